//! Tracker announce request and response

use std::time::Duration;
use tracing::debug;
use url::Url;

use super::peers::{parse_compact_peers, PeerEndpoint};
use crate::bencode::{self, Value};
use crate::error::{Result, TorrentError};

/// Parameters of an HTTP announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub compact: bool,
}

impl AnnounceRequest {
    /// Request for a fresh download of `left` bytes
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
            compact: true,
        }
    }

    /// Build the announce URL. Raw hash and id bytes are percent-encoded
    /// byte by byte, not as UTF-8 text.
    pub fn to_url(&self, tracker_url: &str) -> Result<Url> {
        let mut url = Url::parse(tracker_url)
            .map_err(|e| TorrentError::tracker_error_with_url(e.to_string(), tracker_url))?;

        let params = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact={}",
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left,
            if self.compact { 1 } else { 0 },
        );

        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, params),
            _ => params,
        };
        url.set_query(Some(&query));
        Ok(url)
    }
}

/// Decoded tracker reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub peers: Vec<PeerEndpoint>,
    pub interval: Option<Duration>,
    pub min_interval: Option<Duration>,
    pub complete: Option<u32>,
    pub incomplete: Option<u32>,
}

impl AnnounceResponse {
    /// Parse a bencoded tracker body
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let root = bencode::decode(body)?;
        if root.as_dict().is_none() {
            return Err(TorrentError::malformed("tracker response must be a dictionary", 0));
        }

        if let Some(reason) = root.get(b"failure reason") {
            let reason = reason
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|| "unspecified failure".to_string());
            return Err(TorrentError::tracker_error(format!("tracker refused announce: {}", reason)));
        }

        let peers = match root.get(b"peers") {
            Some(Value::Bytes(raw)) => parse_compact_peers(raw)?,
            Some(_) => return Err(TorrentError::wrong_type("peers", "compact byte string")),
            None => return Err(TorrentError::missing_field("peers")),
        };

        let response = AnnounceResponse {
            peers,
            interval: seconds(&root, b"interval"),
            min_interval: seconds(&root, b"min interval"),
            complete: count(&root, b"complete"),
            incomplete: count(&root, b"incomplete"),
        };
        debug!(
            "Tracker returned {} peers (interval {:?})",
            response.peers.len(),
            response.interval
        );
        Ok(response)
    }
}

fn seconds(root: &Value, key: &[u8]) -> Option<Duration> {
    root.get(key)
        .and_then(Value::as_integer)
        .and_then(|s| u64::try_from(s).ok())
        .map(Duration::from_secs)
}

fn count(root: &Value, key: &[u8]) -> Option<u32> {
    root.get(key)
        .and_then(Value::as_integer)
        .and_then(|n| u32::try_from(n).ok())
}
