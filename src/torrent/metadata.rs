//! Torrent metadata
//!
//! Interprets a decoded metadata file: tracker URL, file length, piece
//! length, per-piece SHA-1 digests and the info hash that identifies the
//! torrent to trackers and peers.

use sha1::{Digest, Sha1};
use std::path::Path;
use tracing::debug;

use crate::bencode::{self, Dict, Value};
use crate::error::{Result, TorrentError};

/// Length of a SHA-1 digest
pub const HASH_LEN: usize = 20;

/// Single-file torrent metadata. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    tracker_url: String,
    name: Option<String>,
    total_length: u64,
    piece_length: u64,
    piece_hashes: Vec<[u8; HASH_LEN]>,
    info_hash: [u8; HASH_LEN],
}

impl Metadata {
    /// Parse metadata from the raw bytes of a metadata file
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let root = bencode::decode(raw)?;
        let root = root
            .as_dict()
            .ok_or_else(|| TorrentError::malformed("metadata must be a dictionary", 0))?;

        let tracker_url = required_str(root, "announce")?.to_string();
        let info = match root.get(b"info".as_ref()) {
            Some(Value::Dict(info)) => info,
            Some(_) => return Err(TorrentError::wrong_type("info", "dictionary")),
            None => return Err(TorrentError::missing_field("info")),
        };

        // Hash the canonical re-encoding of the info dictionary
        let info_hash = sha1_digest(&bencode::encode(&Value::Dict(info.clone())));

        let total_length = required_int(info, "length")?;
        let total_length = u64::try_from(total_length)
            .map_err(|_| TorrentError::wrong_type("length", "non-negative integer"))?;

        let piece_length = required_int(info, "piece length")?;
        if piece_length <= 0 {
            return Err(TorrentError::invalid_piece_table(format!(
                "piece length must be positive, got {}",
                piece_length
            )));
        }
        if piece_length > u32::MAX as i64 {
            return Err(TorrentError::invalid_piece_table(format!(
                "piece length {} too large",
                piece_length
            )));
        }
        let piece_length = piece_length as u64;

        let pieces = match info.get(b"pieces".as_ref()) {
            Some(Value::Bytes(b)) => b,
            Some(_) => return Err(TorrentError::wrong_type("pieces", "byte string")),
            None => return Err(TorrentError::missing_field("pieces")),
        };
        let piece_hashes = split_piece_hashes(pieces)?;

        let expected = total_length.div_ceil(piece_length);
        if piece_hashes.len() as u64 != expected {
            return Err(TorrentError::invalid_piece_table(format!(
                "{} digests for {} bytes at piece length {} (expected {})",
                piece_hashes.len(),
                total_length,
                piece_length,
                expected
            )));
        }
        if expected > u32::MAX as u64 {
            return Err(TorrentError::invalid_piece_table("too many pieces"));
        }

        // Legacy clients wrote names in local code pages
        let name = match info.get(b"name".as_ref()) {
            Some(value) => Some(
                String::from_utf8_lossy(
                    value
                        .as_bytes()
                        .ok_or_else(|| TorrentError::wrong_type("name", "byte string"))?,
                )
                .into_owned(),
            ),
            None => None,
        };

        let metadata = Metadata {
            tracker_url,
            name,
            total_length,
            piece_length,
            piece_hashes,
            info_hash,
        };
        debug!(
            "Parsed metadata: info hash {}, {} pieces of {} bytes",
            metadata.info_hash_hex(),
            metadata.piece_count(),
            metadata.piece_length
        );
        Ok(metadata)
    }

    /// Read and parse a metadata file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            TorrentError::storage_error_with_path(e.to_string(), path.display().to_string())
        })?;
        Self::from_bytes(&raw)
    }

    /// Build metadata describing `content`, hashing it piece by piece
    pub fn for_content(
        tracker_url: &str,
        name: Option<&str>,
        content: &[u8],
        piece_length: u32,
    ) -> Result<Self> {
        if piece_length == 0 {
            return Err(TorrentError::invalid_piece_table("piece length must be positive"));
        }
        let pieces: Vec<u8> = content
            .chunks(piece_length as usize)
            .flat_map(sha1_digest)
            .collect();

        let raw = bencode::encode(&metadata_value(
            tracker_url,
            name,
            content.len() as u64,
            piece_length as u64,
            pieces,
        ));
        Self::from_bytes(&raw)
    }

    /// Encode as a metadata file. Only the fields modelled here are written,
    /// so extra keys of a parsed info dictionary are not carried over.
    pub fn to_bytes(&self) -> Vec<u8> {
        bencode::encode(&metadata_value(
            &self.tracker_url,
            self.name.as_deref(),
            self.total_length,
            self.piece_length,
            self.piece_hashes.concat(),
        ))
    }

    pub fn tracker_url(&self) -> &str {
        &self.tracker_url
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn info_hash(&self) -> &[u8; HASH_LEN] {
        &self.info_hash
    }

    pub fn piece_hashes(&self) -> &[[u8; HASH_LEN]] {
        &self.piece_hashes
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_hashes.len() as u32
    }

    pub fn piece_hash(&self, index: u32) -> Option<&[u8; HASH_LEN]> {
        self.piece_hashes.get(index as usize)
    }

    /// Effective length of a piece: every piece is `piece_length` except the
    /// last, which holds the remainder of the file.
    pub fn piece_size(&self, index: u32) -> Option<u32> {
        if index >= self.piece_count() {
            return None;
        }
        if index + 1 < self.piece_count() {
            return Some(self.piece_length as u32);
        }
        match self.total_length % self.piece_length {
            0 => Some(self.piece_length as u32),
            rem => Some(rem as u32),
        }
    }

    /// Byte offset of a piece within the file
    pub fn piece_offset(&self, index: u32) -> Option<u64> {
        (index < self.piece_count()).then(|| index as u64 * self.piece_length)
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.piece_hashes.iter().map(hex::encode).collect()
    }
}

/// SHA-1 of a byte slice
pub fn sha1_digest(data: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn metadata_value(
    tracker_url: &str,
    name: Option<&str>,
    total_length: u64,
    piece_length: u64,
    pieces: Vec<u8>,
) -> Value {
    let mut info = Dict::new();
    info.insert(b"length".to_vec(), Value::Integer(total_length as i64));
    if let Some(name) = name {
        info.insert(b"name".to_vec(), Value::from(name));
    }
    info.insert(b"piece length".to_vec(), Value::Integer(piece_length as i64));
    info.insert(b"pieces".to_vec(), Value::Bytes(pieces));

    let mut root = Dict::new();
    root.insert(b"announce".to_vec(), Value::from(tracker_url));
    root.insert(b"info".to_vec(), Value::Dict(info));
    Value::Dict(root)
}

fn split_piece_hashes(pieces: &[u8]) -> Result<Vec<[u8; HASH_LEN]>> {
    if pieces.len() % HASH_LEN != 0 {
        return Err(TorrentError::invalid_piece_table(format!(
            "pieces field length must be a multiple of {}, got {}",
            HASH_LEN,
            pieces.len()
        )));
    }

    Ok(pieces
        .chunks_exact(HASH_LEN)
        .map(|chunk| {
            let mut hash = [0u8; HASH_LEN];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

fn required_str<'a>(dict: &'a Dict, field: &str) -> Result<&'a str> {
    match dict.get(field.as_bytes()) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| TorrentError::wrong_type(field, "UTF-8 string")),
        None => Err(TorrentError::missing_field(field)),
    }
}

fn required_int(dict: &Dict, field: &str) -> Result<i64> {
    match dict.get(field.as_bytes()) {
        Some(value) => value
            .as_integer()
            .ok_or_else(|| TorrentError::wrong_type(field, "integer")),
        None => Err(TorrentError::missing_field(field)),
    }
}
