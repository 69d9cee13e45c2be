//! BitTorrent handshake
//!
//! The first 68 bytes exchanged on a peer connection: protocol name length,
//! protocol name, 8 reserved bytes, info hash and peer id.

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, trace};

use crate::error::{Result, TorrentError};

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Size of a handshake on the wire
pub const HANDSHAKE_LEN: usize = 68;

const RESERVED_LEN: usize = 8;

/// Client prefix of generated peer ids
pub const PEER_ID_PREFIX: &[u8; 8] = b"-SG0001-";

/// A parsed or outgoing handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol name as sent by the remote side
    pub protocol: Vec<u8>,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            protocol: PROTOCOL_STRING.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Serialize to exactly 68 bytes
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING.as_bytes());
        buf.put_bytes(0, RESERVED_LEN);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);

        let mut out = [0u8; HANDSHAKE_LEN];
        out.copy_from_slice(&buf);
        trace!("Serialized handshake for info hash {}", hex::encode(self.info_hash));
        out
    }

    /// Parse a 68-byte handshake.
    ///
    /// The protocol name is kept but not checked; only a length byte that
    /// pushes the info hash and peer id past the end of the buffer is
    /// rejected.
    pub fn deserialize(data: &[u8; HANDSHAKE_LEN]) -> Result<Self> {
        let name_len = data[0] as usize;
        let hash_start = 1 + name_len + RESERVED_LEN;
        if hash_start + 40 > HANDSHAKE_LEN {
            return Err(TorrentError::handshake_failed(format!(
                "protocol name length {} does not fit in a {}-byte handshake",
                name_len, HANDSHAKE_LEN
            )));
        }

        let protocol = data[1..1 + name_len].to_vec();
        if protocol != PROTOCOL_STRING.as_bytes() {
            debug!(
                "Peer announced protocol {:?}",
                String::from_utf8_lossy(&protocol)
            );
        }

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[hash_start..hash_start + 20]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[hash_start + 20..hash_start + 40]);

        Ok(Self {
            protocol,
            info_hash,
            peer_id,
        })
    }
}

/// Generate a peer id: fixed client prefix plus 12 random bytes
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
    peer_id[PEER_ID_PREFIX.len()..].copy_from_slice(&rand::random::<[u8; 12]>());
    info!("Generated new peer ID: {}", hex::encode(peer_id));
    peer_id
}
