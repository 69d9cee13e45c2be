//! Compact peer list encoding
//!
//! Trackers answer with a flat byte string: 4 bytes of IPv4 address followed
//! by a 2-byte big-endian port, repeated once per peer.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{Result, TorrentError};

/// Bytes per entry in a compact peer list
pub const COMPACT_PEER_LEN: usize = 6;

/// A peer address from a tracker response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

impl From<SocketAddrV4> for PeerEndpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<PeerEndpoint> for SocketAddr {
    fn from(peer: PeerEndpoint) -> Self {
        peer.socket_addr()
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl std::str::FromStr for PeerEndpoint {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(addr.into())
    }
}

/// Parse a compact peer list, preserving input order
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<PeerEndpoint>> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::invalid_length(
            "compact peer list",
            COMPACT_PEER_LEN,
            data.len(),
        ));
    }

    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerEndpoint::new(ip, port)
        })
        .collect())
}

/// Serialize peers to compact format
pub fn serialize_compact_peers(peers: &[PeerEndpoint]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(peers.len() * COMPACT_PEER_LEN);
    for peer in peers {
        buffer.extend_from_slice(&peer.address.octets());
        buffer.extend_from_slice(&peer.port.to_be_bytes());
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_peers() {
        let data = [127, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 2, 0xC8, 0xD5];
        let peers = parse_compact_peers(&data).unwrap();
        assert_eq!(
            peers,
            vec![
                PeerEndpoint::new(Ipv4Addr::new(127, 0, 0, 1), 6881),
                PeerEndpoint::new(Ipv4Addr::new(10, 0, 0, 2), 51413),
            ]
        );
        assert_eq!(peers[1].to_string(), "10.0.0.2:51413");
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_compact_peers(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_partial_entry() {
        let err = parse_compact_peers(&[1, 2, 3, 4, 5, 6, 7]).unwrap_err();
        assert_eq!(
            err,
            TorrentError::InvalidLength {
                message: "compact peer list".to_string(),
                unit: 6,
                actual: 7,
            }
        );
    }

    #[test]
    fn test_serialize_compact_peers() {
        let peers = vec![
            "165.232.33.77:51467".parse::<PeerEndpoint>().unwrap(),
            "178.62.85.20:51489".parse::<PeerEndpoint>().unwrap(),
        ];
        let data = serialize_compact_peers(&peers);
        assert_eq!(data.len(), 12);
        assert_eq!(parse_compact_peers(&data).unwrap(), peers);
    }

    #[test]
    fn test_endpoint_from_str_rejects_garbage() {
        assert!(matches!(
            "not-an-address".parse::<PeerEndpoint>(),
            Err(TorrentError::ConfigError { .. })
        ));
    }
}
