//! Scripted seeders shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use swarmget::protocol::{read_message, write_message, HANDSHAKE_LEN};
use swarmget::{Handshake, Message, Metadata, PeerConnector, PeerEndpoint, TorrentError};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

pub const SEEDER_ID: [u8; 20] = *b"-FAKE01-seeder000000";
pub const CLIENT_ID: [u8; 20] = *b"-SG0001-testclient00";

/// How a fake peer behaves once connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Serves every block correctly
    Good,
    /// Serves blocks with the first byte flipped
    Corrupt,
    /// Closes the connection right after the handshake
    HangUp,
    /// Unchokes, then answers every request with a choke
    ChokeMidPiece,
    /// Unchokes, then sends only keep-alives once a block is requested
    KeepAliveSpam,
    /// Answers the handshake with another torrent's info hash
    WrongHash,
    /// Refuses the connection
    Refuse,
}

/// Deterministic test content
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn metadata_for(content: &[u8], piece_length: u32) -> Metadata {
    Metadata::for_content("http://tracker.test/announce", Some("fixture.bin"), content, piece_length).unwrap()
}

pub fn endpoint(n: u8) -> PeerEndpoint {
    PeerEndpoint::new(Ipv4Addr::new(10, 0, 0, n), 6881)
}

/// Serve `content` to one client over `stream`
pub async fn seed<S>(mut stream: S, metadata: Arc<Metadata>, content: Arc<Vec<u8>>, behavior: Behavior)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_LEN];
    if stream.read_exact(&mut buf).await.is_err() {
        return;
    }
    let info_hash = match behavior {
        Behavior::WrongHash => [0xAB; 20],
        _ => *metadata.info_hash(),
    };
    if stream.write_all(&Handshake::new(info_hash, SEEDER_ID).serialize()).await.is_err() {
        return;
    }
    if behavior == Behavior::HangUp {
        return;
    }

    let bitfield = Message::Bitfield {
        bitfield: Bytes::from(vec![0xFF; (metadata.piece_count() as usize).div_ceil(8)]),
    };
    if write_message(&mut stream, &bitfield).await.is_err() {
        return;
    }

    while let Ok(message) = read_message(&mut stream).await {
        let reply = match message {
            Message::Interested => Message::Unchoke,
            Message::Request { .. } if behavior == Behavior::KeepAliveSpam => {
                while write_message(&mut stream, &Message::KeepAlive).await.is_ok() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                return;
            }
            Message::Request { .. } if behavior == Behavior::ChokeMidPiece => Message::Other {
                id: 0,
                payload: Bytes::new(),
            },
            Message::Request { index, begin, length } => {
                let start = metadata.piece_offset(index).unwrap_or(0) as usize + begin as usize;
                let mut block = content[start..start + length as usize].to_vec();
                if behavior == Behavior::Corrupt {
                    block[0] ^= 0xFF;
                }
                Message::Piece {
                    index,
                    begin,
                    block: Bytes::from(block),
                }
            }
            _ => continue,
        };
        if write_message(&mut stream, &reply).await.is_err() {
            return;
        }
    }
}

/// In-memory connector: each connect spawns a seeder on a duplex pipe
pub struct FakeConnector {
    metadata: Arc<Metadata>,
    content: Arc<Vec<u8>>,
    behaviors: HashMap<PeerEndpoint, Behavior>,
    connects: Mutex<HashMap<PeerEndpoint, usize>>,
}

impl FakeConnector {
    pub fn new(metadata: Arc<Metadata>, content: Vec<u8>) -> Self {
        Self {
            metadata,
            content: Arc::new(content),
            behaviors: HashMap::new(),
            connects: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_peer(mut self, peer: PeerEndpoint, behavior: Behavior) -> Self {
        self.behaviors.insert(peer, behavior);
        self
    }

    /// Number of connections opened to `peer`
    pub fn connects(&self, peer: PeerEndpoint) -> usize {
        self.connects.lock().unwrap().get(&peer).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    type Stream = DuplexStream;

    async fn connect(&self, peer: PeerEndpoint) -> swarmget::Result<DuplexStream> {
        *self.connects.lock().unwrap().entry(peer).or_insert(0) += 1;
        let behavior = self.behaviors.get(&peer).copied().unwrap_or(Behavior::Refuse);
        if behavior == Behavior::Refuse {
            return Err(TorrentError::network_error_with_address("connection refused", peer.to_string()));
        }
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(seed(server, Arc::clone(&self.metadata), Arc::clone(&self.content), behavior));
        Ok(client)
    }
}
