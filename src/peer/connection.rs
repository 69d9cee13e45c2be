//! Peer connection module
//!
//! A handshake-aware wrapper around one byte stream to a peer. The stream is
//! generic so the same code runs over TCP and in-memory test pipes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, TorrentError};
use crate::protocol::{self, Handshake, Message, MessageId, HANDSHAKE_LEN};
use crate::tracker::PeerEndpoint;

/// Handshake progress on one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unsent,
    Sent,
    Completed,
}

/// A connected peer
pub struct PeerConnection<S> {
    stream: S,
    /// Peer label for logs and errors
    peer: String,
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    state: HandshakeState,
    remote: Option<Handshake>,
    read_timeout: Option<Duration>,
}

impl<S> PeerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, info_hash: [u8; 20], our_peer_id: [u8; 20]) -> Self {
        Self {
            stream,
            peer: peer.into(),
            info_hash,
            our_peer_id,
            state: HandshakeState::Unsent,
            remote: None,
            read_timeout: None,
        }
    }

    /// Bound every frame read (and the handshake reply) by `read_timeout`
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Remote peer id, once the handshake completed
    pub fn remote_peer_id(&self) -> Option<&[u8; 20]> {
        self.remote.as_ref().map(|h| &h.peer_id)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Exchange handshakes without checking the echoed info hash
    pub async fn handshake(&mut self) -> Result<Handshake> {
        if self.state != HandshakeState::Unsent {
            return Err(self.fail_handshake(format!("handshake already attempted ({:?})", self.state)));
        }

        debug!("Sending handshake to peer: {}", self.peer);
        let ours = Handshake::new(self.info_hash, self.our_peer_id).serialize();
        if let Err(e) = self.write_handshake(&ours).await {
            return Err(self.fail_handshake(format!("failed to send handshake: {}", e)));
        }
        self.state = HandshakeState::Sent;

        let mut reply = [0u8; HANDSHAKE_LEN];
        let read = self.stream.read_exact(&mut reply);
        let result = match self.read_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => return Err(self.fail_handshake("timed out waiting for handshake reply")),
            },
            None => read.await,
        };
        if let Err(e) = result {
            return Err(self.fail_handshake(format!("failed to read handshake reply: {}", e)));
        }

        let remote = Handshake::deserialize(&reply)
            .map_err(|e| e.with_context(self.peer.clone()))?;
        self.state = HandshakeState::Completed;
        self.remote = Some(remote.clone());

        info!("Handshake completed with peer {} ({})", self.peer, hex::encode(remote.peer_id));
        Ok(remote)
    }

    /// Exchange handshakes and require the peer to echo our info hash
    pub async fn handshake_strict(&mut self) -> Result<Handshake> {
        let remote = self.handshake().await?;
        if remote.info_hash != self.info_hash {
            warn!(
                "Peer {} answered for info hash {}, expected {}",
                self.peer,
                hex::encode(remote.info_hash),
                hex::encode(self.info_hash)
            );
            return Err(self.fail_handshake("info hash mismatch"));
        }
        Ok(remote)
    }

    /// Send a message to the peer
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.require_handshake()?;
        trace!("Sending message id {:?} to peer {}", message.id(), self.peer);
        protocol::write_message(&mut self.stream, message)
            .await
            .map_err(|e| self.attach_address(e))
    }

    /// Next non-keep-alive message
    pub async fn receive(&mut self) -> Result<Message> {
        self.require_handshake()?;
        loop {
            let frame = match self.read_timeout {
                Some(limit) => timeout(limit, protocol::read_frame(&mut self.stream))
                    .await
                    .map_err(|_| {
                        TorrentError::network_error_with_address("read timed out", self.peer.as_str())
                    })?,
                None => protocol::read_frame(&mut self.stream).await,
            };

            match frame.map_err(|e| self.attach_address(e))? {
                Some((id, payload)) => return Message::parse(id, payload),
                None => trace!("Keep-alive from peer {}", self.peer),
            }
        }
    }

    /// Read the next message and require it to carry `expected`
    pub async fn expect(&mut self, expected: MessageId) -> Result<Message> {
        let message = self.receive().await?;
        match message.id() {
            Some(id) if id == expected as u8 => Ok(message),
            Some(id) => {
                debug!("Peer {} sent id {} while waiting for {}", self.peer, id, expected);
                Err(TorrentError::unexpected_message(expected as u8, id))
            }
            None => Err(TorrentError::protocol_error("keep-alive surfaced as a message")),
        }
    }

    async fn write_handshake(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    fn require_handshake(&self) -> Result<()> {
        if self.state == HandshakeState::Completed {
            Ok(())
        } else {
            Err(TorrentError::protocol_error(format!(
                "handshake with {} not completed",
                self.peer
            )))
        }
    }

    fn fail_handshake(&self, message: impl Into<String>) -> TorrentError {
        TorrentError::handshake_failed_with_peer(message, self.peer.as_str())
    }

    fn attach_address(&self, err: TorrentError) -> TorrentError {
        match err {
            TorrentError::NetworkError { message, address: None } => {
                TorrentError::network_error_with_address(message, self.peer.as_str())
            }
            other => other,
        }
    }
}

/// Opens byte streams to peers
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, peer: PeerEndpoint) -> Result<Self::Stream>;
}

/// Plain TCP with a connect timeout
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl PeerConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, peer: PeerEndpoint) -> Result<TcpStream> {
        debug!("Connecting to peer: {}", peer);
        let stream = timeout(self.connect_timeout, TcpStream::connect(peer.socket_addr()))
            .await
            .map_err(|_| TorrentError::network_error_with_address("connection timed out", peer.to_string()))?
            .map_err(|e| TorrentError::network_error_with_address(e.to_string(), peer.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }
        Ok(stream)
    }
}

/// Connect through `connector` and complete a strict handshake
pub async fn connect_peer<C>(
    connector: &C,
    peer: PeerEndpoint,
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    read_timeout: Duration,
) -> Result<PeerConnection<C::Stream>>
where
    C: PeerConnector + ?Sized,
{
    let stream = connector.connect(peer).await?;
    let mut conn = PeerConnection::new(stream, peer.to_string(), info_hash, our_peer_id)
        .with_read_timeout(read_timeout);
    conn.handshake_strict().await?;
    Ok(conn)
}
