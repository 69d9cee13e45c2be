//! Peer module
//!
//! Connections to remote peers and the transport seam used to open them.

pub mod connection;

// Re-export main types
pub use connection::{connect_peer, HandshakeState, PeerConnection, PeerConnector, TcpConnector};
