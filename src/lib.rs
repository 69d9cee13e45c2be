//! swarmget
//!
//! Core of a BitTorrent client for single-file torrents: bencode, metadata,
//! tracker announce, the peer wire protocol and a multi-peer downloader.

pub mod bencode;
pub mod cli;
pub mod download;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod torrent;
pub mod tracker;

pub use error::{Result, TorrentError};

pub use bencode::{decode, encode, Value};
pub use cli::{CliArgs, Command, Config, ProgressWriter};
pub use download::{download_piece, DownloadManager, DownloadOptions, DownloadSummary, PieceResult};
pub use peer::{connect_peer, PeerConnection, PeerConnector, TcpConnector};
pub use protocol::{generate_peer_id, Handshake, Message, MessageId};
pub use torrent::Metadata;
#[cfg(feature = "tracker")]
pub use tracker::HttpTracker;
pub use tracker::{AnnounceRequest, AnnounceResponse, PeerEndpoint, TrackerClient};
