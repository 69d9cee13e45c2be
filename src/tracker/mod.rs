//! Tracker module
//!
//! Announce requests, compact peer lists and the HTTP tracker client.

pub mod announce;
#[cfg(feature = "tracker")]
pub mod http;
pub mod peers;

use async_trait::async_trait;

use crate::error::Result;

pub use announce::{AnnounceRequest, AnnounceResponse};
#[cfg(feature = "tracker")]
pub use http::HttpTracker;
pub use peers::{parse_compact_peers, serialize_compact_peers, PeerEndpoint, COMPACT_PEER_LEN};

/// Source of peer lists for a torrent
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Announce and return the tracker's peer list
    async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse>;

    /// Tracker identifier for logging
    fn tracker_url(&self) -> &str;
}
