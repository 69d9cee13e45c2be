//! Download module
//!
//! Piece assembly and verification, the single-piece protocol sequence, and
//! the multi-peer manager that drives a whole file.

pub mod manager;
pub mod orchestrator;
pub mod piece;
pub mod worker;

pub use manager::{DownloadManager, DownloadOptions, DownloadSummary};
pub use orchestrator::{download_piece, fetch_piece, negotiate, DEFAULT_PIPELINE_DEPTH};
pub use piece::{block_plan, BlockRequest, PieceBuffer, PieceResult, BLOCK_SIZE};
pub use worker::{PeerWorker, WorkerEvent, WorkerId, WorkerSettings};
