//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for swarmget
#[derive(Debug, Parser)]
#[command(name = "swarmget", version)]
#[command(about = "A BitTorrent client for single-file torrents", long_about = None)]
pub struct CliArgs {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Port reported to the tracker
    #[arg(short, long, global = true, default_value_t = 6881)]
    pub port: u16,

    /// Use this 20-character peer id instead of a random one
    #[arg(long, global = true, value_name = "ID")]
    pub peer_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Print the contents of a metadata file
    Info {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Ask the tracker for peers
    Peers {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Handshake with one peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        /// Peer address as ip:port
        #[arg(value_name = "PEER")]
        peer: String,
    },

    /// Download and verify a single piece
    DownloadPiece {
        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        #[arg(value_name = "PIECE_INDEX")]
        index: u32,
        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Download the whole file
    Download {
        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        #[command(flatten)]
        download: DownloadArgs,
    },
}

/// Options shared by the download commands
#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    /// Maximum number of concurrent peer connections
    #[arg(long, default_value_t = 5)]
    pub max_peers: usize,

    /// Attempts per piece before giving up
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Block requests kept in flight per peer
    #[arg(long = "pipeline", default_value_t = 5)]
    pub pipeline_depth: usize,

    /// Connect and read timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Skip the tracker and use these peers (ip:port, repeatable)
    #[arg(long = "peer", value_name = "PEER")]
    pub peers: Vec<String>,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
