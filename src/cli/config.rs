//! CLI configuration module
//!
//! Resolves global flags and download options into validated settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::args::{CliArgs, DownloadArgs};
use crate::download::DownloadOptions;
use crate::error::{Result, TorrentError};
use crate::protocol::generate_peer_id;
use crate::tracker::PeerEndpoint;

/// Settings for one invocation
#[derive(Debug, Clone)]
pub struct Config {
    /// Port reported to the tracker
    pub port: u16,
    /// Our peer id
    pub peer_id: [u8; 20],
    /// Output file for the download commands
    pub output: Option<PathBuf>,
    pub max_peers: usize,
    pub max_attempts: u32,
    pub pipeline_depth: usize,
    pub timeout: Duration,
    /// Peers given on the command line; the tracker is skipped when set
    pub peers: Vec<PeerEndpoint>,
    pub verbose: bool,
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs, output: Option<PathBuf>, download: Option<&DownloadArgs>) -> Result<Self> {
        let peer_id = match &args.peer_id {
            Some(id) => parse_peer_id(id)?,
            None => generate_peer_id(),
        };
        let defaults = DownloadOptions::default();

        let mut config = Self {
            port: args.port,
            peer_id,
            output,
            max_peers: defaults.max_peers,
            max_attempts: defaults.max_attempts,
            pipeline_depth: defaults.pipeline_depth,
            timeout: defaults.read_timeout,
            peers: Vec::new(),
            verbose: args.verbose,
            quiet: args.quiet,
        };

        if let Some(download) = download {
            config.max_peers = download.max_peers;
            config.max_attempts = download.max_attempts;
            config.pipeline_depth = download.pipeline_depth;
            config.timeout = Duration::from_secs(download.timeout);
            config.peers = download
                .peers
                .iter()
                .map(|p| p.parse::<PeerEndpoint>().map_err(|e| e.with_context(format!("--peer {}", p))))
                .collect::<Result<_>>()?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("port cannot be 0", "port"));
        }
        if self.max_peers == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1", "max_peers"));
        }
        if self.max_attempts == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1", "max_attempts"));
        }
        if self.pipeline_depth == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1", "pipeline"));
        }
        if self.timeout.is_zero() {
            return Err(TorrentError::config_error_with_field("must be at least 1 second", "timeout"));
        }
        if let Some(output) = &self.output {
            if output.as_os_str().is_empty() {
                return Err(TorrentError::config_error_with_field("output path cannot be empty", "output"));
            }
        }
        Ok(())
    }

    /// Options for the download manager
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            max_peers: self.max_peers,
            max_attempts: self.max_attempts,
            pipeline_depth: self.pipeline_depth,
            connect_timeout: self.timeout,
            read_timeout: self.timeout,
            ..DownloadOptions::default()
        }
    }
}

fn parse_peer_id(id: &str) -> Result<[u8; 20]> {
    id.as_bytes().try_into().map_err(|_| {
        TorrentError::config_error_with_field(
            format!("peer id must be exactly 20 bytes, got {}", id.len()),
            "peer_id",
        )
    })
}
