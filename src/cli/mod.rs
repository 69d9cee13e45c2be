//! CLI module
//!
//! Argument parsing, resolved configuration and progress reporting for the
//! `swarmget` binary.

pub mod args;
pub mod config;
pub mod progress;

pub use args::{CliArgs, Command, DownloadArgs};
pub use config::Config;
pub use progress::{format_bytes, format_duration, format_summary, ProgressWriter};
