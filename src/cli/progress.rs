//! Progress display module
//!
//! Tracks how much of the output file has been written and reports it
//! through the log, plus the human-readable formatting used by the CLI.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::AsyncWrite;
use tracing::info;

use crate::download::DownloadSummary;

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration to human readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// One-line report for a finished download
pub fn format_summary(summary: &DownloadSummary, elapsed: Duration) -> String {
    format!(
        "Downloaded {} pieces ({}) in {} from {} peers, {} failed attempts",
        summary.pieces,
        format_bytes(summary.bytes),
        format_duration(elapsed),
        summary.peers_used,
        summary.failed_attempts,
    )
}

/// Sink wrapper that logs progress every 10% of `total`
pub struct ProgressWriter<W> {
    inner: W,
    total: u64,
    written: u64,
    /// Last reported tenth, 0..=10
    reported: u64,
    start_time: Instant,
}

impl<W> ProgressWriter<W> {
    pub fn new(inner: W, total: u64) -> Self {
        Self {
            inner,
            total,
            written: 0,
            reported: 0,
            start_time: Instant::now(),
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Fraction written, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.written as f64 / self.total as f64
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn record(&mut self, n: usize) {
        self.written += n as u64;
        if self.total == 0 {
            return;
        }
        let tenth = (self.written.min(self.total) * 10) / self.total;
        if tenth > self.reported {
            self.reported = tenth;
            info!(
                "Progress: {:.0}% ({} / {})",
                self.progress() * 100.0,
                format_bytes(self.written),
                format_bytes(self.total)
            );
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = result {
            this.record(n);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
