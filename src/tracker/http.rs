//! HTTP tracker client

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::announce::{AnnounceRequest, AnnounceResponse};
use super::TrackerClient;
use crate::error::{Result, TorrentError};

/// Request timeout for announces
pub const TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Announces over HTTP GET
pub struct HttpTracker {
    tracker_url: String,
    client: reqwest::Client,
}

impl HttpTracker {
    pub fn new(tracker_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(TRACKER_TIMEOUT).build()?;
        Ok(Self {
            tracker_url: tracker_url.into(),
            client,
        })
    }
}

#[async_trait]
impl TrackerClient for HttpTracker {
    async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        let url = request.to_url(&self.tracker_url)?;
        info!("Announcing to tracker {}", self.tracker_url);
        debug!("Announce URL: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TorrentError::tracker_error_with_url(
                format!("tracker responded with HTTP {}", status),
                self.tracker_url.as_str(),
            ));
        }

        let body = response.bytes().await?;
        AnnounceResponse::from_bytes(&body)
            .map_err(|e| e.with_context(format!("tracker {}", self.tracker_url)))
    }

    fn tracker_url(&self) -> &str {
        &self.tracker_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request line
    async fn serve_once(status: &'static str, body: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        (format!("http://{}/announce", addr), handle)
    }

    #[tokio::test]
    async fn test_announce_over_http() {
        let mut body = b"d8:intervali900e5:peers6:".to_vec();
        body.extend_from_slice(&[192, 168, 1, 9, 0x1A, 0xE1]);
        body.push(b'e');
        let (url, server) = serve_once("200 OK", body).await;

        let tracker = HttpTracker::new(url.clone()).unwrap();
        assert_eq!(tracker.tracker_url(), url);

        let request = AnnounceRequest::new([1u8; 20], [2u8; 20], 6881, 100);
        let response = tracker.announce(&request).await.unwrap();
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].to_string(), "192.168.1.9:6881");

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /announce?info_hash="));
        assert!(request_line.contains("compact=1"));
    }

    #[tokio::test]
    async fn test_announce_http_error_status() {
        let (url, _server) = serve_once("500 Internal Server Error", b"oops".to_vec()).await;
        let tracker = HttpTracker::new(url).unwrap();

        let request = AnnounceRequest::new([1u8; 20], [2u8; 20], 6881, 100);
        let err = tracker.announce(&request).await.unwrap_err();
        assert!(matches!(err, TorrentError::TrackerError { .. }));
    }
}
