//! Per-peer download task
//!
//! A worker owns one peer connection. It asks the coordinator for work over
//! a channel, fetches the piece on its persistent connection and reports the
//! outcome. The worker never touches the output or the queue directly.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::manager::piece_timed_out;
use super::orchestrator::{fetch_piece, negotiate};
use super::piece::PieceResult;
use crate::error::{Result, TorrentError};
use crate::peer::{connect_peer, PeerConnection, PeerConnector};
use crate::torrent::Metadata;
use crate::tracker::PeerEndpoint;

/// Identifies a worker to the coordinator
pub type WorkerId = usize;

/// Messages from workers to the coordinator
#[derive(Debug)]
pub enum WorkerEvent {
    /// Idle and negotiated; the coordinator answers with an index or `None`
    Ready {
        worker: WorkerId,
        reply: oneshot::Sender<Option<u32>>,
    },
    Completed {
        worker: WorkerId,
        piece: PieceResult,
    },
    Failed {
        worker: WorkerId,
        index: u32,
        error: TorrentError,
    },
    /// The worker has stopped and will send nothing more
    Exited { worker: WorkerId },
}

/// Connection settings shared by all workers
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub pipeline_depth: usize,
    pub read_timeout: Duration,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    pub piece_timeout: Duration,
}

pub struct PeerWorker<C: PeerConnector> {
    id: WorkerId,
    peer: PeerEndpoint,
    connector: Arc<C>,
    metadata: Arc<Metadata>,
    peer_id: [u8; 20],
    settings: WorkerSettings,
    events: mpsc::Sender<WorkerEvent>,
}

impl<C: PeerConnector> PeerWorker<C> {
    pub fn new(
        id: WorkerId,
        peer: PeerEndpoint,
        connector: Arc<C>,
        metadata: Arc<Metadata>,
        peer_id: [u8; 20],
        settings: WorkerSettings,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            id,
            peer,
            connector,
            metadata,
            peer_id,
            settings,
            events,
        }
    }

    /// Run until the coordinator has no more work or the peer is given up on
    pub async fn run(self) {
        let mut reconnects = 0;

        'connection: loop {
            if reconnects > 0 && !self.settings.reconnect_delay.is_zero() {
                tokio::time::sleep(self.settings.reconnect_delay * reconnects).await;
            }

            let mut conn = match self.open().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Worker {}: cannot use peer {}: {}", self.id, self.peer, e);
                    if reconnects >= self.settings.max_reconnects {
                        break 'connection;
                    }
                    reconnects += 1;
                    continue 'connection;
                }
            };
            info!("Worker {}: ready on peer {}", self.id, self.peer);

            loop {
                let (reply, assignment) = oneshot::channel();
                let ready = WorkerEvent::Ready {
                    worker: self.id,
                    reply,
                };
                if self.events.send(ready).await.is_err() {
                    break 'connection;
                }
                let index = match assignment.await {
                    Ok(Some(index)) => index,
                    _ => {
                        debug!("Worker {}: no more work", self.id);
                        break 'connection;
                    }
                };

                let fetch = fetch_piece(&mut conn, &self.metadata, index, self.settings.pipeline_depth);
                let outcome = match timeout(self.settings.piece_timeout, fetch).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(piece_timed_out(index, self.peer, self.settings.piece_timeout)),
                };
                match outcome {
                    Ok(piece) => {
                        let event = WorkerEvent::Completed {
                            worker: self.id,
                            piece,
                        };
                        if self.events.send(event).await.is_err() {
                            break 'connection;
                        }
                    }
                    Err(error) => {
                        warn!("Worker {}: piece {} failed on {}: {}", self.id, index, self.peer, error);
                        let retry = error.is_peer_failure();
                        let event = WorkerEvent::Failed {
                            worker: self.id,
                            index,
                            error,
                        };
                        if self.events.send(event).await.is_err() || !retry {
                            break 'connection;
                        }
                        // The stream may hold stale blocks; start over on a fresh one
                        if reconnects >= self.settings.max_reconnects {
                            break 'connection;
                        }
                        reconnects += 1;
                        continue 'connection;
                    }
                }
            }
        }

        let _ = self.events.send(WorkerEvent::Exited { worker: self.id }).await;
    }

    async fn open(&self) -> Result<PeerConnection<C::Stream>> {
        let mut conn = connect_peer(
            self.connector.as_ref(),
            self.peer,
            *self.metadata.info_hash(),
            self.peer_id,
            self.settings.read_timeout,
        )
        .await?;
        negotiate(&mut conn).await?;
        Ok(conn)
    }
}
