//! Multi-peer download manager
//!
//! One worker task per peer connection; a single coordinator that owns the
//! pending queue, the attempt counters and the reorder buffer, and writes
//! verified pieces to the sink in ascending index order.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::orchestrator::{download_piece, DEFAULT_PIPELINE_DEPTH};
use super::piece::PieceResult;
use super::worker::{PeerWorker, WorkerEvent, WorkerId, WorkerSettings};
use crate::error::{Result, TorrentError};
use crate::peer::{connect_peer, PeerConnector};
use crate::torrent::Metadata;
use crate::tracker::PeerEndpoint;

/// Tuning knobs for a download run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Concurrent peer connections
    pub max_peers: usize,
    /// Failures tolerated per piece before the run is abandoned
    pub max_attempts: u32,
    /// Block requests in flight per connection
    pub pipeline_depth: usize,
    pub connect_timeout: Duration,
    /// Per-frame read timeout
    pub read_timeout: Duration,
    /// Fresh connections a worker may open after its first
    pub max_reconnects: u32,
    /// Base delay before a reconnect, multiplied by the reconnect count
    pub reconnect_delay: Duration,
    /// Deadline for fetching one piece, however chatty the peer is
    pub piece_timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_peers: 5,
            max_attempts: 3,
            pipeline_depth: DEFAULT_PIPELINE_DEPTH,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_reconnects: 1,
            reconnect_delay: Duration::from_secs(1),
            piece_timeout: Duration::from_secs(120),
        }
    }
}

impl DownloadOptions {
    fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            pipeline_depth: self.pipeline_depth,
            read_timeout: self.read_timeout,
            max_reconnects: self.max_reconnects,
            reconnect_delay: self.reconnect_delay,
            piece_timeout: self.piece_timeout,
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub pieces: u32,
    pub bytes: u64,
    /// Peers that delivered at least one verified piece
    pub peers_used: usize,
    pub failed_attempts: u32,
}

pub struct DownloadManager {
    metadata: Arc<Metadata>,
    peer_id: [u8; 20],
    options: DownloadOptions,
}

impl DownloadManager {
    pub fn new(metadata: Arc<Metadata>, peer_id: [u8; 20], options: DownloadOptions) -> Self {
        Self {
            metadata,
            peer_id,
            options,
        }
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Download every piece from `peers`, writing the file to `sink` in order
    pub async fn run<C, W>(
        &self,
        connector: Arc<C>,
        peers: &[PeerEndpoint],
        sink: &mut W,
    ) -> Result<DownloadSummary>
    where
        C: PeerConnector,
        W: AsyncWrite + Unpin,
    {
        let piece_count = self.metadata.piece_count();
        if piece_count == 0 {
            sink.flush().await.map_err(sink_error)?;
            return Ok(DownloadSummary::default());
        }
        if peers.is_empty() {
            return Err(TorrentError::download_failed(0, 0, "no peers available"));
        }

        info!(
            "Downloading {} pieces ({} bytes) from {} peers",
            piece_count,
            self.metadata.total_length(),
            peers.len()
        );

        let (events_tx, events_rx) = mpsc::channel(64);
        let mut coordinator = Coordinator::new(piece_count, self.options.max_attempts);
        let mut reserve: VecDeque<PeerEndpoint> = peers.iter().copied().collect();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for _ in 0..self.options.max_peers.max(1) {
            match reserve.pop_front() {
                Some(peer) => {
                    handles.push(self.spawn_worker(handles.len(), peer, &connector, &events_tx));
                    coordinator.live += 1;
                }
                None => break,
            }
        }

        let result = self
            .coordinate(&mut coordinator, events_rx, &events_tx, &mut reserve, &mut handles, &connector, sink)
            .await;

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        match result {
            Ok(()) => {
                let summary = DownloadSummary {
                    pieces: piece_count,
                    bytes: coordinator.bytes_written,
                    peers_used: coordinator.peers_used.len(),
                    failed_attempts: coordinator.failed_attempts,
                };
                info!(
                    "Download complete: {} pieces, {} bytes, {} peers used, {} failed attempts",
                    summary.pieces, summary.bytes, summary.peers_used, summary.failed_attempts
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Download failed: {}", e);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn coordinate<C, W>(
        &self,
        coordinator: &mut Coordinator,
        mut events: mpsc::Receiver<WorkerEvent>,
        events_tx: &mpsc::Sender<WorkerEvent>,
        reserve: &mut VecDeque<PeerEndpoint>,
        handles: &mut Vec<JoinHandle<()>>,
        connector: &Arc<C>,
        sink: &mut W,
    ) -> Result<()>
    where
        C: PeerConnector,
        W: AsyncWrite + Unpin,
    {
        while !coordinator.is_done() {
            let event = match events.recv().await {
                Some(event) => event,
                None => return Err(coordinator.stalled()),
            };

            match event {
                WorkerEvent::Ready { worker, reply } => {
                    coordinator.idle.push((worker, reply));
                }
                WorkerEvent::Completed { worker, piece } => {
                    coordinator.complete(worker, piece);
                    coordinator.write_in_order(sink).await?;
                }
                WorkerEvent::Failed { worker, index, error } => {
                    coordinator.fail(worker, index, error)?;
                }
                WorkerEvent::Exited { worker } => {
                    coordinator.exited(worker);
                    if let Some(peer) = reserve.pop_front() {
                        debug!("Replacing worker {} with reserve peer {}", worker, peer);
                        handles.push(self.spawn_worker(handles.len(), peer, connector, events_tx));
                        coordinator.live += 1;
                    }
                }
            }

            coordinator.dispatch();
            if coordinator.live == 0 && !coordinator.is_done() {
                return Err(coordinator.stalled());
            }
        }

        sink.flush().await.map_err(sink_error)?;
        // Release parked workers
        for (_, reply) in coordinator.idle.drain(..) {
            let _ = reply.send(None);
        }
        Ok(())
    }

    fn spawn_worker<C: PeerConnector>(
        &self,
        id: WorkerId,
        peer: PeerEndpoint,
        connector: &Arc<C>,
        events: &mpsc::Sender<WorkerEvent>,
    ) -> JoinHandle<()> {
        debug!("Starting worker {} for peer {}", id, peer);
        let worker = PeerWorker::new(
            id,
            peer,
            Arc::clone(connector),
            Arc::clone(&self.metadata),
            self.peer_id,
            self.options.worker_settings(),
            events.clone(),
        );
        tokio::spawn(worker.run())
    }

    /// Fetch one piece, trying `peers` in order until one delivers it
    pub async fn download_single_piece<C>(
        &self,
        connector: &C,
        peers: &[PeerEndpoint],
        index: u32,
    ) -> Result<PieceResult>
    where
        C: PeerConnector,
    {
        if index >= self.metadata.piece_count() {
            return Err(TorrentError::config_error_with_field(
                format!("piece {} out of range ({} pieces)", index, self.metadata.piece_count()),
                "piece_index",
            ));
        }

        let mut attempts = 0;
        let mut last_error = "no peers available".to_string();
        for &peer in peers {
            attempts += 1;
            let result = async {
                let mut conn = connect_peer(
                    connector,
                    peer,
                    *self.metadata.info_hash(),
                    self.peer_id,
                    self.options.read_timeout,
                )
                .await?;
                timeout(self.options.piece_timeout, download_piece(&mut conn, &self.metadata, index))
                    .await
                    .map_err(|_| piece_timed_out(index, peer, self.options.piece_timeout))?
            }
            .await;

            match result {
                Ok(piece) => return Ok(piece),
                Err(e) => {
                    warn!("Piece {} from peer {} failed: {}", index, peer, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(TorrentError::download_failed(index, attempts, last_error))
    }
}

pub(crate) fn piece_timed_out(index: u32, peer: PeerEndpoint, limit: Duration) -> TorrentError {
    TorrentError::network_error_with_address(
        format!("piece {} not completed within {:?}", index, limit),
        peer.to_string(),
    )
}

fn sink_error(err: std::io::Error) -> TorrentError {
    TorrentError::storage_error(format!("writing output: {}", err))
}

/// Coordinator state; touched only by the `run` future
struct Coordinator {
    piece_count: u32,
    max_attempts: u32,
    pending: VecDeque<u32>,
    attempts: HashMap<u32, u32>,
    failed_by: HashMap<u32, HashSet<WorkerId>>,
    last_errors: HashMap<u32, String>,
    idle: Vec<(WorkerId, oneshot::Sender<Option<u32>>)>,
    busy: HashMap<WorkerId, u32>,
    live: usize,
    reorder: BTreeMap<u32, Vec<u8>>,
    next_write: u32,
    bytes_written: u64,
    peers_used: HashSet<WorkerId>,
    failed_attempts: u32,
}

impl Coordinator {
    fn new(piece_count: u32, max_attempts: u32) -> Self {
        Self {
            piece_count,
            max_attempts: max_attempts.max(1),
            pending: (0..piece_count).collect(),
            attempts: HashMap::new(),
            failed_by: HashMap::new(),
            last_errors: HashMap::new(),
            idle: Vec::new(),
            busy: HashMap::new(),
            live: 0,
            reorder: BTreeMap::new(),
            next_write: 0,
            bytes_written: 0,
            peers_used: HashSet::new(),
            failed_attempts: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.next_write == self.piece_count
    }

    fn complete(&mut self, worker: WorkerId, piece: PieceResult) {
        self.busy.remove(&worker);
        self.peers_used.insert(worker);
        debug!("Worker {} completed piece {}", worker, piece.index);
        self.reorder.insert(piece.index, piece.data);
    }

    /// Write every piece that is next in line
    async fn write_in_order<W: AsyncWrite + Unpin>(&mut self, sink: &mut W) -> Result<()> {
        while let Some(data) = self.reorder.remove(&self.next_write) {
            sink.write_all(&data).await.map_err(sink_error)?;
            self.bytes_written += data.len() as u64;
            self.next_write += 1;
        }
        Ok(())
    }

    fn fail(&mut self, worker: WorkerId, index: u32, error: TorrentError) -> Result<()> {
        self.busy.remove(&worker);
        self.failed_attempts += 1;

        let attempts = self.attempts.entry(index).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;
        if attempts >= self.max_attempts {
            return Err(TorrentError::download_failed(index, attempts, error.to_string()));
        }

        debug!("Re-queueing piece {} (attempt {} of {})", index, attempts, self.max_attempts);
        self.failed_by.entry(index).or_default().insert(worker);
        self.last_errors.insert(index, error.to_string());
        self.pending.push_front(index);
        Ok(())
    }

    fn exited(&mut self, worker: WorkerId) {
        self.live = self.live.saturating_sub(1);
        self.idle.retain(|(id, _)| *id != worker);
        if let Some(index) = self.busy.remove(&worker) {
            // Worker vanished mid-piece without reporting
            self.pending.push_front(index);
        }
    }

    /// Hand pending pieces to idle workers.
    ///
    /// A worker is not given a piece it has already failed while some other
    /// worker could still take it; once every live worker is idle, any
    /// worker may retry it.
    fn dispatch(&mut self) {
        let mut parked = Vec::new();
        let everyone_idle = self.busy.is_empty();

        for (worker, reply) in std::mem::take(&mut self.idle) {
            if reply.is_closed() {
                continue;
            }
            let position = self
                .pending
                .iter()
                .position(|index| !self.failed_by.get(index).is_some_and(|w| w.contains(&worker)))
                .or_else(|| (everyone_idle && !self.pending.is_empty()).then_some(0));

            let Some(position) = position else {
                parked.push((worker, reply));
                continue;
            };
            let Some(index) = self.pending.remove(position) else {
                parked.push((worker, reply));
                continue;
            };

            if reply.send(Some(index)).is_ok() {
                debug!("Assigned piece {} to worker {}", index, worker);
                self.busy.insert(worker, index);
            } else {
                self.pending.push_front(index);
            }
        }

        self.idle = parked;
    }

    /// Error for a run that can no longer make progress
    fn stalled(&self) -> TorrentError {
        let index = self
            .pending
            .iter()
            .chain(self.busy.values())
            .copied()
            .min()
            .unwrap_or(self.next_write);
        let attempts = self.attempts.get(&index).copied().unwrap_or(0);
        let reason = self
            .last_errors
            .get(&index)
            .map(|e| format!("no usable peers left (last error: {})", e))
            .unwrap_or_else(|| "no usable peers left".to_string());
        TorrentError::download_failed(index, attempts, reason)
    }
}
