//! swarmget - Main entry point
//!
//! Command-line front end: decode, info, peers, handshake, download-piece
//! and download.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use swarmget::cli::{format_summary, CliArgs, Command, Config};
use swarmget::{
    bencode, DownloadManager, Metadata, PeerConnection, PeerConnector, PeerEndpoint, ProgressWriter,
    TcpConnector,
};
use tracing::{debug, error, info, warn};

/// Log panics through tracing before the default hook runs
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        match panic_info.location() {
            Some(location) => error!("PANIC at {}:{}:{}", location.file(), location.line(), location.column()),
            None => error!("PANIC at unknown location"),
        }
        default_hook(panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse_args();
    init_logging(&args);
    setup_panic_handler();
    debug!("CLI arguments: {:?}", args);

    let result = run(&args).await;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.verbose {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

async fn run(args: &CliArgs) -> Result<()> {
    match &args.command {
        Command::Decode { value } => {
            let decoded = bencode::decode(value.as_bytes()).context("Failed to decode value")?;
            println!("{}", serde_json::to_string(&decoded)?);
        }
        Command::Info { torrent } => {
            let metadata = load_metadata(torrent)?;
            print_info(&metadata);
        }
        Command::Peers { torrent } => {
            let config = Config::from_args(args, None, None).context("Invalid configuration")?;
            let metadata = load_metadata(torrent)?;
            for peer in announce(&config, &metadata).await? {
                println!("{}", peer);
            }
        }
        Command::Handshake { torrent, peer } => {
            let config = Config::from_args(args, None, None).context("Invalid configuration")?;
            let metadata = load_metadata(torrent)?;
            let peer: PeerEndpoint = peer.parse().context("Invalid peer address")?;
            let remote_id = handshake(&config, &metadata, peer).await?;
            println!("Peer ID: {}", hex::encode(remote_id));
        }
        Command::DownloadPiece {
            output,
            torrent,
            index,
            download,
        } => {
            let config = Config::from_args(args, Some(output.clone()), Some(download)).context("Invalid configuration")?;
            config.validate().context("Invalid configuration")?;
            let metadata = Arc::new(load_metadata(torrent)?);
            let peers = resolve_peers(&config, &metadata).await?;

            let manager = DownloadManager::new(Arc::clone(&metadata), config.peer_id, config.download_options());
            let connector = TcpConnector::new(config.timeout);
            let piece = manager
                .download_single_piece(&connector, &peers, *index)
                .await
                .with_context(|| format!("Failed to download piece {}", index))?;

            tokio::fs::write(output, &piece.data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Piece {} downloaded to {}", index, output.display());
        }
        Command::Download { output, torrent, download } => {
            let config = Config::from_args(args, Some(output.clone()), Some(download)).context("Invalid configuration")?;
            config.validate().context("Invalid configuration")?;
            let metadata = Arc::new(load_metadata(torrent)?);
            let peers = resolve_peers(&config, &metadata).await?;

            let file = tokio::fs::File::create(output)
                .await
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let mut sink = ProgressWriter::new(file, metadata.total_length());

            let started = Instant::now();
            let manager = DownloadManager::new(Arc::clone(&metadata), config.peer_id, config.download_options());
            let connector = Arc::new(TcpConnector::new(config.timeout));
            let summary = manager
                .run(connector, &peers, &mut sink)
                .await
                .context("Download failed")?;

            info!("{}", format_summary(&summary, started.elapsed()));
            info!("Downloaded {} to {}", metadata.name().unwrap_or("file"), output.display());
        }
    }
    Ok(())
}

fn load_metadata(path: &Path) -> Result<Metadata> {
    debug!("Loading metadata file: {}", path.display());
    let metadata = Metadata::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?;
    debug!(
        "Loaded {} ({} bytes, {} pieces)",
        metadata.info_hash_hex(),
        metadata.total_length(),
        metadata.piece_count()
    );
    Ok(metadata)
}

fn print_info(metadata: &Metadata) {
    println!("Tracker URL: {}", metadata.tracker_url());
    println!("Length: {}", metadata.total_length());
    println!("Info Hash: {}", metadata.info_hash_hex());
    println!("Piece Length: {}", metadata.piece_length());
    println!("Piece Hashes:");
    for hash in metadata.piece_hashes_hex() {
        println!("{}", hash);
    }
}

async fn handshake(config: &Config, metadata: &Metadata, peer: PeerEndpoint) -> Result<[u8; 20]> {
    let connector = TcpConnector::new(config.timeout);
    let stream = connector.connect(peer).await?;
    let mut conn = PeerConnection::new(stream, peer.to_string(), *metadata.info_hash(), config.peer_id)
        .with_read_timeout(config.timeout);
    let reply = conn.handshake().await?;
    if &reply.info_hash != metadata.info_hash() {
        warn!("Peer {} answered with info hash {}", peer, hex::encode(reply.info_hash));
    }
    Ok(reply.peer_id)
}

/// Peers from `--peer`, or from the tracker when none were given
async fn resolve_peers(config: &Config, metadata: &Metadata) -> Result<Vec<PeerEndpoint>> {
    if !config.peers.is_empty() {
        debug!("Using {} peers from the command line", config.peers.len());
        return Ok(config.peers.clone());
    }
    let peers = announce(config, metadata).await?;
    if peers.is_empty() {
        bail!("Tracker {} returned no peers", metadata.tracker_url());
    }
    Ok(peers)
}

#[cfg(feature = "tracker")]
async fn announce(config: &Config, metadata: &Metadata) -> Result<Vec<PeerEndpoint>> {
    use swarmget::{AnnounceRequest, HttpTracker, TrackerClient};

    let tracker = HttpTracker::new(metadata.tracker_url())?;
    let request = AnnounceRequest::new(*metadata.info_hash(), config.peer_id, config.port, metadata.total_length());
    let response = tracker
        .announce(&request)
        .await
        .with_context(|| format!("Announce to {} failed", tracker.tracker_url()))?;
    info!("Tracker returned {} peers", response.peers.len());
    Ok(response.peers)
}

#[cfg(not(feature = "tracker"))]
async fn announce(_config: &Config, metadata: &Metadata) -> Result<Vec<PeerEndpoint>> {
    bail!(
        "Built without the tracker feature; pass --peer to download from {}",
        metadata.tracker_url()
    )
}
