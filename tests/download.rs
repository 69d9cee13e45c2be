mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{content, endpoint, metadata_for, Behavior, FakeConnector, CLIENT_ID};
use swarmget::{DownloadManager, DownloadOptions, TorrentError};

const PIECE_LENGTH: u32 = 32 * 1024;

fn options(max_peers: usize, max_attempts: u32, max_reconnects: u32) -> DownloadOptions {
    DownloadOptions {
        max_peers,
        max_attempts,
        pipeline_depth: 3,
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
        max_reconnects,
        reconnect_delay: Duration::ZERO,
        piece_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_multi_peer_download_writes_in_order() {
    let data = content(4 * PIECE_LENGTH as usize + 1000);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data.clone())
            .with_peer(endpoint(1), Behavior::Good)
            .with_peer(endpoint(2), Behavior::Good)
            .with_peer(endpoint(3), Behavior::Good),
    );

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(3, 3, 0));
    let mut sink = Vec::new();
    let summary = manager
        .run(connector, &[endpoint(1), endpoint(2), endpoint(3)], &mut sink)
        .await
        .unwrap();

    assert_eq!(sink, data);
    assert_eq!(summary.pieces, 5);
    assert_eq!(summary.bytes, data.len() as u64);
    assert_eq!(summary.failed_attempts, 0);
    assert!((1..=3).contains(&summary.peers_used));
}

#[tokio::test]
async fn test_failed_piece_is_retried_on_another_peer() {
    let data = content(3 * PIECE_LENGTH as usize);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data.clone())
            .with_peer(endpoint(1), Behavior::Corrupt)
            .with_peer(endpoint(2), Behavior::Good),
    );

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(1, 3, 0));
    let mut sink = Vec::new();
    let summary = manager
        .run(Arc::clone(&connector), &[endpoint(1), endpoint(2)], &mut sink)
        .await
        .unwrap();

    assert_eq!(sink, data);
    assert_eq!(summary.failed_attempts, 1);
    assert_eq!(summary.peers_used, 1);
    assert_eq!(connector.connects(endpoint(1)), 1);
    assert_eq!(connector.connects(endpoint(2)), 1);
}

#[tokio::test]
async fn test_choked_piece_is_requeued_to_good_peer() {
    let data = content(2 * PIECE_LENGTH as usize + 300);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data.clone())
            .with_peer(endpoint(1), Behavior::ChokeMidPiece)
            .with_peer(endpoint(2), Behavior::Good),
    );

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(1, 3, 0));
    let mut sink = Vec::new();
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        manager.run(Arc::clone(&connector), &[endpoint(1), endpoint(2)], &mut sink),
    )
    .await
    .expect("a choking peer must not stall the download")
    .unwrap();

    assert_eq!(sink, data);
    assert_eq!(summary.failed_attempts, 1);
    assert_eq!(summary.peers_used, 1);
    assert_eq!(connector.connects(endpoint(2)), 1);
}

#[tokio::test]
async fn test_piece_deadline_releases_stalled_peer() {
    let data = content(PIECE_LENGTH as usize + 10);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data.clone())
            .with_peer(endpoint(1), Behavior::KeepAliveSpam)
            .with_peer(endpoint(2), Behavior::Good),
    );

    let options = DownloadOptions {
        piece_timeout: Duration::from_millis(300),
        ..options(1, 3, 0)
    };
    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options);
    let mut sink = Vec::new();
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        manager.run(Arc::clone(&connector), &[endpoint(1), endpoint(2)], &mut sink),
    )
    .await
    .expect("the piece deadline must fire")
    .unwrap();

    assert_eq!(sink, data);
    assert_eq!(summary.failed_attempts, 1);
}

#[tokio::test]
async fn test_single_piece_deadline() {
    let data = content(PIECE_LENGTH as usize);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector =
        FakeConnector::new(Arc::clone(&metadata), data).with_peer(endpoint(1), Behavior::KeepAliveSpam);

    let options = DownloadOptions {
        piece_timeout: Duration::from_millis(300),
        ..options(1, 3, 0)
    };
    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options);
    let err = manager
        .download_single_piece(&connector, &[endpoint(1)], 0)
        .await
        .unwrap_err();
    assert!(matches!(err, TorrentError::DownloadFailed { piece_index: 0, attempts: 1, .. }));
}

#[tokio::test]
async fn test_reserve_peers_replace_unusable_ones() {
    let data = content(2 * PIECE_LENGTH as usize + 7);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let peers = [endpoint(1), endpoint(2), endpoint(3), endpoint(4)];
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data.clone())
            .with_peer(peers[0], Behavior::Refuse)
            .with_peer(peers[1], Behavior::HangUp)
            .with_peer(peers[2], Behavior::WrongHash)
            .with_peer(peers[3], Behavior::Good),
    );

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(1, 3, 0));
    let mut sink = Vec::new();
    let summary = manager.run(Arc::clone(&connector), &peers, &mut sink).await.unwrap();

    assert_eq!(sink, data);
    assert_eq!(summary.failed_attempts, 0);
    for peer in peers {
        assert_eq!(connector.connects(peer), 1);
    }
}

#[tokio::test]
async fn test_attempts_exhausted() {
    let data = content(20_000);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data).with_peer(endpoint(1), Behavior::Corrupt),
    );

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(1, 2, 5));
    let mut sink = Vec::new();
    let err = manager.run(connector, &[endpoint(1)], &mut sink).await.unwrap_err();

    assert!(
        matches!(err, TorrentError::DownloadFailed { piece_index: 0, attempts: 2, .. }),
        "unexpected error: {}",
        err
    );
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_no_usable_peers() {
    let data = content(PIECE_LENGTH as usize * 2);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(
        FakeConnector::new(Arc::clone(&metadata), data)
            .with_peer(endpoint(1), Behavior::HangUp)
            .with_peer(endpoint(2), Behavior::WrongHash),
    );

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(2, 3, 0));
    let mut sink = Vec::new();
    let err = manager
        .run(connector, &[endpoint(1), endpoint(2)], &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, TorrentError::DownloadFailed { piece_index: 0, attempts: 0, .. }));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_empty_peer_list() {
    let data = content(100);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = Arc::new(FakeConnector::new(Arc::clone(&metadata), data));

    let manager = DownloadManager::new(metadata, CLIENT_ID, DownloadOptions::default());
    let mut sink = Vec::new();
    let err = manager.run(connector, &[], &mut sink).await.unwrap_err();
    assert!(matches!(err, TorrentError::DownloadFailed { .. }));
}

#[tokio::test]
async fn test_download_single_piece_tries_next_peer() {
    let data = content(3 * PIECE_LENGTH as usize - 5);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector = FakeConnector::new(Arc::clone(&metadata), data.clone())
        .with_peer(endpoint(1), Behavior::Refuse)
        .with_peer(endpoint(2), Behavior::Good);

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(1, 3, 0));
    let piece = manager
        .download_single_piece(&connector, &[endpoint(1), endpoint(2)], 2)
        .await
        .unwrap();

    assert_eq!(piece.index, 2);
    assert_eq!(piece.data, &data[2 * PIECE_LENGTH as usize..]);
}

#[tokio::test]
async fn test_download_single_piece_reports_failure() {
    let data = content(2 * PIECE_LENGTH as usize);
    let metadata = Arc::new(metadata_for(&data, PIECE_LENGTH));
    let connector =
        FakeConnector::new(Arc::clone(&metadata), data).with_peer(endpoint(1), Behavior::Corrupt);

    let manager = DownloadManager::new(Arc::clone(&metadata), CLIENT_ID, options(1, 3, 0));
    let err = manager
        .download_single_piece(&connector, &[endpoint(1)], 1)
        .await
        .unwrap_err();
    assert!(matches!(err, TorrentError::DownloadFailed { piece_index: 1, attempts: 1, .. }));

    let err = manager
        .download_single_piece(&connector, &[endpoint(1)], 9)
        .await
        .unwrap_err();
    assert!(matches!(err, TorrentError::ConfigError { .. }));
}
