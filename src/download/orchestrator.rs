//! Single-piece download sequence
//!
//! On a handshaken connection: bitfield, interested, unchoke, then block
//! requests for one piece with up to `pipeline_depth` requests in flight.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::piece::{block_plan, PieceBuffer, PieceResult, BLOCK_SIZE};
use crate::error::{Result, TorrentError};
use crate::peer::PeerConnection;
use crate::protocol::{Message, MessageId};
use crate::torrent::Metadata;

/// Requests kept in flight per connection by default
pub const DEFAULT_PIPELINE_DEPTH: usize = 5;

/// Await bitfield, declare interest, await unchoke
pub async fn negotiate<S>(conn: &mut PeerConnection<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.expect(MessageId::Bitfield).await?;
    debug!("Received bitfield from peer {}", conn.peer());
    conn.send(&Message::Interested).await?;
    conn.expect(MessageId::Unchoke).await?;
    debug!("Unchoked by peer {}", conn.peer());
    Ok(())
}

/// Fetch and verify one piece on a negotiated connection
pub async fn fetch_piece<S>(
    conn: &mut PeerConnection<S>,
    metadata: &Metadata,
    index: u32,
    pipeline_depth: usize,
) -> Result<PieceResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (length, expected) = match (metadata.piece_size(index), metadata.piece_hash(index)) {
        (Some(length), Some(hash)) => (length, *hash),
        _ => {
            return Err(TorrentError::config_error_with_field(
                format!("piece {} out of range ({} pieces)", index, metadata.piece_count()),
                "piece_index",
            ))
        }
    };

    let plan = block_plan(index, length, BLOCK_SIZE);
    let mut buffer = PieceBuffer::new(index, length, BLOCK_SIZE, expected);
    let depth = pipeline_depth.max(1);
    debug!(
        "Fetching piece {} ({} bytes, {} blocks) from {}",
        index,
        length,
        plan.len(),
        conn.peer()
    );

    let mut next = 0;
    let mut in_flight = 0;
    let mut answered = 0;
    while answered < plan.len() {
        while in_flight < depth && next < plan.len() {
            let block = plan[next];
            conn.send(&Message::Request {
                index: block.piece_index,
                begin: block.begin,
                length: block.length,
            })
            .await?;
            next += 1;
            in_flight += 1;
        }

        match conn.receive().await? {
            Message::Piece { index: got, begin, block } => {
                if got != index {
                    return Err(TorrentError::protocol_error(format!(
                        "received block of piece {} while fetching piece {}",
                        got, index
                    )));
                }
                buffer.write_block(begin, &block)?;
                in_flight -= 1;
                answered += 1;
            }
            Message::KeepAlive => {}
            other => {
                let actual = other.id().unwrap_or_default();
                debug!(
                    "Peer {} sent id {} while fetching piece {}",
                    conn.peer(),
                    actual,
                    index
                );
                return Err(TorrentError::unexpected_message(MessageId::Piece as u8, actual));
            }
        }
    }

    if !buffer.is_complete() {
        warn!("Piece {} from {}: some block slots were never written", index, conn.peer());
    }
    let piece = buffer.verify()?;
    info!("Piece {} verified ({} bytes) from {}", index, piece.data.len(), conn.peer());
    Ok(piece)
}

/// Full sequence for one piece on a freshly handshaken connection
pub async fn download_piece<S>(
    conn: &mut PeerConnection<S>,
    metadata: &Metadata,
    index: u32,
) -> Result<PieceResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate(conn).await?;
    fetch_piece(conn, metadata, index, DEFAULT_PIPELINE_DEPTH).await
}
