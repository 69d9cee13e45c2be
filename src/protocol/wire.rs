//! Length-prefixed framing over an async byte stream

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::Message;
use crate::error::{Result, TorrentError};

/// Largest frame accepted from a peer (1 MiB)
pub const MAX_FRAME_LEN: u32 = 1 << 20;

/// Read one frame. `Ok(None)` is a keep-alive.
///
/// EOF at any point, including before the length prefix, is
/// `ConnectionClosed`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<(u8, Bytes)>>
where
    R: AsyncRead + Unpin,
{
    let mut length_buf = [0u8; 4];
    reader
        .read_exact(&mut length_buf)
        .await
        .map_err(|e| closed_or_network(e, "reading frame length"))?;
    let length = u32::from_be_bytes(length_buf);

    if length == 0 {
        trace!("Received keep-alive");
        return Ok(None);
    }
    if length > MAX_FRAME_LEN {
        return Err(TorrentError::protocol_error(format!(
            "frame of {} bytes exceeds limit of {}",
            length, MAX_FRAME_LEN
        )));
    }

    let mut body = vec![0u8; length as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| closed_or_network(e, "reading frame body"))?;

    let mut body = Bytes::from(body);
    let id = body[0];
    let payload = body.split_off(1);
    trace!("Received frame id {} ({} bytes)", id, length);
    Ok(Some((id, payload)))
}

/// Read the next message, skipping keep-alives
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some((id, payload)) = read_frame(reader).await? {
            return Message::parse(id, payload);
        }
    }
}

/// Write and flush one message
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.serialize();
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| TorrentError::network_error(format!("writing message: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TorrentError::network_error(format!("flushing message: {}", e)))?;
    trace!("Sent message id {:?} ({} bytes)", message.id(), bytes.len());
    Ok(())
}

fn closed_or_network(err: std::io::Error, context: &str) -> TorrentError {
    TorrentError::from(err).with_context(context)
}
