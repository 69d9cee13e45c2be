//! Peer wire messages
//!
//! Only the messages the downloader acts on get their own variant; every
//! other id is carried through as [`Message::Other`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::error::{Result, TorrentError};

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = TorrentError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(TorrentError::protocol_error(format!("unknown message id {}", value))),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageId::Choke => "choke",
            MessageId::Unchoke => "unchoke",
            MessageId::Interested => "interested",
            MessageId::NotInterested => "not interested",
            MessageId::Have => "have",
            MessageId::Bitfield => "bitfield",
            MessageId::Request => "request",
            MessageId::Piece => "piece",
            MessageId::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// A framed peer message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Unchoke,
    Interested,
    Bitfield { bitfield: Bytes },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Bytes },
    Other { id: u8, payload: Bytes },
}

impl Message {
    /// Wire id, or `None` for a keep-alive
    pub fn id(&self) -> Option<u8> {
        match self {
            Message::KeepAlive => None,
            Message::Unchoke => Some(MessageId::Unchoke as u8),
            Message::Interested => Some(MessageId::Interested as u8),
            Message::Bitfield { .. } => Some(MessageId::Bitfield as u8),
            Message::Request { .. } => Some(MessageId::Request as u8),
            Message::Piece { .. } => Some(MessageId::Piece as u8),
            Message::Other { id, .. } => Some(*id),
        }
    }

    /// Length of id plus payload, the value of the length prefix
    pub fn length(&self) -> u32 {
        let body = match self {
            Message::KeepAlive => return 0,
            Message::Unchoke | Message::Interested => 0,
            Message::Bitfield { bitfield } => bitfield.len(),
            Message::Request { .. } => 12,
            Message::Piece { block, .. } => 8 + block.len(),
            Message::Other { payload, .. } => payload.len(),
        };
        1 + body as u32
    }

    /// Serialize with the 4-byte length prefix
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());

        if let Some(id) = self.id() {
            buf.put_u8(id);
        }
        match self {
            Message::KeepAlive | Message::Unchoke | Message::Interested => {}
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Other { payload, .. } => buf.put_slice(payload),
        }

        buf.freeze()
    }

    /// Interpret the id and payload of a non-empty frame
    pub fn parse(id: u8, mut payload: Bytes) -> Result<Self> {
        trace!("Parsing message id {} with {} payload bytes", id, payload.len());

        let message = match MessageId::try_from(id) {
            Ok(MessageId::Unchoke) => {
                expect_empty(MessageId::Unchoke, &payload)?;
                Message::Unchoke
            }
            Ok(MessageId::Interested) => {
                expect_empty(MessageId::Interested, &payload)?;
                Message::Interested
            }
            Ok(MessageId::Bitfield) => Message::Bitfield { bitfield: payload },
            Ok(MessageId::Request) => {
                if payload.len() != 12 {
                    return Err(TorrentError::protocol_error(format!(
                        "request payload must be 12 bytes, got {}",
                        payload.len()
                    )));
                }
                Message::Request {
                    index: payload.get_u32(),
                    begin: payload.get_u32(),
                    length: payload.get_u32(),
                }
            }
            Ok(MessageId::Piece) => {
                if payload.len() < 8 {
                    return Err(TorrentError::protocol_error(format!(
                        "piece payload must be at least 8 bytes, got {}",
                        payload.len()
                    )));
                }
                let index = payload.get_u32();
                let begin = payload.get_u32();
                Message::Piece {
                    index,
                    begin,
                    block: payload,
                }
            }
            _ => Message::Other { id, payload },
        };

        Ok(message)
    }
}

fn expect_empty(id: MessageId, payload: &Bytes) -> Result<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(TorrentError::protocol_error(format!(
            "{} message carries {} unexpected payload bytes",
            id,
            payload.len()
        )))
    }
}
