//! Piece assembly
//!
//! A piece is fetched as a series of fixed-size blocks and verified as a
//! whole once every block slot has been written.

use tracing::trace;

use crate::error::{Result, TorrentError};
use crate::torrent::sha1_digest;

/// Standard block size (16 KiB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// One block request within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub piece_index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Split a piece into blocks of `block_size`, the last one truncated
pub fn block_plan(piece_index: u32, piece_len: u32, block_size: u32) -> Vec<BlockRequest> {
    if block_size == 0 {
        return Vec::new();
    }
    (0..piece_len)
        .step_by(block_size as usize)
        .map(|begin| BlockRequest {
            piece_index,
            begin,
            length: block_size.min(piece_len - begin),
        })
        .collect()
}

/// A verified piece
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Assembly buffer for one piece, owned by a single download attempt
#[derive(Debug)]
pub struct PieceBuffer {
    index: u32,
    data: Vec<u8>,
    block_size: u32,
    received: Vec<bool>,
    expected: [u8; 20],
}

impl PieceBuffer {
    pub fn new(index: u32, length: u32, block_size: u32, expected: [u8; 20]) -> Self {
        let slots = if block_size == 0 {
            0
        } else {
            length.div_ceil(block_size) as usize
        };
        Self {
            index,
            data: vec![0u8; length as usize],
            block_size,
            received: vec![false; slots],
            expected,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy `block` into the buffer at `begin`.
    ///
    /// The offset is taken as reported by the peer; only the bounds are
    /// checked.
    pub fn write_block(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        let start = begin as usize;
        let end = start
            .checked_add(block.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                TorrentError::protocol_error(format!(
                    "block at offset {} with {} bytes overruns piece {} of {} bytes",
                    begin,
                    block.len(),
                    self.index,
                    self.data.len()
                ))
            })?;

        self.data[start..end].copy_from_slice(block);
        let slot = begin.checked_div(self.block_size).map(|s| s as usize);
        if let Some(slot) = slot.and_then(|s| self.received.get_mut(s)) {
            *slot = true;
        }
        trace!("Piece {}: wrote {} bytes at offset {}", self.index, block.len(), begin);
        Ok(())
    }

    /// Every block slot has been written at least once
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    /// Check the digest, releasing the bytes only on a match
    pub fn verify(self) -> Result<PieceResult> {
        let actual = sha1_digest(&self.data);
        if actual != self.expected {
            return Err(TorrentError::integrity_error(self.index, self.expected, actual));
        }
        Ok(PieceResult {
            index: self.index,
            data: self.data,
        })
    }
}
