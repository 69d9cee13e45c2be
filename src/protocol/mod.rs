//! BitTorrent protocol module
//!
//! Handshake layout, message encoding and stream framing.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{generate_peer_id, Handshake, HANDSHAKE_LEN, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{Message, MessageId};
pub use wire::{read_frame, read_message, write_message, MAX_FRAME_LEN};
