//! Torrent metadata module
//!
//! Interprets single-file metadata files on top of the bencode codec.

pub mod metadata;

pub use metadata::{sha1_digest, Metadata, HASH_LEN};
