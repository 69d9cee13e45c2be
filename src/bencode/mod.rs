//! Bencode module
//!
//! Decoding and canonical encoding of the bencode format used by metadata
//! files and tracker responses.

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::{decode, decode_prefix, MAX_DEPTH};
pub use encode::{encode, encode_into};
pub use value::{Dict, Value};
