//! Bencode decoder
//!
//! Recursive descent over a byte slice. Every failure reports the offset at
//! which the violation was detected.

use tracing::{debug, trace};

use super::value::{Dict, Value};
use crate::error::{Result, TorrentError};

/// Maximum container nesting accepted by the decoder
pub const MAX_DEPTH: usize = 256;

/// Decode a complete bencoded value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value> {
    let (value, next) = decode_prefix(data, 0)?;
    if next != data.len() {
        debug!("Trailing data after bencoded value: {} of {} bytes consumed", next, data.len());
        return Err(TorrentError::malformed(
            format!("{} trailing bytes after value", data.len() - next),
            next,
        ));
    }
    Ok(value)
}

/// Decode one value starting at `offset`, returning it with the offset just
/// past its encoding.
pub fn decode_prefix(data: &[u8], offset: usize) -> Result<(Value, usize)> {
    let mut idx = offset;
    let value = parse_value(data, &mut idx, 0).map_err(|e| {
        debug!("Bencode decode failed: {}", e);
        e
    })?;
    Ok((value, idx))
}

fn parse_value(data: &[u8], idx: &mut usize, depth: usize) -> Result<Value> {
    let byte = *data
        .get(*idx)
        .ok_or_else(|| TorrentError::malformed("unexpected end of input", *idx))?;

    match byte {
        b'0'..=b'9' => parse_bytes(data, idx).map(Value::Bytes),
        b'i' => parse_integer(data, idx).map(Value::Integer),
        b'l' => parse_list(data, idx, depth + 1),
        b'd' => parse_dict(data, idx, depth + 1),
        other => Err(TorrentError::malformed(
            format!("unexpected byte 0x{:02x}", other),
            *idx,
        )),
    }
}

fn parse_bytes(data: &[u8], idx: &mut usize) -> Result<Vec<u8>> {
    let start = *idx;
    let mut length: usize = 0;

    while let Some(&b) = data.get(*idx) {
        if !b.is_ascii_digit() {
            break;
        }
        length = length
            .checked_mul(10)
            .and_then(|l| l.checked_add((b - b'0') as usize))
            .ok_or_else(|| TorrentError::malformed("string length overflow", start))?;
        *idx += 1;
    }

    match data.get(*idx) {
        Some(b':') => *idx += 1,
        Some(_) => return Err(TorrentError::malformed("expected ':' after string length", *idx)),
        None => return Err(TorrentError::malformed("unterminated string length", *idx)),
    }

    let body_start = *idx;
    let end = body_start
        .checked_add(length)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            TorrentError::malformed(
                format!("string of length {} exceeds input", length),
                body_start,
            )
        })?;

    *idx = end;
    Ok(data[body_start..end].to_vec())
}

fn parse_integer(data: &[u8], idx: &mut usize) -> Result<i64> {
    let start = *idx;
    *idx += 1; // skip 'i'

    let negative = data.get(*idx) == Some(&b'-');
    if negative {
        *idx += 1;
    }

    let digits_start = *idx;
    let mut value: i64 = 0;
    while let Some(&b) = data.get(*idx) {
        if !b.is_ascii_digit() {
            break;
        }
        let digit = (b - b'0') as i64;
        // Accumulate towards the sign so i64::MIN is representable.
        value = value
            .checked_mul(10)
            .and_then(|v| if negative { v.checked_sub(digit) } else { v.checked_add(digit) })
            .ok_or_else(|| TorrentError::malformed("integer overflow", start))?;
        *idx += 1;
    }

    if *idx == digits_start {
        return Err(TorrentError::malformed("integer has no digits", *idx));
    }

    match data.get(*idx) {
        Some(b'e') => {
            *idx += 1;
            Ok(value)
        }
        Some(_) => Err(TorrentError::malformed("expected 'e' after integer", *idx)),
        None => Err(TorrentError::malformed("unterminated integer", *idx)),
    }
}

fn parse_list(data: &[u8], idx: &mut usize, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::malformed("nesting too deep", *idx));
    }
    *idx += 1; // skip 'l'

    let mut list = Vec::new();
    loop {
        match data.get(*idx) {
            None => return Err(TorrentError::malformed("unterminated list", *idx)),
            Some(b'e') => {
                *idx += 1;
                break;
            }
            Some(_) => list.push(parse_value(data, idx, depth)?),
        }
    }

    trace!("Decoded list with {} items", list.len());
    Ok(Value::List(list))
}

fn parse_dict(data: &[u8], idx: &mut usize, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::malformed("nesting too deep", *idx));
    }
    *idx += 1; // skip 'd'

    let mut dict = Dict::new();
    loop {
        match data.get(*idx) {
            None => return Err(TorrentError::malformed("unterminated dictionary", *idx)),
            Some(b'e') => {
                *idx += 1;
                break;
            }
            Some(_) => {
                let key_offset = *idx;
                let key = match parse_value(data, idx, depth)? {
                    Value::Bytes(b) => b,
                    other => {
                        return Err(TorrentError::malformed(
                            format!("dictionary key must be a byte string, got {}", other.kind()),
                            key_offset,
                        ))
                    }
                };
                let value = parse_value(data, idx, depth)?;
                // Last write wins on duplicate keys.
                dict.insert(key, value);
            }
        }
    }

    trace!("Decoded dictionary with {} keys", dict.len());
    Ok(Value::Dict(dict))
}
