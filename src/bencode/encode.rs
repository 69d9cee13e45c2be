//! Canonical bencode encoder

use bytes::{BufMut, BytesMut};

use super::value::Value;

/// Encode a value; dictionary keys are emitted in ascending byte order.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

/// Append the encoding of `value` to `buf`.
pub fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Bytes(bytes) => put_bytes(bytes, buf),
        Value::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        Value::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        Value::Dict(dict) => {
            buf.put_u8(b'd');
            // BTreeMap iteration is already sorted by raw key bytes
            for (key, item) in dict {
                put_bytes(key, buf);
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_bytes(bytes: &[u8], buf: &mut BytesMut) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{decode, Dict};

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&Value::from("spam")), b"4:spam");
        assert_eq!(encode(&Value::Bytes(vec![])), b"0:");
        assert_eq!(encode(&Value::Integer(-3)), b"i-3e");
        assert_eq!(encode(&Value::Integer(0)), b"i0e");
    }

    #[test]
    fn test_encode_sorts_dictionary_keys() {
        let mut dict = Dict::new();
        dict.insert(b"zebra".to_vec(), Value::Integer(1));
        dict.insert(b"apple".to_vec(), Value::Integer(2));
        dict.insert(b"Mango".to_vec(), Value::Integer(3));

        assert_eq!(
            encode(&Value::Dict(dict)),
            b"d5:Mangoi3e5:applei2e5:zebrai1ee".to_vec()
        );
    }

    #[test]
    fn test_encode_normalizes_unsorted_input() {
        // Keys arrive out of order and `-0` is written non-canonically.
        let value = decode(b"d1:bi-0e1:ali1e2:xyee").unwrap();
        assert_eq!(encode(&value), b"d1:ali1e2:xye1:bi0ee".to_vec());
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        encode_into(&Value::List(vec![]), &mut buf);
        assert_eq!(&buf[..], b"prefixle");
    }

    #[test]
    fn test_reencode_canonical_input_is_identity() {
        let input = b"d8:announce3:url4:infod6:lengthi92063e4:name10:sample.txtee";
        assert_eq!(encode(&decode(input).unwrap()), input.to_vec());
    }
}
