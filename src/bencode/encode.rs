//! Bencode encoder
//!
//! Encoding is total: every `Value` has exactly one canonical encoding.

use crate::bencode::value::Value;

/// Encode a value to its canonical byte form
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

fn encode_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            buf.push(b'i');
            buf.extend_from_slice(i.to_string().as_bytes());
            buf.push(b'e');
        }
        Value::Bytes(b) => encode_bytes(b, buf),
        Value::List(list) => {
            buf.push(b'l');
            for item in list {
                encode_into(item, buf);
            }
            buf.push(b'e');
        }
        Value::Dict(dict) => {
            // BTreeMap iteration yields keys in ascending byte order
            buf.push(b'd');
            for (key, val) in dict {
                encode_bytes(key, buf);
                encode_into(val, buf);
            }
            buf.push(b'e');
        }
    }
}
