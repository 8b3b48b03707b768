//! Bencode decoder
//!
//! Never reads past the end of the input: every out-of-range access is
//! reported as a `DecodeError`.

use crate::bencode::value::{Dict, Value};
use crate::error::CrawlError;
use bytes::Bytes;

/// Maximum nesting of lists and dictionaries accepted from the wire
pub const MAX_DEPTH: usize = 64;

/// Decode exactly one value spanning the whole buffer
pub fn decode(data: &[u8]) -> Result<Value, CrawlError> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;

    if pos != data.len() {
        return Err(CrawlError::decode_error(format!(
            "trailing data after value ({} of {} bytes consumed)",
            pos,
            data.len()
        )));
    }

    Ok(value)
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, CrawlError> {
    if depth > MAX_DEPTH {
        return Err(CrawlError::decode_error("nesting too deep"));
    }

    match data.get(*pos) {
        None => Err(CrawlError::decode_error("unexpected end of input")),
        Some(b'i') => decode_integer(data, pos),
        Some(b'l') => decode_list(data, pos, depth),
        Some(b'd') => decode_dict(data, pos, depth),
        Some(b'0'..=b'9') => decode_bytes(data, pos).map(Value::Bytes),
        Some(&c) => Err(CrawlError::decode_error(format!(
            "unexpected byte 0x{:02x} at offset {}",
            c, *pos
        ))),
    }
}

/// Scan forward from `start` to the first `terminator`, returning its index
fn find(data: &[u8], start: usize, terminator: u8) -> Result<usize, CrawlError> {
    data.get(start..)
        .and_then(|rest| rest.iter().position(|&b| b == terminator))
        .map(|offset| start + offset)
        .ok_or_else(|| {
            CrawlError::decode_error(format!("missing '{}' terminator", terminator as char))
        })
}

/// Integers are held as `i64`; anything wider is a decode error.
fn decode_integer(data: &[u8], pos: &mut usize) -> Result<Value, CrawlError> {
    let start = *pos + 1;
    let end = find(data, start, b'e')?;

    let digits = std::str::from_utf8(&data[start..end])
        .map_err(|_| CrawlError::decode_error("integer is not ASCII"))?;

    if digits.is_empty() || digits == "-" {
        return Err(CrawlError::decode_error("empty integer"));
    }
    if digits.starts_with("-0") || (digits.starts_with('0') && digits.len() > 1) {
        return Err(CrawlError::decode_error_with_source("integer has leading zeros", digits));
    }
    if !digits.trim_start_matches('-').bytes().all(|b| b.is_ascii_digit()) {
        return Err(CrawlError::decode_error_with_source("integer is not numeric", digits));
    }

    let value: i64 = digits
        .parse()
        .map_err(|e: std::num::ParseIntError| CrawlError::decode_error_with_source(
            format!("invalid integer '{}'", digits),
            e.to_string(),
        ))?;

    *pos = end + 1;
    Ok(Value::Integer(value))
}

fn decode_bytes(data: &[u8], pos: &mut usize) -> Result<Bytes, CrawlError> {
    let colon = find(data, *pos, b':')?;

    let len_str = std::str::from_utf8(&data[*pos..colon])
        .map_err(|_| CrawlError::decode_error("string length is not ASCII"))?;
    if !len_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CrawlError::decode_error_with_source("string length is not numeric", len_str));
    }
    let length: usize = len_str
        .parse()
        .map_err(|e: std::num::ParseIntError| CrawlError::decode_error_with_source(
            "invalid string length",
            e.to_string(),
        ))?;

    let start = colon + 1;
    let end = start
        .checked_add(length)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| CrawlError::decode_error(format!(
            "string of declared length {} exceeds buffer ({} bytes left)",
            length,
            data.len().saturating_sub(start)
        )))?;

    *pos = end;
    Ok(Bytes::copy_from_slice(&data[start..end]))
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, CrawlError> {
    *pos += 1;
    let mut list = Vec::new();

    loop {
        match data.get(*pos) {
            None => return Err(CrawlError::decode_error("unterminated list")),
            Some(b'e') => break,
            Some(_) => list.push(decode_value(data, pos, depth + 1)?),
        }
    }

    *pos += 1;
    Ok(Value::List(list))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, CrawlError> {
    *pos += 1;
    let mut dict = Dict::new();

    loop {
        match data.get(*pos) {
            None => return Err(CrawlError::decode_error("unterminated dictionary")),
            Some(b'e') => break,
            Some(b'0'..=b'9') => {
                let key = decode_bytes(data, pos)?;
                let value = decode_value(data, pos, depth + 1)?;
                // Peers are not required to be canonical: any key order is accepted
                dict.insert(key, value);
            }
            Some(_) => {
                return Err(CrawlError::decode_error_with_source(
                    "dictionary key must be a byte string",
                    format!("offset {}", *pos),
                ))
            }
        }
    }

    *pos += 1;
    Ok(Value::Dict(dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
        assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
        assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
        assert_eq!(decode(b"i9223372036854775807e").unwrap(), Value::Integer(i64::MAX));
    }

    #[test]
    fn test_decode_integer_invalid() {
        assert!(decode(b"i-0e").is_err());
        assert!(decode(b"i03e").is_err());
        assert!(decode(b"ie").is_err());
        assert!(decode(b"i-e").is_err());
        assert!(decode(b"i+5e").is_err());
        assert!(decode(b"i12").is_err());
        assert!(decode(b"i99999999999999999999e").is_err());
    }

    #[test]
    fn test_decode_integer_i64_bounds() {
        assert_eq!(decode(b"i-9223372036854775808e").unwrap(), Value::Integer(i64::MIN));
        assert!(matches!(
            decode(b"i9223372036854775808e"),
            Err(CrawlError::DecodeError { .. })
        ));
        assert!(decode(b"i-9223372036854775809e").is_err());
    }

    #[test]
    fn test_decode_bytes() {
        assert_eq!(decode(b"4:spam").unwrap(), Value::string("spam"));
        assert_eq!(decode(b"0:").unwrap(), Value::string(""));
        assert_eq!(decode(b"3:\x00\xff\x01").unwrap(), Value::bytes(&[0x00, 0xff, 0x01]));
    }

    #[test]
    fn test_decode_bytes_invalid() {
        // Declared length longer than the buffer
        assert!(decode(b"10:short").is_err());
        // Negative length
        assert!(decode(b"-3:abc").is_err());
        // Non-numeric length
        assert!(decode(b"4x:spam").is_err());
        // No colon at all
        assert!(decode(b"4").is_err());
        // Length that overflows usize arithmetic
        assert!(decode(b"18446744073709551615:a").is_err());
    }

    #[test]
    fn test_decode_list() {
        let value = decode(b"l4:spami42ee").unwrap();
        let list = value.as_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], Value::string("spam"));
        assert_eq!(list[1], Value::Integer(42));
        assert_eq!(decode(b"le").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_decode_dict_accepts_any_key_order() {
        let value = decode(b"d4:spam4:eggs3:cow3:mooe").unwrap();
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(value.get(b"cow"), Some(&Value::string("moo")));
        assert_eq!(value.get(b"spam"), Some(&Value::string("eggs")));
    }

    #[test]
    fn test_decode_unterminated() {
        assert!(decode(b"l4:spam").is_err());
        assert!(decode(b"d3:cow3:moo").is_err());
        assert!(decode(b"d3:cowe").is_err());
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_decode_dict_non_string_key() {
        assert!(decode(b"di1e3:mooe").is_err());
    }

    #[test]
    fn test_decode_trailing_data() {
        assert!(decode(b"i1ei2e").is_err());
    }

    #[test]
    fn test_decode_nesting_limit() {
        let mut deep = vec![b'l'; MAX_DEPTH + 2];
        deep.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert!(decode(&deep).is_err());

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(vec![b'e'; MAX_DEPTH]);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_decode_never_panics_on_prefixes() {
        let full = b"d1:ad2:id20:abcdefghij0123456789e1:q4:ping1:t2:aa1:y1:qe";
        assert!(decode(full).is_ok());
        for end in 0..full.len() {
            assert!(decode(&full[..end]).is_err());
        }
    }
}
