//! Bencode value model
//!
//! A small recursive value: integer, byte string, list, dictionary.

use bytes::Bytes;
use std::collections::BTreeMap;

/// Bencode dictionary, keyed by raw byte strings.
///
/// `BTreeMap` keeps keys in ascending byte order, which is exactly the
/// canonical order the encoder must emit.
pub type Dict = BTreeMap<Bytes, Value>;

/// Bencode value types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Bytes),
    List(Vec<Value>),
    Dict(Dict),
}

impl Value {
    /// Create a byte string value from a UTF-8 string
    pub fn string(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Create a byte string value from raw bytes
    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }

    /// Build a dictionary value from `(key, value)` pairs in any order
    pub fn dict<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Bytes::copy_from_slice(k.as_bytes()), v))
                .collect(),
        )
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get the value as UTF-8 text, if it is a valid UTF-8 byte string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Consume the value and return the dictionary, if it is one
    pub fn into_dict(self) -> Option<Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key if this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Name of the value kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dictionary",
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dict(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::string("spam").as_str(), Some("spam"));
        assert_eq!(Value::string("spam").as_integer(), None);
        assert!(Value::List(vec![]).as_list().unwrap().is_empty());
    }

    #[test]
    fn test_as_str_rejects_invalid_utf8() {
        let value = Value::bytes(&[0xff, 0xfe]);
        assert!(value.as_str().is_none());
        assert_eq!(value.as_bytes().map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_dict_builder_and_get() {
        let value = Value::dict([("y", Value::string("q")), ("t", Value::string("aa"))]);
        assert_eq!(value.get(b"y").and_then(Value::as_str), Some("q"));
        assert!(value.get(b"missing").is_none());
        assert!(Value::Integer(1).get(b"y").is_none());
    }
}
