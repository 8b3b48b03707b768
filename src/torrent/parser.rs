//! Torrent file parser
//!
//! Extracts the metadata kept for each converted magnet from a completed
//! .torrent file.

use crate::bencode::{self, Value};
use crate::dht::compact::parse_hash;
use crate::error::CrawlError;
use anyhow::Result;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::path::Path;
use tracing::{debug, error, info, trace};

/// One file listed by a torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentFileEntry {
    /// Path components joined by `/`
    pub name: Option<String>,
    pub length: Option<i64>,
}

/// Metadata extracted from a .torrent file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentMetadata {
    pub name: Option<String>,
    pub created_by: Option<String>,
    /// Unix timestamp
    pub creation_date: Option<i64>,
    /// SHA-1 of the info dictionary, uppercase hex
    pub info_hash: String,
    pub files: Vec<TorrentFileEntry>,
}

impl TorrentMetadata {
    pub fn total_size(&self) -> i64 {
        self.files.iter().filter_map(|f| f.length).sum()
    }

    pub fn is_multi_file(&self) -> bool {
        self.files.len() > 1
    }
}

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentMetadata> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let root = bencode::decode(data)
            .map_err(|e| CrawlError::parse_error_with_source("Torrent is not valid bencode", e.to_string()))?;
        if root.as_dict().is_none() {
            return Err(CrawlError::parse_error("Root must be a dictionary").into());
        }

        let info_value = root
            .get(b"info")
            .filter(|v| v.as_dict().is_some())
            .ok_or_else(|| CrawlError::parse_error("Missing info dictionary"))?;

        let created_by = root.get(b"created by").and_then(text);
        let creation_date = root.get(b"creation date").and_then(Value::as_integer);
        let name = preferred_text(info_value, b"name.utf-8", b"name");

        let files = match info_value.get(b"files").and_then(Value::as_list) {
            Some(entries) => {
                debug!("Multi-file torrent with {} entries", entries.len());
                entries.iter().map(Self::file_entry).collect()
            }
            None => vec![TorrentFileEntry {
                name: name.clone(),
                length: info_value.get(b"length").and_then(Value::as_integer),
            }],
        };

        let info_hash = Self::info_hash(info_value);
        info!(
            "Parsed torrent {}: {} files, info hash {}",
            name.as_deref().unwrap_or("(unnamed)"),
            files.len(),
            parse_hash(&info_hash)
        );

        Ok(TorrentMetadata {
            name,
            created_by,
            creation_date,
            info_hash: parse_hash(&info_hash),
            files,
        })
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &Path) -> Result<TorrentMetadata> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            CrawlError::store_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    /// SHA-1 of the canonical encoding of the info dictionary
    pub fn info_hash(info: &Value) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(bencode::encode(info));
        hasher.finalize().into()
    }

    fn file_entry(entry: &Value) -> TorrentFileEntry {
        let path = entry
            .get(b"path.utf-8")
            .or_else(|| entry.get(b"path"))
            .and_then(Value::as_list)
            .map(|components| components.iter().filter_map(text).collect::<Vec<_>>().join("/"))
            .filter(|joined| !joined.is_empty());

        TorrentFileEntry {
            name: path,
            length: entry.get(b"length").and_then(Value::as_integer),
        }
    }
}

/// Byte string as text, replacing invalid UTF-8 sequences
fn text(value: &Value) -> Option<String> {
    value.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned())
}

fn preferred_text(dict: &Value, preferred: &[u8], fallback: &[u8]) -> Option<String> {
    dict.get(preferred).or_else(|| dict.get(fallback)).and_then(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_file_info() -> Value {
        Value::dict([
            ("length", Value::Integer(1024)),
            ("name", Value::string("ubuntu.iso")),
            ("piece length", Value::Integer(262_144)),
            ("pieces", Value::bytes(&[0xAB; 20])),
        ])
    }

    #[test]
    fn test_parse_single_file() {
        let torrent = Value::dict([
            ("created by", Value::string("mktorrent 1.1")),
            ("creation date", Value::Integer(1_600_000_000)),
            ("info", single_file_info()),
        ]);
        let meta = TorrentParser::parse_bytes(&bencode::encode(&torrent)).unwrap();

        assert_eq!(meta.name.as_deref(), Some("ubuntu.iso"));
        assert_eq!(meta.created_by.as_deref(), Some("mktorrent 1.1"));
        assert_eq!(meta.creation_date, Some(1_600_000_000));
        assert_eq!(meta.files.len(), 1);
        assert_eq!(meta.files[0].name.as_deref(), Some("ubuntu.iso"));
        assert_eq!(meta.total_size(), 1024);
        assert!(!meta.is_multi_file());
    }

    #[test]
    fn test_info_hash_matches_raw_info_bytes() {
        let info = single_file_info();
        let torrent = Value::dict([("info", info.clone())]);
        let meta = TorrentParser::parse_bytes(&bencode::encode(&torrent)).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(bencode::encode(&info));
        let expected: [u8; 20] = hasher.finalize().into();
        assert_eq!(meta.info_hash, hex::encode_upper(expected));
    }

    #[test]
    fn test_parse_multi_file_prefers_utf8_fields() {
        let files = Value::List(vec![
            Value::dict([
                ("length", Value::Integer(10)),
                ("path", Value::List(vec![Value::bytes(b"raw")])),
                ("path.utf-8", Value::List(vec![Value::string("dir"), Value::string("a.txt")])),
            ]),
            Value::dict([
                ("length", Value::Integer(20)),
                ("path", Value::List(vec![Value::bytes(&[b'b', 0xFF])])),
            ]),
        ]);
        let info = Value::dict([
            ("files", files),
            ("name", Value::string("legacy")),
            ("name.utf-8", Value::string("album")),
            ("piece length", Value::Integer(16_384)),
            ("pieces", Value::bytes(&[0; 20])),
        ]);
        let meta = TorrentParser::parse_bytes(&bencode::encode(&Value::dict([("info", info)]))).unwrap();

        assert_eq!(meta.name.as_deref(), Some("album"));
        assert!(meta.is_multi_file());
        assert_eq!(meta.files[0].name.as_deref(), Some("dir/a.txt"));
        assert_eq!(meta.files[1].name.as_deref(), Some("b\u{FFFD}"));
        assert_eq!(meta.total_size(), 30);
        assert!(meta.created_by.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(TorrentParser::parse_bytes(b"not bencode").is_err());
        assert!(TorrentParser::parse_bytes(b"li1ee").is_err());
        assert!(TorrentParser::parse_bytes(b"d4:name3:fooe").is_err());
    }

    #[test]
    fn test_metadata_serializes() {
        let torrent = Value::dict([("info", single_file_info())]);
        let meta = TorrentParser::parse_bytes(&bencode::encode(&torrent)).unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "ubuntu.iso");
        assert_eq!(json["files"][0]["length"], 1024);
    }
}
