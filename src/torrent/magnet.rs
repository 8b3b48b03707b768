//! Magnet links
//!
//! Builds the `magnet:?xt=urn:btih:<HEX>` links handed to the store and
//! parses them back when the converter needs the info-hash.

use crate::dht::compact::parse_hash;
use crate::dht::node::ID_LENGTH;
use crate::error::CrawlError;
use anyhow::Result;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

/// Prefix shared by every link this crate produces
pub const MAGNET_PREFIX: &str = "magnet:?xt=urn:btih:";

/// A BitTorrent magnet link identified by its info-hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magnet {
    info_hash: [u8; ID_LENGTH],
}

impl Magnet {
    pub fn from_info_hash(info_hash: [u8; ID_LENGTH]) -> Self {
        Self { info_hash }
    }

    /// Canonical link text, with the hash in uppercase hex
    pub fn uri(&self) -> String {
        format!("{}{}", MAGNET_PREFIX, parse_hash(&self.info_hash))
    }

    pub fn info_hash(&self) -> &[u8; ID_LENGTH] {
        &self.info_hash
    }

    pub fn info_hash_hex(&self) -> String {
        parse_hash(&self.info_hash)
    }

    /// Parse a magnet link.
    ///
    /// Only hex-encoded `urn:btih:` topics are accepted, in either case.
    /// Other parameters (`dn`, `tr`, ...) are ignored.
    pub fn parse(magnet_uri: &str) -> Result<Self> {
        let url = Url::parse(magnet_uri.trim()).map_err(|e| {
            warn!("Invalid magnet URL format: {}", e);
            anyhow::Error::from(CrawlError::validation_error_with_field(format!("invalid magnet URL: {}", e), "magnet"))
        })?;

        if url.scheme() != "magnet" {
            return Err(CrawlError::validation_error_with_field(
                format!("expected magnet scheme, got '{}'", url.scheme()),
                "magnet",
            )
            .into());
        }

        for (key, value) in url.query_pairs() {
            if key != "xt" {
                debug!("Ignoring magnet parameter: {}", key);
                continue;
            }
            if let Some(info_hash) = Self::extract_info_hash(&value)? {
                return Ok(Self::from_info_hash(info_hash));
            }
        }

        Err(CrawlError::validation_error_with_field("magnet link must contain xt=urn:btih:<hash>", "xt").into())
    }

    /// Hash from an `xt` value, `None` when the topic is not `urn:btih:`
    fn extract_info_hash(xt_value: &str) -> Result<Option<[u8; ID_LENGTH]>> {
        let Some(hash_str) = xt_value.strip_prefix("urn:btih:") else {
            debug!("xt parameter is not a BitTorrent info hash: {}", xt_value);
            return Ok(None);
        };
        Self::from_hex(hash_str).map(|magnet| Some(magnet.info_hash))
    }

    /// Build a magnet from a 40-character hex info-hash in either case
    pub fn from_hex(hash_str: &str) -> Result<Self> {
        if hash_str.len() != ID_LENGTH * 2 {
            return Err(CrawlError::validation_error_with_field(
                format!("info hash must be {} hex characters, got {}", ID_LENGTH * 2, hash_str.len()),
                "xt",
            )
            .into());
        }

        let bytes = hex::decode(hash_str)
            .map_err(|e| CrawlError::validation_error_with_field(format!("info hash is not hex: {}", e), "xt"))?;
        let mut info_hash = [0u8; ID_LENGTH];
        info_hash.copy_from_slice(&bytes);
        Ok(Self::from_info_hash(info_hash))
    }
}

impl fmt::Display for Magnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
