//! Torrent metadata records
//!
//! Converted torrents are kept as JSON lines, sharded by the first hex
//! character of the info-hash.

use crate::error::CrawlError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Subdirectory of the store holding the shards
pub const RECORDS_DIR: &str = "records";

/// Shard suffixes, one per possible leading hash character
pub const SHARD_NAMES: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l',
    'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Metadata stored for one converted magnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    /// Magnet link the torrent was fetched for
    pub magnet: String,
    /// Torrent name, if the metadata had one
    pub name: Option<String>,
    /// Parsed metadata
    pub content: serde_json::Value,
    /// Unix timestamp of insertion
    pub created_at: u64,
}

impl TorrentRecord {
    pub fn new(magnet: impl Into<String>, name: Option<String>, content: serde_json::Value) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            magnet: magnet.into(),
            name,
            content,
            created_at,
        }
    }
}

/// Sharded JSON-lines record store
#[derive(Debug)]
pub struct RecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn shard_file_name(shard: char) -> String {
        format!("magnet_{}.jsonl", shard)
    }

    /// Shard a magnet belongs to, taken from the first character of its
    /// 40-character hash suffix.
    pub fn shard_for(magnet: &str) -> Result<char> {
        let hash_start = magnet
            .len()
            .checked_sub(40)
            .ok_or_else(|| CrawlError::validation_error_with_field("magnet too short to carry an info-hash", "magnet"))?;
        let shard = magnet
            .get(hash_start..)
            .and_then(|hash| hash.chars().next())
            .map(|c| c.to_ascii_lowercase())
            .filter(|c| SHARD_NAMES.contains(c))
            .ok_or_else(|| CrawlError::validation_error_with_field("magnet does not end in a hex info-hash", "magnet"))?;
        Ok(shard)
    }

    pub fn shard_path(&self, magnet: &str) -> Result<PathBuf> {
        let shard = Self::shard_for(magnet)?;
        Ok(self.dir.join(Self::shard_file_name(shard)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a record to its shard.
    ///
    /// Returns `false` without writing when the shard already holds a record
    /// for the same magnet.
    pub async fn insert(&self, record: &TorrentRecord) -> Result<bool> {
        let path = self.shard_path(&record.magnet)?;
        let _guard = self.write_lock.lock().await;

        if self.find_in(&path, &record.magnet).await?.is_some() {
            debug!("Record for {} already present", record.magnet);
            return Ok(false);
        }

        let mut line = serde_json::to_string(record).map_err(CrawlError::from)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CrawlError::store_error_full("Failed to open record shard", path.display().to_string(), e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CrawlError::store_error_full("Failed to append record", path.display().to_string(), e.to_string()))?;

        debug!("Stored record for {} in {}", record.magnet, path.display());
        Ok(true)
    }

    /// Look up the record stored for a magnet
    pub async fn get(&self, magnet: &str) -> Result<Option<TorrentRecord>> {
        let path = self.shard_path(magnet)?;
        self.find_in(&path, magnet).await
    }

    async fn find_in(&self, path: &Path, magnet: &str) -> Result<Option<TorrentRecord>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CrawlError::store_error_full("Failed to read record shard", path.display().to_string(), e.to_string()).into());
            }
        };

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let record: TorrentRecord = serde_json::from_str(line).map_err(|e| {
                CrawlError::store_error_full("Corrupt record line", path.display().to_string(), e.to_string())
            })?;
            if record.magnet == magnet {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
