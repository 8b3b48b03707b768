//! File-backed magnet store
//!
//! One append-only text file per set, one magnet per line. The whole
//! store is loaded into memory when opened.

use crate::error::CrawlError;
use crate::store::backend::{MagnetSet, MagnetStore, OrderedSet};
use crate::store::records::{RecordStore, RECORDS_DIR, SHARD_NAMES};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outcome of [`FileStore::init`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Files created by this run
    pub created: Vec<PathBuf>,
    /// Files that were already present and left untouched
    pub existing: Vec<PathBuf>,
}

/// Magnet store persisted in a directory
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    sets: RwLock<HashMap<MagnetSet, OrderedSet>>,
}

impl FileStore {
    /// Create the store layout under `dir`.
    ///
    /// Safe to run repeatedly: existing files are reported, never truncated.
    pub async fn init(dir: impl AsRef<Path>) -> Result<InitReport> {
        let dir = dir.as_ref();
        info!("Initializing magnet store at {}", dir.display());

        let records_dir = dir.join(RECORDS_DIR);
        fs::create_dir_all(&records_dir).await.map_err(|e| {
            CrawlError::store_error_full("Failed to create store directory", records_dir.display().to_string(), e.to_string())
        })?;

        let mut report = InitReport::default();
        let set_files = MagnetSet::ALL.iter().map(|set| dir.join(set.file_name()));
        let shard_files = SHARD_NAMES.iter().map(|shard| records_dir.join(RecordStore::shard_file_name(*shard)));

        for path in set_files.chain(shard_files) {
            let created = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(_) => {
                    debug!("Created {}", path.display());
                    report.created.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists", path.display());
                    report.existing.push(path);
                }
                Err(e) => {
                    return Err(CrawlError::store_error_full("Failed to create store file", path.display().to_string(), e.to_string()).into());
                }
            }
        }

        info!(
            "Magnet store ready: {} files created, {} already existed",
            report.created.len(),
            report.existing.len()
        );
        Ok(report)
    }

    /// Open an initialized store and load its sets
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(CrawlError::store_error_full(
                "Store directory does not exist, run `init` first",
                dir.display().to_string(),
                "not found",
            )
            .into());
        }

        let mut sets = HashMap::new();
        for set in MagnetSet::ALL {
            let path = dir.join(set.file_name());
            let mut members = OrderedSet::default();
            match fs::read_to_string(&path).await {
                Ok(content) => {
                    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                        members.insert(line);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CrawlError::store_error_full("Failed to read store file", path.display().to_string(), e.to_string()).into());
                }
            }
            debug!("Loaded {} magnets from {}", members.len(), path.display());
            sets.insert(set, members);
        }

        info!("Opened magnet store at {}", dir.display());
        Ok(Self {
            dir,
            sets: RwLock::new(sets),
        })
    }

    /// Directory the store lives in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Metadata record store sharing this directory
    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.dir.join(RECORDS_DIR))
    }
}

#[async_trait]
impl MagnetStore for FileStore {
    async fn add_to(&self, set: MagnetSet, magnet: &str) -> Result<bool> {
        let magnet = magnet.trim();
        if magnet.is_empty() || magnet.contains('\n') {
            return Err(CrawlError::validation_error_with_field("magnet must be a single non-empty line", "magnet").into());
        }

        // Held across the append so file order matches memory order
        let mut sets = self.sets.write().await;
        let members = sets.entry(set).or_default();
        if members.contains(magnet) {
            return Ok(false);
        }

        let path = self.dir.join(set.file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CrawlError::store_error_full("Failed to open store file", path.display().to_string(), e.to_string()))?;
        file.write_all(format!("{}\n", magnet).as_bytes())
            .await
            .map_err(|e| CrawlError::store_error_full("Failed to append to store file", path.display().to_string(), e.to_string()))?;

        members.insert(magnet);
        Ok(true)
    }

    async fn count_in(&self, set: MagnetSet) -> Result<usize> {
        Ok(self.sets.read().await.get(&set).map_or(0, OrderedSet::len))
    }

    async fn difference(&self, set: MagnetSet, minus: MagnetSet, limit: usize) -> Result<Vec<String>> {
        let sets = self.sets.read().await;
        let empty = OrderedSet::default();
        let base = sets.get(&set).unwrap_or(&empty);
        let minus = sets.get(&minus).unwrap_or(&empty);
        Ok(base.difference(minus, limit))
    }
}
