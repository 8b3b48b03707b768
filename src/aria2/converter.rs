//! Magnet to torrent conversion
//!
//! Feeds harvested magnets to aria2 in metadata-only mode and stores the
//! parsed metadata of every torrent it manages to fetch.

use crate::aria2::client::{Aria2Client, Aria2Options, DownloadStatus};
use crate::error::CrawlError;
use crate::store::{MagnetSet, MagnetStore, RecordStore, TorrentRecord};
use crate::torrent::{Magnet, TorrentParser};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const STATUS_KEYS: [&str; 3] = ["gid", "status", "infoHash"];

/// Consecutive `tellStatus` failures after which a gid is given up on
const MAX_STATUS_FAILURES: u32 = 3;

/// Converter settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterConfig {
    /// Directory aria2 writes `<HASH>.torrent` files to
    pub torrent_dir: PathBuf,
    /// aria2 `max-concurrent-downloads`
    pub max_downloads: usize,
    /// Maximum number of downloads this converter keeps outstanding
    pub batch: usize,
    /// Pause between rounds
    pub poll_interval: Duration,
    /// aria2 `bt-stop-timeout`, in seconds
    pub stop_timeout: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            torrent_dir: PathBuf::from("./torrents"),
            max_downloads: 32,
            batch: 32,
            poll_interval: Duration::from_secs(10),
            stop_timeout: 600,
        }
    }
}

impl ConverterConfig {
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.max_downloads == 0 {
            return Err(CrawlError::config_error_with_field("must be at least 1", "max_downloads"));
        }
        if self.batch == 0 {
            return Err(CrawlError::config_error_with_field("must be at least 1", "batch"));
        }
        if self.poll_interval.is_zero() {
            return Err(CrawlError::config_error_with_field("must be positive", "poll_interval"));
        }
        if self.torrent_dir.as_os_str().is_empty() {
            return Err(CrawlError::config_error_with_field("cannot be empty", "torrent_dir"));
        }
        Ok(())
    }
}

/// What happened to one outstanding download during a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Metadata fetched; `stored` tells whether a record was written
    Completed { magnet: String, stored: bool },
    /// aria2 gave up; the result was removed
    Failed { gid: String },
    /// aria2 no longer answers for the gid; it is no longer tracked
    Lost { gid: String },
    Pending,
}

/// Drives aria2 through the backlog of harvested magnets
pub struct MagnetConverter {
    client: Aria2Client,
    store: Arc<dyn MagnetStore>,
    records: RecordStore,
    config: ConverterConfig,
    /// gid -> magnet, `None` for downloads this converter did not submit
    pending: HashMap<String, Option<String>>,
    /// gid -> consecutive failed status queries
    status_failures: HashMap<String, u32>,
}

impl MagnetConverter {
    pub fn new(client: Aria2Client, store: Arc<dyn MagnetStore>, records: RecordStore, config: ConverterConfig) -> Self {
        Self {
            client,
            store,
            records,
            config,
            pending: HashMap::new(),
            status_failures: HashMap::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn download_options(&self) -> Aria2Options {
        let mut options = Aria2Options::new();
        options.insert("bt-metadata-only".to_string(), "true".to_string());
        options.insert("bt-stop-timeout".to_string(), self.config.stop_timeout.to_string());
        options.insert("dir".to_string(), self.config.torrent_dir.display().to_string());
        options
    }

    /// Configure aria2 and pick up downloads left over from an earlier run
    pub async fn prepare(&mut self) -> Result<()> {
        self.config.validate()?;
        tokio::fs::create_dir_all(&self.config.torrent_dir).await.map_err(|e| {
            CrawlError::store_error_full(
                "Failed to create torrent directory",
                self.config.torrent_dir.display().to_string(),
                e.to_string(),
            )
        })?;

        let mut global = Aria2Options::new();
        global.insert("max-concurrent-downloads".to_string(), self.config.max_downloads.to_string());
        match self.client.change_global_option(&global).await {
            Ok(()) => info!("Set aria2 max-concurrent-downloads to {}", self.config.max_downloads),
            Err(e) => warn!("Failed to set aria2 global options: {}", e),
        }

        match self.client.tell_active(&STATUS_KEYS).await {
            Ok(active) => {
                for status in active {
                    if let Some(gid) = status.gid {
                        self.pending.entry(gid).or_insert(None);
                    }
                }
                debug!("Tracking {} downloads already active in aria2", self.pending.len());
            }
            Err(e) => warn!("Failed to list active aria2 downloads: {}", e),
        }
        Ok(())
    }

    /// Submit magnets from the backlog until `batch` downloads are outstanding.
    ///
    /// Every magnet taken from the backlog is marked used, including the ones
    /// aria2 rejects. Returns the number aria2 accepted.
    pub async fn submit_batch(&mut self) -> Result<usize> {
        let room = self.config.batch.saturating_sub(self.pending.len());
        if room == 0 {
            return Ok(0);
        }

        let magnets = self.store.difference(MagnetSet::All, MagnetSet::Used, room).await?;
        let options = self.download_options();
        let mut submitted = 0;
        for magnet in magnets {
            let accepted = self.client.add_uri(&magnet, &options).await;
            self.store.add_to(MagnetSet::Used, &magnet).await?;
            match accepted {
                Ok(gid) => {
                    info!("Sending {} to aria2 as {}", magnet, gid);
                    self.pending.insert(gid, Some(magnet));
                    submitted += 1;
                }
                Err(e) => warn!("aria2 rejected {}: {}", magnet, e),
            }
        }
        Ok(submitted)
    }

    /// Check every outstanding download once
    pub async fn poll(&mut self) -> Vec<PollOutcome> {
        let gids: Vec<String> = self.pending.keys().cloned().collect();
        let mut outcomes = Vec::with_capacity(gids.len());
        for gid in gids {
            let outcome = match self.client.tell_status(&gid, &STATUS_KEYS).await {
                Ok(status) => {
                    self.status_failures.remove(&gid);
                    self.settle(&gid, status).await
                }
                Err(e) => self.status_failed(&gid, &e),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    fn status_failed(&mut self, gid: &str, err: &anyhow::Error) -> PollOutcome {
        let failures = self.status_failures.entry(gid.to_string()).or_insert(0);
        *failures += 1;
        let unknown = err.to_string().contains("not found");
        if !unknown && *failures < MAX_STATUS_FAILURES {
            warn!("Failed to query status of {} ({} of {}): {}", gid, failures, MAX_STATUS_FAILURES, err);
            return PollOutcome::Pending;
        }

        self.status_failures.remove(gid);
        let magnet = self.pending.remove(gid).flatten();
        warn!(
            "Giving up on download {} of {}: {}",
            gid,
            magnet.as_deref().unwrap_or("unknown magnet"),
            err
        );
        PollOutcome::Lost { gid: gid.to_string() }
    }

    async fn settle(&mut self, gid: &str, status: DownloadStatus) -> PollOutcome {
        match status.status.as_deref() {
            Some("complete") => {
                let known = self.pending.remove(gid).flatten();
                let magnet = match known.or_else(|| Self::magnet_from_status(&status)) {
                    Some(magnet) => magnet,
                    None => {
                        error!("Download {} completed without a recoverable info hash", gid);
                        return PollOutcome::Failed { gid: gid.to_string() };
                    }
                };
                let stored = match self.store_metadata(&magnet).await {
                    Ok(stored) => stored,
                    Err(e) => {
                        error!("Failed to store metadata for {}: {}", magnet, e);
                        false
                    }
                };
                PollOutcome::Completed { magnet, stored }
            }
            Some("error") | Some("removed") => {
                let magnet = self.pending.remove(gid).flatten().or_else(|| Self::magnet_from_status(&status));
                warn!(
                    "Download {} of {} failed: {}",
                    gid,
                    magnet.as_deref().unwrap_or("unknown magnet"),
                    status.error_message.as_deref().unwrap_or("no message")
                );
                if let Err(e) = self.client.remove_download_result(gid).await {
                    warn!("Failed to remove result of {}: {}", gid, e);
                }
                PollOutcome::Failed { gid: gid.to_string() }
            }
            _ => PollOutcome::Pending,
        }
    }

    fn magnet_from_status(status: &DownloadStatus) -> Option<String> {
        let hash = status.info_hash.as_deref()?;
        Magnet::from_hex(hash).ok().map(|magnet| magnet.uri())
    }

    /// Mark the magnet available and record its parsed metadata
    async fn store_metadata(&self, magnet: &str) -> Result<bool> {
        self.store.add_to(MagnetSet::Available, magnet).await?;

        let hex = Magnet::parse(magnet)?.info_hash_hex();
        let candidates = [
            self.config.torrent_dir.join(format!("{}.torrent", hex)),
            self.config.torrent_dir.join(format!("{}.torrent", hex.to_lowercase())),
        ];
        let Some(path) = candidates.iter().find(|p| p.is_file()) else {
            error!("No torrent file for {} in {}", magnet, self.config.torrent_dir.display());
            return Ok(false);
        };

        let metadata = TorrentParser::parse_file(path)?;
        let content = serde_json::to_value(&metadata).map_err(CrawlError::from)?;
        let record = TorrentRecord::new(magnet, metadata.name.clone(), content);
        let stored = self.records.insert(&record).await?;
        if stored {
            info!("Saved metadata of {} ({})", magnet, metadata.name.as_deref().unwrap_or("unnamed"));
        }
        Ok(stored)
    }

    /// Submit and poll forever
    pub async fn run(mut self) -> Result<()> {
        self.prepare().await?;
        info!(
            "Converting magnets through {} into {}",
            self.client.rpc_url(),
            self.config.torrent_dir.display()
        );
        loop {
            match self.submit_batch().await {
                Ok(0) => debug!("Nothing submitted, {} downloads outstanding", self.pending.len()),
                Ok(n) => debug!("Submitted {} magnets", n),
                Err(e) => warn!("Failed to submit magnets: {}", e),
            }
            self.poll().await;
            sleep(self.config.poll_interval).await;
        }
    }
}
