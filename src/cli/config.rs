//! CLI configuration module
//!
//! Turns parsed arguments into the settings each subcommand runs with.

use crate::cli::args::CrawlArgs;
use crate::dht::CrawlerConfig;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "aria2")]
use crate::aria2::ConverterConfig;
#[cfg(feature = "aria2")]
use crate::cli::args::ConvertArgs;

/// Configuration of the `crawl` subcommand
#[derive(Debug, Clone)]
pub struct Config {
    /// Magnet store directory
    pub store_dir: PathBuf,
    /// Use an in-memory store instead of `store_dir`
    pub in_memory: bool,
    /// Number of crawl nodes
    pub count: usize,
    /// Port of the first node
    pub base_port: u16,
    /// Settings shared by every node
    pub crawler: CrawlerConfig,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CrawlArgs) -> Self {
        let count = args.count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let mut crawler = CrawlerConfig::default();
        if !args.seeds.is_empty() {
            crawler = crawler.with_seeds(args.seeds.iter().cloned());
        }
        crawler.bind_ip = args.bind;
        crawler.table_capacity = args.capacity;
        crawler.report_interval = Duration::from_secs(args.report_interval);

        Self {
            store_dir: args.store.clone(),
            in_memory: args.memory,
            count,
            base_port: args.base_port,
            crawler,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(anyhow::anyhow!("count must be at least 1"));
        }

        if self.base_port == 0 {
            return Err(anyhow::anyhow!("base_port cannot be 0"));
        }

        // Last node must still get a valid port
        let last = u16::try_from(self.count - 1)
            .ok()
            .and_then(|offset| self.base_port.checked_add(offset));
        if last.is_none() {
            return Err(anyhow::anyhow!(
                "{} nodes starting at port {} exceed port 65535",
                self.count,
                self.base_port
            ));
        }

        if !self.in_memory && self.store_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("store directory cannot be empty"));
        }

        self.crawler.validate()?;
        Ok(())
    }

    /// Ports the nodes will bind, in node order
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.count).filter_map(move |i| u16::try_from(i).ok().and_then(|i| self.base_port.checked_add(i)))
    }
}

/// Configuration of the `convert` subcommand
#[cfg(feature = "aria2")]
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub store_dir: PathBuf,
    pub rpc_url: String,
    pub secret: Option<String>,
    pub converter: ConverterConfig,
}

#[cfg(feature = "aria2")]
impl ConvertConfig {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &ConvertArgs) -> Self {
        Self {
            store_dir: args.store.clone(),
            rpc_url: args.rpc_url.clone(),
            secret: args.secret.clone(),
            converter: ConverterConfig {
                torrent_dir: args.dir.clone(),
                max_downloads: args.max_downloads,
                batch: args.batch,
                poll_interval: Duration::from_secs(args.poll_interval),
                ..ConverterConfig::default()
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.rpc_url).map_err(|e| anyhow::anyhow!("invalid rpc_url '{}': {}", self.rpc_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("rpc_url must use http or https, got '{}'", url.scheme()));
        }
        if self.store_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("store directory cannot be empty"));
        }
        self.converter.validate()?;
        Ok(())
    }
}
