//! Crawler configuration module
//!
//! Immutable settings handed to every crawl node at construction.

use crate::dht::table::DEFAULT_TABLE_CAPACITY;
use crate::error::CrawlError;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Well-known mainline DHT bootstrap routers
pub const DEFAULT_SEEDS: [&str; 3] = [
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];

/// Default size of the datagram receive buffer
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 10_240;

/// Default interval between telemetry reports
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Default pause between consecutive outbound queries
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(1);

/// Default pause after a bootstrap forced by an empty table
pub const DEFAULT_EMPTY_TABLE_BACKOFF: Duration = Duration::from_secs(1);

/// Default number of recently discovered hashes each node remembers
pub const DEFAULT_SEEN_CAPACITY: usize = 100_000;

/// Configuration shared by all crawl nodes of one process
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlerConfig {
    /// Bootstrap routers as `host:port`, resolved on every bootstrap round
    pub seeds: Vec<String>,
    /// Local address every node binds to
    pub bind_ip: IpAddr,
    /// Receive buffer size; longer datagrams are truncated and dropped
    pub recv_buffer_size: usize,
    /// Node table capacity per crawl node
    pub table_capacity: usize,
    /// Interval between reporter rounds
    pub report_interval: Duration,
    /// Pacing delay between outbound queries
    pub send_interval: Duration,
    /// Pause after bootstrapping because the table ran empty
    pub empty_table_backoff: Duration,
    /// Capacity of the recently-discovered hash filter
    pub seen_capacity: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: DEFAULT_SEEDS.iter().map(|s| s.to_string()).collect(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            report_interval: DEFAULT_REPORT_INTERVAL,
            send_interval: DEFAULT_SEND_INTERVAL,
            empty_table_backoff: DEFAULT_EMPTY_TABLE_BACKOFF,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        }
    }
}

impl CrawlerConfig {
    /// Replace the seed list
    pub fn with_seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.seeds.is_empty() {
            return Err(CrawlError::config_error_with_field("at least one seed is required", "seeds"));
        }
        if let Some(seed) = self.seeds.iter().find(|s| !s.contains(':')) {
            return Err(CrawlError::config_error_with_field(
                format!("seed '{}' must be host:port", seed),
                "seeds",
            ));
        }
        if !self.bind_ip.is_ipv4() {
            return Err(CrawlError::config_error_with_field("only IPv4 is supported", "bind_ip"));
        }
        if self.recv_buffer_size == 0 {
            return Err(CrawlError::config_error_with_field("must be at least 1", "recv_buffer_size"));
        }
        if self.table_capacity == 0 {
            return Err(CrawlError::config_error_with_field("must be at least 1", "table_capacity"));
        }
        if self.report_interval.is_zero() {
            return Err(CrawlError::config_error_with_field("must be positive", "report_interval"));
        }
        if self.seen_capacity == 0 {
            return Err(CrawlError::config_error_with_field("must be at least 1", "seen_capacity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.seeds.len(), 3);
        assert!(config.seeds.iter().all(|s| s.ends_with(":6881")));
        assert_eq!(config.recv_buffer_size, 10_240);
        assert_eq!(config.table_capacity, 10_000);
        assert_eq!(config.report_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_seeds() {
        let config = CrawlerConfig::default().with_seeds(["127.0.0.1:6881"]);
        assert_eq!(config.seeds, vec!["127.0.0.1:6881".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty = CrawlerConfig::default().with_seeds(Vec::<String>::new());
        assert!(empty.validate().is_err());

        let no_port = CrawlerConfig::default().with_seeds(["router.example.org"]);
        assert!(no_port.validate().is_err());

        let config = CrawlerConfig { table_capacity: 0, ..CrawlerConfig::default() };
        assert!(matches!(config.validate(), Err(CrawlError::ConfigError { .. })));

        let config = CrawlerConfig { recv_buffer_size: 0, ..CrawlerConfig::default() };
        assert!(config.validate().is_err());

        let config = CrawlerConfig { report_interval: Duration::ZERO, ..CrawlerConfig::default() };
        assert!(config.validate().is_err());

        let config = CrawlerConfig { bind_ip: "::1".parse().unwrap(), ..CrawlerConfig::default() };
        assert!(config.validate().is_err());
    }
}
