//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Default directory of the magnet store
pub const DEFAULT_STORE_DIR: &str = "./magnet-store";

/// First UDP port used by `crawl`
pub const DEFAULT_BASE_PORT: u16 = 10086;

/// CLI arguments for the magnet crawler
#[derive(Debug, Parser)]
#[command(name = "magnet-crawler")]
#[command(about = "Harvest info-hashes from the mainline DHT as magnet links", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join the DHT and record every info-hash other nodes ask about
    Crawl(CrawlArgs),

    /// Create the magnet store layout
    Init {
        /// Store directory
        #[arg(long, value_name = "DIR", default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,
    },

    /// Fetch .torrent metadata for harvested magnets through aria2
    #[cfg(feature = "aria2")]
    Convert(ConvertArgs),

    /// Print the metadata of a .torrent file as JSON
    Inspect {
        /// Path to the .torrent file
        #[arg(value_name = "TORRENT_FILE")]
        torrent_file: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Number of crawl nodes (defaults to the number of CPUs)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// UDP port of the first node; node i binds base_port + i
    #[arg(short = 'p', long, default_value_t = DEFAULT_BASE_PORT)]
    pub base_port: u16,

    /// Local address to bind
    #[arg(long, value_name = "IP", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Magnet store directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,

    /// Keep magnets in memory only
    #[arg(long, conflicts_with = "store")]
    pub memory: bool,

    /// Seconds between telemetry reports
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub report_interval: u64,

    /// Node table capacity per crawl node
    #[arg(long, default_value_t = 10_000)]
    pub capacity: usize,

    /// Bootstrap router, repeatable (defaults to the well-known routers)
    #[arg(long = "seed", value_name = "HOST:PORT")]
    pub seeds: Vec<String>,
}

#[cfg(feature = "aria2")]
#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// aria2 JSON-RPC endpoint
    #[arg(long, value_name = "URL", default_value = crate::aria2::DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// aria2 RPC secret
    #[arg(long, value_name = "TOKEN")]
    pub secret: Option<String>,

    /// Directory aria2 saves .torrent files to
    #[arg(long, value_name = "DIR", default_value = "./torrents")]
    pub dir: PathBuf,

    /// Magnet store directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,

    /// aria2 max-concurrent-downloads
    #[arg(long, default_value_t = 32)]
    pub max_downloads: usize,

    /// Maximum downloads kept outstanding
    #[arg(long, default_value_t = 32)]
    pub batch: usize,

    /// Seconds between polling rounds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub poll_interval: u64,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
