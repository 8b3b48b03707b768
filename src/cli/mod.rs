//! CLI module
//!
//! Command-line interface for the magnet crawler.

pub mod args;
pub mod config;

pub use args::{CliArgs, Command, CrawlArgs};
pub use config::Config;

#[cfg(feature = "aria2")]
pub use args::ConvertArgs;
#[cfg(feature = "aria2")]
pub use config::ConvertConfig;
