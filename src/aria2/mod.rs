//! aria2 integration
//!
//! Turns harvested magnets into .torrent files by driving an aria2 daemon
//! over JSON-RPC, then records the parsed metadata.

pub mod client;
pub mod converter;

pub use client::{Aria2Client, Aria2Options, DownloadStatus, DEFAULT_RPC_URL};
pub use converter::{ConverterConfig, MagnetConverter, PollOutcome};
