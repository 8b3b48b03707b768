//! Torrent module
//!
//! Magnet links produced by the crawler and the metadata parsed from the
//! .torrent files the converter fetches for them.

pub mod magnet;
pub mod parser;

pub use magnet::{Magnet, MAGNET_PREFIX};
pub use parser::{TorrentFileEntry, TorrentMetadata, TorrentParser};
