//! Magnet store module
//!
//! Deduplicating sets of magnet URIs shared by every crawl node, plus the
//! metadata records written once a magnet has been converted.

pub mod backend;
pub mod memory;
pub mod file;
pub mod records;

// Re-exports for convenience
pub use backend::{MagnetSet, MagnetStore, OrderedSet};
pub use memory::MemoryStore;
pub use file::{FileStore, InitReport};
pub use records::{RecordStore, TorrentRecord, RECORDS_DIR, SHARD_NAMES};
