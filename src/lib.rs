//! magnet-crawler
//!
//! A passive mainline DHT crawler that collects announced info-hashes as
//! magnet links, with an optional aria2-driven metadata converter.

pub mod bencode;
pub mod dht;
pub mod store;
pub mod torrent;
#[cfg(feature = "aria2")]
pub mod aria2;
pub mod cli;
pub mod error;

pub use error::CrawlError;

pub use bencode::{decode, encode, Value};
pub use dht::{
    run_crawlers, CrawlNode, CrawlNodeIdentity, CrawlerConfig, Handled, KrpcEvent, KrpcMessage, NodeId, NodeTable,
    PeerRef, QueryMethod,
};
pub use store::{FileStore, MagnetSet, MagnetStore, MemoryStore, RecordStore, TorrentRecord};
pub use torrent::{Magnet, TorrentMetadata, TorrentParser};
#[cfg(feature = "aria2")]
pub use aria2::{Aria2Client, ConverterConfig, MagnetConverter};
pub use cli::{CliArgs, Command, Config};
