//! DHT (Distributed Hash Table) module
//!
//! Passive mainline DHT crawling: KRPC message handling, the bounded node
//! table and the crawl node that ties them to a UDP socket.

pub mod node;
pub mod compact;
pub mod message;
pub mod table;
pub mod config;
pub mod bootstrap;
pub mod crawler;

// Re-exports for convenience
pub use node::{CrawlNodeIdentity, NodeId, PeerRef, ID_LENGTH};
pub use compact::{encode_nodes, parse_hash, parse_nodes, COMPACT_NODE_LENGTH};
pub use message::{generate_transaction_id, KrpcEvent, KrpcMessage, QueryMethod};
pub use table::NodeTable;
pub use config::CrawlerConfig;
pub use bootstrap::resolve_seeds;
pub use crawler::{run_crawlers, CrawlNode, CrawlStats, Handled, StatsSnapshot};
