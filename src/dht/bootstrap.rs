//! DHT bootstrap module
//!
//! Resolves the seed routers used to (re)join the DHT.

use std::net::SocketAddr;
use tokio::net::lookup_host;
use tracing::debug;

/// Resolve each seed to its first IPv4 address.
///
/// Seeds that fail to resolve are skipped; DNS outages must not stop the
/// crawl, the next bootstrap round simply tries again.
pub async fn resolve_seeds(seeds: &[String]) -> Vec<SocketAddr> {
    let mut resolved = Vec::with_capacity(seeds.len());
    for seed in seeds {
        match lookup_host(seed.as_str()).await {
            Ok(mut addrs) => match addrs.find(SocketAddr::is_ipv4) {
                Some(addr) => resolved.push(addr),
                None => debug!("Seed {} has no IPv4 address", seed),
            },
            Err(e) => debug!("Failed to resolve seed {}: {}", seed, e),
        }
    }
    resolved
}
