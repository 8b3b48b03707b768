//! DHT node table module
//!
//! A bounded churn buffer of peers waiting to be probed. Unlike a
//! Kademlia routing table it keeps no distance ordering: the oldest
//! entry is probed first and is evicted first when the table is full.

use crate::dht::node::PeerRef;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Default number of entries a node table holds
pub const DEFAULT_TABLE_CAPACITY: usize = 10_000;

/// Bounded, insertion-ordered collection of peers
#[derive(Debug)]
pub struct NodeTable {
    entries: Mutex<VecDeque<PeerRef>>,
    capacity: usize,
}

impl NodeTable {
    /// Create a new table holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_TABLE_CAPACITY))),
            capacity,
        }
    }

    /// Append a peer, evicting and returning the oldest entry if the
    /// table was full. Eviction and append happen under one lock.
    pub async fn push(&self, peer: PeerRef) -> Option<PeerRef> {
        if self.capacity == 0 {
            return Some(peer);
        }
        let mut entries = self.entries.lock().await;
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(peer);
        evicted
    }

    /// Append several peers, returning how many old entries were evicted
    pub async fn extend(&self, peers: impl IntoIterator<Item = PeerRef>) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        let mut entries = self.entries.lock().await;
        let mut evicted = 0;
        for peer in peers {
            if entries.len() >= self.capacity {
                entries.pop_front();
                evicted += 1;
            }
            entries.push_back(peer);
        }
        evicted
    }

    /// Remove and return the oldest entry
    pub async fn pop(&self) -> Option<PeerRef> {
        self.entries.lock().await.pop_front()
    }

    /// Get the number of entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if the table is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::node::NodeId;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn peer(n: u16) -> PeerRef {
        let mut id = [0u8; 20];
        id[..2].copy_from_slice(&n.to_be_bytes());
        PeerRef::new(NodeId::new(id), Ipv4Addr::new(10, 0, (n >> 8) as u8, n as u8), 1000 + n)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let table = NodeTable::new(10);
        for n in 0..3 {
            table.push(peer(n)).await;
        }
        assert_eq!(table.pop().await, Some(peer(0)));
        assert_eq!(table.pop().await, Some(peer(1)));
        assert_eq!(table.pop().await, Some(peer(2)));
        assert_eq!(table.pop().await, None);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let capacity = 100;
        let table = NodeTable::new(capacity);
        for n in 0..capacity as u16 {
            assert!(table.push(peer(n)).await.is_none());
        }
        assert_eq!(table.push(peer(capacity as u16)).await, Some(peer(0)));
        assert_eq!(table.len().await, capacity);
        assert_eq!(table.pop().await, Some(peer(1)));
    }

    #[tokio::test]
    async fn test_extend_evicts_oldest() {
        let table = NodeTable::new(3);
        let evicted = table.extend((0..5).map(peer)).await;
        assert_eq!(evicted, 2);
        assert_eq!(table.len().await, 3);
        assert_eq!(table.pop().await, Some(peer(2)));
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let table = NodeTable::new(10);
        table.push(peer(7)).await;
        table.push(peer(7)).await;
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_nothing() {
        let table = NodeTable::new(0);
        assert_eq!(table.push(peer(1)).await, Some(peer(1)));
        assert_eq!(table.extend([peer(2)]).await, 0);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_producer_consumer() {
        let table = Arc::new(NodeTable::new(50));
        let producer = {
            let table = table.clone();
            tokio::spawn(async move {
                for n in 0..500 {
                    table.push(peer(n)).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        let consumer = {
            let table = table.clone();
            tokio::spawn(async move {
                let mut popped = 0usize;
                for _ in 0..2000 {
                    if table.pop().await.is_some() {
                        popped += 1;
                    }
                    tokio::task::yield_now().await;
                }
                popped
            })
        };
        producer.await.unwrap();
        let popped = consumer.await.unwrap();
        assert!(table.len().await <= table.capacity());
        assert!(popped + table.len().await <= 500);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(NodeTable::default().capacity(), DEFAULT_TABLE_CAPACITY);
    }
}
