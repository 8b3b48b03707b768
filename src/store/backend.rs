//! Magnet store abstraction
//!
//! The crawl core only ever calls [`MagnetStore::add`] and
//! [`MagnetStore::count`]; the converter also works with the `Used` and
//! `Available` sets.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Named sets a magnet can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagnetSet {
    /// Every magnet harvested from the DHT
    All,
    /// Magnets handed to the download manager
    Used,
    /// Magnets whose metadata was fetched successfully
    Available,
}

impl MagnetSet {
    pub const ALL: [MagnetSet; 3] = [MagnetSet::All, MagnetSet::Used, MagnetSet::Available];

    /// File name of the set inside a store directory
    pub fn file_name(&self) -> &'static str {
        match self {
            MagnetSet::All => "all.txt",
            MagnetSet::Used => "used.txt",
            MagnetSet::Available => "available.txt",
        }
    }
}

/// Storage of deduplicated magnet URIs.
///
/// Insertion must be idempotent and safe to call concurrently from every
/// crawl node of the process.
#[async_trait]
pub trait MagnetStore: Send + Sync {
    /// Insert a magnet into a set; returns `true` if it was not present
    async fn add_to(&self, set: MagnetSet, magnet: &str) -> Result<bool>;

    /// Number of magnets in a set
    async fn count_in(&self, set: MagnetSet) -> Result<usize>;

    /// Up to `limit` members of `set` that are not in `minus`, oldest first
    async fn difference(&self, set: MagnetSet, minus: MagnetSet, limit: usize) -> Result<Vec<String>>;

    /// Record a harvested magnet
    async fn add(&self, magnet: &str) -> Result<bool> {
        self.add_to(MagnetSet::All, magnet).await
    }

    /// Number of harvested magnets
    async fn count(&self) -> Result<usize> {
        self.count_in(MagnetSet::All).await
    }
}

/// Insertion-ordered set of strings
#[derive(Debug, Default, Clone)]
pub struct OrderedSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl OrderedSet {
    pub fn insert(&mut self, value: &str) -> bool {
        if self.members.contains(value) {
            return false;
        }
        self.members.insert(value.to_string());
        self.order.push(value.to_string());
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.members.contains(value)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Members not contained in `other`, in insertion order
    pub fn difference<'a>(&'a self, other: &'a OrderedSet, limit: usize) -> Vec<String> {
        self.order
            .iter()
            .filter(|value| !other.contains(value))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_set_dedup() {
        let mut set = OrderedSet::default();
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_ordered_set_difference_keeps_order() {
        let mut all = OrderedSet::default();
        let mut used = OrderedSet::default();
        for v in ["c", "a", "b", "d"] {
            all.insert(v);
        }
        used.insert("a");
        assert_eq!(all.difference(&used, 10), vec!["c", "b", "d"]);
        assert_eq!(all.difference(&used, 2), vec!["c", "b"]);
    }

    #[test]
    fn test_set_file_names_distinct() {
        let names: HashSet<_> = MagnetSet::ALL.iter().map(MagnetSet::file_name).collect();
        assert_eq!(names.len(), 3);
    }
}
