//! In-process magnet store

use crate::store::backend::{MagnetSet, MagnetStore, OrderedSet};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Magnet store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: RwLock<HashMap<MagnetSet, OrderedSet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MagnetStore for MemoryStore {
    async fn add_to(&self, set: MagnetSet, magnet: &str) -> Result<bool> {
        Ok(self.sets.write().await.entry(set).or_default().insert(magnet))
    }

    async fn count_in(&self, set: MagnetSet) -> Result<usize> {
        Ok(self.sets.read().await.get(&set).map_or(0, OrderedSet::len))
    }

    async fn difference(&self, set: MagnetSet, minus: MagnetSet, limit: usize) -> Result<Vec<String>> {
        let sets = self.sets.read().await;
        let empty = OrderedSet::default();
        let base = sets.get(&set).unwrap_or(&empty);
        let minus = sets.get(&minus).unwrap_or(&empty);
        Ok(base.difference(minus, limit))
    }
}
