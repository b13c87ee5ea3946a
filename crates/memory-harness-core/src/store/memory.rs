//! In-memory [`FactRepository`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Nothing touches disk.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use crate::models::Fact;

use super::{FactRepository, Partition};

/// In-memory partition storage.
#[derive(Default)]
pub struct InMemoryRepository {
    partitions: RwLock<HashMap<Partition, Vec<Fact>>>,
    saves: RwLock<usize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a partition, replacing anything stored.
    pub fn with_partition(self, partition: Partition, facts: Vec<Fact>) -> Self {
        if let Ok(mut map) = self.partitions.write() {
            map.insert(partition, facts);
        }
        self
    }

    /// Copy of a partition's stored facts.
    pub fn snapshot(&self, partition: &Partition) -> Vec<Fact> {
        self.partitions
            .read()
            .map(|map| map.get(partition).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of `save_partition` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.read().map(|n| *n).unwrap_or(0)
    }
}

impl FactRepository for InMemoryRepository {
    fn load_partition(&self, partition: &Partition) -> Result<Vec<Fact>> {
        let map = self
            .partitions
            .read()
            .map_err(|_| anyhow!("in-memory repository lock poisoned"))?;
        Ok(map.get(partition).cloned().unwrap_or_default())
    }

    fn save_partition(&self, partition: &Partition, facts: &[&Fact]) -> Result<()> {
        let mut map = self
            .partitions
            .write()
            .map_err(|_| anyhow!("in-memory repository lock poisoned"))?;
        let stored = facts.iter().map(|f| (*f).clone()).collect();
        map.insert(partition.clone(), stored);
        let mut saves = self
            .saves
            .write()
            .map_err(|_| anyhow!("in-memory repository lock poisoned"))?;
        *saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FactKind, FactScope};

    #[test]
    fn test_unsaved_partition_is_empty() {
        let repo = InMemoryRepository::new();
        assert!(repo.load_partition(&Partition::Global).unwrap().is_empty());
    }

    #[test]
    fn test_save_overwrites() {
        let repo = InMemoryRepository::new();
        let a = Fact::new("a", "b", FactKind::Pattern, FactScope::Global);
        let b = Fact::new("b", "b", FactKind::Pattern, FactScope::Global);
        repo.save_partition(&Partition::Global, &[&a, &b]).unwrap();
        repo.save_partition(&Partition::Global, &[&b]).unwrap();

        let loaded = repo.load_partition(&Partition::Global).unwrap();
        assert_eq!(loaded, vec![b]);
        assert_eq!(repo.save_count(), 2);
    }
}
