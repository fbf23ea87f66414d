/*
    memory.rs - In-memory record store

    Sharded concurrent map; each shard has its own lock, so operations on
    different records do not contend on a single global lock. A shard guard
    is only held inside synchronous code and never across an await point.
*/

use super::errors::StoreResult;
use super::traits::{CasOutcome, InsertOutcome, RecordKey, RecordStore, RecordValue, Versioned};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory implementation of [`RecordStore`]
pub struct MemoryStore<K: RecordKey, V: RecordValue> {
    records: DashMap<K, Versioned<V>>,
}

impl<K: RecordKey, V: RecordValue> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<K: RecordKey, V: RecordValue> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: RecordKey, V: RecordValue> RecordStore<K, V> for MemoryStore<K, V> {
    async fn get(&self, key: &K) -> StoreResult<Option<Versioned<V>>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn insert_if_absent(&self, key: K, value: V) -> StoreResult<InsertOutcome<V>> {
        match self.records.entry(key) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                let record = Versioned::new(1, value);
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted(record))
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &K,
        expected_version: u64,
        value: V,
    ) -> StoreResult<CasOutcome<V>> {
        let Some(mut current) = self.records.get_mut(key) else {
            return Ok(CasOutcome::Conflict(None));
        };

        if current.version != expected_version {
            return Ok(CasOutcome::Conflict(Some(current.clone())));
        }

        let next = Versioned::new(current.version + 1, value);
        *current = next.clone();
        Ok(CasOutcome::Swapped(next))
    }

    async fn scan(&self) -> StoreResult<Vec<(K, Versioned<V>)>> {
        Ok(self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing() {
        let store: MemoryStore<String, u32> = MemoryStore::new();

        let first = store.insert_if_absent("a".into(), 1).await.unwrap();
        assert!(first.was_inserted());

        let second = store.insert_if_absent("a".into(), 2).await.unwrap();
        assert!(!second.was_inserted());
        assert_eq!(second.into_inner(), Versioned::new(1, 1));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cas_bumps_version() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        store.insert_if_absent("a".into(), 1).await.unwrap();

        let swapped = store.compare_and_swap(&"a".into(), 1, 5).await.unwrap();
        assert_eq!(swapped, CasOutcome::Swapped(Versioned::new(2, 5)));

        let stale = store.compare_and_swap(&"a".into(), 1, 9).await.unwrap();
        assert_eq!(stale, CasOutcome::Conflict(Some(Versioned::new(2, 5))));

        let record = store.get(&"a".into()).await.unwrap().unwrap();
        assert_eq!(record.value, 5);
    }

    #[tokio::test]
    async fn test_cas_on_missing_record_conflicts() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        let outcome = store.compare_and_swap(&"missing".into(), 1, 1).await.unwrap();
        assert_eq!(outcome, CasOutcome::Conflict(None));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cas_exactly_one_winner_per_version() {
        let store: Arc<MemoryStore<String, u32>> = Arc::new(MemoryStore::new());
        store.insert_if_absent("k".into(), 0).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.compare_and_swap(&"k".into(), 1, i).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), CasOutcome::Swapped(_)) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get(&"k".into()).await.unwrap().unwrap().version, 2);
    }
}
