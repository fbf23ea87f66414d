//! Store wrappers that fail on demand

use crate::core_store::{
    CasOutcome, InsertOutcome, MemoryStore, RecordKey, RecordStore, RecordValue, StoreError,
    StoreResult, Versioned,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// [`MemoryStore`] whose next `n` compare-and-swaps fail with
/// [`StoreError::Storage`] without touching the record
pub struct FlakyStore<K: RecordKey, V: RecordValue> {
    inner: MemoryStore<K, V>,
    failing_swaps: AtomicUsize,
}

impl<K: RecordKey, V: RecordValue> FlakyStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_swaps: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_swaps(&self, n: usize) {
        self.failing_swaps.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failing_swaps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<K: RecordKey, V: RecordValue> Default for FlakyStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: RecordKey, V: RecordValue> RecordStore<K, V> for FlakyStore<K, V> {
    async fn get(&self, key: &K) -> StoreResult<Option<Versioned<V>>> {
        self.inner.get(key).await
    }

    async fn insert_if_absent(&self, key: K, value: V) -> StoreResult<InsertOutcome<V>> {
        self.inner.insert_if_absent(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &K,
        expected_version: u64,
        value: V,
    ) -> StoreResult<CasOutcome<V>> {
        if self.take_failure() {
            return Err(StoreError::Storage(format!("injected failure writing {}", key)));
        }
        self.inner.compare_and_swap(key, expected_version, value).await
    }

    async fn scan(&self) -> StoreResult<Vec<(K, Versioned<V>)>> {
        self.inner.scan().await
    }

    async fn len(&self) -> StoreResult<usize> {
        self.inner.len().await
    }
}
