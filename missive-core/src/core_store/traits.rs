//! Record store abstraction
//!
//! Every entity the engine owns (messages, delivery records, rosters, key
//! histories) is persisted through [`RecordStore`]: point reads,
//! create-if-absent and a per-record compare-and-swap keyed on a
//! monotonically increasing record version.

use super::errors::StoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;

/// A stored value together with its record version.
///
/// Versions start at 1 on insert and increase by one on every successful
/// compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<V> {
    pub version: u64,
    pub value: V,
}

impl<V> Versioned<V> {
    pub fn new(version: u64, value: V) -> Self {
        Self { version, value }
    }
}

/// Result of [`RecordStore::insert_if_absent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<V> {
    /// The record did not exist and was created
    Inserted(Versioned<V>),
    /// A record already existed; it was left untouched
    Existing(Versioned<V>),
}

impl<V> InsertOutcome<V> {
    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }

    pub fn into_inner(self) -> Versioned<V> {
        match self {
            InsertOutcome::Inserted(v) | InsertOutcome::Existing(v) => v,
        }
    }
}

/// Result of [`RecordStore::compare_and_swap`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<V> {
    /// The expected version matched and the new value is stored
    Swapped(Versioned<V>),
    /// The record changed (or vanished) since it was read
    Conflict(Option<Versioned<V>>),
}

/// Keys usable in a record store
pub trait RecordKey: Clone + Eq + Hash + Display + Send + Sync + 'static {}

impl<T> RecordKey for T where T: Clone + Eq + Hash + Display + Send + Sync + 'static {}

/// Values usable in a record store
pub trait RecordValue: Clone + Send + Sync + 'static {}

impl<T> RecordValue for T where T: Clone + Send + Sync + 'static {}

/// Persistent key/record store with per-record atomic compare-and-swap.
#[async_trait]
pub trait RecordStore<K: RecordKey, V: RecordValue>: Send + Sync {
    /// Fetch a record
    async fn get(&self, key: &K) -> StoreResult<Option<Versioned<V>>>;

    /// Create a record unless one already exists under `key`
    async fn insert_if_absent(&self, key: K, value: V) -> StoreResult<InsertOutcome<V>>;

    /// Replace the record only if its version still equals `expected_version`
    async fn compare_and_swap(
        &self,
        key: &K,
        expected_version: u64,
        value: V,
    ) -> StoreResult<CasOutcome<V>>;

    /// Snapshot of every record (unordered)
    async fn scan(&self) -> StoreResult<Vec<(K, Versioned<V>)>>;

    /// Number of records
    async fn len(&self) -> StoreResult<usize>;
}
