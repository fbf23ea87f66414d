//! Optimistic read-modify-write loops over a [`RecordStore`].
//!
//! Business logic runs synchronously inside the `apply` closure; the only
//! suspension points are the store calls around it. A lost compare-and-swap
//! re-reads the record and re-runs `apply` against the fresh value, so a
//! transition is always computed from the state it replaces.

use super::traits::{CasOutcome, RecordKey, RecordStore, RecordValue};
use crate::errors::{EngineError, EngineResult};
use metrics::counter;
use tracing::{trace, warn};

/// What an `apply` closure decided to do with the current value
#[derive(Debug)]
pub enum Mutation<V, T> {
    /// Store `V` and return `T`
    Write(V, T),
    /// Leave the record untouched and return `T`
    Keep(T),
}

/// Read-modify-write an existing record.
///
/// Fails with [`EngineError::NotFound`] if the record does not exist and with
/// [`EngineError::Contention`] once `retry_limit` swaps have been lost.
pub async fn update_record<K, V, T, F>(
    store: &dyn RecordStore<K, V>,
    entity: &'static str,
    key: &K,
    retry_limit: usize,
    mut apply: F,
) -> EngineResult<T>
where
    K: RecordKey,
    V: RecordValue,
    T: Send,
    F: FnMut(&V) -> EngineResult<Mutation<V, T>> + Send,
{
    let mut conflicts = 0usize;
    loop {
        let current = store
            .get(key)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("{} {}", entity, key)))?;

        let (next, output) = match apply(&current.value)? {
            Mutation::Keep(output) => return Ok(output),
            Mutation::Write(next, output) => (next, output),
        };

        match store.compare_and_swap(key, current.version, next).await? {
            CasOutcome::Swapped(_) => return Ok(output),
            CasOutcome::Conflict(_) => {
                conflicts += 1;
                counter!("store.cas.conflicts").increment(1);
                trace!(entity, key = %key, conflicts, "compare-and-swap lost, retrying");
                if conflicts >= retry_limit {
                    warn!(entity, key = %key, conflicts, "giving up after repeated conflicts");
                    return Err(EngineError::Contention {
                        key: format!("{} {}", entity, key),
                        attempts: conflicts,
                    });
                }
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Like [`update_record`], but creates the record from `initial` first when
/// it does not exist yet.
pub async fn upsert_record<K, V, T, D, F>(
    store: &dyn RecordStore<K, V>,
    entity: &'static str,
    key: &K,
    retry_limit: usize,
    initial: D,
    apply: F,
) -> EngineResult<T>
where
    K: RecordKey,
    V: RecordValue,
    T: Send,
    D: FnOnce() -> V + Send,
    F: FnMut(&V) -> EngineResult<Mutation<V, T>> + Send,
{
    if store.get(key).await?.is_none() {
        store.insert_if_absent(key.clone(), initial()).await?;
    }
    update_record(store, entity, key, retry_limit, apply).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        let result = update_record(&store, "counter", &"c".to_string(), 4, |v| {
            Ok(Mutation::Write(v + 1, ()))
        })
        .await;
        assert!(matches!(result, Err(EngineError::NotFound(ref what)) if what == "counter c"));
    }

    #[tokio::test]
    async fn test_keep_does_not_bump_version() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        store.insert_if_absent("c".into(), 7).await.unwrap();

        let seen = update_record(&store, "counter", &"c".to_string(), 4, |v| {
            Ok(Mutation::Keep(*v))
        })
        .await
        .unwrap();

        assert_eq!(seen, 7);
        assert_eq!(store.get(&"c".into()).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_applies() {
        let store: MemoryStore<String, Vec<u32>> = MemoryStore::new();
        let len = upsert_record(&store, "list", &"l".to_string(), 4, Vec::new, |v| {
            let mut next = v.clone();
            next.push(1);
            let len = next.len();
            Ok(Mutation::Write(next, len))
        })
        .await
        .unwrap();
        assert_eq!(len, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store: Arc<MemoryStore<String, u32>> = Arc::new(MemoryStore::new());
        store.insert_if_absent("c".into(), 0).await.unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    update_record(store.as_ref(), "counter", &"c".to_string(), 10_000, |v| {
                        Ok(Mutation::Write(v + 1, ()))
                    })
                    .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let record = store.get(&"c".into()).await.unwrap().unwrap();
        assert_eq!(record.value, 32);
        assert_eq!(record.version, 33);
    }
}
