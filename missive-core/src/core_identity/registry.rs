/*
    registry.rs - Identity & Key Registry

    Keeps an append-only history of public keys per identity. The last entry
    is the canonical current key; older entries stay available so envelopes
    encrypted under a superseded key version still validate.

    Only public key material ever reaches this module.
*/

use crate::config::KeyConfig;
use crate::core_model::{Clock, Timestamp, UserId};
use crate::core_store::{update_record, upsert_record, Mutation, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::record_counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// One public key an identity has held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub user: UserId,
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// Starts at 1 and strictly increases on every rotation
    pub version: u32,
    pub rotated_at: Timestamp,
    /// Hex-encoded SHA-256 of the public key
    pub fingerprint: String,
}

impl KeyRecord {
    fn new(user: UserId, public_key: Vec<u8>, version: u32, rotated_at: Timestamp) -> Self {
        let fingerprint = fingerprint(&public_key);
        Self {
            user,
            public_key,
            version,
            rotated_at,
            fingerprint,
        }
    }
}

/// Hex-encoded SHA-256 digest of a public key
pub fn fingerprint(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

/// Append-only key history of one identity, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHistory {
    pub user: UserId,
    pub records: Vec<KeyRecord>,
}

impl KeyHistory {
    fn new(user: UserId) -> Self {
        Self {
            user,
            records: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&KeyRecord> {
        self.records.last()
    }

    pub fn current_version(&self) -> u32 {
        self.current().map(|r| r.version).unwrap_or(0)
    }

    pub fn get(&self, version: u32) -> Option<&KeyRecord> {
        self.records.iter().find(|r| r.version == version)
    }

    /// Whether the identity has ever held (and still retains) `version`
    pub fn holds(&self, version: u32) -> bool {
        self.get(version).is_some()
    }

    /// Append a new current key, dropping the oldest entries beyond `retain`
    fn push(&mut self, record: KeyRecord, retain: Option<usize>) {
        self.records.push(record);
        if let Some(retain) = retain {
            let excess = self.records.len().saturating_sub(retain.max(1));
            self.records.drain(..excess);
        }
    }
}

/// Registry of identity keys
pub struct KeyRegistry {
    store: Arc<dyn RecordStore<UserId, KeyHistory>>,
    clock: Arc<dyn Clock>,
    config: KeyConfig,
    retry_limit: usize,
}

impl KeyRegistry {
    pub fn new(
        store: Arc<dyn RecordStore<UserId, KeyHistory>>,
        clock: Arc<dyn Clock>,
        config: KeyConfig,
        retry_limit: usize,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            retry_limit,
        }
    }

    fn validate_key(&self, public_key: &[u8]) -> EngineResult<()> {
        if public_key.is_empty() {
            return Err(EngineError::InvalidInput("public key is empty".into()));
        }
        if public_key.len() != self.config.public_key_length {
            return Err(EngineError::InvalidInput(format!(
                "public key must be {} bytes, got {}",
                self.config.public_key_length,
                public_key.len()
            )));
        }
        Ok(())
    }

    /// Register the first key of an identity.
    ///
    /// Registering the same key again is a no-op; registering a different key
    /// for an identity that already has one is `InvalidState` (use
    /// [`KeyRegistry::rotate_key`]).
    pub async fn register(&self, user: &UserId, public_key: Vec<u8>) -> EngineResult<KeyRecord> {
        self.validate_key(&public_key)?;
        let now = self.clock.now();

        upsert_record(
            self.store.as_ref(),
            "key history",
            user,
            self.retry_limit,
            || KeyHistory::new(user.clone()),
            |history| match history.current() {
                Some(current) if current.public_key == public_key => {
                    Ok(Mutation::Keep(current.clone()))
                }
                Some(current) => Err(EngineError::InvalidState(format!(
                    "{} already registered key version {}",
                    user, current.version
                ))),
                None => {
                    let record = KeyRecord::new(user.clone(), public_key.clone(), 1, now);
                    let mut next = history.clone();
                    next.push(record.clone(), self.config.max_retained_versions);
                    Ok(Mutation::Write(next, record))
                }
            },
        )
        .await
        .inspect(|record| debug!(user = %user, version = record.version, "key registered"))
    }

    /// Install a new current key and return its record.
    ///
    /// An identity without any key gets version 1. Rotating to the key that
    /// is already current is rejected.
    pub async fn rotate_key(&self, user: &UserId, new_public_key: Vec<u8>) -> EngineResult<KeyRecord> {
        self.validate_key(&new_public_key)?;
        let now = self.clock.now();
        let retain = self.config.max_retained_versions;

        let record = upsert_record(
            self.store.as_ref(),
            "key history",
            user,
            self.retry_limit,
            || KeyHistory::new(user.clone()),
            |history| {
                if history
                    .current()
                    .is_some_and(|current| current.public_key == new_public_key)
                {
                    return Err(EngineError::InvalidInput(format!(
                        "{} is already using this key",
                        user
                    )));
                }
                let version = history.current_version() + 1;
                let record = KeyRecord::new(user.clone(), new_public_key.clone(), version, now);
                let mut next = history.clone();
                next.push(record.clone(), retain);
                Ok(Mutation::Write(next, record))
            },
        )
        .await?;

        record_counter("keys.rotated", 1);
        info!(
            user = %user,
            version = record.version,
            fingerprint = %record.fingerprint,
            "identity key rotated"
        );
        Ok(record)
    }

    /// Current key of an identity, if any
    pub async fn current(&self, user: &UserId) -> EngineResult<Option<KeyRecord>> {
        Ok(self
            .store
            .get(user)
            .await?
            .and_then(|history| history.value.current().cloned()))
    }

    /// Full retained history, oldest first
    pub async fn history(&self, user: &UserId) -> EngineResult<KeyHistory> {
        self.store
            .get(user)
            .await?
            .map(|history| history.value)
            .ok_or_else(|| EngineError::NotFound(format!("key history {}", user)))
    }

    /// Whether `user` has held key `version`
    pub async fn holds_version(&self, user: &UserId, version: u32) -> EngineResult<bool> {
        Ok(self
            .store
            .get(user)
            .await?
            .is_some_and(|history| history.value.holds(version)))
    }

    /// Drop every retained key but the current one. Returns how many went.
    pub async fn prune_history(&self, user: &UserId) -> EngineResult<usize> {
        update_record(
            self.store.as_ref(),
            "key history",
            user,
            self.retry_limit,
            |history| {
                let excess = history.records.len().saturating_sub(1);
                if excess == 0 {
                    return Ok(Mutation::Keep(0));
                }
                let mut next = history.clone();
                next.records.drain(..excess);
                Ok(Mutation::Write(next, excess))
            },
        )
        .await
    }
}
