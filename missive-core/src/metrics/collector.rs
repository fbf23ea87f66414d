//! In-process operation tally

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub messages_created: u64,
    pub records_seeded: u64,
    pub delivered_acks: u64,
    pub read_acks: u64,
    pub duplicate_acks: u64,
    pub envelopes_attached: u64,
    pub keys_rotated: u64,
    pub edits: u64,
    pub soft_deletes: u64,
    pub hard_deletes: u64,
    pub reaction_toggles: u64,
    pub rejected: u64,
}

/// Metrics collector for aggregating engine activity
#[derive(Debug, Default)]
pub struct MetricsCollector {
    messages_created: AtomicU64,
    records_seeded: AtomicU64,
    delivered_acks: AtomicU64,
    read_acks: AtomicU64,
    duplicate_acks: AtomicU64,
    envelopes_attached: AtomicU64,
    keys_rotated: AtomicU64,
    edits: AtomicU64,
    soft_deletes: AtomicU64,
    hard_deletes: AtomicU64,
    reaction_toggles: AtomicU64,
    rejected: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_messages_created(&self) {
        self.messages_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_seeded(&self, count: u64) {
        self.records_seeded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_delivered(&self) {
        self.delivered_acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_read(&self) {
        self.read_acks.fetch_add(1, Ordering::Relaxed);
    }

    /// Acknowledgement that changed nothing
    pub fn inc_duplicate_ack(&self) {
        self.duplicate_acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_envelopes_attached(&self) {
        self.envelopes_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_keys_rotated(&self) {
        self.keys_rotated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_edits(&self) {
        self.edits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_soft_deletes(&self) {
        self.soft_deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_hard_deletes(&self) {
        self.hard_deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reaction_toggles(&self) {
        self.reaction_toggles.fetch_add(1, Ordering::Relaxed);
    }

    /// Operation that surfaced an error to the caller
    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current counters
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            messages_created: self.messages_created.load(Ordering::Relaxed),
            records_seeded: self.records_seeded.load(Ordering::Relaxed),
            delivered_acks: self.delivered_acks.load(Ordering::Relaxed),
            read_acks: self.read_acks.load(Ordering::Relaxed),
            duplicate_acks: self.duplicate_acks.load(Ordering::Relaxed),
            envelopes_attached: self.envelopes_attached.load(Ordering::Relaxed),
            keys_rotated: self.keys_rotated.load(Ordering::Relaxed),
            edits: self.edits.load(Ordering::Relaxed),
            soft_deletes: self.soft_deletes.load(Ordering::Relaxed),
            hard_deletes: self.hard_deletes.load(Ordering::Relaxed),
            reaction_toggles: self.reaction_toggles.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
