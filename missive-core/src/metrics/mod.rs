//! Metrics collection for observability
//!
//! Counters and histograms go through the `metrics` facade; the binary decides
//! which recorder (if any) receives them. [`MetricsCollector`] keeps a small
//! in-process tally that backs `MessageEngine::stats()`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

mod collector;

pub use collector::{EngineStats, MetricsCollector};

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Delivery metrics
    describe_counter!("delivery.records.seeded", "Delivery records created by fan-out");
    describe_counter!("delivery.transitions.delivered", "Records advanced to delivered");
    describe_counter!("delivery.transitions.read", "Records advanced to read");

    // Envelope and key metrics
    describe_counter!("envelope.attached", "Encryption envelopes attached to messages");
    describe_counter!("envelope.rejected", "Encryption envelopes rejected as malformed");
    describe_counter!("keys.rotated", "Identity key rotations");

    // Message lifecycle metrics
    describe_counter!("messages.created", "Messages created");
    describe_counter!("edits.recorded", "Edits appended to edit history");
    describe_counter!("deletions.soft", "Soft (sender-only) deletions");
    describe_counter!("deletions.hard", "Hard (everyone) deletions");
    describe_counter!("reactions.toggled", "Reaction toggles");

    // Store metrics
    describe_counter!("store.cas.conflicts", "Lost compare-and-swap rounds");
    describe_histogram!("engine.dispatch.duration_ms", "Inbound event handling duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration in milliseconds
    pub fn stop(self) {
        record_histogram(self.name, self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
