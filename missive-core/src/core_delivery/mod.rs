//! Delivery Status Tracker
//!
//! ```text
//!   seed ──► sent ──mark_delivered──► delivered ──mark_read──► read
//!              └───────────────mark_read (backfill)──────────────┘
//! ```

pub mod status;
pub mod tracker;

pub use status::{
    AggregateStatus, DeliveryKey, DeliveryRoster, DeliveryStatus, DeliveryStatusRecord,
    DeliverySummary, Transition,
};
pub use tracker::{DeliveryTracker, SeedReport};
