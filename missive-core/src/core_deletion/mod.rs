//! Deletion Policy Engine
//!
//! Two-tier deletion: `soft` hides a message from its sender only, `hard`
//! scrubs it for everyone and leaves a tombstone.

pub mod marker;
pub mod policy;

pub use marker::DeletionMarker;
pub use policy::{DeletionEngine, DeletionOutcome, HardDeletePolicy};
