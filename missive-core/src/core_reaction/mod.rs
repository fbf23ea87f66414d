//! Reaction Aggregator

pub mod aggregator;
pub mod map;

pub use aggregator::ReactionAggregator;
pub use map::{ReactionChange, ReactionMap};
