//! Missive core
//!
//! Message delivery, read-receipt and encryption-metadata tracking for direct
//! and group conversations.
//!
//! ```text
//!   InboundEvent ──► MessageEngine::dispatch ──► Broadcast
//!                        │
//!     ┌──────────┬───────┴──────┬───────────┬───────────┬───────────┐
//!     ▼          ▼              ▼           ▼           ▼           ▼
//!  delivery   envelope        edit      deletion    reaction    identity
//!     │          │              │           │           │           │
//!     └──────────┴──────── RecordStore (compare-and-swap) ──────────┘
//! ```

pub mod config;
pub mod core_deletion;
pub mod core_delivery;
pub mod core_edit;
pub mod core_engine;
pub mod core_envelope;
pub mod core_identity;
pub mod core_membership;
pub mod core_model;
pub mod core_reaction;
pub mod core_store;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::Config;
pub use core_engine::{Broadcast, InboundEvent, MessageEngine, NewMessage, StoreSet};
pub use errors::{EngineError, EngineResult, ErrorKind};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        assert!(Config::default().validate().is_ok());
    }
}
