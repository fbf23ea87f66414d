//! Encryption Envelope Manager
//!
//! Attaches and validates per-message encryption metadata and reconciles it
//! against the sender's and recipients' key records. Validation is purely
//! metadata-level.

pub mod envelope;
pub mod manager;

pub use envelope::{CipherSuite, EncryptionEnvelope};
pub use manager::{EnvelopeManager, EnvelopeReconciliation};
