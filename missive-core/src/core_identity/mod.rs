//! Identity & Key Registry

pub mod registry;

pub use registry::{fingerprint, KeyHistory, KeyRecord, KeyRegistry};
