//! Test utilities shared by unit and integration tests

pub mod assertions;
pub mod faults;
pub mod fixtures;

pub use assertions::*;
pub use faults::*;
pub use fixtures::*;
