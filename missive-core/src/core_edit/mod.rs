//! Edit History Log

pub mod history;

pub use history::{archive_entries, EditHistoryEntry, EditLog};
