/*
    core_store - Persistence boundary of the engine

    Handles:
    - The record store contract (get / create-if-absent / compare-and-swap)
    - An in-memory sharded implementation
    - Optimistic update loops used as the sole write path by every component
*/

pub mod errors;
pub mod memory;
pub mod traits;
pub mod update;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::{CasOutcome, InsertOutcome, RecordKey, RecordStore, RecordValue, Versioned};
pub use update::{update_record, upsert_record, Mutation};
