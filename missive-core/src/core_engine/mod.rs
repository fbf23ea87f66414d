//! Message engine facade and inbound event routing

pub mod engine;
pub mod events;

pub use engine::{CreatedMessage, MessageEngine, StoreSet};
pub use events::{Broadcast, InboundEvent, NewMessage};
