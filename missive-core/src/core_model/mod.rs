/*
    core_model - Value objects shared by every component

    Messages, identifiers, timestamps and the clock. No I/O happens here.
*/

pub mod message;
pub mod types;

pub use message::{validate_content, Message, MessageView, Tombstone};
pub use types::{
    Clock, ConversationRef, EditId, GroupId, ManualClock, MessageId, MessageKind, SystemClock,
    Timestamp, UserId,
};
