//! Inbound events and the broadcasts they produce
//!
//! Both sides are plain serde value objects; the transport layer decides how
//! they travel.

use crate::core_deletion::DeletionOutcome;
use crate::core_delivery::{AggregateStatus, DeliveryStatusRecord, Transition};
use crate::core_edit::EditHistoryEntry;
use crate::core_identity::KeyRecord;
use crate::core_model::{ConversationRef, Message, MessageId, MessageKind, Timestamp, Tombstone, UserId};
use crate::core_reaction::ReactionMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A message the caller wants to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Caller-chosen id, so a replayed create event is recognised; generated
    /// when absent
    #[serde(default)]
    pub id: Option<MessageId>,
    pub conversation: ConversationRef,
    pub sender: UserId,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

impl NewMessage {
    pub fn text(conversation: ConversationRef, sender: UserId, content: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation,
            sender,
            content: content.into(),
            kind: MessageKind::Text,
            reply_to: None,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// Events arriving from connected sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    MessageCreated(NewMessage),
    Delivered {
        message_id: MessageId,
        recipient: UserId,
        /// Defaults to the engine clock
        #[serde(default)]
        at: Option<Timestamp>,
    },
    Read {
        message_id: MessageId,
        recipient: UserId,
        #[serde(default)]
        at: Option<Timestamp>,
    },
    Edited {
        message_id: MessageId,
        editor: UserId,
        content: String,
    },
    ReactionToggled {
        message_id: MessageId,
        user: UserId,
        emoji: String,
    },
    SoftDeleted {
        message_id: MessageId,
        actor: UserId,
    },
    HardDeleted {
        message_id: MessageId,
        actor: UserId,
    },
    KeyRotated {
        user: UserId,
        #[serde(with = "hex::serde")]
        public_key: Vec<u8>,
    },
    EnvelopeAttached {
        message_id: MessageId,
        algorithm: String,
        #[serde(with = "hex::serde")]
        nonce: Vec<u8>,
        #[serde(with = "hex::serde")]
        auth_tag: Vec<u8>,
        key_version: u32,
    },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::MessageCreated(_) => "message_created",
            InboundEvent::Delivered { .. } => "delivered",
            InboundEvent::Read { .. } => "read",
            InboundEvent::Edited { .. } => "edited",
            InboundEvent::ReactionToggled { .. } => "reaction_toggled",
            InboundEvent::SoftDeleted { .. } => "soft_deleted",
            InboundEvent::HardDeleted { .. } => "hard_deleted",
            InboundEvent::KeyRotated { .. } => "key_rotated",
            InboundEvent::EnvelopeAttached { .. } => "envelope_attached",
        }
    }
}

/// Authoritative state to push to connected recipients after an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "broadcast", rename_all = "snake_case")]
pub enum Broadcast {
    MessageCreated {
        message: Message,
        recipients: BTreeSet<UserId>,
    },
    DeliveryUpdated {
        record: DeliveryStatusRecord,
        transition: Transition,
        aggregate: AggregateStatus,
    },
    MessageEdited {
        message: Message,
        entry: EditHistoryEntry,
    },
    ReactionsUpdated {
        message_id: MessageId,
        reactions: ReactionMap,
    },
    /// Only the sender's own sessions need this one
    MessageHidden {
        message_id: MessageId,
        sender: UserId,
        outcome: DeletionOutcome,
    },
    MessageDeleted {
        tombstone: Tombstone,
    },
    KeyRotated {
        record: KeyRecord,
    },
    EnvelopeAttached {
        message: Message,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let json = r#"{
            "event": "message_created",
            "id": "m1",
            "conversation": { "type": "group", "group": "g1" },
            "sender": "s",
            "content": "hi"
        }"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        match event {
            InboundEvent::MessageCreated(new) => {
                assert_eq!(new.id, Some(MessageId::new("m1")));
                assert_eq!(new.kind, MessageKind::Text);
                assert!(new.conversation.is_group());
            }
            other => panic!("unexpected event {:?}", other),
        }

        let read: InboundEvent =
            serde_json::from_str(r#"{"event":"read","message_id":"m1","recipient":"b","at":42}"#)
                .unwrap();
        assert_eq!(
            read,
            InboundEvent::Read {
                message_id: MessageId::new("m1"),
                recipient: UserId::new("b"),
                at: Some(Timestamp(42)),
            }
        );
        assert_eq!(read.name(), "read");
    }

    #[test]
    fn test_binary_fields_are_hex() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"event":"key_rotated","user":"alice","public_key":"00ff"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::KeyRotated {
                user: UserId::new("alice"),
                public_key: vec![0x00, 0xff],
            }
        );
    }
}
