/*
    message.rs - Message model

    A message is owned by its sender and is never physically removed, only
    marked. Invariant: `content` is `Some` unless the deletion marker is
    `hard`, in which case content, envelope and reactions are gone for good
    and only a tombstone remains.
*/

use super::types::{ConversationRef, MessageId, MessageKind, Timestamp, UserId};
use crate::core_deletion::DeletionMarker;
use crate::core_edit::{archive_entries, EditHistoryEntry};
use crate::core_envelope::EncryptionEnvelope;
use crate::core_reaction::ReactionMap;
use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Message in a direct or group conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation: ConversationRef,
    pub sender: UserId,

    /// Live content; `None` only after a hard delete
    pub content: Option<String>,

    pub kind: MessageKind,
    pub created_at: Timestamp,
    pub reply_to: Option<MessageId>,

    pub encrypted: bool,
    pub envelope: Option<EncryptionEnvelope>,

    pub deletion: DeletionMarker,
    pub deleted_at: Option<Timestamp>,
    pub deleted_by: Option<UserId>,

    /// Number of successful edits; also the revision of the latest history entry
    pub revision: u32,
    pub edited_at: Option<Timestamp>,
    /// Oldest first; written in the same swap as the content it describes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_history: Vec<EditHistoryEntry>,

    pub reactions: ReactionMap,
}

/// What remains of a hard-deleted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub message_id: MessageId,
    pub conversation: ConversationRef,
    pub deletion: DeletionMarker,
    pub deleted_at: Timestamp,
    pub deleted_by: Option<UserId>,
}

/// A message as one particular viewer should see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum MessageView {
    Live(Message),
    Tombstone(Tombstone),
}

/// Content must be non-blank and at most `max_chars` characters
pub fn validate_content(content: &str, max_chars: usize) -> EngineResult<()> {
    if content.trim().is_empty() {
        return Err(EngineError::InvalidInput("message content is empty".into()));
    }
    let chars = content.chars().count();
    if chars > max_chars {
        return Err(EngineError::InvalidInput(format!(
            "message content is {} characters, limit is {}",
            chars, max_chars
        )));
    }
    Ok(())
}

impl Message {
    /// Create a new message
    pub fn new(
        id: MessageId,
        conversation: ConversationRef,
        sender: UserId,
        content: String,
        kind: MessageKind,
        created_at: Timestamp,
    ) -> Self {
        Message {
            id,
            conversation,
            sender,
            content: Some(content),
            kind,
            created_at,
            reply_to: None,
            encrypted: false,
            envelope: None,
            deletion: DeletionMarker::None,
            deleted_at: None,
            deleted_by: None,
            revision: 0,
            edited_at: None,
            edit_history: Vec::new(),
            reactions: ReactionMap::new(),
        }
    }

    /// Create a message with a reply reference
    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn is_hard_deleted(&self) -> bool {
        self.deletion.is_terminal()
    }

    pub fn is_edited(&self) -> bool {
        self.revision > 0
    }

    /// Soft-deleted messages disappear for their sender only
    pub fn visible_to(&self, viewer: &UserId) -> bool {
        !(self.deletion == DeletionMarker::Soft && &self.sender == viewer)
    }

    pub fn tombstone(&self) -> Option<Tombstone> {
        if !self.is_hard_deleted() {
            return None;
        }
        Some(Tombstone {
            message_id: self.id.clone(),
            conversation: self.conversation.clone(),
            deletion: self.deletion,
            deleted_at: self.deleted_at.unwrap_or(self.created_at),
            deleted_by: self.deleted_by.clone(),
        })
    }

    /// Projection for `viewer`, `None` when the message is hidden from them
    pub fn view_for(&self, viewer: &UserId) -> Option<MessageView> {
        if let Some(tombstone) = self.tombstone() {
            return Some(MessageView::Tombstone(tombstone));
        }
        if !self.visible_to(viewer) {
            return None;
        }
        Some(MessageView::Live(self.clone()))
    }

    /// Irreversibly clear content and encryption metadata and archive the
    /// edit history. Returns how many history entries were archived.
    pub(crate) fn scrub(&mut self, at: Timestamp, by: &UserId) -> usize {
        self.content = None;
        self.envelope = None;
        self.encrypted = false;
        self.reactions.clear();
        self.deletion = DeletionMarker::Hard;
        self.deleted_at = Some(at);
        self.deleted_by = Some(by.clone());
        archive_entries(&mut self.edit_history, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_model::GroupId;

    fn sample() -> Message {
        Message::new(
            MessageId::new("m1"),
            ConversationRef::group(GroupId::new("g1")),
            UserId::new("sender"),
            "hi".to_string(),
            MessageKind::Text,
            Timestamp(100),
        )
    }

    #[test]
    fn test_message_creation() {
        let msg = sample();
        assert_eq!(msg.content.as_deref(), Some("hi"));
        assert_eq!(msg.deletion, DeletionMarker::None);
        assert!(!msg.is_edited());
        assert!(!msg.encrypted);
        assert!(msg.tombstone().is_none());
    }

    #[test]
    fn test_content_validation() {
        assert!(validate_content("hello", 10).is_ok());
        assert!(validate_content("   ", 10).is_err());
        assert!(validate_content("", 10).is_err());
        assert!(validate_content("ééééé", 5).is_ok());
        assert!(matches!(
            validate_content("toolong", 3),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reply_reference() {
        let msg = sample().with_reply_to(MessageId::new("m0"));
        assert_eq!(msg.reply_to, Some(MessageId::new("m0")));
    }

    #[test]
    fn test_soft_delete_hides_only_from_sender() {
        let mut msg = sample();
        msg.deletion = DeletionMarker::Soft;

        assert!(msg.view_for(&UserId::new("sender")).is_none());
        match msg.view_for(&UserId::new("bob")) {
            Some(MessageView::Live(live)) => assert_eq!(live.content.as_deref(), Some("hi")),
            other => panic!("expected live view, got {:?}", other),
        }
    }

    #[test]
    fn test_scrub_leaves_tombstone() {
        let mut msg = sample();
        msg.reactions.toggle(&UserId::new("bob"), "👍");
        assert_eq!(msg.scrub(Timestamp(200), &UserId::new("mod")), 0);

        assert!(msg.content.is_none());
        assert!(msg.envelope.is_none());
        assert!(msg.reactions.is_empty());

        let tombstone = msg.tombstone().unwrap();
        assert_eq!(tombstone.deleted_at, Timestamp(200));
        assert_eq!(tombstone.deleted_by, Some(UserId::new("mod")));
        assert!(matches!(
            msg.view_for(&UserId::new("sender")),
            Some(MessageView::Tombstone(_))
        ));
    }
}
