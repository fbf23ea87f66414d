/*
    history.rs - Edit History Log

    Append-only record of content mutations per message. The entries live in
    the message record itself, so the content swap and its history entry are
    one compare-and-swap: either both land or neither does, and a hard
    delete archives the log in the same write that scrubs the content.

    Entries are never removed. A hard delete stamps them `archived_at`.
*/

use crate::core_deletion::DeletionMarker;
use crate::core_model::{validate_content, Clock, EditId, Message, MessageId, Timestamp, UserId};
use crate::core_store::{update_record, Mutation, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::record_counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One applied edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditHistoryEntry {
    pub id: EditId,
    pub message_id: MessageId,
    /// 1 for the first edit, then consecutive
    pub revision: u32,
    pub previous_content: String,
    pub new_content: String,
    pub editor: UserId,
    pub edited_at: Timestamp,
    /// Set when the message was hard-deleted
    pub archived_at: Option<Timestamp>,
}

/// Stamp every unarchived entry with `at`; returns how many were stamped
pub fn archive_entries(entries: &mut [EditHistoryEntry], at: Timestamp) -> usize {
    entries
        .iter_mut()
        .filter(|entry| entry.archived_at.is_none())
        .map(|entry| entry.archived_at = Some(at))
        .count()
}

/// Edit History Log
pub struct EditLog {
    messages: Arc<dyn RecordStore<MessageId, Message>>,
    clock: Arc<dyn Clock>,
    edit_window: Option<Duration>,
    max_content_length: usize,
    retry_limit: usize,
}

impl EditLog {
    pub fn new(
        messages: Arc<dyn RecordStore<MessageId, Message>>,
        clock: Arc<dyn Clock>,
        edit_window: Option<Duration>,
        max_content_length: usize,
        retry_limit: usize,
    ) -> Self {
        Self {
            messages,
            clock,
            edit_window,
            max_content_length,
            retry_limit,
        }
    }

    /// Replace the live content of a message and log the change.
    ///
    /// Only the sender may edit, only while the message is not deleted and
    /// only within the edit window. The envelope of an encrypted message
    /// described the old ciphertext, so it is dropped; the sender attaches a
    /// fresh one for the new content.
    pub async fn record_edit(
        &self,
        message_id: &MessageId,
        editor: &UserId,
        new_content: &str,
    ) -> EngineResult<EditHistoryEntry> {
        validate_content(new_content, self.max_content_length)?;

        let entry = update_record(
            self.messages.as_ref(),
            "message",
            message_id,
            self.retry_limit,
            |message| {
                if &message.sender != editor {
                    return Err(EngineError::forbidden(editor, "edit", message_id));
                }
                if message.deletion != DeletionMarker::None {
                    return Err(EngineError::InvalidState(format!(
                        "cannot edit {} message {}",
                        message.deletion, message_id
                    )));
                }

                let now = self.clock.now();
                if let Some(window) = self.edit_window {
                    // The window is half-open: an edit at exactly created_at + window is late
                    if now.since(message.created_at) >= window {
                        return Err(EngineError::WindowExpired {
                            operation: "edit",
                            window,
                        });
                    }
                }

                let previous_content = message.content.clone().unwrap_or_default();
                if previous_content == new_content {
                    return Err(EngineError::InvalidInput(format!(
                        "edit of message {} does not change its content",
                        message_id
                    )));
                }

                // Never earlier than the edit it follows
                let edited_at = now.max(message.edited_at.unwrap_or(message.created_at));

                let mut next = message.clone();
                next.content = Some(new_content.to_string());
                next.revision += 1;
                next.edited_at = Some(edited_at);
                next.encrypted = false;
                next.envelope = None;

                let entry = EditHistoryEntry {
                    id: EditId::generate(),
                    message_id: message_id.clone(),
                    revision: next.revision,
                    previous_content,
                    new_content: new_content.to_string(),
                    editor: editor.clone(),
                    edited_at,
                    archived_at: None,
                };
                next.edit_history.push(entry.clone());
                Ok(Mutation::Write(next, entry))
            },
        )
        .await?;

        record_counter("edits.recorded", 1);
        debug!(
            message_id = %message_id,
            editor = %editor,
            revision = entry.revision,
            "edit recorded"
        );
        Ok(entry)
    }

    /// Entries of a message, oldest first
    pub async fn history(&self, message_id: &MessageId) -> EngineResult<Vec<EditHistoryEntry>> {
        self.messages
            .get(message_id)
            .await?
            .map(|message| message.value.edit_history)
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))
    }
}
