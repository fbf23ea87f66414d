/*
    policy.rs - Deletion Policy Engine

    soft_delete: sender only. Hides the message from the sender's own view;
                 recipients keep content, delivery state and reactions.
    hard_delete: sender (within the hard-delete window) or a moderator.
                 Scrubs content, envelope and reactions for everyone and
                 leaves a tombstone. Delivery records are untouched and edit
                 history entries are archived in the same write, never erased.

    Authorization depends only on the sender and the conversation, neither
    of which ever changes, so it is resolved once before the
    compare-and-swap loop. The state checks run inside it.
*/

use super::marker::DeletionMarker;
use crate::core_membership::MembershipResolver;
use crate::core_model::{Clock, Message, MessageId, Tombstone, UserId};
use crate::core_store::{update_record, Mutation, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::record_counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a second hard delete of the same message does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardDeletePolicy {
    /// Fail with `AlreadyTerminal`
    #[default]
    Strict,
    /// Succeed and return the existing tombstone
    Idempotent,
}

impl FromStr for HardDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(HardDeletePolicy::Strict),
            "idempotent" => Ok(HardDeletePolicy::Idempotent),
            other => Err(format!("unknown hard delete policy: {}", other)),
        }
    }
}

impl fmt::Display for HardDeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardDeletePolicy::Strict => write!(f, "strict"),
            HardDeletePolicy::Idempotent => write!(f, "idempotent"),
        }
    }
}

/// Whether a delete changed the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionOutcome {
    Applied,
    Unchanged,
}

/// Deletion Policy Engine
pub struct DeletionEngine {
    messages: Arc<dyn RecordStore<MessageId, Message>>,
    membership: Arc<dyn MembershipResolver>,
    clock: Arc<dyn Clock>,
    hard_delete_window: Option<Duration>,
    policy: HardDeletePolicy,
    retry_limit: usize,
}

impl DeletionEngine {
    pub fn new(
        messages: Arc<dyn RecordStore<MessageId, Message>>,
        membership: Arc<dyn MembershipResolver>,
        clock: Arc<dyn Clock>,
        hard_delete_window: Option<Duration>,
        policy: HardDeletePolicy,
        retry_limit: usize,
    ) -> Self {
        Self {
            messages,
            membership,
            clock,
            hard_delete_window,
            policy,
            retry_limit,
        }
    }

    pub fn policy(&self) -> HardDeletePolicy {
        self.policy
    }

    /// Delete a message for its sender only.
    ///
    /// Repeating it is a no-op; after a hard delete it is `AlreadyTerminal`.
    pub async fn soft_delete(
        &self,
        message_id: &MessageId,
        actor: &UserId,
    ) -> EngineResult<DeletionOutcome> {
        let outcome = update_record(
            self.messages.as_ref(),
            "message",
            message_id,
            self.retry_limit,
            |message| {
                if &message.sender != actor {
                    return Err(EngineError::forbidden(actor, "soft-delete", message_id));
                }
                match message.deletion {
                    DeletionMarker::Soft => Ok(Mutation::Keep(DeletionOutcome::Unchanged)),
                    DeletionMarker::Hard => Err(EngineError::AlreadyTerminal(format!(
                        "message {} is hard-deleted",
                        message_id
                    ))),
                    DeletionMarker::None => {
                        let mut next = message.clone();
                        next.deletion = DeletionMarker::Soft;
                        next.deleted_at = Some(self.clock.now());
                        next.deleted_by = Some(actor.clone());
                        Ok(Mutation::Write(next, DeletionOutcome::Applied))
                    }
                }
            },
        )
        .await
        .inspect_err(|err| {
            if matches!(err, EngineError::Forbidden { .. }) {
                warn!(message_id = %message_id, actor = %actor, "soft delete refused");
            }
        })?;

        if outcome == DeletionOutcome::Applied {
            record_counter("deletions.soft", 1);
            info!(message_id = %message_id, actor = %actor, "message soft-deleted");
        }
        Ok(outcome)
    }

    /// Delete a message for everyone and return its tombstone.
    pub async fn hard_delete(&self, message_id: &MessageId, actor: &UserId) -> EngineResult<Tombstone> {
        let snapshot = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))?
            .value;

        let is_sender = &snapshot.sender == actor;
        let is_moderator = self
            .membership
            .is_moderator(&snapshot.conversation, actor)
            .await?;
        if !is_sender && !is_moderator {
            warn!(message_id = %message_id, actor = %actor, "hard delete refused");
            return Err(EngineError::forbidden(actor, "hard-delete", message_id));
        }

        let (tombstone, archived) = update_record(
            self.messages.as_ref(),
            "message",
            message_id,
            self.retry_limit,
            |message| {
                if let Some(existing) = message.tombstone() {
                    return match self.policy {
                        HardDeletePolicy::Idempotent => Ok(Mutation::Keep((existing, None))),
                        HardDeletePolicy::Strict => Err(EngineError::AlreadyTerminal(format!(
                            "message {} is already hard-deleted",
                            message_id
                        ))),
                    };
                }

                let now = self.clock.now();
                // Moderators are never windowed
                if let (false, Some(window)) = (is_moderator, self.hard_delete_window) {
                    if now.since(message.created_at) > window {
                        return Err(EngineError::WindowExpired {
                            operation: "hard delete",
                            window,
                        });
                    }
                }

                let mut next = message.clone();
                let archived = next.scrub(now, actor);
                let tombstone = next.tombstone().ok_or_else(|| {
                    EngineError::InvalidState(format!("message {} was not scrubbed", message_id))
                })?;
                Ok(Mutation::Write(next, (tombstone, Some(archived))))
            },
        )
        .await?;

        if let Some(archived) = archived {
            record_counter("deletions.hard", 1);
            info!(
                message_id = %message_id,
                actor = %actor,
                moderator = !is_sender,
                archived_edits = archived,
                "message hard-deleted"
            );
        }
        Ok(tombstone)
    }
}
