/*
    manager.rs - Encryption Envelope Manager

    attach_envelope: validate metadata shape, check the stated key version
                     against the sender's retained key history, then store
                     the envelope on the message and set its encryption flag.
    rotate_key:      delegate to the key registry.
    reconcile:       report how an envelope relates to the current keys of
                     the sender and the recipients.

    Envelopes are never re-validated after a rotation: the key version they
    carry may lag the sender's current one, which is expected.
*/

use super::envelope::{CipherSuite, EncryptionEnvelope};
use crate::core_identity::{KeyRecord, KeyRegistry};
use crate::core_membership::MembershipResolver;
use crate::core_model::{Message, MessageId, UserId};
use crate::core_store::{update_record, Mutation, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::record_counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// How an attached envelope relates to the keys registered now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeReconciliation {
    pub message_id: MessageId,
    pub algorithm: CipherSuite,
    /// Sender key version the message was encrypted under
    pub key_version: u32,
    pub sender_current_version: Option<u32>,
    /// The sender rotated since encrypting; not an error
    pub lagging: bool,
    /// The sender's history still holds `key_version`
    pub key_retained: bool,
    /// Active recipients with no registered key
    pub recipients_without_keys: BTreeSet<UserId>,
}

pub struct EnvelopeManager {
    messages: Arc<dyn RecordStore<MessageId, Message>>,
    registry: Arc<KeyRegistry>,
    membership: Arc<dyn MembershipResolver>,
    retry_limit: usize,
}

impl EnvelopeManager {
    pub fn new(
        messages: Arc<dyn RecordStore<MessageId, Message>>,
        registry: Arc<KeyRegistry>,
        membership: Arc<dyn MembershipResolver>,
        retry_limit: usize,
    ) -> Self {
        Self {
            messages,
            registry,
            membership,
            retry_limit,
        }
    }

    /// Store encryption metadata on a message.
    ///
    /// Re-attaching an identical envelope is a no-op. Replacing a different
    /// envelope, or attaching to a hard-deleted message, is `InvalidState`.
    pub async fn attach_envelope(
        &self,
        message_id: &MessageId,
        algorithm: &str,
        nonce: Vec<u8>,
        auth_tag: Vec<u8>,
        sender_key_version: u32,
    ) -> EngineResult<Message> {
        let result = self
            .attach(message_id, algorithm, nonce, auth_tag, sender_key_version)
            .await;

        match &result {
            Ok(message) => {
                record_counter("envelope.attached", 1);
                debug!(
                    message_id = %message_id,
                    algorithm,
                    key_version = sender_key_version,
                    sender = %message.sender,
                    "envelope attached"
                );
            }
            Err(EngineError::InvalidEnvelope(reason)) => {
                record_counter("envelope.rejected", 1);
                warn!(message_id = %message_id, algorithm, reason = %reason, "envelope rejected");
            }
            Err(_) => {}
        }
        result
    }

    async fn attach(
        &self,
        message_id: &MessageId,
        algorithm: &str,
        nonce: Vec<u8>,
        auth_tag: Vec<u8>,
        sender_key_version: u32,
    ) -> EngineResult<Message> {
        let suite: CipherSuite = algorithm.parse()?;
        let envelope = EncryptionEnvelope::new(suite, nonce, auth_tag, sender_key_version)?;

        let sender = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))?
            .value
            .sender;

        if !self.registry.holds_version(&sender, sender_key_version).await? {
            return Err(EngineError::InvalidEnvelope(format!(
                "{} never held key version {}",
                sender, sender_key_version
            )));
        }

        update_record(
            self.messages.as_ref(),
            "message",
            message_id,
            self.retry_limit,
            |message| {
                if message.is_hard_deleted() {
                    return Err(EngineError::InvalidState(format!(
                        "message {} is hard-deleted",
                        message_id
                    )));
                }
                match &message.envelope {
                    Some(existing) if existing == &envelope => Ok(Mutation::Keep(message.clone())),
                    Some(_) => Err(EngineError::InvalidState(format!(
                        "message {} already carries a different envelope",
                        message_id
                    ))),
                    None => {
                        let mut next = message.clone();
                        next.envelope = Some(envelope.clone());
                        next.encrypted = true;
                        Ok(Mutation::Write(next.clone(), next))
                    }
                }
            },
        )
        .await
    }

    /// Install a new identity key. Envelopes sent under older versions stay
    /// valid.
    pub async fn rotate_key(&self, user: &UserId, new_public_key: Vec<u8>) -> EngineResult<KeyRecord> {
        self.registry.rotate_key(user, new_public_key).await
    }

    /// Compare a message's envelope with the keys registered now
    pub async fn reconcile_envelope(&self, message_id: &MessageId) -> EngineResult<EnvelopeReconciliation> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))?
            .value;
        let envelope = message.envelope.as_ref().ok_or_else(|| {
            EngineError::InvalidState(format!("message {} carries no envelope", message_id))
        })?;

        let sender_current_version = self
            .registry
            .current(&message.sender)
            .await?
            .map(|record| record.version);
        let key_retained = self
            .registry
            .holds_version(&message.sender, envelope.key_version)
            .await?;

        let mut recipients = self.membership.active_recipients(&message.conversation).await?;
        recipients.remove(&message.sender);
        let mut recipients_without_keys = BTreeSet::new();
        for recipient in recipients {
            if self.registry.current(&recipient).await?.is_none() {
                recipients_without_keys.insert(recipient);
            }
        }

        Ok(EnvelopeReconciliation {
            message_id: message_id.clone(),
            algorithm: envelope.algorithm,
            key_version: envelope.key_version,
            lagging: sender_current_version.is_some_and(|current| current > envelope.key_version),
            sender_current_version,
            key_retained,
            recipients_without_keys,
        })
    }
}
