/*
    engine.rs - MessageEngine facade

    Wires the components over one set of record stores and exposes the
    lifecycle surface to the transport layer:

        create_message ─► MembershipResolver ─► DeliveryTracker::seed
        attach_envelope ─► KeyRegistry (version check) ─► message record
        delivered / read ─► DeliveryTracker
        edit / react / delete ─► EditLog / ReactionAggregator / DeletionEngine

    Components never write each other's records; the stores below are the
    only shared state and every write to them is a compare-and-swap.
*/

use super::events::{Broadcast, InboundEvent, NewMessage};
use crate::config::{Config, EngineConfig};
use crate::core_deletion::{DeletionEngine, DeletionOutcome};
use crate::core_delivery::{
    AggregateStatus, DeliveryKey, DeliveryRoster, DeliveryStatusRecord, DeliverySummary,
    DeliveryTracker, SeedReport, Transition,
};
use crate::core_edit::{EditHistoryEntry, EditLog};
use crate::core_envelope::{EnvelopeManager, EnvelopeReconciliation};
use crate::core_identity::{KeyHistory, KeyRecord, KeyRegistry};
use crate::core_membership::MembershipResolver;
use crate::core_model::{
    validate_content, Clock, ConversationRef, Message, MessageId, MessageView, SystemClock,
    Timestamp, Tombstone, UserId,
};
use crate::core_reaction::{ReactionAggregator, ReactionMap};
use crate::core_store::{MemoryStore, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::{record_counter, EngineStats, MetricsCollector, Timer};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every record store the engine persists to
#[derive(Clone)]
pub struct StoreSet {
    pub messages: Arc<dyn RecordStore<MessageId, Message>>,
    pub deliveries: Arc<dyn RecordStore<DeliveryKey, DeliveryStatusRecord>>,
    pub rosters: Arc<dyn RecordStore<MessageId, DeliveryRoster>>,
    pub inboxes: Arc<dyn RecordStore<UserId, BTreeSet<MessageId>>>,
    pub keys: Arc<dyn RecordStore<UserId, KeyHistory>>,
}

impl StoreSet {
    pub fn in_memory() -> Self {
        Self {
            messages: Arc::new(MemoryStore::new()),
            deliveries: Arc::new(MemoryStore::new()),
            rosters: Arc::new(MemoryStore::new()),
            inboxes: Arc::new(MemoryStore::new()),
            keys: Arc::new(MemoryStore::new()),
        }
    }
}

/// A created message and the fan-out it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMessage {
    pub message: Message,
    pub delivery: SeedReport,
    /// False when the create was a replay of a stored message
    pub is_new: bool,
}

pub struct MessageEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    messages: Arc<dyn RecordStore<MessageId, Message>>,
    membership: Arc<dyn MembershipResolver>,
    registry: Arc<KeyRegistry>,
    delivery: DeliveryTracker,
    envelopes: EnvelopeManager,
    edits: EditLog,
    deletions: DeletionEngine,
    reactions: ReactionAggregator,
    collector: MetricsCollector,
}

impl MessageEngine {
    /// In-memory engine on the wall clock
    pub fn new(config: &Config, membership: Arc<dyn MembershipResolver>) -> Self {
        Self::with_parts(config, membership, Arc::new(SystemClock), StoreSet::in_memory())
    }

    pub fn with_parts(
        config: &Config,
        membership: Arc<dyn MembershipResolver>,
        clock: Arc<dyn Clock>,
        stores: StoreSet,
    ) -> Self {
        let engine = config.engine.clone();
        let retry = engine.cas_retry_limit;

        let registry = Arc::new(KeyRegistry::new(
            stores.keys.clone(),
            clock.clone(),
            config.keys.clone(),
            retry,
        ));
        let delivery = DeliveryTracker::new(
            stores.deliveries.clone(),
            stores.rosters.clone(),
            stores.inboxes.clone(),
            membership.clone(),
            retry,
        );
        let envelopes = EnvelopeManager::new(
            stores.messages.clone(),
            registry.clone(),
            membership.clone(),
            retry,
        );
        let edits = EditLog::new(
            stores.messages.clone(),
            clock.clone(),
            engine.edit_window,
            engine.max_content_length,
            retry,
        );
        let deletions = DeletionEngine::new(
            stores.messages.clone(),
            membership.clone(),
            clock.clone(),
            engine.hard_delete_window,
            engine.hard_delete_policy,
            retry,
        );
        let reactions =
            ReactionAggregator::new(stores.messages.clone(), engine.max_emoji_length, retry);

        Self {
            config: engine,
            clock,
            messages: stores.messages,
            membership,
            registry,
            delivery,
            envelopes,
            edits,
            deletions,
            reactions,
            collector: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.collector.snapshot()
    }

    fn track<T>(&self, result: EngineResult<T>) -> EngineResult<T> {
        if result.is_err() {
            self.collector.inc_rejected();
        }
        result
    }

    fn track_ack(&self, result: &EngineResult<Transition>, applied: impl Fn(&MetricsCollector)) {
        match result {
            Ok(Transition::Applied) => applied(&self.collector),
            Ok(Transition::Unchanged) => self.collector.inc_duplicate_ack(),
            Err(_) => self.collector.inc_rejected(),
        }
    }

    // =========================================================================
    // Message lifecycle
    // =========================================================================

    /// Persist a new message and fan it out to the conversation's active
    /// members, excluding the sender.
    ///
    /// Replaying a create with the same id, sender and conversation returns
    /// the stored message and re-seeds idempotently against the roster the
    /// message was first fanned out to; members who joined since get nothing.
    pub async fn create_message(&self, new: NewMessage) -> EngineResult<CreatedMessage> {
        let result = self.create(new).await;
        if let Ok(created) = &result {
            if created.is_new {
                self.collector.inc_messages_created();
            }
            self.collector
                .add_records_seeded(created.delivery.created.len() as u64);
        }
        self.track(result)
    }

    async fn create(&self, new: NewMessage) -> EngineResult<CreatedMessage> {
        validate_content(&new.content, self.config.max_content_length)?;

        let mut recipients = self.membership.active_recipients(&new.conversation).await?;
        match &new.conversation {
            ConversationRef::Direct { peer } if peer == &new.sender => {
                return Err(EngineError::InvalidInput(format!(
                    "{} cannot message themselves",
                    new.sender
                )));
            }
            ConversationRef::Group { group } if !recipients.contains(&new.sender) => {
                warn!(group = %group, sender = %new.sender, "post by non-member refused");
                return Err(EngineError::Forbidden {
                    actor: new.sender.to_string(),
                    action: "post",
                    message: format!("in {}", new.conversation),
                });
            }
            _ => {}
        }
        recipients.remove(&new.sender);

        if let Some(parent) = &new.reply_to {
            let parent = self.message(parent).await?;
            if !parent.conversation.same_thread(&parent.sender, &new.conversation, &new.sender) {
                return Err(EngineError::InvalidInput(format!(
                    "reply target {} belongs to another conversation",
                    parent.id
                )));
            }
        }

        let id = new.id.clone().unwrap_or_else(MessageId::generate);
        let mut message = Message::new(
            id.clone(),
            new.conversation.clone(),
            new.sender.clone(),
            new.content.clone(),
            new.kind,
            self.clock.now(),
        );
        message.reply_to = new.reply_to.clone();

        let stored = self.messages.insert_if_absent(id.clone(), message).await?;
        let inserted = stored.was_inserted();
        let message = stored.into_inner().value;
        if !inserted && (message.sender != new.sender || message.conversation != new.conversation) {
            return Err(EngineError::InvalidState(format!(
                "message id {} is already taken",
                id
            )));
        }

        if !inserted {
            // An interrupted first fan-out has no roster yet and seeds from scratch
            if let Some(roster) = self.delivery.roster_recipients(&id).await? {
                recipients = roster;
            }
        }
        let delivery = self.delivery.seed(&id, &message.conversation, &recipients).await?;

        if inserted {
            record_counter("messages.created", 1);
            info!(
                message_id = %id,
                conversation = %message.conversation,
                sender = %message.sender,
                recipients = delivery.total(),
                "message created"
            );
        } else {
            debug!(message_id = %id, "duplicate create event");
        }
        Ok(CreatedMessage {
            message,
            delivery,
            is_new: inserted,
        })
    }

    /// Stored message regardless of viewer
    pub async fn message(&self, message_id: &MessageId) -> EngineResult<Message> {
        self.messages
            .get(message_id)
            .await?
            .map(|message| message.value)
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))
    }

    /// The message as `viewer` sees it; `None` if it is hidden from them
    pub async fn view_for(
        &self,
        message_id: &MessageId,
        viewer: &UserId,
    ) -> EngineResult<Option<MessageView>> {
        Ok(self.message(message_id).await?.view_for(viewer))
    }

    pub async fn edit_message(
        &self,
        message_id: &MessageId,
        editor: &UserId,
        new_content: &str,
    ) -> EngineResult<EditHistoryEntry> {
        let result = self.edits.record_edit(message_id, editor, new_content).await;
        if result.is_ok() {
            self.collector.inc_edits();
        }
        self.track(result)
    }

    pub async fn history(&self, message_id: &MessageId) -> EngineResult<Vec<EditHistoryEntry>> {
        self.edits.history(message_id).await
    }

    pub async fn soft_delete(
        &self,
        message_id: &MessageId,
        actor: &UserId,
    ) -> EngineResult<DeletionOutcome> {
        let result = self.deletions.soft_delete(message_id, actor).await;
        if let Ok(DeletionOutcome::Applied) = result {
            self.collector.inc_soft_deletes();
        }
        self.track(result)
    }

    pub async fn hard_delete(&self, message_id: &MessageId, actor: &UserId) -> EngineResult<Tombstone> {
        let result = self.deletions.hard_delete(message_id, actor).await;
        if result.is_ok() {
            self.collector.inc_hard_deletes();
        }
        self.track(result)
    }

    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        user: &UserId,
        emoji: &str,
    ) -> EngineResult<ReactionMap> {
        let result = self.reactions.toggle_reaction(message_id, user, emoji).await;
        if result.is_ok() {
            self.collector.inc_reaction_toggles();
        }
        self.track(result)
    }

    pub async fn reactions(&self, message_id: &MessageId) -> EngineResult<ReactionMap> {
        self.reactions.reactions(message_id).await
    }

    // =========================================================================
    // Delivery lifecycle
    // =========================================================================

    /// Fan a message out to `recipients` directly. `create_message` already
    /// does this; the call exists for fan-out events replayed from elsewhere.
    pub async fn seed_delivery(
        &self,
        message_id: &MessageId,
        recipients: &BTreeSet<UserId>,
    ) -> EngineResult<SeedReport> {
        let message = self.message(message_id).await?;
        let mut recipients = recipients.clone();
        recipients.remove(&message.sender);
        let result = self
            .delivery
            .seed(message_id, &message.conversation, &recipients)
            .await;
        if let Ok(report) = &result {
            self.collector.add_records_seeded(report.created.len() as u64);
        }
        self.track(result)
    }

    pub async fn mark_delivered(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
        at: Timestamp,
    ) -> EngineResult<Transition> {
        let result = self.delivery.mark_delivered(message_id, recipient, at).await;
        self.track_ack(&result, MetricsCollector::inc_delivered);
        result
    }

    pub async fn mark_read(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
        at: Timestamp,
    ) -> EngineResult<Transition> {
        let result = self.delivery.mark_read(message_id, recipient, at).await;
        self.track_ack(&result, MetricsCollector::inc_read);
        result
    }

    pub async fn aggregate_status(&self, message_id: &MessageId) -> EngineResult<AggregateStatus> {
        self.delivery.aggregate_status(message_id).await
    }

    pub async fn delivery_summary(&self, message_id: &MessageId) -> EngineResult<DeliverySummary> {
        self.delivery.summary(message_id).await
    }

    pub async fn statuses(&self, message_id: &MessageId) -> EngineResult<Vec<DeliveryStatusRecord>> {
        self.delivery.statuses(message_id).await
    }

    pub async fn delivery_record(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
    ) -> EngineResult<Option<DeliveryStatusRecord>> {
        self.delivery.record(message_id, recipient).await
    }

    pub async fn unread_count(&self, user: &UserId) -> EngineResult<usize> {
        self.delivery.unread_count(user).await
    }

    // =========================================================================
    // Key lifecycle
    // =========================================================================

    pub async fn register_key(&self, user: &UserId, public_key: Vec<u8>) -> EngineResult<KeyRecord> {
        let result = self.registry.register(user, public_key).await;
        self.track(result)
    }

    pub async fn rotate_key(&self, user: &UserId, new_public_key: Vec<u8>) -> EngineResult<KeyRecord> {
        let result = self.envelopes.rotate_key(user, new_public_key).await;
        if result.is_ok() {
            self.collector.inc_keys_rotated();
        }
        self.track(result)
    }

    pub async fn current_key(&self, user: &UserId) -> EngineResult<Option<KeyRecord>> {
        self.registry.current(user).await
    }

    pub async fn attach_envelope(
        &self,
        message_id: &MessageId,
        algorithm: &str,
        nonce: Vec<u8>,
        auth_tag: Vec<u8>,
        sender_key_version: u32,
    ) -> EngineResult<Message> {
        let result = self
            .envelopes
            .attach_envelope(message_id, algorithm, nonce, auth_tag, sender_key_version)
            .await;
        if result.is_ok() {
            self.collector.inc_envelopes_attached();
        }
        self.track(result)
    }

    pub async fn reconcile_envelope(&self, message_id: &MessageId) -> EngineResult<EnvelopeReconciliation> {
        self.envelopes.reconcile_envelope(message_id).await
    }

    // =========================================================================
    // Event routing
    // =========================================================================

    /// Route an inbound event to its component and return what to broadcast
    pub async fn dispatch(&self, event: InboundEvent) -> EngineResult<Broadcast> {
        let timer = Timer::new("engine.dispatch.duration_ms");
        let name = event.name();

        let result = self.route(event).await;
        timer.stop();

        if let Err(err) = &result {
            debug!(event = name, error = %err, status = err.status_code(), "event rejected");
        }
        result
    }

    async fn route(&self, event: InboundEvent) -> EngineResult<Broadcast> {
        match event {
            InboundEvent::MessageCreated(new) => {
                let created = self.create_message(new).await?;
                let recipients = created
                    .delivery
                    .created
                    .union(&created.delivery.existing)
                    .cloned()
                    .collect();
                Ok(Broadcast::MessageCreated {
                    message: created.message,
                    recipients,
                })
            }
            InboundEvent::Delivered {
                message_id,
                recipient,
                at,
            } => {
                let at = at.unwrap_or_else(|| self.clock.now());
                let transition = self.mark_delivered(&message_id, &recipient, at).await?;
                self.delivery_update(&message_id, &recipient, transition).await
            }
            InboundEvent::Read {
                message_id,
                recipient,
                at,
            } => {
                let at = at.unwrap_or_else(|| self.clock.now());
                let transition = self.mark_read(&message_id, &recipient, at).await?;
                self.delivery_update(&message_id, &recipient, transition).await
            }
            InboundEvent::Edited {
                message_id,
                editor,
                content,
            } => {
                let entry = self.edit_message(&message_id, &editor, &content).await?;
                let message = self.message(&message_id).await?;
                Ok(Broadcast::MessageEdited { message, entry })
            }
            InboundEvent::ReactionToggled {
                message_id,
                user,
                emoji,
            } => {
                let reactions = self.toggle_reaction(&message_id, &user, &emoji).await?;
                Ok(Broadcast::ReactionsUpdated {
                    message_id,
                    reactions,
                })
            }
            InboundEvent::SoftDeleted { message_id, actor } => {
                let outcome = self.soft_delete(&message_id, &actor).await?;
                Ok(Broadcast::MessageHidden {
                    message_id,
                    sender: actor,
                    outcome,
                })
            }
            InboundEvent::HardDeleted { message_id, actor } => {
                let tombstone = self.hard_delete(&message_id, &actor).await?;
                Ok(Broadcast::MessageDeleted { tombstone })
            }
            InboundEvent::KeyRotated { user, public_key } => {
                let record = self.rotate_key(&user, public_key).await?;
                Ok(Broadcast::KeyRotated { record })
            }
            InboundEvent::EnvelopeAttached {
                message_id,
                algorithm,
                nonce,
                auth_tag,
                key_version,
            } => {
                let message = self
                    .attach_envelope(&message_id, &algorithm, nonce, auth_tag, key_version)
                    .await?;
                Ok(Broadcast::EnvelopeAttached { message })
            }
        }
    }

    async fn delivery_update(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
        transition: Transition,
    ) -> EngineResult<Broadcast> {
        let record = self
            .delivery
            .record(message_id, recipient)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("delivery record {}/{}", message_id, recipient))
            })?;
        let aggregate = self.delivery.aggregate_status(message_id).await?;
        Ok(Broadcast::DeliveryUpdated {
            record,
            transition,
            aggregate,
        })
    }
}
