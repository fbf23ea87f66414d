/*
    tracker.rs - Delivery Status Tracker

    Owns exactly one DeliveryStatusRecord per (message, recipient) pair.

    Layout:
        records:  (message, recipient) -> DeliveryStatusRecord
        rosters:  message              -> recipients fanned out to
        inboxes:  recipient            -> messages fanned out to them

    Every record is updated through its own compare-and-swap, so acks for
    different recipients of the same message never contend with each other.
    Aggregation intersects the roster with the conversation's current
    members: a recipient who left after the message was sent no longer
    holds back the sender's view.
*/

use super::status::{
    AggregateStatus, DeliveryKey, DeliveryRoster, DeliveryStatus, DeliveryStatusRecord,
    DeliverySummary, Transition,
};
use crate::core_membership::MembershipResolver;
use crate::core_model::{ConversationRef, MessageId, Timestamp, UserId};
use crate::core_store::{update_record, upsert_record, Mutation, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::record_counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Recipients that got a new `sent` record
    pub created: BTreeSet<UserId>,
    /// Recipients that were already seeded
    pub existing: BTreeSet<UserId>,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.created.len() + self.existing.len()
    }
}

pub struct DeliveryTracker {
    records: Arc<dyn RecordStore<DeliveryKey, DeliveryStatusRecord>>,
    rosters: Arc<dyn RecordStore<MessageId, DeliveryRoster>>,
    inboxes: Arc<dyn RecordStore<UserId, BTreeSet<MessageId>>>,
    membership: Arc<dyn MembershipResolver>,
    retry_limit: usize,
}

impl DeliveryTracker {
    pub fn new(
        records: Arc<dyn RecordStore<DeliveryKey, DeliveryStatusRecord>>,
        rosters: Arc<dyn RecordStore<MessageId, DeliveryRoster>>,
        inboxes: Arc<dyn RecordStore<UserId, BTreeSet<MessageId>>>,
        membership: Arc<dyn MembershipResolver>,
        retry_limit: usize,
    ) -> Self {
        Self {
            records,
            rosters,
            inboxes,
            membership,
            retry_limit,
        }
    }

    /// Create one `sent` record per recipient.
    ///
    /// Idempotent: recipients that already have a record are left untouched,
    /// so a duplicated fan-out event changes nothing. Seeding the same message
    /// id under a different conversation is `InvalidState`.
    pub async fn seed(
        &self,
        message_id: &MessageId,
        conversation: &ConversationRef,
        recipients: &BTreeSet<UserId>,
    ) -> EngineResult<SeedReport> {
        upsert_record(
            self.rosters.as_ref(),
            "delivery roster",
            message_id,
            self.retry_limit,
            || DeliveryRoster {
                message_id: message_id.clone(),
                conversation: conversation.clone(),
                recipients: BTreeSet::new(),
            },
            |roster| {
                if &roster.conversation != conversation {
                    return Err(EngineError::InvalidState(format!(
                        "message {} was already seeded in {}",
                        message_id, roster.conversation
                    )));
                }
                if recipients.is_subset(&roster.recipients) {
                    return Ok(Mutation::Keep(()));
                }
                let mut next = roster.clone();
                next.recipients.extend(recipients.iter().cloned());
                Ok(Mutation::Write(next, ()))
            },
        )
        .await?;

        let mut report = SeedReport::default();
        for recipient in recipients {
            let key = DeliveryKey::new(message_id.clone(), recipient.clone());
            let record = DeliveryStatusRecord::sent(message_id.clone(), recipient.clone());
            if self.records.insert_if_absent(key, record).await?.was_inserted() {
                self.add_to_inbox(recipient, message_id).await?;
                report.created.insert(recipient.clone());
            } else {
                report.existing.insert(recipient.clone());
            }
        }

        record_counter("delivery.records.seeded", report.created.len() as u64);
        debug!(
            message_id = %message_id,
            created = report.created.len(),
            existing = report.existing.len(),
            "delivery seeded"
        );
        Ok(report)
    }

    async fn add_to_inbox(&self, recipient: &UserId, message_id: &MessageId) -> EngineResult<()> {
        upsert_record(
            self.inboxes.as_ref(),
            "inbox",
            recipient,
            self.retry_limit,
            BTreeSet::new,
            |inbox| {
                if inbox.contains(message_id) {
                    return Ok(Mutation::Keep(()));
                }
                let mut next = inbox.clone();
                next.insert(message_id.clone());
                Ok(Mutation::Write(next, ()))
            },
        )
        .await
    }

    /// `sent -> delivered`. Already delivered or read is a successful no-op.
    pub async fn mark_delivered(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
        at: Timestamp,
    ) -> EngineResult<Transition> {
        let key = DeliveryKey::new(message_id.clone(), recipient.clone());
        let transition = update_record(
            self.records.as_ref(),
            "delivery record",
            &key,
            self.retry_limit,
            |record| {
                Ok(match record.mark_delivered(at) {
                    Some(next) => Mutation::Write(next, Transition::Applied),
                    None => Mutation::Keep(Transition::Unchanged),
                })
            },
        )
        .await?;

        if transition.is_applied() {
            record_counter("delivery.transitions.delivered", 1);
        }
        debug!(message_id = %message_id, recipient = %recipient, ?transition, "delivered ack");
        Ok(transition)
    }

    /// `sent | delivered -> read`, backfilling `delivered_at` when needed.
    /// Already read is a successful no-op.
    pub async fn mark_read(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
        at: Timestamp,
    ) -> EngineResult<Transition> {
        let key = DeliveryKey::new(message_id.clone(), recipient.clone());
        let transition = update_record(
            self.records.as_ref(),
            "delivery record",
            &key,
            self.retry_limit,
            |record| {
                Ok(match record.mark_read(at) {
                    Some(next) => Mutation::Write(next, Transition::Applied),
                    None => Mutation::Keep(Transition::Unchanged),
                })
            },
        )
        .await?;

        if transition.is_applied() {
            record_counter("delivery.transitions.read", 1);
        }
        debug!(message_id = %message_id, recipient = %recipient, ?transition, "read ack");
        Ok(transition)
    }

    /// Record of one recipient, if seeded
    pub async fn record(
        &self,
        message_id: &MessageId,
        recipient: &UserId,
    ) -> EngineResult<Option<DeliveryStatusRecord>> {
        let key = DeliveryKey::new(message_id.clone(), recipient.clone());
        Ok(self.records.get(&key).await?.map(|r| r.value))
    }

    async fn roster(&self, message_id: &MessageId) -> EngineResult<DeliveryRoster> {
        self.rosters
            .get(message_id)
            .await?
            .map(|roster| roster.value)
            .ok_or_else(|| EngineError::NotFound(format!("delivery roster {}", message_id)))
    }

    /// Recipients a message was fanned out to, `None` if it never was
    pub async fn roster_recipients(&self, message_id: &MessageId) -> EngineResult<Option<BTreeSet<UserId>>> {
        Ok(self.rosters.get(message_id).await?.map(|roster| roster.value.recipients))
    }

    /// Every seeded record of a message, including departed recipients,
    /// ordered by recipient
    pub async fn statuses(&self, message_id: &MessageId) -> EngineResult<Vec<DeliveryStatusRecord>> {
        let roster = self.roster(message_id).await?;
        let mut records = Vec::with_capacity(roster.recipients.len());
        for recipient in &roster.recipients {
            if let Some(record) = self.record(message_id, recipient).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Counts over the recipients that are still active members
    pub async fn summary(&self, message_id: &MessageId) -> EngineResult<DeliverySummary> {
        let roster = self.roster(message_id).await?;
        let active = self.membership.active_recipients(&roster.conversation).await?;

        let mut records = Vec::new();
        for recipient in roster.recipients.intersection(&active) {
            // A record not written yet is a fan-out still in flight
            let record = self
                .record(message_id, recipient)
                .await?
                .unwrap_or_else(|| DeliveryStatusRecord::sent(message_id.clone(), recipient.clone()));
            records.push(record);
        }
        Ok(DeliverySummary::tally(&records))
    }

    /// `Read` iff every active recipient read the message
    pub async fn aggregate_status(&self, message_id: &MessageId) -> EngineResult<AggregateStatus> {
        Ok(self.summary(message_id).await?.aggregate())
    }

    /// Messages fanned out to `user` that they have not read yet
    pub async fn unread_count(&self, user: &UserId) -> EngineResult<usize> {
        let Some(inbox) = self.inboxes.get(user).await? else {
            return Ok(0);
        };
        let mut unread = 0;
        for message_id in &inbox.value {
            if let Some(record) = self.record(message_id, user).await? {
                if record.status != DeliveryStatus::Read {
                    unread += 1;
                }
            }
        }
        Ok(unread)
    }
}
