//! Per-recipient delivery state and its transition rules.
//!
//! Transitions are pure functions over a record; the tracker applies them
//! through compare-and-swap so concurrent acknowledgements are evaluated
//! against the exact state they replace.

use crate::core_model::{ConversationRef, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Delivery status of one (message, recipient) pair.
///
/// Ordered: `Sent < Delivered < Read`. A record never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status across the active recipients of a message.
///
/// `Read` only if every active recipient read it, `Delivered` if every one
/// at least received it, `Sent` otherwise.
pub type AggregateStatus = DeliveryStatus;

/// Whether an acknowledgement changed the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Applied,
    Unchanged,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Store key of a delivery record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub message_id: MessageId,
    pub recipient: UserId,
}

impl DeliveryKey {
    pub fn new(message_id: MessageId, recipient: UserId) -> Self {
        Self {
            message_id,
            recipient,
        }
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.message_id, self.recipient)
    }
}

/// Delivery state of one message for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatusRecord {
    pub message_id: MessageId,
    pub recipient: UserId,
    pub status: DeliveryStatus,
    pub delivered_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
}

impl DeliveryStatusRecord {
    /// Fresh `sent` record
    pub fn sent(message_id: MessageId, recipient: UserId) -> Self {
        Self {
            message_id,
            recipient,
            status: DeliveryStatus::Sent,
            delivered_at: None,
            read_at: None,
        }
    }

    pub fn key(&self) -> DeliveryKey {
        DeliveryKey::new(self.message_id.clone(), self.recipient.clone())
    }

    /// `sent -> delivered`; anything later is left alone.
    pub fn mark_delivered(&self, at: Timestamp) -> Option<Self> {
        if self.status != DeliveryStatus::Sent {
            return None;
        }
        Some(Self {
            status: DeliveryStatus::Delivered,
            delivered_at: Some(at),
            ..self.clone()
        })
    }

    /// `sent | delivered -> read`.
    ///
    /// A record that was never delivered gets `delivered_at = at`. `read_at`
    /// is never earlier than `delivered_at`.
    pub fn mark_read(&self, at: Timestamp) -> Option<Self> {
        if self.status == DeliveryStatus::Read {
            return None;
        }
        let delivered_at = self.delivered_at.unwrap_or(at);
        Some(Self {
            status: DeliveryStatus::Read,
            delivered_at: Some(delivered_at),
            read_at: Some(at.max(delivered_at)),
            ..self.clone()
        })
    }
}

/// Who a message was fanned out to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRoster {
    pub message_id: MessageId,
    pub conversation: ConversationRef,
    pub recipients: BTreeSet<UserId>,
}

/// Per-status counts for one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub total: usize,
    pub sent: usize,
    pub delivered: usize,
    pub read: usize,
}

impl DeliverySummary {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a DeliveryStatusRecord>) -> Self {
        records
            .into_iter()
            .fold(DeliverySummary::default(), |mut summary, record| {
                summary.total += 1;
                match record.status {
                    DeliveryStatus::Sent => summary.sent += 1,
                    DeliveryStatus::Delivered => summary.delivered += 1,
                    DeliveryStatus::Read => summary.read += 1,
                }
                summary
            })
    }

    /// Three-tier aggregate; an empty summary is vacuously `Read`
    pub fn aggregate(&self) -> AggregateStatus {
        if self.read == self.total {
            DeliveryStatus::Read
        } else if self.sent == 0 {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Sent
        }
    }
}
