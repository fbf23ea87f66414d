/*
    types.rs - Common types for the message-state engine

    Defines:
    - Timestamps and the clock they are read from
    - IDs for messages, users, groups and edit entries
    - Conversation references (direct peer or group)
    - Message kinds
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Timestamp shifted forward by `duration`, saturating at `u64::MAX`
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_millis() as u64))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of "now" for every time-stamped transition.
///
/// The engine never calls `Timestamp::now()` directly so tests can drive
/// edit and delete windows deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicU64::new(start.0),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

/// Unique identifier for a message
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn generate() -> Self {
        use uuid::Uuid;
        MessageId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier, as supplied by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn generate() -> Self {
        use uuid::Uuid;
        UserId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a group conversation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        GroupId(id.into())
    }

    pub fn generate() -> Self {
        use uuid::Uuid;
        GroupId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an edit history entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditId(pub String);

impl EditId {
    pub fn generate() -> Self {
        use uuid::Uuid;
        EditId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message was posted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationRef {
    /// One-to-one conversation with `peer`
    Direct { peer: UserId },
    /// Group conversation
    Group { group: GroupId },
}

impl ConversationRef {
    pub fn direct(peer: UserId) -> Self {
        ConversationRef::Direct { peer }
    }

    pub fn group(group: GroupId) -> Self {
        ConversationRef::Group { group }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ConversationRef::Group { .. })
    }

    /// Whether a message `sender` posted here and one `other_sender` posted
    /// to `other` belong to the same conversation.
    ///
    /// `Direct` names the peer as seen by the sender, so two direct refs
    /// match when they describe the same pair of users.
    pub fn same_thread(&self, sender: &UserId, other: &ConversationRef, other_sender: &UserId) -> bool {
        match (self, other) {
            (ConversationRef::Group { group }, ConversationRef::Group { group: other_group }) => {
                group == other_group
            }
            (ConversationRef::Direct { peer }, ConversationRef::Direct { peer: other_peer }) => {
                pair(sender, peer) == pair(other_sender, other_peer)
            }
            _ => false,
        }
    }
}

fn pair<'a>(a: &'a UserId, b: &'a UserId) -> (&'a UserId, &'a UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationRef::Direct { peer } => write!(f, "direct:{}", peer),
            ConversationRef::Group { group } => write!(f, "group:{}", group),
        }
    }
}

/// Kind of message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    Image,
    Video,
    Call,
    System,
    Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(1_000);
        assert_eq!(t.saturating_add(Duration::from_secs(2)), Timestamp(3_000));
        assert_eq!(Timestamp(3_000).since(t), Duration::from_secs(2));
        assert_eq!(t.since(Timestamp(3_000)), Duration::ZERO);
        assert_eq!(Timestamp(u64::MAX).saturating_add(Duration::from_secs(1)), Timestamp(u64::MAX));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Timestamp(10));
        assert_eq!(clock.now(), Timestamp(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Timestamp(15));
        clock.set(Timestamp(1));
        assert_eq!(clock.now(), Timestamp(1));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(MessageId::generate(), MessageId::generate());
        assert_ne!(UserId::generate(), UserId::generate());
    }

    #[test]
    fn test_direct_thread_is_the_user_pair() {
        let (alice, bob, carol) = (UserId::new("alice"), UserId::new("bob"), UserId::new("carol"));
        let to_bob = ConversationRef::direct(bob.clone());
        let to_alice = ConversationRef::direct(alice.clone());

        assert!(to_bob.same_thread(&alice, &to_alice, &bob));
        assert!(to_bob.same_thread(&alice, &to_bob, &alice));
        assert!(!to_bob.same_thread(&alice, &to_bob, &carol));

        let g1 = ConversationRef::group(GroupId::new("g1"));
        assert!(g1.same_thread(&alice, &g1, &carol));
        assert!(!g1.same_thread(&alice, &ConversationRef::group(GroupId::new("g2")), &alice));
        assert!(!g1.same_thread(&alice, &to_bob, &alice));
    }

    #[test]
    fn test_conversation_ref_serde() {
        let conv = ConversationRef::group(GroupId::new("g1"));
        let json = serde_json::to_string(&conv).unwrap();
        assert_eq!(json, r#"{"type":"group","group":"g1"}"#);
        let back: ConversationRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
        assert!(back.is_group());
        assert_eq!(conv.to_string(), "group:g1");
    }
}
