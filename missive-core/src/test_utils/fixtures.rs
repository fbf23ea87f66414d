//! Test fixtures
//!
//! [`TestEngineBuilder`] assembles a [`MessageEngine`] over in-memory stores
//! and a [`ManualClock`], with groups and moderators declared up front.

use crate::config::Config;
use crate::core_deletion::HardDeletePolicy;
use crate::core_engine::{MessageEngine, NewMessage, StoreSet};
use crate::core_membership::{InMemoryMembership, MemberRole};
use crate::core_model::{Clock, ConversationRef, GroupId, ManualClock, MessageId, Timestamp, UserId};
use std::sync::Arc;
use std::time::Duration;

/// Start of every fixture clock
pub const EPOCH: Timestamp = Timestamp(1_700_000_000_000);

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub fn msg(id: &str) -> MessageId {
    MessageId::new(id)
}

pub fn group(id: &str) -> ConversationRef {
    ConversationRef::group(GroupId::new(id))
}

pub fn direct(peer: &str) -> ConversationRef {
    ConversationRef::direct(UserId::new(peer))
}

/// Public key of the given length filled with `seed`
pub fn public_key(seed: u8) -> Vec<u8> {
    vec![seed; 32]
}

/// Engine plus the handles tests drive it with
pub struct TestEngine {
    pub engine: MessageEngine,
    pub membership: Arc<InMemoryMembership>,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) -> Timestamp {
        self.clock.advance(by);
        self.now()
    }

    /// Create a text message with a fixed id
    pub async fn post(&self, conversation: ConversationRef, sender: &str, id: &str, content: &str) {
        self.engine
            .create_message(NewMessage::text(conversation, user(sender), content).with_id(msg(id)))
            .await
            .unwrap_or_else(|e| panic!("posting {} failed: {}", id, e));
    }
}

pub struct TestEngineBuilder {
    config: Config,
    groups: Vec<(GroupId, Vec<(UserId, MemberRole)>)>,
    global_moderators: Vec<UserId>,
    start: Timestamp,
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            groups: Vec::new(),
            global_moderators: Vec::new(),
            start: EPOCH,
        }
    }

    /// Group whose members all have the plain member role
    pub fn with_group(mut self, id: &str, members: &[&str]) -> Self {
        let members = members
            .iter()
            .map(|m| (user(m), MemberRole::Member))
            .collect();
        self.groups.push((GroupId::new(id), members));
        self
    }

    /// Add a moderator to an already declared group
    pub fn with_moderator(mut self, group: &str, moderator: &str) -> Self {
        let group = GroupId::new(group);
        match self.groups.iter_mut().find(|(id, _)| id == &group) {
            Some((_, members)) => members.push((user(moderator), MemberRole::Moderator)),
            None => self
                .groups
                .push((group, vec![(user(moderator), MemberRole::Moderator)])),
        }
        self
    }

    pub fn with_global_moderator(mut self, moderator: &str) -> Self {
        self.global_moderators.push(user(moderator));
        self
    }

    pub fn with_policy(mut self, policy: HardDeletePolicy) -> Self {
        self.config.engine.hard_delete_policy = policy;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TestEngine {
        let membership = Arc::new(InMemoryMembership::new());
        for (group, members) in self.groups {
            membership.create_group(group.clone());
            for (member, role) in members {
                membership.add_member(&group, member, role);
            }
        }
        for moderator in self.global_moderators {
            membership.add_global_moderator(moderator);
        }

        let clock = Arc::new(ManualClock::new(self.start));
        let engine = MessageEngine::with_parts(
            &self.config,
            membership.clone(),
            clock.clone(),
            StoreSet::in_memory(),
        );
        TestEngine {
            engine,
            membership,
            clock,
        }
    }
}
