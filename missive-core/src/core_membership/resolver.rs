//! Membership resolution
//!
//! The engine never owns group membership; it asks a [`MembershipResolver`]
//! who currently belongs to a conversation. [`InMemoryMembership`] is the
//! in-process implementation used by the CLI and the tests.

use crate::core_model::{ConversationRef, GroupId, UserId};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Errors raised by a membership backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("Unknown group: {0}")]
    UnknownGroup(GroupId),

    #[error("Membership backend unavailable: {0}")]
    Unavailable(String),
}

/// Role of a member inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Moderator,
    Admin,
}

impl MemberRole {
    pub fn can_moderate(&self) -> bool {
        matches!(self, MemberRole::Moderator | MemberRole::Admin)
    }
}

/// Answers "who is in this conversation right now"
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// Current active participants of a conversation.
    ///
    /// For a direct conversation this is the peer only; the sender is added
    /// or removed by the caller as needed.
    async fn active_recipients(
        &self,
        conversation: &ConversationRef,
    ) -> Result<BTreeSet<UserId>, MembershipError>;

    /// Whether `user` may moderate messages in `conversation`
    async fn is_moderator(
        &self,
        conversation: &ConversationRef,
        user: &UserId,
    ) -> Result<bool, MembershipError>;
}

/// Membership table held in memory
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    groups: DashMap<GroupId, BTreeMap<UserId, MemberRole>>,
    global_moderators: DashSet<UserId>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty group (no-op if it exists)
    pub fn create_group(&self, group: GroupId) {
        self.groups.entry(group).or_default();
    }

    /// Add or re-role a member; creates the group on first use
    pub fn add_member(&self, group: &GroupId, user: UserId, role: MemberRole) {
        debug!(group = %group, user = %user, ?role, "adding group member");
        self.groups
            .entry(group.clone())
            .or_default()
            .insert(user, role);
    }

    /// Remove a member. Returns whether the user was a member.
    pub fn remove_member(&self, group: &GroupId, user: &UserId) -> bool {
        let removed = self
            .groups
            .get_mut(group)
            .map(|mut members| members.remove(user).is_some())
            .unwrap_or(false);
        if removed {
            debug!(group = %group, user = %user, "member left group");
        }
        removed
    }

    /// Grant moderation rights in every conversation
    pub fn add_global_moderator(&self, user: UserId) {
        self.global_moderators.insert(user);
    }

    pub fn members(&self, group: &GroupId) -> Option<BTreeMap<UserId, MemberRole>> {
        self.groups.get(group).map(|members| members.clone())
    }
}

#[async_trait]
impl MembershipResolver for InMemoryMembership {
    async fn active_recipients(
        &self,
        conversation: &ConversationRef,
    ) -> Result<BTreeSet<UserId>, MembershipError> {
        match conversation {
            ConversationRef::Direct { peer } => Ok(BTreeSet::from([peer.clone()])),
            ConversationRef::Group { group } => self
                .groups
                .get(group)
                .map(|members| members.keys().cloned().collect())
                .ok_or_else(|| MembershipError::UnknownGroup(group.clone())),
        }
    }

    async fn is_moderator(
        &self,
        conversation: &ConversationRef,
        user: &UserId,
    ) -> Result<bool, MembershipError> {
        if self.global_moderators.contains(user) {
            return Ok(true);
        }
        match conversation {
            ConversationRef::Direct { .. } => Ok(false),
            ConversationRef::Group { group } => {
                let members = self
                    .groups
                    .get(group)
                    .ok_or_else(|| MembershipError::UnknownGroup(group.clone()))?;
                Ok(members
                    .get(user)
                    .map(|role| role.can_moderate())
                    .unwrap_or(false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(ids: &[&str]) -> BTreeSet<UserId> {
        ids.iter().map(|id| UserId::new(*id)).collect()
    }

    #[tokio::test]
    async fn test_direct_resolves_to_peer() {
        let membership = InMemoryMembership::new();
        let conversation = ConversationRef::direct(UserId::new("bob"));
        let recipients = membership.active_recipients(&conversation).await.unwrap();
        assert_eq!(recipients, users(&["bob"]));
    }

    #[tokio::test]
    async fn test_group_members_and_departure() {
        let membership = InMemoryMembership::new();
        let group = GroupId::new("g1");
        for id in ["a", "b", "c"] {
            membership.add_member(&group, UserId::new(id), MemberRole::Member);
        }

        let conversation = ConversationRef::group(group.clone());
        assert_eq!(
            membership.active_recipients(&conversation).await.unwrap(),
            users(&["a", "b", "c"])
        );

        assert!(membership.remove_member(&group, &UserId::new("c")));
        assert!(!membership.remove_member(&group, &UserId::new("c")));
        assert_eq!(
            membership.active_recipients(&conversation).await.unwrap(),
            users(&["a", "b"])
        );
    }

    #[tokio::test]
    async fn test_unknown_group() {
        let membership = InMemoryMembership::new();
        let conversation = ConversationRef::group(GroupId::new("nope"));
        let err = membership.active_recipients(&conversation).await.unwrap_err();
        assert_eq!(err, MembershipError::UnknownGroup(GroupId::new("nope")));
    }

    #[tokio::test]
    async fn test_moderator_roles() {
        let membership = InMemoryMembership::new();
        let group = GroupId::new("g1");
        membership.add_member(&group, UserId::new("admin"), MemberRole::Admin);
        membership.add_member(&group, UserId::new("mod"), MemberRole::Moderator);
        membership.add_member(&group, UserId::new("plain"), MemberRole::Member);
        membership.add_global_moderator(UserId::new("staff"));

        let conversation = ConversationRef::group(group);
        for (id, expected) in [("admin", true), ("mod", true), ("plain", false), ("staff", true)] {
            let is_mod = membership
                .is_moderator(&conversation, &UserId::new(id))
                .await
                .unwrap();
            assert_eq!(is_mod, expected, "{}", id);
        }

        let direct = ConversationRef::direct(UserId::new("bob"));
        assert!(!membership.is_moderator(&direct, &UserId::new("alice")).await.unwrap());
        assert!(membership.is_moderator(&direct, &UserId::new("staff")).await.unwrap());
    }
}
