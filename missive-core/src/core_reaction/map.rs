/*
    map.rs - Emoji reaction map

    emoji -> set of reacting users. Within one emoji a user appears at most
    once; a user may hold several different emoji on the same message.
    Emoji keys with no remaining users are dropped so that toggling twice
    restores the exact original map.
*/

use crate::core_model::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Whether a toggle added or removed the reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionChange {
    Added,
    Removed,
}

/// Reactions on a single message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionMap(BTreeMap<String, BTreeSet<UserId>>);

impl ReactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `user` under `emoji`, or remove it if already present
    pub fn toggle(&mut self, user: &UserId, emoji: &str) -> ReactionChange {
        let users = self.0.entry(emoji.to_string()).or_default();
        if users.remove(user) {
            if users.is_empty() {
                self.0.remove(emoji);
            }
            ReactionChange::Removed
        } else {
            users.insert(user.clone());
            ReactionChange::Added
        }
    }

    pub fn contains(&self, user: &UserId, emoji: &str) -> bool {
        self.0.get(emoji).is_some_and(|users| users.contains(user))
    }

    pub fn users(&self, emoji: &str) -> Option<&BTreeSet<UserId>> {
        self.0.get(emoji)
    }

    /// Emoji `user` currently holds on this message
    pub fn emoji_for(&self, user: &UserId) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, users)| users.contains(user))
            .map(|(emoji, _)| emoji.as_str())
            .collect()
    }

    /// Per-emoji counts, for compact broadcasts
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        self.0.iter().map(|(e, users)| (e.as_str(), users.len())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<UserId>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut map = ReactionMap::new();
        let alice = UserId::new("alice");

        assert_eq!(map.toggle(&alice, "👍"), ReactionChange::Added);
        assert!(map.contains(&alice, "👍"));

        assert_eq!(map.toggle(&alice, "👍"), ReactionChange::Removed);
        assert!(!map.contains(&alice, "👍"));
        assert!(map.is_empty(), "empty emoji entries are pruned");
    }

    #[test]
    fn test_multiple_emoji_per_user() {
        let mut map = ReactionMap::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        map.toggle(&alice, "👍");
        map.toggle(&alice, "🎉");
        map.toggle(&bob, "👍");

        assert_eq!(map.emoji_for(&alice), vec!["🎉", "👍"]);
        assert_eq!(map.counts().get("👍"), Some(&2));
        assert_eq!(map.users("🎉").map(|u| u.len()), Some(1));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut map = ReactionMap::new();
        map.toggle(&UserId::new("u1"), "❤");
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"❤":["u1"]}"#);
    }

    proptest! {
        #[test]
        fn prop_toggle_is_self_inverse(
            seed in prop::collection::vec((0..5u8, 0..4u8), 0..20),
            user in 0..5u8,
            emoji in 0..4u8,
        ) {
            let emojis = ["👍", "👎", "🎉", "❤"];
            let mut map = ReactionMap::new();
            for (u, e) in seed {
                map.toggle(&UserId::new(format!("u{}", u)), emojis[e as usize]);
            }

            let original = map.clone();
            let user = UserId::new(format!("u{}", user));
            map.toggle(&user, emojis[emoji as usize]);
            map.toggle(&user, emojis[emoji as usize]);

            prop_assert_eq!(map, original);
        }
    }
}
