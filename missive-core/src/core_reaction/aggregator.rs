//! Reaction Aggregator
//!
//! Toggles are compare-and-swapped on the message record, so two sessions
//! racing on the same (user, emoji) serialize: one adds, the other observes
//! the add and removes. Callers get the full map back and broadcast it
//! instead of a delta.

use super::map::{ReactionChange, ReactionMap};
use crate::core_model::{Message, MessageId, UserId};
use crate::core_store::{update_record, Mutation, RecordStore};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::record_counter;
use std::sync::Arc;
use tracing::debug;

pub struct ReactionAggregator {
    messages: Arc<dyn RecordStore<MessageId, Message>>,
    max_emoji_length: usize,
    retry_limit: usize,
}

impl ReactionAggregator {
    pub fn new(
        messages: Arc<dyn RecordStore<MessageId, Message>>,
        max_emoji_length: usize,
        retry_limit: usize,
    ) -> Self {
        Self {
            messages,
            max_emoji_length,
            retry_limit,
        }
    }

    fn validate_emoji(&self, emoji: &str) -> EngineResult<()> {
        if emoji.trim().is_empty() {
            return Err(EngineError::InvalidInput("emoji is empty".into()));
        }
        if emoji.len() > self.max_emoji_length {
            return Err(EngineError::InvalidInput(format!(
                "emoji is {} bytes, limit is {}",
                emoji.len(),
                self.max_emoji_length
            )));
        }
        Ok(())
    }

    /// Add or remove `user`'s `emoji` and return the authoritative map.
    ///
    /// Hard-deleted messages reject reactions; soft-deleted ones still take
    /// them since recipients can see the message.
    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        user: &UserId,
        emoji: &str,
    ) -> EngineResult<ReactionMap> {
        self.validate_emoji(emoji)?;

        let (reactions, change) = update_record(
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
                let mut next = message.clone();
                let change = next.reactions.toggle(user, emoji);
                let reactions = next.reactions.clone();
                Ok(Mutation::Write(next, (reactions, change)))
            },
        )
        .await?;

        record_counter("reactions.toggled", 1);
        debug!(
            message_id = %message_id,
            user = %user,
            emoji,
            added = change == ReactionChange::Added,
            "reaction toggled"
        );
        Ok(reactions)
    }

    /// Current reactions of a message
    pub async fn reactions(&self, message_id: &MessageId) -> EngineResult<ReactionMap> {
        self.messages
            .get(message_id)
            .await?
            .map(|message| message.value.reactions)
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_model::{ConversationRef, MessageKind, Timestamp};
    use crate::core_store::MemoryStore;

    async fn aggregator() -> (ReactionAggregator, Arc<MemoryStore<MessageId, Message>>) {
        let messages = Arc::new(MemoryStore::new());
        let message = Message::new(
            MessageId::new("m1"),
            ConversationRef::direct(UserId::new("bob")),
            UserId::new("alice"),
            "hi".into(),
            MessageKind::Text,
            Timestamp(1),
        );
        messages
            .insert_if_absent(message.id.clone(), message)
            .await
            .unwrap();
        (ReactionAggregator::new(messages.clone(), 32, 64), messages)
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_map() {
        let (aggregator, _) = aggregator().await;
        let m1 = MessageId::new("m1");
        let bob = UserId::new("bob");

        let before = aggregator.reactions(&m1).await.unwrap();
        let added = aggregator.toggle_reaction(&m1, &bob, "👍").await.unwrap();
        assert!(added.contains(&bob, "👍"));

        let removed = aggregator.toggle_reaction(&m1, &bob, "👍").await.unwrap();
        assert_eq!(removed, before);
    }

    #[tokio::test]
    async fn test_multiple_emoji_per_user() {
        let (aggregator, _) = aggregator().await;
        let m1 = MessageId::new("m1");
        let bob = UserId::new("bob");

        aggregator.toggle_reaction(&m1, &bob, "👍").await.unwrap();
        let map = aggregator.toggle_reaction(&m1, &bob, "🎉").await.unwrap();
        assert_eq!(map.emoji_for(&bob).len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_emoji() {
        let (aggregator, _) = aggregator().await;
        let m1 = MessageId::new("m1");
        let bob = UserId::new("bob");

        assert!(matches!(
            aggregator.toggle_reaction(&m1, &bob, " ").await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            aggregator.toggle_reaction(&m1, &bob, &"😀".repeat(9)).await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_hard_deleted_message_rejects_reactions() {
        let (aggregator, messages) = aggregator().await;
        let m1 = MessageId::new("m1");
        let current = messages.get(&m1).await.unwrap().unwrap();
        let mut scrubbed = current.value.clone();
        scrubbed.scrub(Timestamp(2), &UserId::new("alice"));
        messages
            .compare_and_swap(&m1, current.version, scrubbed)
            .await
            .unwrap();

        let err = aggregator
            .toggle_reaction(&m1, &UserId::new("bob"), "👍")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_users_all_land() {
        let (aggregator, _) = aggregator().await;
        let aggregator = Arc::new(aggregator);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move {
                    aggregator
                        .toggle_reaction(&MessageId::new("m1"), &UserId::new(format!("u{}", i)), "❤️")
                        .await
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let map = aggregator.reactions(&MessageId::new("m1")).await.unwrap();
        assert_eq!(map.users("❤️").map(|users| users.len()), Some(16));
    }
}
