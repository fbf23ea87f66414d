/// Concurrency tests
///
/// Every write is a per-record compare-and-swap, so racing tasks on a
/// multi-threaded runtime must converge on the same state a serial run of
/// the winners would produce.

use futures::future::join_all;
use missive_core::core_delivery::{DeliveryStatus, Transition};
use missive_core::core_engine::NewMessage;
use missive_core::core_deletion::DeletionMarker;
use missive_core::test_utils::*;
use missive_core::EngineError;
use std::sync::Arc;
use std::time::Duration;

const MEMBERS: usize = 16;

fn crowd() -> Arc<TestEngine> {
    let names: Vec<String> = (0..MEMBERS).map(|i| format!("u{}", i)).collect();
    let mut roster: Vec<&str> = names.iter().map(String::as_str).collect();
    roster.push("s");
    Arc::new(
        TestEngineBuilder::new()
            .with_group("g1", &roster)
            .with_moderator("g1", "mod")
            .build(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_reactions_all_land() {
    let t = crowd();
    t.post(group("g1"), "s", "m1", "party").await;

    let tasks = (0..MEMBERS).map(|i| {
        let t = t.clone();
        tokio::spawn(async move {
            t.engine
                .toggle_reaction(&msg("m1"), &user(&format!("u{}", i)), "🎉")
                .await
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let reactions = t.engine.reactions(&msg("m1")).await.unwrap();
    assert_eq!(reactions.users("🎉").map(|users| users.len()), Some(MEMBERS));
    assert_eq!(t.engine.stats().reaction_toggles, MEMBERS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_odd_number_of_racing_toggles_leaves_one_reaction() {
    let t = crowd();
    t.post(group("g1"), "s", "m1", "party").await;

    let tasks = (0..7).map(|_| {
        let t = t.clone();
        tokio::spawn(async move { t.engine.toggle_reaction(&msg("m1"), &user("u0"), "👍").await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let reactions = t.engine.reactions(&msg("m1")).await.unwrap();
    assert!(reactions.contains(&user("u0"), "👍"));
    assert_eq!(reactions.counts().get("👍"), Some(&1));
    assert_eq!(reactions.emoji_for(&user("u0")), vec!["👍"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_acks_stay_monotonic() {
    let t = crowd();
    t.post(group("g1"), "s", "m1", "hi").await;
    let start = t.now();

    // Delivered and read acks for the same recipient, interleaved
    let tasks = (0..20u64).map(|i| {
        let t = t.clone();
        let at = start.saturating_add(Duration::from_millis(i));
        tokio::spawn(async move {
            if i % 2 == 0 {
                t.engine.mark_delivered(&msg("m1"), &user("u1"), at).await
            } else {
                t.engine.mark_read(&msg("m1"), &user("u1"), at).await
            }
        })
    });
    let transitions: Vec<Transition> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let applied = transitions.iter().filter(|t| t.is_applied()).count();
    assert!((1..=2).contains(&applied), "applied {} transitions", applied);

    let record = t
        .engine
        .delivery_record(&msg("m1"), &user("u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Read);
    let delivered_at = record.delivered_at.unwrap();
    let read_at = record.read_at.unwrap();
    assert!(delivered_at <= read_at);

    let stats = t.engine.stats();
    assert_eq!(stats.duplicate_acks as usize, 20 - applied);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_ack_racing_hard_delete() {
    let t = crowd();
    t.post(group("g1"), "s", "m1", "hi").await;

    let reader = {
        let t = t.clone();
        tokio::spawn(async move { t.engine.mark_read(&msg("m1"), &user("u2"), t.now()).await })
    };
    let deleter = {
        let t = t.clone();
        tokio::spawn(async move { t.engine.hard_delete(&msg("m1"), &user("mod")).await })
    };

    assert_eq!(reader.await.unwrap().unwrap(), Transition::Applied);
    deleter.await.unwrap().unwrap();

    let message = t.engine.message(&msg("m1")).await.unwrap();
    assert_eq!(message.deletion, DeletionMarker::Hard);
    assert!(message.content.is_none());
    assert_delivery(&t.engine, &msg("m1"), &user("u2"), DeliveryStatus::Read).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_hard_deletes_have_one_winner() {
    let t = crowd();
    t.post(group("g1"), "s", "m1", "hi").await;

    let actors = ["s", "mod", "s", "mod"];
    let tasks = actors.iter().map(|actor| {
        let t = t.clone();
        let actor = user(actor);
        tokio::spawn(async move { t.engine.hard_delete(&msg("m1"), &actor).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EngineError::AlreadyTerminal(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_edits_keep_history_chained() {
    let t = crowd();
    t.post(group("g1"), "s", "m1", "v0").await;

    let tasks = (1..=12).map(|i| {
        let t = t.clone();
        tokio::spawn(async move {
            t.engine
                .edit_message(&msg("m1"), &user("s"), &format!("v{}", i))
                .await
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let history = t.engine.history(&msg("m1")).await.unwrap();
    assert_eq!(history.len(), 12);
    assert_eq!(history[0].previous_content, "v0");
    for (i, pair) in history.windows(2).enumerate() {
        assert_eq!(pair[0].revision as usize, i + 1);
        assert_eq!(pair[0].new_content, pair[1].previous_content);
        assert!(pair[0].edited_at <= pair[1].edited_at);
    }

    let live = t.engine.message(&msg("m1")).await.unwrap();
    assert_eq!(live.content, history.last().map(|e| e.new_content.clone()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_creates_seed_once() {
    let t = crowd();

    let tasks = (0..8).map(|_| {
        let t = t.clone();
        tokio::spawn(async move {
            t.engine
                .create_message(NewMessage::text(group("g1"), user("s"), "once").with_id(msg("m1")))
                .await
        })
    });
    let created: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(created.iter().filter(|c| c.is_new).count(), 1);
    let seeded: usize = created.iter().map(|c| c.delivery.created.len()).sum();
    assert_eq!(seeded, MEMBERS + 1);
    assert_eq!(t.engine.statuses(&msg("m1")).await.unwrap().len(), MEMBERS + 1);
    assert_eq!(t.engine.stats().messages_created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unread_counts_across_many_messages() {
    let t = crowd();
    let ids: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
    join_all(ids.iter().map(|id| t.post(group("g1"), "s", id, "news"))).await;

    let tasks = ids.iter().take(4).cloned().map(|id| {
        let t = t.clone();
        tokio::spawn(async move { t.engine.mark_read(&msg(&id), &user("u3"), t.now()).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(t.engine.unread_count(&user("u3")).await.unwrap(), 6);
    assert_eq!(t.engine.unread_count(&user("u4")).await.unwrap(), 10);
    assert_eq!(t.engine.unread_count(&user("s")).await.unwrap(), 0);
}
