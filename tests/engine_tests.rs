// Integration tests for the matchmaking engine over the in-process store

use pairup_match::{
    ChannelNotifier, Difficulty, MatchEngine, MatchRequest, MemoryStore, Notification, RequestStore,
    StoreKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(30);
const TTL: Duration = Duration::from_secs(31);

type Outcomes = UnboundedReceiver<(String, Notification)>;

fn test_engine() -> (Arc<MemoryStore>, MatchEngine<MemoryStore, ChannelNotifier>, Outcomes) {
    test_engine_with(WAIT, TTL)
}

fn test_engine_with(
    wait: Duration,
    ttl: Duration,
) -> (Arc<MemoryStore>, MatchEngine<MemoryStore, ChannelNotifier>, Outcomes) {
    let store = Arc::new(MemoryStore::new());
    let (notifier, rx) = ChannelNotifier::new();
    let engine = MatchEngine::new(Arc::clone(&store), Arc::new(notifier), wait, ttl);
    (store, engine, rx)
}

fn request(user: &str, topic: &str, difficulty: Difficulty) -> MatchRequest {
    MatchRequest::new(user, topic, difficulty)
}

/// Let spawned timer tasks run after the clock was advanced
async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut Outcomes) -> Vec<(String, Notification)> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn test_exact_match_notifies_both_parties() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();

    let outcomes: HashMap<String, Notification> =
        vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()].into_iter().collect();

    assert_eq!(outcomes["alice"], Notification::match_found("bob"));
    assert_eq!(outcomes["bob"], Notification::match_found("alice"));
}

#[tokio::test]
async fn test_match_clears_all_shared_state() {
    let (store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();
    drain(&mut rx);

    assert_eq!(store.get(&StoreKey::entry("alice")).await.unwrap(), None);
    assert_eq!(store.get(&StoreKey::entry("bob")).await.unwrap(), None);
    assert!(store
        .set_members(&StoreKey::exact_queue("arrays", Difficulty::Easy))
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .set_members(&StoreKey::broad_queue("arrays"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_tier_precedence_prefers_exact() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();
    engine.submit(request("carol", "arrays", Difficulty::Hard)).await.unwrap();
    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();

    let outcomes: HashMap<String, Notification> =
        vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()].into_iter().collect();

    assert_eq!(outcomes["alice"], Notification::match_found("bob"));
    assert_eq!(outcomes["bob"], Notification::match_found("alice"));
    assert!(!outcomes.contains_key("carol"));
}

#[tokio::test]
async fn test_fallback_tier_matches_across_difficulty() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("carol", "arrays", Difficulty::Hard)).await.unwrap();
    engine.submit(request("dave", "arrays", Difficulty::Easy)).await.unwrap();

    let outcomes: HashMap<String, Notification> =
        vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()].into_iter().collect();

    assert_eq!(outcomes["dave"], Notification::match_found("carol"));
    assert_eq!(outcomes["carol"], Notification::match_found("dave"));
}

#[tokio::test]
async fn test_different_topics_do_not_match() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.submit(request("bob", "graphs", Difficulty::Easy)).await.unwrap();

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_submission_restarts_wait() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    settle().await;

    tokio::time::advance(Duration::from_secs(20)).await;
    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    settle().await;

    // The original deadline passes without firing
    tokio::time::advance(Duration::from_secs(20)).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    // The restarted deadline fires once
    tokio::time::advance(Duration::from_secs(10)).await;
    let (user, notification) = rx.recv().await.unwrap();
    assert_eq!(user, "alice");
    assert_eq!(notification, Notification::NotFound);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bounded_wait_single_not_found() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    settle().await;

    // Nothing before the deadline
    tokio::time::advance(Duration::from_secs(29)).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    tokio::time::advance(Duration::from_millis(1500)).await;
    let (user, notification) = rx.recv().await.unwrap();
    assert_eq!(user, "alice");
    assert_eq!(notification, Notification::NotFound);

    // And exactly once
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_cancel_notifies_and_clears_state() {
    let (store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.cancel("alice").await.unwrap();

    let (user, notification) = rx.recv().await.unwrap();
    assert_eq!(user, "alice");
    assert_eq!(notification, Notification::Cancelled);

    assert_eq!(store.get(&StoreKey::entry("alice")).await.unwrap(), None);
    assert!(store
        .set_members(&StoreKey::exact_queue("arrays", Difficulty::Easy))
        .await
        .unwrap()
        .is_empty());

    // A later arrival finds nobody waiting
    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.cancel("alice").await.unwrap();
    engine.cancel("alice").await.unwrap();

    let outcomes = drain(&mut rx);
    assert_eq!(outcomes, vec![("alice".to_string(), Notification::Cancelled)]);

    // Cancelling an identity that never submitted is a silent no-op
    engine.cancel("ghost").await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_cancel_after_match_is_silent() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();
    assert_eq!(drain(&mut rx).len(), 2);

    engine.cancel("alice").await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_identity_does_not_expire_later() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.cancel("alice").await.unwrap();
    assert_eq!(drain(&mut rx).len(), 1);

    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert!(drain(&mut rx).is_empty(), "no not_found after cancellation");
}

#[tokio::test(start_paused = true)]
async fn test_race_late_match_beats_expiry() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    settle().await;

    // A peer arrives one second before alice would expire
    tokio::time::advance(Duration::from_secs(29)).await;
    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;

    let outcomes = drain(&mut rx);
    assert_eq!(outcomes.len(), 2, "exactly one terminal notification per user");
    for (_, notification) in &outcomes {
        assert!(matches!(notification, Notification::MatchFound { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_expired_identity_can_resubmit() {
    let (_store, engine, mut rx) = test_engine();

    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    settle().await;
    tokio::time::advance(Duration::from_millis(30500)).await;
    settle().await;
    assert_eq!(
        drain(&mut rx),
        vec![("alice".to_string(), Notification::NotFound)]
    );

    // Back to idle: a fresh submission matches normally
    engine.submit(request("alice", "arrays", Difficulty::Easy)).await.unwrap();
    engine.submit(request("bob", "arrays", Difficulty::Easy)).await.unwrap();
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_match_under_concurrency() {
    // Short wait so any unmatched stragglers resolve quickly as not_found
    let (_store, engine, mut rx) = test_engine_with(Duration::from_millis(200), Duration::from_secs(1));
    let engine = Arc::new(engine);

    let users: Vec<String> = (0..8).map(|i| format!("user{}", i)).collect();
    let mut handles = Vec::new();
    for user in &users {
        let engine = Arc::clone(&engine);
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit(MatchRequest::new(user, "arrays", Difficulty::Medium))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every user reaches exactly one terminal state
    let mut outcomes: HashMap<String, Notification> = HashMap::new();
    while outcomes.len() < users.len() {
        let (user, notification) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("terminal notification missing")
            .expect("notifier closed");
        let previous = outcomes.insert(user.clone(), notification);
        assert!(previous.is_none(), "{} received two terminal notifications", user);
    }

    // Matched pairs are reciprocal and nobody appears in two pairs
    for (user, notification) in &outcomes {
        if let Notification::MatchFound { match_user_name } = notification {
            assert_ne!(user, match_user_name, "self-match");
            assert_eq!(
                outcomes.get(match_user_name),
                Some(&Notification::match_found(user)),
                "match between {} and {} is not reciprocal",
                user,
                match_user_name
            );
        }
    }
}
