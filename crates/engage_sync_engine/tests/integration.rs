//! Integration tests for the queue, rule cache and coordinator.

use engage_storage::{BlobStore, FileStore};
use engage_sync_engine::{
    DrainOutcome, ManualClock, MockTransport, NoopHook, PayloadKind,
    PayloadQueue, PayloadState, RawRuleResponse, RetryConfig, RuleCache, RuleCacheConfig,
    SendOutcome, SyncConfig, SyncCoordinator,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const RULES: &str = r#"{
    "interactions": [{"id": "survey-1", "type": "Survey", "configuration": {}}],
    "targets": {"local#app#launch": [{"interaction_id": "survey-1"}]}
}"#;

fn file_store(dir: &std::path::Path) -> Arc<dyn BlobStore> {
    Arc::new(FileStore::open(dir).unwrap())
}

#[test]
fn queue_survives_restart_mid_send() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));

    {
        let queue = PayloadQueue::open(file_store(dir.path()), clock.clone(), RetryConfig::new());
        queue.enqueue(PayloadKind::Message, r#"{"n":1}"#);
        queue.enqueue(PayloadKind::Event, r#"{"n":2}"#);
        queue.enqueue(PayloadKind::Message, r#"{"n":3}"#);
        let claimed = queue.claim_next().unwrap();
        assert_eq!(claimed.id, 1);
        // Process dies here, before the send outcome is recorded.
    }

    let store = file_store(dir.path());
    let queue = Arc::new(PayloadQueue::open(store.clone(), clock.clone(), RetryConfig::new()));
    let first = queue.get(1).unwrap();
    assert_eq!(first.state, PayloadState::Pending);
    assert_eq!(first.retry_count, 0);

    let transport = Arc::new(MockTransport::new());
    let coordinator = SyncCoordinator::new(
        SyncConfig::default(),
        transport.clone(),
        queue.clone(),
        Arc::new(RuleCache::open(store, clock.clone(), RuleCacheConfig::default())),
        Arc::new(NoopHook),
        clock,
    );
    assert_eq!(coordinator.drain_all().unwrap().delivered, 3);

    let bodies: Vec<String> = transport.sent().into_iter().map(|e| e.body).collect();
    assert_eq!(bodies, [r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#]);
    assert_eq!(queue.enqueue(PayloadKind::Event, "{}"), 4);
}

#[test]
fn rules_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(0));

    {
        let cache = RuleCache::open(file_store(dir.path()), clock.clone(), RuleCacheConfig::default());
        cache
            .install(RawRuleResponse::new(RULES).with_cache_lifetime(Duration::from_secs(60)))
            .unwrap();
    }

    let cache = RuleCache::open(file_store(dir.path()), clock.clone(), RuleCacheConfig::default());
    let snapshot = cache.get();
    assert!(snapshot.rules.interaction("survey-1").is_some());
    assert!(!cache.is_expired());

    clock.advance(Duration::from_secs(61));
    assert!(cache.is_expired());
    assert!(cache.get().rules.interaction("survey-1").is_some());
}

#[test]
fn concurrent_refreshes_share_one_fetch() {
    let clock = Arc::new(ManualClock::new(0));
    let store: Arc<dyn BlobStore> = Arc::new(engage_storage::InMemoryStore::new());
    let cache = Arc::new(RuleCache::open(store, clock, RuleCacheConfig::default()));
    let transport = Arc::new(MockTransport::new());
    transport.set_rules(RawRuleResponse::new(RULES));
    transport.set_fetch_delay(Duration::from_millis(300));

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let transport = Arc::clone(&transport);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.refresh(transport.as_ref(), true).unwrap()
            })
        })
        .collect();

    let snapshots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(transport.fetch_calls(), 1);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
}

#[test]
fn offline_then_online_delivery() {
    let clock = Arc::new(ManualClock::new(0));
    let store: Arc<dyn BlobStore> = Arc::new(engage_storage::InMemoryStore::new());
    let retry = RetryConfig::new().with_initial_delay(Duration::from_secs(1));
    let queue = Arc::new(PayloadQueue::open(store.clone(), clock.clone(), retry.clone()));
    let transport = Arc::new(MockTransport::new());
    let coordinator = SyncCoordinator::new(
        SyncConfig::default().with_retry(retry),
        transport.clone(),
        queue.clone(),
        Arc::new(RuleCache::open(store, clock.clone(), RuleCacheConfig::default())),
        Arc::new(NoopHook),
        clock.clone(),
    );

    queue.enqueue(PayloadKind::Message, "{}");
    transport.set_connected(false);

    let mut delays = Vec::new();
    for _ in 0..3 {
        match coordinator.drain_once().unwrap() {
            DrainOutcome::Retrying { delay, .. } => delays.push(delay),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(coordinator.drain_once().unwrap(), DrainOutcome::Idle);
        clock.advance(*delays.last().unwrap());
    }
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));

    transport.set_connected(true);
    transport.push_send_outcome(SendOutcome::success());
    assert_eq!(coordinator.drain_once().unwrap(), DrainOutcome::Delivered { id: 1 });
    assert_eq!(queue.get(1).unwrap().retry_count, 3);
    assert_eq!(transport.sent().len(), 4);
}
