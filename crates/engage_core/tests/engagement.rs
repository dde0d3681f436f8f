//! End-to-end tests for the engagement engine.

use engage_codec::Value;
use engage_core::{
    AutoMessageKind, AutoMessageState, DrainOutcome, Engagement, EngagementEvent, EngineConfig,
    MessageDraft, MockTransport, PayloadKind, PayloadState, ProfileKind, ProfileRecord,
    RawRuleResponse,
};
use engage_storage::{BlobStore, InMemoryStore};
use engage_sync_engine::{ManualClock, SendOutcome};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const LAUNCH_RULES: &str = r#"{
    "interactions": [
        {"id": "survey1", "type": "Survey", "configuration": {"title": "How are we doing?"}},
        {"id": "prompt1", "type": "EnjoymentDialog", "configuration": {}}
    ],
    "targets": {
        "local#app#launch": [
            {"interaction_id": "survey1", "criteria": {"code_point/local#app#launch/invokes/total": {"$gte": 3}}}
        ],
        "local#app#checkout": [
            {"interaction_id": "prompt1", "criteria": {"custom_data.beta": true}}
        ]
    }
}"#;

type TestEngine = Engagement<Arc<MockTransport>>;

fn engine_with(store: Arc<dyn BlobStore>) -> (TestEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let engine = Engagement::with_clock(
        EngineConfig::new().app("1.0.0", "1"),
        store,
        Arc::new(MockTransport::new()),
        clock.clone(),
    );
    (engine, clock)
}

fn engine() -> (TestEngine, Arc<ManualClock>) {
    engine_with(Arc::new(InMemoryStore::new()))
}

fn drain_everything(engine: &TestEngine) {
    while !matches!(engine.drain_once().unwrap(), DrainOutcome::Idle) {}
}

#[test]
fn survey_selected_on_third_launch() {
    let (engine, _) = engine();
    engine.install_rules(RawRuleResponse::new(LAUNCH_RULES)).unwrap();

    assert!(engine.record_local_event("launch").is_none());
    assert!(engine.record_local_event("launch").is_none());
    let selected = engine.record_local_event("launch").unwrap();
    assert_eq!(selected.id, "survey1");

    assert_eq!(engine.ledger().code_point("local#app#launch").unwrap().total, 3);
    assert_eq!(engine.ledger().interaction("survey1").unwrap().total, 1);
}

#[test]
fn every_recorded_event_is_queued() {
    let (engine, _) = engine();
    engine.record_event("com.acme", "checkout", "done");
    engine.record_local_event("launch");

    let entries = engine.queue().entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.kind == PayloadKind::Event));
    assert!(entries[0].body.contains("com.acme#checkout#done"));
    assert!(entries[1].body.contains("local#app#launch"));
}

#[test]
fn resolve_does_not_record() {
    let (engine, _) = engine();
    engine.install_rules(RawRuleResponse::new(LAUNCH_RULES)).unwrap();

    let facts = engine.facts();
    let event = engage_core::EventName::local("launch");
    assert!(engine.resolve(&event, &facts).is_none());
    assert!(engine.ledger().code_point("local#app#launch").is_none());
    assert!(engine.queue().is_empty());
}

#[test]
fn person_custom_data_feeds_targeting() {
    let (engine, _) = engine();
    engine.install_rules(RawRuleResponse::new(LAUNCH_RULES)).unwrap();
    assert!(engine.record_local_event("checkout").is_none());

    let mut custom = engage_codec::Map::new();
    custom.insert("beta".into(), Value::from(true));
    engine
        .enqueue_profile_update(
            ProfileKind::Person,
            ProfileRecord::new().with("name", "Alice").with("custom_data", custom),
        )
        .unwrap();

    assert_eq!(engine.record_local_event("checkout").unwrap().id, "prompt1");
}

#[test]
fn profile_diff_advances_baseline_on_delivery() {
    let (engine, _) = engine();
    let first = ProfileRecord::new().with("name", "Alice").with("age", 30);

    let id = engine
        .enqueue_profile_update(ProfileKind::Person, first.clone())
        .unwrap()
        .unwrap();
    assert!(engine.baseline(ProfileKind::Person).is_none());

    assert_eq!(engine.drain_once().unwrap(), DrainOutcome::Delivered { id });
    assert_eq!(engine.baseline(ProfileKind::Person), Some(first));

    let second = ProfileRecord::new().with("name", "Alice").with("city", "NYC");
    engine
        .enqueue_profile_update(ProfileKind::Person, second.clone())
        .unwrap()
        .unwrap();
    let sent = engine.queue().entries().pop().unwrap();
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"person": {"age": null, "city": "NYC"}})
    );

    drain_everything(&engine);
    assert_eq!(engine.baseline(ProfileKind::Person), Some(second));
}

#[test]
fn queued_diffs_are_not_queued_again() {
    let (engine, _) = engine();
    engine.transport().set_connected(false);
    let record = ProfileRecord::new().with("os_version", "17.0");

    assert!(engine
        .enqueue_profile_update(ProfileKind::Device, record.clone())
        .unwrap()
        .is_some());
    // Nothing delivered yet, but the queued diff already covers this.
    assert!(engine
        .enqueue_profile_update(ProfileKind::Device, record)
        .unwrap()
        .is_none());

    let changed = ProfileRecord::new().with("os_version", "17.1");
    engine
        .enqueue_profile_update(ProfileKind::Device, changed)
        .unwrap()
        .unwrap();
    assert_eq!(engine.queue().outstanding_diffs(ProfileKind::Device).len(), 2);
}

#[test]
fn non_finite_profile_values_queue_once() {
    let (engine, _) = engine();
    engine.transport().set_connected(false);
    let record = ProfileRecord::new()
        .with("name", "Alice")
        .with("score", f64::NAN)
        .with("limit", f64::INFINITY);

    let first = engine
        .enqueue_profile_update(ProfileKind::Person, record.clone())
        .unwrap()
        .unwrap();
    for _ in 0..2 {
        assert!(engine
            .enqueue_profile_update(ProfileKind::Person, record.clone())
            .unwrap()
            .is_none());
    }

    let entry = engine.queue().get(first).unwrap();
    assert_eq!(entry.body, r#"{"person":{"name":"Alice"}}"#);
}

#[test]
fn device_and_person_baselines_are_independent() {
    let (engine, _) = engine();
    engine
        .enqueue_profile_update(ProfileKind::Device, ProfileRecord::new().with("model", "X"))
        .unwrap();
    drain_everything(&engine);

    assert!(engine.baseline(ProfileKind::Device).is_some());
    assert!(engine.baseline(ProfileKind::Person).is_none());
}

#[test]
fn rejection_removes_attachment_and_notifies() {
    let dir = tempdir().unwrap();
    let attachment = dir.path().join("screenshot.png");
    std::fs::write(&attachment, b"png").unwrap();

    let (engine, _) = engine();
    let events = engine.subscribe();
    engine.transport().push_send_outcome(SendOutcome::rejected("413 too large"));

    let id = engine
        .enqueue_message(MessageDraft::new("see attached").with_attachment(&attachment))
        .unwrap();
    assert_eq!(engine.drain_once().unwrap(), DrainOutcome::Rejected { id });

    assert!(!attachment.exists());
    assert_eq!(engine.queue().get(id).unwrap().state, PayloadState::FailedPermanent);

    let rejected: Vec<_> = events
        .try_iter()
        .filter(|e| matches!(e, EngagementEvent::PayloadRejected { .. }))
        .collect();
    assert_eq!(rejected.len(), 1);
    match &rejected[0] {
        EngagementEvent::PayloadRejected {
            id: rejected_id,
            reason,
            attachment: path,
            ..
        } => {
            assert_eq!(*rejected_id, id);
            assert_eq!(reason, "413 too large");
            assert_eq!(path.as_deref(), Some(attachment.as_path()));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn hidden_message_attachment_removed_after_delivery() {
    let dir = tempdir().unwrap();
    let hidden_file = dir.path().join("log.txt");
    let visible_file = dir.path().join("photo.jpg");
    std::fs::write(&hidden_file, b"log").unwrap();
    std::fs::write(&visible_file, b"jpg").unwrap();

    let (engine, _) = engine();
    engine
        .enqueue_message(
            MessageDraft::new("diagnostics")
                .with_attachment(&hidden_file)
                .hidden(true),
        )
        .unwrap();
    engine
        .enqueue_message(MessageDraft::new("look").with_attachment(&visible_file))
        .unwrap();
    drain_everything(&engine);

    assert!(!hidden_file.exists());
    assert!(visible_file.exists());
    let kinds: Vec<_> = engine.transport().sent().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![PayloadKind::HiddenMessage, PayloadKind::Message]);
}

#[test]
fn auto_message_created_once() {
    let (engine, _) = engine();
    assert_eq!(engine.auto_message_state(), AutoMessageState::NotShown);

    let id = engine.create_auto_message(true).unwrap().unwrap();
    assert!(engine.create_auto_message(true).unwrap().is_none());
    assert!(engine.create_auto_message(false).unwrap().is_none());
    assert_eq!(
        engine.auto_message_state(),
        AutoMessageState::Shown(AutoMessageKind::Welcome)
    );

    let entry = engine.queue().get(id).unwrap();
    assert_eq!(entry.kind, PayloadKind::HiddenMessage);
    assert!(entry.body.contains(AutoMessageKind::Welcome.default_body()));
}

#[test]
fn listener_sees_delivery_and_rule_updates() {
    let (engine, _) = engine();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.add_listener(move |event: &EngagementEvent| sink.lock().push(event.clone()));

    engine.install_rules(RawRuleResponse::new(LAUNCH_RULES)).unwrap();
    let id = engine.enqueue_message(MessageDraft::new("hi")).unwrap();
    drain_everything(&engine);

    let seen = seen.lock();
    assert!(seen.contains(&EngagementEvent::RulesUpdated {
        interactions: 2,
        targets: 2
    }));
    assert!(seen.iter().any(|e| matches!(
        e,
        EngagementEvent::PayloadDelivered { id: delivered, kind: PayloadKind::Message, .. } if *delivered == id
    )));
}

#[test]
fn offline_messages_back_off_then_deliver() {
    let (engine, clock) = engine();
    engine.transport().set_connected(false);
    let id = engine.enqueue_message(MessageDraft::new("queued offline")).unwrap();

    match engine.drain_once().unwrap() {
        DrainOutcome::Retrying { id: retry_id, delay } => {
            assert_eq!(retry_id, id);
            clock.advance(delay);
        }
        other => panic!("expected retry, got {other:?}"),
    }
    assert_eq!(engine.queue().get(id).unwrap().retry_count, 1);

    engine.transport().set_connected(true);
    assert_eq!(engine.drain_once().unwrap(), DrainOutcome::Delivered { id });
    assert_eq!(engine.sync_stats().delivered, 1);
    assert_eq!(engine.prune().len(), 1);
    assert!(engine.queue().is_empty());
}

#[test]
fn rules_refresh_through_transport() {
    let (engine, clock) = engine();
    engine
        .transport()
        .set_rules(RawRuleResponse::new(LAUNCH_RULES).with_cache_lifetime(Duration::from_secs(60)));

    assert!(engine.rules_expired());
    let snapshot = engine.refresh_rules().unwrap();
    assert_eq!(snapshot.rules.interaction_count(), 2);
    assert!(!engine.rules_expired());

    clock.advance(Duration::from_secs(61));
    assert!(engine.rules_expired());
}

#[test]
fn state_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = || EngineConfig::new().app("1.0.0", "1");

    {
        let engine = Engagement::open(dir.path(), config(), MockTransport::new()).unwrap();
        engine.install_rules(RawRuleResponse::new(LAUNCH_RULES)).unwrap();
        engine.record_local_event("launch");
        engine.record_local_event("launch");
        engine.enqueue_message(MessageDraft::new("survives")).unwrap();
        engine.create_auto_message(false).unwrap();
        engine.flush().unwrap();
    }

    let engine = Engagement::open(dir.path(), config(), MockTransport::new()).unwrap();
    assert_eq!(engine.rules().rules.interaction_count(), 2);
    assert_eq!(engine.ledger().code_point("local#app#launch").unwrap().total, 2);
    assert_eq!(engine.queue_stats().pending, 4);
    assert_eq!(
        engine.auto_message_state(),
        AutoMessageState::Shown(AutoMessageKind::NoLove)
    );

    // The third launch, counted after the restart, selects the survey.
    assert_eq!(engine.record_local_event("launch").unwrap().id, "survey1");
}

#[test]
fn upgrade_resets_version_counters() {
    let store: Arc<dyn BlobStore> = Arc::new(InMemoryStore::new());
    {
        let (engine, _) = engine_with(Arc::clone(&store));
        engine.record_local_event("launch");
    }

    let engine = Engagement::new(
        EngineConfig::new().app("2.0.0", "2"),
        store,
        Arc::new(MockTransport::new()),
    );
    let stats = engine.ledger().code_point("local#app#launch").unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.version, 0);
    assert_eq!(stats.build, 0);
}
