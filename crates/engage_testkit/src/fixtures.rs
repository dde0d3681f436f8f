//! Rule-set fixtures and engine helpers.
//!
//! The rule payloads are literal wire JSON so that tests exercise the same
//! parser the engine uses for server responses.

use engage_core::{Engagement, EngineConfig};
use engage_storage::{BlobStore, FileStore, InMemoryStore};
use engage_sync_engine::{ManualClock, MockTransport, RawRuleResponse, RetryConfig};
use engage_targeting::RuleSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A survey shown from the third app launch on.
pub const LAUNCH_SURVEY_RULES: &str = r#"{
    "interactions": [
        {"id": "survey1", "type": "Survey", "configuration": {"title": "Quick question"}}
    ],
    "targets": {
        "local#app#launch": [
            {"interaction_id": "survey1", "criteria": {"code_point/local#app#launch/invokes/total": {"$gte": 3}}}
        ]
    }
}"#;

/// Several targets per event, exercising ordering and combinators.
pub const LAYERED_RULES: &str = r#"{
    "interactions": [
        {"id": "upgrade", "type": "UpgradeMessage", "configuration": {"body": "New in 2.0"}},
        {"id": "love", "type": "EnjoymentDialog", "configuration": {}},
        {"id": "rate", "type": "RatingDialog", "configuration": {}},
        {"id": "beta-note", "type": "TextModal", "configuration": {"title": "Thanks for testing"}}
    ],
    "targets": {
        "local#app#launch": [
            {"interaction_id": "upgrade", "criteria": {
                "code_point/local#app#launch/invokes/version": 1,
                "code_point/local#app#launch/invokes/total": {"$gt": 1}
            }},
            {"interaction_id": "beta-note", "criteria": {"custom_data.beta": true}}
        ],
        "com.acme#checkout#done": [
            {"interaction_id": "love", "criteria": {
                "$and": [
                    {"code_point/com.acme#checkout#done/invokes/total": {"$gte": 2}},
                    {"$not": {"interactions/love/invokes/total": {"$gte": 1}}}
                ]
            }},
            {"interaction_id": "rate", "criteria": {
                "$or": [
                    {"person.email": {"$ends_with": "@acme.com"}},
                    {"interactions/love/invokes/total": {"$gte": 1}}
                ]
            }}
        ]
    }
}"#;

/// A payload with fragments the parser drops or marks malformed.
pub const DEGRADED_RULES: &str = r#"{
    "interactions": [
        {"id": "ok", "type": "TextModal", "configuration": {}},
        {"id": "future", "type": "HologramPrompt", "configuration": {}},
        {"type": "Survey"}
    ],
    "targets": {
        "local#app#launch": [
            {"interaction_id": "ok", "criteria": {"person.age": {"$between": [1, 2]}}},
            {"criteria": {}},
            {"interaction_id": "ok", "criteria": {"device.os_name": "iOS"}}
        ],
        "local#app#exit": "not a list"
    }
}"#;

/// A payload with no targets at all.
pub const EMPTY_RULES: &str = r#"{"interactions": [], "targets": {}}"#;

/// Parses a fixture. Panics on a bad fixture.
pub fn rule_set(json: &str) -> RuleSet {
    RuleSet::from_json(json.as_bytes()).expect("fixture rule set must parse")
}

/// A test engine with a scripted transport and a manual clock.
pub struct TestEngine {
    /// The engine.
    pub engine: Engagement<Arc<MockTransport>>,
    /// The transport the engine sends through.
    pub transport: Arc<MockTransport>,
    /// The engine's clock.
    pub clock: Arc<ManualClock>,
    /// The engine's store.
    pub store: Arc<dyn BlobStore>,
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// The configuration test engines use: app 1.0.0 (1) and immediate retries.
    pub fn config() -> EngineConfig {
        EngineConfig::new()
            .app("1.0.0", "1")
            .retry(RetryConfig::immediate())
            .default_cache_lifetime(Duration::from_secs(3600))
    }

    /// An engine over an in-memory store.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), None)
    }

    /// An engine over a file store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        Self::with_store(Arc::new(store), Some(temp_dir))
    }

    /// An engine over any store, with the default test configuration.
    pub fn over(store: Arc<dyn BlobStore>) -> Self {
        Self::with_store(store, None)
    }

    fn with_store(store: Arc<dyn BlobStore>, temp_dir: Option<TempDir>) -> Self {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let engine = Engagement::with_clock(
            Self::config(),
            Arc::clone(&store),
            Arc::clone(&transport),
            clock.clone(),
        );
        Self {
            engine,
            transport,
            clock,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Installs a fixture rule payload. Panics if it does not parse.
    pub fn install(&self, json: &str) {
        self.engine
            .install_rules(RawRuleResponse::new(json))
            .expect("fixture rule set must install");
    }

    /// The temporary directory of a file-backed engine.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engagement<Arc<MockTransport>>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test against a fresh in-memory engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine) -> R,
{
    let t = TestEngine::memory();
    f(&t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::EventName;
    use engage_targeting::{resolve, FactSnapshot, InvocationStats};

    #[test]
    fn fixtures_parse() {
        assert_eq!(rule_set(LAUNCH_SURVEY_RULES).interaction_count(), 1);
        assert_eq!(rule_set(LAYERED_RULES).target_count(), 2);
        assert!(rule_set(EMPTY_RULES).is_empty());

        let (rules, report) = RuleSet::from_json_with_report(DEGRADED_RULES.as_bytes()).unwrap();
        assert_eq!(rules.interaction_count(), 1);
        assert_eq!(report.skipped_interactions, 2);
        assert_eq!(report.skipped_targets, 2);
        assert_eq!(report.malformed_criteria, 1);
    }

    #[test]
    fn degraded_rules_still_resolve() {
        let rules = rule_set(DEGRADED_RULES);
        let mut device = engage_codec::Map::new();
        device.insert("os_name".into(), "iOS".into());
        let facts = FactSnapshot::builder(0).device(device).build();

        let selected = resolve(&rules, &EventName::local("launch"), &facts).unwrap();
        assert_eq!(selected.id, "ok");
    }

    #[test]
    fn layered_rules_prefer_first_match() {
        let rules = rule_set(LAYERED_RULES);
        let event = EventName::new("com.acme", "checkout", "done");
        let mut person = engage_codec::Map::new();
        person.insert("email".into(), "dev@acme.com".into());

        let twice = InvocationStats {
            total: 2,
            ..InvocationStats::default()
        };
        let facts = FactSnapshot::builder(0)
            .code_point("com.acme#checkout#done", twice)
            .person(person)
            .build();
        assert_eq!(resolve(&rules, &event, &facts).unwrap().id, "love");

        let shown = InvocationStats {
            total: 1,
            ..InvocationStats::default()
        };
        let facts = FactSnapshot::builder(0)
            .code_point("com.acme#checkout#done", InvocationStats { total: 5, ..InvocationStats::default() })
            .interaction("love", shown)
            .build();
        assert_eq!(resolve(&rules, &event, &facts).unwrap().id, "rate");
    }

    #[test]
    fn test_engine_counts_events() {
        with_engine(|t| {
            t.install(LAUNCH_SURVEY_RULES);
            assert!(t.record_local_event("launch").is_none());
            assert!(t.record_local_event("launch").is_none());
            assert_eq!(t.record_local_event("launch").unwrap().id, "survey1");
        });
    }

    #[test]
    fn file_engine_has_a_path() {
        let t = TestEngine::file();
        assert!(t.path().unwrap().is_dir());
        assert!(TestEngine::memory().path().is_none());
    }
}
