//! Rule cache with expiry, offline fallback and coalesced refresh.

use crate::clock::{after, Clock};
use crate::config::RuleCacheConfig;
use crate::error::FetchError;
use crate::transport::{EngageTransport, RawRuleResponse};
use engage_codec::{decode_versioned, encode_versioned};
use engage_storage::BlobStore;
use engage_targeting::RuleSet;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blob key of the persisted rule cache.
pub const RULE_CACHE_KEY: &str = "rule_cache";

const RULE_CACHE_FORMAT: u16 = 1;

/// An immutable view of the cached rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSnapshot {
    /// Parsed rules.
    pub rules: RuleSet,
    /// The JSON they were parsed from.
    pub raw: Option<String>,
    /// Fetch time (milliseconds since the Unix epoch).
    pub fetched_at: Option<u64>,
    /// Expiry time (milliseconds since the Unix epoch).
    pub expires_at: Option<u64>,
}

impl RuleSnapshot {
    /// The snapshot used before anything was ever fetched.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True once `now_ms` reaches the expiry, or if never fetched.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at.map_or(true, |at| now_ms >= at)
    }
}

#[derive(Serialize, Deserialize)]
struct CachedRules {
    raw: String,
    fetched_at: u64,
    expires_at: u64,
}

type RefreshOutcome = Result<Arc<RuleSnapshot>, FetchError>;

#[derive(Default)]
struct InFlight {
    outcome: Mutex<Option<RefreshOutcome>>,
    done: Condvar,
}

impl InFlight {
    fn complete(&self, outcome: RefreshOutcome) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> RefreshOutcome {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

/// How a refresh caller proceeds.
enum Entry {
    /// Another caller committed fresh rules in the meantime.
    Fresh(Arc<RuleSnapshot>),
    /// Wait for the fetch already in flight.
    Follow(Arc<InFlight>),
    /// Fetch, then publish to followers.
    Lead(Arc<InFlight>),
}

/// Publishes an outcome and clears the in-flight slot even if the leader unwinds.
struct LeaderGuard<'a> {
    cache: &'a RuleCache,
    flight: Arc<InFlight>,
    finished: bool,
}

impl LeaderGuard<'_> {
    fn finish(mut self, outcome: RefreshOutcome) -> RefreshOutcome {
        self.flight.complete(outcome.clone());
        *self.cache.in_flight.lock() = None;
        self.finished = true;
        outcome
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.flight
                .complete(Err(FetchError::network("rule refresh aborted")));
            *self.cache.in_flight.lock() = None;
        }
    }
}

/// Holds the latest committed rule set.
///
/// Readers get an `Arc` to an immutable snapshot. A refresh builds a new
/// snapshot and swaps it in whole; a failed or partial fetch leaves the
/// previous snapshot in place.
pub struct RuleCache {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: RuleCacheConfig,
    current: RwLock<Arc<RuleSnapshot>>,
    in_flight: Mutex<Option<Arc<InFlight>>>,
}

impl RuleCache {
    /// Loads the cache from `store`. An unreadable blob yields the empty snapshot.
    pub fn open(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, config: RuleCacheConfig) -> Self {
        let snapshot = load_snapshot(store.as_ref());
        Self {
            store,
            clock,
            config,
            current: RwLock::new(Arc::new(snapshot)),
            in_flight: Mutex::new(None),
        }
    }

    /// The current snapshot, possibly stale.
    pub fn get(&self) -> Arc<RuleSnapshot> {
        self.current.read().clone()
    }

    /// True if the current snapshot has expired.
    pub fn is_expired(&self) -> bool {
        self.get().is_expired_at(self.clock.now_ms())
    }

    /// The cache configuration.
    pub fn config(&self) -> &RuleCacheConfig {
        &self.config
    }

    /// Fetches new rules if forced or expired.
    ///
    /// Returns the current snapshot without fetching when polling is
    /// disabled, or when not forced and not expired. Concurrent callers share
    /// one fetch and all receive its outcome.
    ///
    /// # Errors
    ///
    /// Returns the fetch or parse error; the cache is left untouched.
    pub fn refresh<T: EngageTransport + ?Sized>(
        &self,
        transport: &T,
        forced: bool,
    ) -> Result<Arc<RuleSnapshot>, FetchError> {
        if !self.config.polling_enabled {
            debug!("rule polling disabled; keeping cached rules");
            return Ok(self.get());
        }
        if !forced && !self.is_expired() {
            return Ok(self.get());
        }

        let flight = match self.enter(forced) {
            Entry::Fresh(snapshot) => return Ok(snapshot),
            Entry::Follow(flight) => {
                debug!("joining in-flight rule refresh");
                return flight.wait();
            }
            Entry::Lead(flight) => flight,
        };

        let guard = LeaderGuard {
            cache: self,
            flight,
            finished: false,
        };
        let outcome = transport
            .fetch_rules()
            .and_then(|response| self.install(response));
        if let Err(e) = &outcome {
            info!(error = %e, "rule refresh failed; keeping cached rules");
        }
        guard.finish(outcome)
    }

    /// Joins the fetch in flight, or starts one.
    ///
    /// A leader commits its snapshot before clearing the slot, so an empty
    /// slot means any earlier fetch is already visible. Expiry is checked
    /// again here for callers that saw an expired cache just before that
    /// commit.
    fn enter(&self, forced: bool) -> Entry {
        let mut slot = self.in_flight.lock();
        if let Some(flight) = slot.as_ref() {
            return Entry::Follow(Arc::clone(flight));
        }
        if !forced && !self.is_expired() {
            return Entry::Fresh(self.get());
        }
        let flight = Arc::new(InFlight::default());
        *slot = Some(Arc::clone(&flight));
        Entry::Lead(flight)
    }

    /// Parses and commits a rule payload without fetching.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the payload is not a complete rule set.
    pub fn install(&self, response: RawRuleResponse) -> Result<Arc<RuleSnapshot>, FetchError> {
        let rules = RuleSet::from_json(response.body.as_bytes())?;
        let now = self.clock.now_ms();
        let lifetime = response
            .cache_lifetime
            .unwrap_or(self.config.default_lifetime);
        let snapshot = Arc::new(RuleSnapshot {
            rules,
            raw: Some(response.body),
            fetched_at: Some(now),
            expires_at: Some(after(now, lifetime)),
        });

        self.persist(&snapshot);
        *self.current.write() = snapshot.clone();
        info!(
            interactions = snapshot.rules.interaction_count(),
            targets = snapshot.rules.target_count(),
            lifetime_secs = lifetime.as_secs(),
            "rules updated"
        );
        Ok(snapshot)
    }

    /// Drops the cached rules, in memory and in storage.
    pub fn clear(&self) {
        if let Err(e) = self.store.delete(RULE_CACHE_KEY) {
            warn!(error = %e, "rule cache delete not durable this cycle");
        }
        *self.current.write() = Arc::new(RuleSnapshot::empty());
    }

    /// Time left before expiry, zero if expired.
    pub fn time_to_live(&self) -> Duration {
        let now = self.clock.now_ms();
        self.get()
            .expires_at
            .map_or(Duration::ZERO, |at| Duration::from_millis(at.saturating_sub(now)))
    }

    fn persist(&self, snapshot: &RuleSnapshot) {
        let (Some(raw), Some(fetched_at), Some(expires_at)) =
            (&snapshot.raw, snapshot.fetched_at, snapshot.expires_at)
        else {
            return;
        };
        let record = CachedRules {
            raw: raw.clone(),
            fetched_at,
            expires_at,
        };
        let result = encode_versioned(RULE_CACHE_FORMAT, &record)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.store
                    .put(RULE_CACHE_KEY, &bytes)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!(error = %e, "rule cache not durable this cycle");
        }
    }
}

fn load_snapshot(store: &dyn BlobStore) -> RuleSnapshot {
    let bytes = match store.get(RULE_CACHE_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return RuleSnapshot::empty(),
        Err(e) => {
            warn!(error = %e, "rule cache unavailable; starting empty");
            return RuleSnapshot::empty();
        }
    };
    let record: CachedRules = match decode_versioned(RULE_CACHE_FORMAT, &bytes) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "discarding unreadable rule cache");
            return RuleSnapshot::empty();
        }
    };
    match RuleSet::from_json(record.raw.as_bytes()) {
        Ok(rules) => RuleSnapshot {
            rules,
            raw: Some(record.raw),
            fetched_at: Some(record.fetched_at),
            expires_at: Some(record.expires_at),
        },
        Err(e) => {
            warn!(error = %e, "discarding cached rules that no longer parse");
            RuleSnapshot::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::MockTransport;
    use engage_storage::InMemoryStore;

    const RULES: &str = r#"{
        "interactions": [{"id": "s1", "type": "Survey", "configuration": {}}],
        "targets": {"local#app#launch": [{"interaction_id": "s1", "criteria": {}}]}
    }"#;

    fn cache(config: RuleCacheConfig) -> (RuleCache, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(10_000));
        let cache = RuleCache::open(store.clone(), clock.clone(), config);
        (cache, store, clock)
    }

    #[test]
    fn late_caller_does_not_refetch_committed_rules() {
        let (cache, _, _) = cache(RuleCacheConfig::default());
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new(RULES));

        // A caller that found the cache expired reaches the slot only after
        // the leader has committed and left.
        assert!(cache.is_expired());
        cache.refresh(&transport, false).unwrap();
        assert_eq!(transport.fetch_calls(), 1);

        let Entry::Fresh(snapshot) = cache.enter(false) else {
            panic!("fresh rules should not start another fetch");
        };
        assert_eq!(snapshot.rules.interaction_count(), 1);
        assert!(cache.in_flight.lock().is_none());

        assert!(matches!(cache.enter(true), Entry::Lead(_)));
    }

    #[test]
    fn starts_empty_and_expired() {
        let (cache, _, _) = cache(RuleCacheConfig::default());
        assert!(cache.get().rules.is_empty());
        assert!(cache.is_expired());
        assert_eq!(cache.time_to_live(), Duration::ZERO);
    }

    #[test]
    fn server_lifetime_overrides_default() {
        let (cache, _, clock) = cache(RuleCacheConfig::default());
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new(RULES).with_cache_lifetime(Duration::from_secs(60)));

        let snapshot = cache.refresh(&transport, false).unwrap();
        assert_eq!(snapshot.expires_at, Some(70_000));
        assert!(!cache.is_expired());

        cache.refresh(&transport, false).unwrap();
        assert_eq!(transport.fetch_calls(), 1);

        clock.advance(Duration::from_secs(60));
        assert!(cache.is_expired());
        cache.refresh(&transport, false).unwrap();
        assert_eq!(transport.fetch_calls(), 2);
    }

    #[test]
    fn default_lifetime_applies_without_hint() {
        let (cache, _, _) = cache(RuleCacheConfig::default().with_default_lifetime(Duration::from_secs(5)));
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new(RULES));
        assert_eq!(cache.refresh(&transport, false).unwrap().expires_at, Some(15_000));
    }

    #[test]
    fn forced_refresh_ignores_expiry() {
        let (cache, _, _) = cache(RuleCacheConfig::default());
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new(RULES));
        cache.refresh(&transport, false).unwrap();
        cache.refresh(&transport, true).unwrap();
        assert_eq!(transport.fetch_calls(), 2);
    }

    #[test]
    fn failure_keeps_last_good_rules() {
        let (cache, _, _) = cache(RuleCacheConfig::default());
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new(RULES));
        let good = cache.refresh(&transport, true).unwrap();

        transport.push_rules_result(Err(FetchError::network("offline")));
        assert!(cache.refresh(&transport, true).is_err());
        assert!(Arc::ptr_eq(&cache.get(), &good));

        transport.push_rules_result(Ok(RawRuleResponse::new(r#"{"targets": {}}"#)));
        assert!(matches!(
            cache.refresh(&transport, true),
            Err(FetchError::Parse(_))
        ));
        assert!(Arc::ptr_eq(&cache.get(), &good));
    }

    #[test]
    fn polling_disabled_never_fetches() {
        let (cache, _, _) = cache(RuleCacheConfig::default().with_polling(false));
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new(RULES));
        assert!(cache.refresh(&transport, true).unwrap().rules.is_empty());
        assert_eq!(transport.fetch_calls(), 0);
    }

    #[test]
    fn committed_rules_survive_reopen_in_order() {
        let (cache, store, clock) = cache(RuleCacheConfig::default());
        cache.install(RawRuleResponse::new(RULES)).unwrap();

        let reopened = RuleCache::open(store, clock, RuleCacheConfig::default());
        let snapshot = reopened.get();
        assert_eq!(snapshot.rules.interaction("s1").map(|d| d.id.as_str()), Some("s1"));
        assert_eq!(snapshot.fetched_at, Some(10_000));
    }

    #[test]
    fn clear_removes_blob() {
        let (cache, store, _) = cache(RuleCacheConfig::default());
        cache.install(RawRuleResponse::new(RULES)).unwrap();
        cache.clear();
        assert!(cache.get().rules.is_empty());
        assert!(!store.contains(RULE_CACHE_KEY).unwrap());
    }
}
