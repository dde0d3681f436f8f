//! Event ledger: invocation counters per event key and per interaction.

use engage_codec::{decode_versioned, encode_versioned};
use engage_storage::{BlobStore, StorageError, StorageResult};
use engage_targeting::InvocationStats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Storage key of the ledger blob.
pub const LEDGER_KEY: &str = "event_ledger";

const LEDGER_FORMAT: u16 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    app_version: String,
    app_build: String,
    installed_at: Option<u64>,
    code_points: BTreeMap<String, InvocationStats>,
    interactions: BTreeMap<String, InvocationStats>,
}

impl LedgerState {
    fn all_stats(&mut self) -> impl Iterator<Item = &mut InvocationStats> {
        self.code_points
            .values_mut()
            .chain(self.interactions.values_mut())
    }
}

struct Inner {
    state: LedgerState,
    dirty: bool,
}

/// Persisted invocation counters.
///
/// Counts are kept in total, since the current app version, and since the
/// current app build. Opening the ledger under a new version or build resets
/// the matching counters.
pub struct EventLedger {
    store: Arc<dyn BlobStore>,
    recent_limit: usize,
    inner: Mutex<Inner>,
}

impl EventLedger {
    /// Loads the ledger for the running app version and build.
    pub fn open(
        store: Arc<dyn BlobStore>,
        app_version: &str,
        app_build: &str,
        now_ms: u64,
        recent_limit: usize,
    ) -> Self {
        let mut state = load_state(store.as_ref());
        let mut changed = false;

        if state.installed_at.is_none() {
            state.installed_at = Some(now_ms);
            changed = true;
        }
        if state.app_version != app_version {
            info!(from = %state.app_version, to = %app_version, "app version changed; resetting version counters");
            state.all_stats().for_each(|s| s.version = 0);
            state.app_version = app_version.to_string();
            changed = true;
        }
        if state.app_build != app_build {
            info!(from = %state.app_build, to = %app_build, "app build changed; resetting build counters");
            state.all_stats().for_each(|s| s.build = 0);
            state.app_build = app_build.to_string();
            changed = true;
        }

        let ledger = Self {
            store,
            recent_limit,
            inner: Mutex::new(Inner {
                state,
                dirty: false,
            }),
        };
        if changed {
            ledger.persist(&mut ledger.inner.lock());
        }
        ledger
    }

    /// Loads the ledger as stored, without touching version counters.
    pub fn load(store: Arc<dyn BlobStore>, recent_limit: usize) -> Self {
        let state = load_state(store.as_ref());
        Self {
            store,
            recent_limit,
            inner: Mutex::new(Inner {
                state,
                dirty: false,
            }),
        }
    }

    /// App version the counters were last opened under.
    pub fn app_version(&self) -> String {
        self.inner.lock().state.app_version.clone()
    }

    /// App build the counters were last opened under.
    pub fn app_build(&self) -> String {
        self.inner.lock().state.app_build.clone()
    }

    /// Records one invocation of an event key and returns its counters.
    pub fn record_code_point(&self, key: &str, now_ms: u64) -> InvocationStats {
        let mut inner = self.inner.lock();
        let stats = inner.state.code_points.entry(key.to_string()).or_default();
        bump(stats, now_ms, self.recent_limit);
        let stats = stats.clone();
        self.persist(&mut inner);
        stats
    }

    /// Records one display of an interaction and returns its counters.
    pub fn record_interaction(&self, id: &str, now_ms: u64) -> InvocationStats {
        let mut inner = self.inner.lock();
        let stats = inner.state.interactions.entry(id.to_string()).or_default();
        bump(stats, now_ms, self.recent_limit);
        let stats = stats.clone();
        self.persist(&mut inner);
        stats
    }

    /// Counters for one event key.
    pub fn code_point(&self, key: &str) -> Option<InvocationStats> {
        self.inner.lock().state.code_points.get(key).cloned()
    }

    /// Counters for one interaction.
    pub fn interaction(&self, id: &str) -> Option<InvocationStats> {
        self.inner.lock().state.interactions.get(id).cloned()
    }

    /// Every event key's counters.
    pub fn code_points(&self) -> BTreeMap<String, InvocationStats> {
        self.inner.lock().state.code_points.clone()
    }

    /// Every interaction's counters.
    pub fn interactions(&self) -> BTreeMap<String, InvocationStats> {
        self.inner.lock().state.interactions.clone()
    }

    /// When the ledger was first created (milliseconds since the Unix epoch).
    pub fn installed_at(&self) -> u64 {
        self.inner.lock().state.installed_at.unwrap_or(0)
    }

    /// True if the last write reached storage.
    pub fn is_durable(&self) -> bool {
        !self.inner.lock().dirty
    }

    fn persist(&self, inner: &mut Inner) {
        match write_state(self.store.as_ref(), &inner.state) {
            Ok(()) => inner.dirty = false,
            Err(e) => {
                warn!(error = %e, "event ledger not durable this cycle");
                inner.dirty = true;
            }
        }
    }
}

fn bump(stats: &mut InvocationStats, now_ms: u64, recent_limit: usize) {
    stats.total += 1;
    stats.version += 1;
    stats.build += 1;
    stats.last_invoked_at = Some(now_ms);
    stats.recent.push(now_ms);
    if stats.recent.len() > recent_limit {
        let excess = stats.recent.len() - recent_limit;
        stats.recent.drain(..excess);
    }
}

fn load_state(store: &dyn BlobStore) -> LedgerState {
    match store.get(LEDGER_KEY) {
        Ok(Some(bytes)) => decode_versioned(LEDGER_FORMAT, &bytes).unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable event ledger");
            LedgerState::default()
        }),
        Ok(None) => LedgerState::default(),
        Err(e) => {
            warn!(error = %e, "event ledger unavailable; starting empty");
            LedgerState::default()
        }
    }
}

fn write_state(store: &dyn BlobStore, state: &LedgerState) -> StorageResult<()> {
    let bytes = encode_versioned(LEDGER_FORMAT, state)
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
    store.put(LEDGER_KEY, &bytes)
}
