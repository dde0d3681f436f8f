//! Last-sent profile baselines.

use super::delta::ProfileDiff;
use super::record::ProfileRecord;
use engage_codec::{decode_versioned, encode_versioned};
use engage_storage::{BlobStore, StorageError, StorageResult};
use engage_sync_engine::ProfileKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key of the baseline blob.
pub const BASELINE_KEY: &str = "profile_baseline";

const BASELINE_FORMAT: u16 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Baselines {
    device: Option<ProfileRecord>,
    person: Option<ProfileRecord>,
}

impl Baselines {
    fn slot(&mut self, kind: ProfileKind) -> &mut Option<ProfileRecord> {
        match kind {
            ProfileKind::Device => &mut self.device,
            ProfileKind::Person => &mut self.person,
        }
    }

    fn get(&self, kind: ProfileKind) -> Option<&ProfileRecord> {
        match kind {
            ProfileKind::Device => self.device.as_ref(),
            ProfileKind::Person => self.person.as_ref(),
        }
    }
}

struct Inner {
    baselines: Baselines,
    dirty: bool,
}

/// The last version of each profile the server confirmed receiving.
///
/// A baseline only moves forward when a profile diff is delivered. A lost
/// write leaves the previous baseline in place, which at worst re-sends
/// fields the server already has.
pub struct BaselineStore {
    store: Arc<dyn BlobStore>,
    inner: Mutex<Inner>,
}

impl BaselineStore {
    /// Loads baselines from `store`, starting empty if the blob is missing
    /// or unreadable.
    pub fn open(store: Arc<dyn BlobStore>) -> Self {
        let baselines = match store.get(BASELINE_KEY) {
            Ok(Some(bytes)) => decode_versioned(BASELINE_FORMAT, &bytes).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable profile baseline");
                Baselines::default()
            }),
            Ok(None) => Baselines::default(),
            Err(e) => {
                warn!(error = %e, "profile baseline unavailable; starting empty");
                Baselines::default()
            }
        };
        Self {
            store,
            inner: Mutex::new(Inner {
                baselines,
                dirty: false,
            }),
        }
    }

    /// The baseline for one profile kind.
    pub fn get(&self, kind: ProfileKind) -> Option<ProfileRecord> {
        self.inner.lock().baselines.get(kind).cloned()
    }

    /// The baseline with `pending` diffs applied in order.
    ///
    /// Returns `None` only when there is neither a baseline nor a pending
    /// diff.
    pub fn projected<'a, I>(&self, kind: ProfileKind, pending: I) -> Option<ProfileRecord>
    where
        I: IntoIterator<Item = &'a ProfileDiff>,
    {
        let mut projected = self.get(kind);
        for diff in pending {
            diff.apply_to(projected.get_or_insert_with(ProfileRecord::new));
        }
        projected
    }

    /// Applies a delivered diff to the baseline and returns the new baseline.
    pub fn advance(&self, kind: ProfileKind, diff: &ProfileDiff) -> ProfileRecord {
        let mut inner = self.inner.lock();
        let record = inner
            .baselines
            .slot(kind)
            .get_or_insert_with(ProfileRecord::new);
        diff.apply_to(record);
        let advanced = record.clone();
        debug!(kind = %kind, fields = advanced.len(), "profile baseline advanced");
        self.persist(&mut inner);
        advanced
    }

    /// Replaces the baseline outright.
    pub fn replace(&self, kind: ProfileKind, record: Option<ProfileRecord>) {
        let mut inner = self.inner.lock();
        *inner.baselines.slot(kind) = record;
        self.persist(&mut inner);
    }

    /// True if the last write reached storage.
    pub fn is_durable(&self) -> bool {
        !self.inner.lock().dirty
    }

    fn persist(&self, inner: &mut Inner) {
        match write_baselines(self.store.as_ref(), &inner.baselines) {
            Ok(()) => inner.dirty = false,
            Err(e) => {
                warn!(error = %e, "profile baseline not durable this cycle");
                inner.dirty = true;
            }
        }
    }
}

fn write_baselines(store: &dyn BlobStore, baselines: &Baselines) -> StorageResult<()> {
    let bytes = encode_versioned(BASELINE_FORMAT, baselines)
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
    store.put(BASELINE_KEY, &bytes)
}
