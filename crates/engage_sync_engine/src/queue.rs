//! Durable, ordered, single-flight payload queue.
//!
//! Every mutation rewrites the whole queue blob. A write that fails leaves
//! the in-memory queue authoritative and marks it dirty; the next mutation
//! or [`PayloadQueue::flush`] tries again.

use crate::clock::{after, Clock};
use crate::config::RetryConfig;
use crate::error::{QueueError, QueueResult};
use crate::payload::{
    NewPayload, PayloadEntry, PayloadKind, PayloadState, ProfileKind, SendOutcome, Settled,
};
use engage_codec::{decode_versioned, encode_versioned};
use engage_storage::{BlobStore, StorageResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Blob key of the persisted queue.
pub const QUEUE_KEY: &str = "payload_queue";

const QUEUE_FORMAT: u16 = 1;

/// Entry counts by state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Entries waiting to be sent.
    pub pending: usize,
    /// Entries being sent (0 or 1).
    pub sending: usize,
    /// Delivered entries not yet pruned.
    pub sent: usize,
    /// Rejected entries not yet pruned.
    pub failed_permanent: usize,
    /// True if the latest state has not reached storage.
    pub not_durable: bool,
}

impl QueueStats {
    /// Total entries.
    pub fn total(&self) -> usize {
        self.pending + self.sending + self.sent + self.failed_permanent
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct QueueState {
    next_id: u64,
    entries: Vec<PayloadEntry>,
}

struct Inner {
    state: QueueState,
    dirty: bool,
}

/// The outbound payload queue.
pub struct PayloadQueue {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    inner: Mutex<Inner>,
}

impl PayloadQueue {
    /// Loads the queue from `store`.
    ///
    /// A missing or unreadable blob yields an empty queue. An entry that was
    /// `Sending` when the process stopped is returned to `Pending` without
    /// counting a retry.
    pub fn open(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, retry: RetryConfig) -> Self {
        let mut state = load_state(store.as_ref());

        for entry in &mut state.entries {
            if entry.state == PayloadState::Sending {
                info!(id = entry.id, "returning interrupted payload to pending");
                entry.state = PayloadState::Pending;
                entry.next_attempt_at = None;
            }
        }
        let max_id = state.entries.iter().map(|e| e.id).max().unwrap_or(0);
        state.next_id = state.next_id.max(max_id + 1).max(1);
        state.entries.sort_by_key(|e| e.id);

        debug!(entries = state.entries.len(), "payload queue opened");
        Self {
            store,
            clock,
            retry,
            inner: Mutex::new(Inner {
                state,
                dirty: false,
            }),
        }
    }

    /// Appends a payload and returns its local id.
    pub fn enqueue(&self, kind: PayloadKind, body: impl Into<String>) -> u64 {
        self.enqueue_with(NewPayload::new(kind, body))
    }

    /// Appends a payload with a nonce and attachment.
    pub fn enqueue_with(&self, payload: NewPayload) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.state.next_id;
        inner.state.next_id += 1;
        inner.state.entries.push(PayloadEntry {
            id,
            nonce: payload.nonce.unwrap_or_else(Uuid::new_v4),
            kind: payload.kind,
            body: payload.body,
            state: PayloadState::Pending,
            created_at: self.clock.now_ms(),
            retry_count: 0,
            next_attempt_at: None,
            attachment: payload.attachment,
            last_error: None,
        });
        debug!(id, kind = %payload.kind, "payload enqueued");
        self.persist(&mut inner);
        id
    }

    /// The next entry to send, if one may be sent now.
    ///
    /// Returns `None` while any entry is `Sending`, and while the oldest
    /// pending entry is still waiting out its backoff. Later entries never
    /// overtake it.
    pub fn peek_next(&self) -> Option<PayloadEntry> {
        let inner = self.inner.lock();
        self.head(&inner.state).cloned()
    }

    /// Claims an entry for sending.
    ///
    /// # Errors
    ///
    /// Fails if another entry is in flight, the id is unknown, or the entry is
    /// not pending.
    pub fn mark_sending(&self, id: u64) -> QueueResult<PayloadEntry> {
        let mut inner = self.inner.lock();
        if let Some(busy) = in_flight(&inner.state) {
            return Err(QueueError::AlreadyInFlight { in_flight: busy });
        }
        let entry = find_mut(&mut inner.state, id)?;
        if entry.state != PayloadState::Pending {
            return Err(transition(entry, PayloadState::Sending));
        }
        entry.state = PayloadState::Sending;
        let claimed = entry.clone();
        self.persist(&mut inner);
        Ok(claimed)
    }

    /// Atomically peeks and claims the next sendable entry.
    pub fn claim_next(&self) -> Option<PayloadEntry> {
        let mut inner = self.inner.lock();
        let id = self.head(&inner.state)?.id;
        let entry = find_mut(&mut inner.state, id).ok()?;
        entry.state = PayloadState::Sending;
        let claimed = entry.clone();
        self.persist(&mut inner);
        Some(claimed)
    }

    /// Applies the outcome of a send attempt to a `Sending` entry.
    ///
    /// # Errors
    ///
    /// Fails if the id is unknown or the entry is not `Sending`.
    pub fn mark_result(&self, id: u64, outcome: &SendOutcome) -> QueueResult<Settled> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let entry = find_mut(&mut inner.state, id)?;
        if entry.state != PayloadState::Sending {
            let to = match outcome {
                SendOutcome::Success { .. } => PayloadState::Sent,
                SendOutcome::RetryableFailure { .. } => PayloadState::Pending,
                SendOutcome::PermanentRejection { .. } => PayloadState::FailedPermanent,
            };
            return Err(transition(entry, to));
        }

        let settled = match outcome {
            SendOutcome::Success { .. } => {
                entry.state = PayloadState::Sent;
                entry.next_attempt_at = None;
                entry.last_error = None;
                let removed = entry.kind.is_hidden();
                let snapshot = entry.clone();
                if removed {
                    inner.state.entries.retain(|e| e.id != id);
                }
                debug!(id, removed, "payload delivered");
                Settled::Delivered {
                    entry: snapshot,
                    removed,
                }
            }
            SendOutcome::RetryableFailure { reason } => {
                entry.retry_count = entry.retry_count.saturating_add(1);
                let delay = self.retry.delay_for_attempt(entry.retry_count);
                entry.state = PayloadState::Pending;
                entry.next_attempt_at = Some(after(now, delay));
                entry.last_error = Some(reason.clone());
                info!(id, retry = entry.retry_count, ?delay, reason = %reason, "payload will retry");
                Settled::WillRetry {
                    entry: entry.clone(),
                    delay,
                }
            }
            SendOutcome::PermanentRejection { reason } => {
                entry.state = PayloadState::FailedPermanent;
                entry.next_attempt_at = None;
                entry.last_error = Some(reason.clone());
                warn!(id, kind = %entry.kind, reason = %reason, "payload rejected permanently");
                Settled::Rejected {
                    entry: entry.clone(),
                }
            }
        };

        self.persist(&mut inner);
        Ok(settled)
    }

    /// Removes every `Sent` and `FailedPermanent` entry and returns them.
    pub fn remove_terminal(&self) -> Vec<PayloadEntry> {
        let mut inner = self.inner.lock();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.state.entries)
            .into_iter()
            .partition(|e| e.state.is_terminal());
        inner.state.entries = kept;
        if !removed.is_empty() {
            debug!(count = removed.len(), "pruned terminal payloads");
            self.persist(&mut inner);
        }
        removed
    }

    /// Looks up one entry.
    pub fn get(&self, id: u64) -> Option<PayloadEntry> {
        self.inner
            .lock()
            .state
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// All entries in id order.
    pub fn entries(&self) -> Vec<PayloadEntry> {
        self.inner.lock().state.entries.clone()
    }

    /// Non-terminal profile diffs of one kind, in id order.
    pub fn outstanding_diffs(&self, kind: ProfileKind) -> Vec<PayloadEntry> {
        self.inner
            .lock()
            .state
            .entries
            .iter()
            .filter(|e| e.kind == PayloadKind::ProfileDiff(kind) && !e.state.is_terminal())
            .cloned()
            .collect()
    }

    /// Number of entries, terminal ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().state.entries.len()
    }

    /// True if the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts by state.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let mut stats = QueueStats {
            not_durable: inner.dirty,
            ..QueueStats::default()
        };
        for entry in &inner.state.entries {
            match entry.state {
                PayloadState::Pending => stats.pending += 1,
                PayloadState::Sending => stats.sending += 1,
                PayloadState::Sent => stats.sent += 1,
                PayloadState::FailedPermanent => stats.failed_permanent += 1,
            }
        }
        stats
    }

    /// Writes the queue to storage now.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails; the queue stays dirty.
    pub fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let result = write_state(self.store.as_ref(), &inner.state);
        inner.dirty = result.is_err();
        result
    }

    fn head<'a>(&self, state: &'a QueueState) -> Option<&'a PayloadEntry> {
        if in_flight(state).is_some() {
            return None;
        }
        let head = state
            .entries
            .iter()
            .find(|e| e.state == PayloadState::Pending)?;
        match head.next_attempt_at {
            Some(at) if at > self.clock.now_ms() => None,
            _ => Some(head),
        }
    }

    fn persist(&self, inner: &mut Inner) {
        match write_state(self.store.as_ref(), &inner.state) {
            Ok(()) => inner.dirty = false,
            Err(e) => {
                warn!(error = %e, "payload queue not durable this cycle");
                inner.dirty = true;
            }
        }
    }
}

fn load_state(store: &dyn BlobStore) -> QueueState {
    match store.get(QUEUE_KEY) {
        Ok(Some(bytes)) => decode_versioned(QUEUE_FORMAT, &bytes).unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable payload queue");
            QueueState::default()
        }),
        Ok(None) => QueueState::default(),
        Err(e) => {
            warn!(error = %e, "payload queue unavailable; starting empty");
            QueueState::default()
        }
    }
}

fn write_state(store: &dyn BlobStore, state: &QueueState) -> StorageResult<()> {
    let bytes = encode_versioned(QUEUE_FORMAT, state)
        .map_err(|e| engage_storage::StorageError::Unavailable(e.to_string()))?;
    store.put(QUEUE_KEY, &bytes)
}

fn in_flight(state: &QueueState) -> Option<u64> {
    state
        .entries
        .iter()
        .find(|e| e.state == PayloadState::Sending)
        .map(|e| e.id)
}

fn find_mut(state: &mut QueueState, id: u64) -> QueueResult<&mut PayloadEntry> {
    state
        .entries
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or(QueueError::NotFound { id })
}

fn transition(entry: &PayloadEntry, to: PayloadState) -> QueueError {
    QueueError::InvalidTransition {
        id: entry.id,
        from: entry.state.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use engage_storage::InMemoryStore;
    use std::time::Duration;

    fn queue() -> (PayloadQueue, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let retry = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(60));
        let queue = PayloadQueue::open(store.clone(), clock.clone(), retry);
        (queue, store, clock)
    }

    #[test]
    fn single_flight_and_fifo() {
        let (queue, _, _) = queue();
        let ids: Vec<u64> = (0..3)
            .map(|i| queue.enqueue(PayloadKind::Message, format!("{{\"n\":{i}}}")))
            .collect();
        assert_eq!(ids, [1, 2, 3]);

        queue.mark_sending(1).unwrap();
        assert_eq!(queue.peek_next(), None);

        queue.mark_result(1, &SendOutcome::success()).unwrap();
        assert_eq!(queue.peek_next().map(|e| e.id), Some(2));
    }

    #[test]
    fn second_claim_is_refused() {
        let (queue, _, _) = queue();
        queue.enqueue(PayloadKind::Message, "{}");
        queue.enqueue(PayloadKind::Message, "{}");
        queue.mark_sending(1).unwrap();
        assert_eq!(
            queue.mark_sending(2),
            Err(QueueError::AlreadyInFlight { in_flight: 1 })
        );
        assert_eq!(queue.claim_next(), None);
    }

    #[test]
    fn uncapped_backoff_parks_entry_without_panicking() {
        let clock = Arc::new(ManualClock::new(1_000));
        let retry = RetryConfig::new().with_max_delay(Duration::MAX);
        let queue = PayloadQueue::open(Arc::new(InMemoryStore::new()), clock, retry);
        let id = queue.enqueue(PayloadKind::Message, "{}");

        for _ in 0..100 {
            queue.mark_sending(id).unwrap();
            queue
                .mark_result(id, &SendOutcome::retryable("offline"))
                .unwrap();
        }

        let entry = queue.get(id).unwrap();
        assert_eq!(entry.retry_count, 100);
        assert_eq!(entry.next_attempt_at, Some(u64::MAX));
        assert_eq!(queue.peek_next(), None);
    }

    #[test]
    fn retry_gates_head_without_overtaking() {
        let (queue, _, clock) = queue();
        queue.enqueue(PayloadKind::Message, "{}");
        queue.enqueue(PayloadKind::Message, "{}");

        queue.mark_sending(1).unwrap();
        let settled = queue
            .mark_result(1, &SendOutcome::retryable("offline"))
            .unwrap();
        assert!(matches!(
            settled,
            Settled::WillRetry { delay, .. } if delay == Duration::from_secs(1)
        ));
        assert_eq!(queue.peek_next(), None);

        clock.advance(Duration::from_secs(1));
        let head = queue.peek_next().unwrap();
        assert_eq!(head.id, 1);
        assert_eq!(head.retry_count, 1);
        assert_eq!(head.last_error.as_deref(), Some("offline"));
    }

    #[test]
    fn rejection_is_terminal() {
        let (queue, _, _) = queue();
        let id = queue.enqueue(PayloadKind::Message, "{}");
        queue.mark_sending(id).unwrap();
        let settled = queue
            .mark_result(id, &SendOutcome::rejected("413 payload too large"))
            .unwrap();
        assert!(matches!(settled, Settled::Rejected { .. }));
        assert_eq!(queue.peek_next(), None);
        assert!(matches!(
            queue.mark_sending(id),
            Err(QueueError::InvalidTransition { .. })
        ));
        assert_eq!(queue.stats().failed_permanent, 1);
    }

    #[test]
    fn hidden_payload_is_deleted_on_success() {
        let (queue, _, _) = queue();
        let id = queue.enqueue(PayloadKind::HiddenMessage, "{}");
        queue.mark_sending(id).unwrap();
        let settled = queue.mark_result(id, &SendOutcome::success()).unwrap();
        assert!(matches!(settled, Settled::Delivered { removed: true, .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn result_requires_sending() {
        let (queue, _, _) = queue();
        let id = queue.enqueue(PayloadKind::Event, "{}");
        assert!(matches!(
            queue.mark_result(id, &SendOutcome::success()),
            Err(QueueError::InvalidTransition { .. })
        ));
        assert_eq!(
            queue.mark_result(99, &SendOutcome::success()),
            Err(QueueError::NotFound { id: 99 })
        );
    }

    #[test]
    fn remove_terminal_keeps_live_entries() {
        let (queue, _, _) = queue();
        for _ in 0..3 {
            queue.enqueue(PayloadKind::Message, "{}");
        }
        queue.mark_sending(1).unwrap();
        queue.mark_result(1, &SendOutcome::success()).unwrap();
        queue.mark_sending(2).unwrap();
        queue.mark_result(2, &SendOutcome::rejected("bad")).unwrap();

        let removed = queue.remove_terminal();
        assert_eq!(removed.iter().map(|e| e.id).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(queue.entries().iter().map(|e| e.id).collect::<Vec<_>>(), [3]);
    }

    #[test]
    fn reopen_reverts_sending_and_keeps_ids() {
        let (queue, store, clock) = queue();
        queue.enqueue(PayloadKind::Message, "a");
        queue.enqueue(PayloadKind::Message, "b");
        queue.mark_sending(1).unwrap();
        drop(queue);

        let reopened = PayloadQueue::open(store, clock, RetryConfig::default());
        let head = reopened.peek_next().unwrap();
        assert_eq!(head.id, 1);
        assert_eq!(head.state, PayloadState::Pending);
        assert_eq!(head.retry_count, 0);
        assert_eq!(reopened.enqueue(PayloadKind::Message, "c"), 3);
    }

    #[test]
    fn garbage_blob_starts_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.put(QUEUE_KEY, &[0xff, 0x00, 0x01]).unwrap();
        let queue = PayloadQueue::open(
            store,
            Arc::new(ManualClock::new(0)),
            RetryConfig::default(),
        );
        assert!(queue.is_empty());
        assert_eq!(queue.enqueue(PayloadKind::Event, "{}"), 1);
    }

    #[test]
    fn outstanding_diffs_filters_by_kind() {
        let (queue, _, _) = queue();
        queue.enqueue(PayloadKind::ProfileDiff(ProfileKind::Person), "{}");
        queue.enqueue(PayloadKind::ProfileDiff(ProfileKind::Device), "{}");
        queue.enqueue(PayloadKind::ProfileDiff(ProfileKind::Person), "{}");
        let ids: Vec<u64> = queue
            .outstanding_diffs(ProfileKind::Person)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, [1, 3]);
    }
}
