//! Sync coordinator: drains the payload queue and refreshes rules.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::payload::{PayloadEntry, SendOutcome, Settled};
use crate::queue::PayloadQueue;
use crate::rule_cache::{RuleCache, RuleSnapshot};
use crate::transport::EngageTransport;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the coordinator is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in progress.
    Idle,
    /// A payload send is in progress.
    Sending,
    /// A rule fetch is in progress.
    Fetching,
    /// The queue head is waiting out its backoff.
    Backoff,
    /// The last operation failed.
    Error,
}

impl SyncState {
    /// Returns true while a network operation is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Sending | SyncState::Fetching)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Payloads delivered.
    pub delivered: u64,
    /// Retryable send failures.
    pub retried: u64,
    /// Payloads rejected permanently.
    pub rejected: u64,
    /// Successful rule fetches that committed new rules.
    pub fetches: u64,
    /// Failed rule fetches.
    pub fetch_failures: u64,
    /// Time of the last send attempt (milliseconds since the Unix epoch).
    pub last_send_at: Option<u64>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one [`SyncCoordinator::drain_once`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing could be sent.
    Idle,
    /// The entry was delivered.
    Delivered {
        /// Entry id.
        id: u64,
    },
    /// The entry failed transiently and will be retried.
    Retrying {
        /// Entry id.
        id: u64,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// The entry was rejected permanently.
    Rejected {
        /// Entry id.
        id: u64,
    },
}

/// Totals from [`SyncCoordinator::drain_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Entries delivered.
    pub delivered: usize,
    /// Entries sent back to pending.
    pub retrying: usize,
    /// Entries rejected.
    pub rejected: usize,
}

impl DrainSummary {
    /// Total send attempts.
    pub fn attempts(&self) -> usize {
        self.delivered + self.retrying + self.rejected
    }
}

/// Callbacks for settled payloads and rule updates.
///
/// This is where the engine advances profile baselines, cleans up
/// attachments and notifies listeners. Hooks run on the coordinator's
/// thread after the queue has recorded the outcome.
pub trait DeliveryHook: Send + Sync {
    /// A payload was delivered.
    fn on_delivered(&self, entry: &PayloadEntry, remote_id: Option<&str>);

    /// A payload was rejected permanently.
    fn on_rejected(&self, entry: &PayloadEntry, reason: &str);

    /// A refresh committed new rules.
    fn on_rules_updated(&self, _snapshot: &RuleSnapshot) {}
}

/// A hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl DeliveryHook for NoopHook {
    fn on_delivered(&self, _entry: &PayloadEntry, _remote_id: Option<&str>) {}

    fn on_rejected(&self, _entry: &PayloadEntry, _reason: &str) {}
}

/// Drives payload delivery and rule refresh against a transport.
pub struct SyncCoordinator<T: EngageTransport, H: DeliveryHook> {
    config: SyncConfig,
    transport: Arc<T>,
    queue: Arc<PayloadQueue>,
    rules: Arc<RuleCache>,
    hook: Arc<H>,
    clock: Arc<dyn Clock>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: EngageTransport, H: DeliveryHook> SyncCoordinator<T, H> {
    /// Creates a new coordinator.
    pub fn new(
        config: SyncConfig,
        transport: Arc<T>,
        queue: Arc<PayloadQueue>,
        rules: Arc<RuleCache>,
        hook: Arc<H>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            queue,
            rules,
            hook,
            clock,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The transport in use.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The queue being drained.
    pub fn queue(&self) -> &Arc<PayloadQueue> {
        &self.queue
    }

    /// The rule cache being refreshed.
    pub fn rules(&self) -> &Arc<RuleCache> {
        &self.rules
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Sends at most one payload and records its outcome.
    ///
    /// Returns [`DrainOutcome::Idle`] without side effects when nothing is
    /// sendable.
    ///
    /// # Errors
    ///
    /// Fails only if the queue refuses a transition, which means another
    /// party mutated the claimed entry.
    pub fn drain_once(&self) -> SyncResult<DrainOutcome> {
        let Some(entry) = self.queue.claim_next() else {
            let stats = self.queue.stats();
            self.set_state(if stats.pending > 0 && stats.sending == 0 {
                SyncState::Backoff
            } else {
                SyncState::Idle
            });
            return Ok(DrainOutcome::Idle);
        };

        self.set_state(SyncState::Sending);
        debug!(id = entry.id, kind = %entry.kind, attempt = entry.retry_count + 1, "sending payload");
        let outcome = self.transport.send_payload(&entry);
        self.stats.write().last_send_at = Some(self.clock.now_ms());

        let settled = match self.queue.mark_result(entry.id, &outcome) {
            Ok(settled) => settled,
            Err(e) => {
                self.handle_error(&e.to_string());
                return Err(e.into());
            }
        };

        let result = match &settled {
            Settled::Delivered { entry, .. } => {
                let remote_id = match &outcome {
                    SendOutcome::Success { remote_id } => remote_id.as_deref(),
                    _ => None,
                };
                self.stats.write().delivered += 1;
                self.hook.on_delivered(entry, remote_id);
                DrainOutcome::Delivered { id: entry.id }
            }
            Settled::WillRetry { entry, delay } => {
                let mut stats = self.stats.write();
                stats.retried += 1;
                stats.last_error = entry.last_error.clone();
                DrainOutcome::Retrying {
                    id: entry.id,
                    delay: *delay,
                }
            }
            Settled::Rejected { entry } => {
                {
                    let mut stats = self.stats.write();
                    stats.rejected += 1;
                    stats.last_error = entry.last_error.clone();
                }
                let reason = entry.last_error.as_deref().unwrap_or("rejected");
                self.hook.on_rejected(entry, reason);
                DrainOutcome::Rejected { id: entry.id }
            }
        };

        self.set_state(SyncState::Idle);
        Ok(result)
    }

    /// Sends until the queue is idle, a send must wait for backoff, or the
    /// configured batch limit is reached.
    ///
    /// # Errors
    ///
    /// See [`SyncCoordinator::drain_once`].
    pub fn drain_all(&self) -> SyncResult<DrainSummary> {
        let mut summary = DrainSummary::default();
        while summary.attempts() < self.config.drain_batch_limit {
            match self.drain_once()? {
                DrainOutcome::Idle => break,
                DrainOutcome::Delivered { .. } => summary.delivered += 1,
                DrainOutcome::Rejected { .. } => summary.rejected += 1,
                DrainOutcome::Retrying { .. } => {
                    summary.retrying += 1;
                    break;
                }
            }
        }
        Ok(summary)
    }

    /// Refreshes rules if expired, or always when `force_refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; cached rules remain in use.
    pub fn refresh_rules(&self) -> SyncResult<Arc<RuleSnapshot>> {
        let before = self.rules.get();
        self.set_state(SyncState::Fetching);
        match self.rules.refresh(self.transport.as_ref(), self.config.force_refresh) {
            Ok(snapshot) => {
                if !Arc::ptr_eq(&before, &snapshot) {
                    self.stats.write().fetches += 1;
                    self.hook.on_rules_updated(&snapshot);
                }
                self.set_state(SyncState::Idle);
                Ok(snapshot)
            }
            Err(e) => {
                self.stats.write().fetch_failures += 1;
                self.handle_error(&e.to_string());
                Err(e.into())
            }
        }
    }

    fn handle_error(&self, message: &str) {
        warn!(error = %message, "sync operation failed");
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(message.to_string());
    }
}
