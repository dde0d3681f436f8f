//! The engagement engine.

use crate::auto_message::{AutoMessageState, AutoMessageStore, LegacyAutoMessageFlags};
use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::ledger::EventLedger;
use crate::message::MessageDraft;
use crate::notify::{EngagementEvent, EngagementListener, ListenerId, Notifier};
use crate::profile::{diff, BaselineStore, DeviceInfo, PersonInfo, ProfileDiff, ProfileRecord};
use engage_codec::CodecError;
use engage_storage::{BlobStore, FileStore};
use engage_sync_engine::{
    Clock, DeliveryHook, DrainOutcome, DrainSummary, EngageTransport, NewPayload, PayloadEntry,
    PayloadKind, PayloadQueue, ProfileKind, QueueStats, RawRuleResponse, RuleCache, RuleSnapshot,
    SyncCoordinator, SyncState, SyncStats, SystemClock,
};
use engage_targeting::{resolve, EventName, FactSnapshot, InteractionDefinition};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Applies settled payloads to local state.
struct EngineHook {
    baselines: Arc<BaselineStore>,
    notifier: Arc<Notifier>,
    delete_attachments: bool,
}

impl EngineHook {
    fn remove_attachment(&self, entry: &PayloadEntry) {
        if !self.delete_attachments {
            return;
        }
        let Some(path) = entry.attachment.as_deref() else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => debug!(id = entry.id, path = %path.display(), "attachment deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(id = entry.id, path = %path.display(), error = %e, "attachment not deleted"),
        }
    }
}

impl DeliveryHook for EngineHook {
    fn on_delivered(&self, entry: &PayloadEntry, remote_id: Option<&str>) {
        if let Some(kind) = entry.kind.profile() {
            match ProfileDiff::from_payload_body(kind, &entry.body) {
                Some(d) => {
                    self.baselines.advance(kind, &d);
                }
                None => warn!(id = entry.id, kind = %kind, "delivered profile diff is unreadable; baseline unchanged"),
            }
        }
        if entry.kind.is_hidden() {
            self.remove_attachment(entry);
        }
        self.notifier.emit(EngagementEvent::PayloadDelivered {
            id: entry.id,
            kind: entry.kind,
            remote_id: remote_id.map(str::to_string),
        });
    }

    fn on_rejected(&self, entry: &PayloadEntry, reason: &str) {
        self.remove_attachment(entry);
        self.notifier.emit(EngagementEvent::PayloadRejected {
            id: entry.id,
            kind: entry.kind,
            reason: reason.to_string(),
            attachment: entry.attachment.clone(),
        });
    }

    fn on_rules_updated(&self, snapshot: &RuleSnapshot) {
        self.notifier.emit(rules_updated(snapshot));
    }
}

fn rules_updated(snapshot: &RuleSnapshot) -> EngagementEvent {
    EngagementEvent::RulesUpdated {
        interactions: snapshot.rules.interaction_count(),
        targets: snapshot.rules.target_count(),
    }
}

#[derive(Serialize)]
struct EventWire<'a> {
    nonce: String,
    label: &'a str,
    client_created_at: f64,
}

#[derive(Serialize)]
struct EventBody<'a> {
    event: EventWire<'a>,
}

#[derive(Default)]
struct CurrentProfiles {
    device: Option<ProfileRecord>,
    person: Option<ProfileRecord>,
}

/// The engagement engine.
///
/// One instance owns the rule cache, the payload queue, the event ledger
/// and the profile baselines for one data store. Construct it once and share
/// it by reference; there is no global state.
///
/// # Opening an engine
///
/// ```rust,ignore
/// use engage_core::{Engagement, EngineConfig};
/// use std::path::Path;
///
/// let config = EngineConfig::new().app("2.1.0", "42");
/// let engine = Engagement::open(Path::new("engage_data"), config, transport)?;
///
/// if let Some(interaction) = engine.record_event("local", "app", "launch") {
///     // present the interaction
/// }
/// ```
pub struct Engagement<T: EngageTransport> {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    coordinator: SyncCoordinator<T, EngineHook>,
    ledger: EventLedger,
    baselines: Arc<BaselineStore>,
    auto_message: AutoMessageStore,
    notifier: Arc<Notifier>,
    profiles: RwLock<CurrentProfiles>,
    profile_lock: Mutex<()>,
}

impl<T: EngageTransport> Engagement<T> {
    /// Opens an engine backed by a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or another
    /// process holds its lock.
    pub fn open(path: &Path, config: EngineConfig, transport: T) -> CoreResult<Self> {
        let store = FileStore::open(path)?;
        Ok(Self::new(config, Arc::new(store), transport))
    }

    /// Creates an engine over any blob store, using the system clock.
    pub fn new(config: EngineConfig, store: Arc<dyn BlobStore>, transport: T) -> Self {
        Self::with_clock(config, store, transport, Arc::new(SystemClock))
    }

    /// Creates an engine with an explicit clock.
    ///
    /// Every persisted component is loaded from `store`; unreadable blobs are
    /// discarded and the component starts from defaults.
    pub fn with_clock(
        config: EngineConfig,
        store: Arc<dyn BlobStore>,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_ms();
        let notifier = Arc::new(Notifier::new());
        let baselines = Arc::new(BaselineStore::open(Arc::clone(&store)));
        let queue = Arc::new(PayloadQueue::open(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.retry.clone(),
        ));
        let rules = Arc::new(RuleCache::open(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.rule_cache_config(),
        ));
        let hook = Arc::new(EngineHook {
            baselines: Arc::clone(&baselines),
            notifier: Arc::clone(&notifier),
            delete_attachments: config.delete_attachments_on_terminal,
        });
        let coordinator = SyncCoordinator::new(
            config.sync_config(),
            Arc::new(transport),
            queue,
            rules,
            hook,
            Arc::clone(&clock),
        );
        let ledger = EventLedger::open(
            Arc::clone(&store),
            &config.app_version,
            &config.app_build,
            now,
            config.recent_invocation_limit,
        );
        let auto_message = AutoMessageStore::open(store);

        let stats = coordinator.queue().stats();
        info!(
            app_version = %config.app_version,
            pending = stats.pending,
            interactions = coordinator.rules().get().rules.interaction_count(),
            "engagement engine opened"
        );

        Self {
            config,
            clock,
            coordinator,
            ledger,
            baselines,
            auto_message,
            notifier,
            profiles: RwLock::new(CurrentProfiles::default()),
            profile_lock: Mutex::new(()),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        self.coordinator.transport()
    }

    // ========================================================================
    // Events and targeting
    // ========================================================================

    /// Records an event and returns the interaction to present, if any.
    ///
    /// The invocation is counted and queued for delivery before rules are
    /// evaluated, so criteria see the count including this invocation.
    pub fn record_event(
        &self,
        vendor: &str,
        interaction: &str,
        label: &str,
    ) -> Option<InteractionDefinition> {
        let event = EventName::new(vendor, interaction, label);
        let key = self.count_event(&event);
        let facts = self.facts();
        self.select(&key, &facts)
    }

    /// Records an event raised by the host app (`local#app#<label>`).
    pub fn record_local_event(&self, label: &str) -> Option<InteractionDefinition> {
        let event = EventName::local(label);
        let key = self.count_event(&event);
        let facts = self.facts();
        self.select(&key, &facts)
    }

    /// Records an event and evaluates rules against caller-supplied facts.
    pub fn record_event_with_facts(
        &self,
        event: &EventName,
        facts: &FactSnapshot,
    ) -> Option<InteractionDefinition> {
        let key = self.count_event(event);
        self.select(&key, facts)
    }

    /// Resolves an event without recording anything.
    pub fn resolve(&self, event: &EventName, facts: &FactSnapshot) -> Option<InteractionDefinition> {
        let snapshot = self.coordinator.rules().get();
        resolve(&snapshot.rules, event, facts).cloned()
    }

    /// A fact snapshot of the current counters and profiles.
    pub fn facts(&self) -> FactSnapshot {
        let profiles = self.profiles.read();
        let device = profiles
            .device
            .clone()
            .or_else(|| self.baselines.get(ProfileKind::Device))
            .unwrap_or_default();
        let person = profiles
            .person
            .clone()
            .or_else(|| self.baselines.get(ProfileKind::Person))
            .unwrap_or_default();
        let custom_data = person.submap("custom_data").cloned().unwrap_or_default();

        FactSnapshot::builder(self.clock.now_ms())
            .installed_at(self.ledger.installed_at())
            .code_points(self.ledger.code_points())
            .interactions(self.ledger.interactions())
            .device(device.into_map())
            .person(person.into_map())
            .custom_data(custom_data)
            .build()
    }

    /// The event ledger.
    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    fn count_event(&self, event: &EventName) -> String {
        let key = event.canonical();
        let now = self.clock.now_ms();
        let stats = self.ledger.record_code_point(&key, now);
        debug!(event = %key, total = stats.total, "event recorded");

        match event_body(&key, now) {
            Ok(body) => {
                self.coordinator.queue().enqueue(PayloadKind::Event, body);
            }
            Err(e) => warn!(event = %key, error = %e, "event payload not queued"),
        }
        key
    }

    fn select(&self, key: &str, facts: &FactSnapshot) -> Option<InteractionDefinition> {
        let snapshot = self.coordinator.rules().get();
        let selected = engage_targeting::resolve_key(&snapshot.rules, key, facts)?.clone();

        self.ledger.record_interaction(&selected.id, self.clock.now_ms());
        info!(event = %key, interaction = %selected.id, kind = %selected.kind, "interaction selected");
        self.notifier.emit(EngagementEvent::InteractionResolved {
            event: key.to_string(),
            interaction_id: selected.id.clone(),
        });
        Some(selected)
    }

    // ========================================================================
    // Outbound payloads
    // ========================================================================

    /// Queues a message and returns its queue id.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the body cannot be serialized.
    pub fn enqueue_message(&self, draft: MessageDraft) -> CoreResult<u64> {
        let body = draft.to_payload_body(self.clock.now_ms())?;
        let kind = if draft.is_hidden() {
            PayloadKind::HiddenMessage
        } else {
            PayloadKind::Message
        };
        let mut payload = NewPayload::new(kind, body).with_nonce(draft.nonce());
        if let Some(path) = draft.attachment() {
            payload = payload.with_attachment(path);
        }
        Ok(self.coordinator.queue().enqueue_with(payload))
    }

    /// Queues the changes between the last-sent profile and `current`.
    ///
    /// The comparison is against the baseline with every still-queued diff of
    /// the same kind applied, so nothing already queued is queued again.
    /// Returns `None` when there is nothing to send.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the diff cannot be serialized.
    pub fn enqueue_profile_update(
        &self,
        kind: ProfileKind,
        current: ProfileRecord,
    ) -> CoreResult<Option<u64>> {
        let _guard = self.profile_lock.lock();
        {
            let mut profiles = self.profiles.write();
            let slot = match kind {
                ProfileKind::Device => &mut profiles.device,
                ProfileKind::Person => &mut profiles.person,
            };
            *slot = Some(current.clone());
        }

        let queue = self.coordinator.queue();
        let pending: Vec<ProfileDiff> = queue
            .outstanding_diffs(kind)
            .iter()
            .filter_map(|entry| {
                let parsed = ProfileDiff::from_payload_body(kind, &entry.body);
                if parsed.is_none() {
                    warn!(id = entry.id, kind = %kind, "queued profile diff is unreadable; ignoring");
                }
                parsed
            })
            .collect();
        let projected = self.baselines.projected(kind, &pending);

        let Some(changes) = diff(projected.as_ref(), &current) else {
            debug!(kind = %kind, "profile unchanged; nothing queued");
            return Ok(None);
        };
        let body = changes.to_payload_body(kind)?;
        let id = queue.enqueue(PayloadKind::ProfileDiff(kind), body);
        debug!(id, kind = %kind, fields = changes.len(), "profile diff queued");
        Ok(Some(id))
    }

    /// Queues changes to the device profile.
    ///
    /// # Errors
    ///
    /// See [`Engagement::enqueue_profile_update`].
    pub fn enqueue_device_update(&self, device: &DeviceInfo) -> CoreResult<Option<u64>> {
        self.enqueue_profile_update(ProfileKind::Device, device.to_record())
    }

    /// Queues changes to the person profile.
    ///
    /// # Errors
    ///
    /// See [`Engagement::enqueue_profile_update`].
    pub fn enqueue_person_update(&self, person: &PersonInfo) -> CoreResult<Option<u64>> {
        self.enqueue_profile_update(ProfileKind::Person, person.to_record())
    }

    /// The last profile the server confirmed.
    pub fn baseline(&self, kind: ProfileKind) -> Option<ProfileRecord> {
        self.baselines.get(kind)
    }

    /// Queues the automated message if none was ever created.
    ///
    /// `forced` requests a welcome message; otherwise a "no love" message.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the body cannot be serialized.
    pub fn create_auto_message(&self, forced: bool) -> CoreResult<Option<u64>> {
        let Some(kind) = self.auto_message.claim(forced) else {
            return Ok(None);
        };
        let draft = MessageDraft::automated(kind.default_body())
            .with_custom_data("auto_message", kind.as_str());
        let id = self.enqueue_message(draft)?;
        info!(id, kind = kind.as_str(), "automated message queued");
        Ok(Some(id))
    }

    /// Current automated message state.
    pub fn auto_message_state(&self) -> AutoMessageState {
        self.auto_message.state()
    }

    /// Folds flags from an older install into the automated message state.
    pub fn migrate_auto_message(&self, flags: LegacyAutoMessageFlags) -> AutoMessageState {
        self.auto_message.migrate(flags)
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Sends at most one payload.
    ///
    /// # Errors
    ///
    /// Returns an error only on a queue state conflict.
    pub fn drain_once(&self) -> CoreResult<DrainOutcome> {
        Ok(self.coordinator.drain_once()?)
    }

    /// Sends payloads until idle, backing off, or the batch limit.
    ///
    /// # Errors
    ///
    /// Returns an error only on a queue state conflict.
    pub fn drain_all(&self) -> CoreResult<DrainSummary> {
        Ok(self.coordinator.drain_all()?)
    }

    /// Fetches rules if expired (always in debug mode).
    ///
    /// # Errors
    ///
    /// Returns the fetch error; cached rules stay in use.
    pub fn refresh_rules(&self) -> CoreResult<Arc<RuleSnapshot>> {
        Ok(self.coordinator.refresh_rules()?)
    }

    /// Commits a rule payload obtained out of band.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the payload is not a complete rule set.
    pub fn install_rules(&self, response: RawRuleResponse) -> CoreResult<Arc<RuleSnapshot>> {
        let snapshot = self.coordinator.rules().install(response)?;
        self.notifier.emit(rules_updated(&snapshot));
        Ok(snapshot)
    }

    /// The current rules, possibly stale.
    pub fn rules(&self) -> Arc<RuleSnapshot> {
        self.coordinator.rules().get()
    }

    /// True if the cached rules are past their expiry.
    pub fn rules_expired(&self) -> bool {
        self.coordinator.rules().is_expired()
    }

    /// The payload queue.
    pub fn queue(&self) -> &Arc<PayloadQueue> {
        self.coordinator.queue()
    }

    /// Queue counts by state.
    pub fn queue_stats(&self) -> QueueStats {
        self.coordinator.queue().stats()
    }

    /// Coordinator state.
    pub fn sync_state(&self) -> SyncState {
        self.coordinator.state()
    }

    /// Coordinator statistics.
    pub fn sync_stats(&self) -> SyncStats {
        self.coordinator.stats()
    }

    /// Removes sent and permanently failed entries from the queue.
    pub fn prune(&self) -> Vec<PayloadEntry> {
        self.coordinator.queue().remove_terminal()
    }

    /// Writes the queue to storage now.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails.
    pub fn flush(&self) -> CoreResult<()> {
        Ok(self.coordinator.queue().flush()?)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// The notifier.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: impl EngagementListener + 'static) -> ListenerId {
        self.notifier.add_listener(listener)
    }

    /// Returns a receiver for all future notifications.
    pub fn subscribe(&self) -> Receiver<EngagementEvent> {
        self.notifier.subscribe()
    }
}

impl<T: EngageTransport> std::fmt::Debug for Engagement<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engagement")
            .field("app_version", &self.config.app_version)
            .field("queue", &self.queue_stats())
            .field("sync_state", &self.sync_state())
            .finish()
    }
}

fn event_body(key: &str, now_ms: u64) -> Result<String, CodecError> {
    let body = EventBody {
        event: EventWire {
            nonce: Uuid::new_v4().to_string(),
            label: key,
            client_created_at: now_ms as f64 / 1000.0,
        },
    };
    serde_json::to_string(&body).map_err(|e| CodecError::encoding_failed(e.to_string()))
}
