//! # Engage Core
//!
//! The engagement engine for host applications.
//!
//! This crate provides:
//! - The [`Engagement`] engine, explicitly constructed over a blob store
//! - Event recording with per-version and per-build counters
//! - Interaction selection against cached rules
//! - Profile diffs against the last-sent baseline
//! - Message drafts and the one-time automated message
//! - Listener and channel notifications
//! - A tokio background worker for draining and rule refresh
//!
//! ## Data flow
//!
//! App events are counted, queued as event payloads, and resolved against
//! the current rules to at most one interaction. Profile updates are diffed
//! against the last version the server confirmed and only the changes are
//! queued. The sync coordinator delivers queued payloads one at a time and,
//! on delivery of a profile diff, advances the baseline.
//!
//! ## Key Invariants
//!
//! - Rule evaluation never blocks and never fails; malformed rules match nothing
//! - An empty profile diff is never queued
//! - A baseline advances only on confirmed delivery
//! - At most one automated message is ever created

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auto_message;
mod config;
mod engine;
mod error;
mod ledger;
mod message;
mod notify;
mod profile;
mod worker;

pub use auto_message::{
    migrate_legacy, AutoMessageKind, AutoMessageState, AutoMessageStore, LegacyAutoMessageFlags,
    AUTO_MESSAGE_KEY,
};
pub use config::{EngineConfig, MIN_WORKER_INTERVAL};
pub use engine::Engagement;
pub use error::{CoreError, CoreResult};
pub use ledger::{EventLedger, LEDGER_KEY};
pub use message::MessageDraft;
pub use notify::{EngagementEvent, EngagementListener, ListenerId, Notifier};
pub use profile::{
    diff, BaselineStore, DeviceInfo, FieldChange, PersonInfo, ProfileDiff, ProfileRecord,
    BASELINE_KEY,
};
pub use worker::{spawn_worker, WorkerHandle};

pub use engage_sync_engine::{
    DrainOutcome, DrainSummary, MockTransport, PayloadEntry, PayloadKind, PayloadState,
    ProfileKind, QueueStats, RawRuleResponse, RuleSnapshot, SyncState, SyncStats,
};
pub use engage_targeting::{EventName, FactSnapshot, InteractionDefinition, InteractionKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
