//! CLI command implementations.

pub mod dump_queue;
pub mod import_rules;
pub mod inspect;
pub mod prune;
pub mod resolve;

use engage_core::{CoreError, Engagement, EngineConfig, EventLedger};
use engage_storage::{BlobStore, FileStore, StorageError};
use engage_sync_engine::{EngageTransport, FetchError, PayloadEntry, RawRuleResponse, SendOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The path is not an existing directory.
    #[error("no data directory found at {}", .0.display())]
    MissingDataDir(PathBuf),

    /// A command argument has an unknown value.
    #[error("unknown {what}: {value}")]
    InvalidArgument {
        /// Which argument.
        what: &'static str,
        /// The value given.
        value: String,
    },

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// File error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Output serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// A transport that never reaches the server.
///
/// Rule fetches fail and sends are retryable, so opening the engine from a
/// tool never changes delivery state.
pub struct OfflineTransport;

impl EngageTransport for OfflineTransport {
    fn fetch_rules(&self) -> Result<RawRuleResponse, FetchError> {
        Err(FetchError::network("offline tooling"))
    }

    fn send_payload(&self, _entry: &PayloadEntry) -> SendOutcome {
        SendOutcome::retryable("offline tooling")
    }
}

/// An opened data directory.
pub struct DataDir {
    /// The underlying store.
    pub store: Arc<dyn BlobStore>,
    /// The engine over that store.
    pub engine: Engagement<OfflineTransport>,
}

/// Opens an existing data directory.
///
/// The engine is configured with the app version and build stored in the
/// ledger so that opening it does not reset any counters.
pub fn open_data_dir(path: &Path) -> CliResult<DataDir> {
    if !path.is_dir() {
        return Err(CliError::MissingDataDir(path.to_path_buf()));
    }
    let store: Arc<dyn BlobStore> = Arc::new(FileStore::open(path)?);
    let ledger = EventLedger::load(Arc::clone(&store), 0);
    let config = EngineConfig::new()
        .app(ledger.app_version(), ledger.app_build())
        .polling_enabled(false);
    let engine = Engagement::new(config, Arc::clone(&store), OfflineTransport);
    Ok(DataDir { store, engine })
}

/// Formats milliseconds since the Unix epoch for text output.
pub fn format_timestamp(ms: Option<u64>) -> String {
    match ms {
        Some(ms) => format!("{}.{:03}s", ms / 1000, ms % 1000),
        None => "never".to_string(),
    }
}
