//! Engine configuration.

use engage_sync_engine::{RetryConfig, RuleCacheConfig, SyncConfig, DEFAULT_RULE_LIFETIME};
use std::time::Duration;

/// Shortest drain or refresh interval the background worker accepts.
pub const MIN_WORKER_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for opening an engagement engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Host app version name, used for per-version counters.
    pub app_version: String,

    /// Host app build identifier, used for per-build counters.
    pub app_build: String,

    /// Debug builds refresh rules on every request, ignoring expiry.
    pub debug: bool,

    /// Whether rules are fetched at all.
    pub polling_enabled: bool,

    /// Rule lifetime when the server sends no cache hint.
    pub default_cache_lifetime: Duration,

    /// How often the background worker drains the payload queue.
    pub drain_interval: Duration,

    /// How often the background worker checks rule expiry.
    pub refresh_interval: Duration,

    /// Backoff between retries of one payload.
    pub retry: RetryConfig,

    /// Maximum sends per drain pass.
    pub drain_batch_limit: usize,

    /// Delete a payload's attachment once it can never be sent again.
    pub delete_attachments_on_terminal: bool,

    /// Invocation times kept per event key for windowed counts.
    pub recent_invocation_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_version: String::new(),
            app_build: String::new(),
            debug: false,
            polling_enabled: true,
            default_cache_lifetime: DEFAULT_RULE_LIFETIME,
            drain_interval: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(60),
            retry: RetryConfig::default(),
            drain_batch_limit: 50,
            delete_attachments_on_terminal: true,
            recent_invocation_limit: 64,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the app version and build.
    #[must_use]
    pub fn app(mut self, version: impl Into<String>, build: impl Into<String>) -> Self {
        self.app_version = version.into();
        self.app_build = build.into();
        self
    }

    /// Sets debug mode.
    #[must_use]
    pub const fn debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Enables or disables rule fetching.
    #[must_use]
    pub const fn polling_enabled(mut self, value: bool) -> Self {
        self.polling_enabled = value;
        self
    }

    /// Sets the fallback rule lifetime.
    #[must_use]
    pub const fn default_cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_cache_lifetime = lifetime;
        self
    }

    /// Sets the drain interval, at least [`MIN_WORKER_INTERVAL`].
    #[must_use]
    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval.max(MIN_WORKER_INTERVAL);
        self
    }

    /// Sets the refresh interval, at least [`MIN_WORKER_INTERVAL`].
    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(MIN_WORKER_INTERVAL);
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum sends per drain pass.
    #[must_use]
    pub fn drain_batch_limit(mut self, limit: usize) -> Self {
        self.drain_batch_limit = limit.max(1);
        self
    }

    /// Sets whether attachments are deleted for terminal payloads.
    #[must_use]
    pub const fn delete_attachments_on_terminal(mut self, value: bool) -> Self {
        self.delete_attachments_on_terminal = value;
        self
    }

    /// Sets how many invocation times are kept per key.
    #[must_use]
    pub const fn recent_invocation_limit(mut self, limit: usize) -> Self {
        self.recent_invocation_limit = limit;
        self
    }

    /// The coordinator settings implied by this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_force_refresh(self.debug)
            .with_retry(self.retry.clone())
            .with_drain_batch_limit(self.drain_batch_limit)
    }

    /// The rule cache settings implied by this configuration.
    pub fn rule_cache_config(&self) -> RuleCacheConfig {
        RuleCacheConfig::new()
            .with_default_lifetime(self.default_cache_lifetime)
            .with_polling(self.polling_enabled)
    }
}
