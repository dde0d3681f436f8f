//! Coordinator, backoff and rule cache settings.

use std::time::Duration;

/// Default rule lifetime when the server does not supply one.
pub const DEFAULT_RULE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fetch rules on every refresh, ignoring expiry (debug builds).
    pub force_refresh: bool,
    /// Backoff for retryable payload failures.
    pub retry: RetryConfig,
    /// Maximum entries sent by one `drain_all` call.
    pub drain_batch_limit: usize,
}

impl SyncConfig {
    /// Defaults: expiry honoured, default backoff, 50 sends per drain.
    pub fn new() -> Self {
        Self {
            force_refresh: false,
            retry: RetryConfig::default(),
            drain_batch_limit: 50,
        }
    }

    /// Sets whether every refresh bypasses expiry.
    #[must_use]
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Sets the payload backoff.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-call drain limit.
    #[must_use]
    pub fn with_drain_batch_limit(mut self, limit: usize) -> Self {
        self.drain_batch_limit = limit.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff for retryable payload failures.
///
/// Delays are deterministic so that the delay never decreases from one
/// attempt to the next. There is no attempt limit: retryable failures are
/// retried until they succeed or are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (at least 1.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// One second, doubling, capped at ten minutes.
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10 * 60),
            backoff_multiplier: 2.0,
        }
    }

    /// Retries immediately.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the ceiling.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier. Values below 1.0 (or NaN) become 1.0.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier >= 1.0 { multiplier } else { 1.0 };
        self
    }

    /// Delay before retry number `attempt` (0 means the first send).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(1024) as i32;
        let grown = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(grown.min(self.max_delay.as_secs_f64()).max(0.0))
            .unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the rule cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCacheConfig {
    /// Lifetime applied when the server sends no cache hint.
    pub default_lifetime: Duration,
    /// When false, the cache never fetches.
    pub polling_enabled: bool,
}

impl RuleCacheConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            default_lifetime: DEFAULT_RULE_LIFETIME,
            polling_enabled: true,
        }
    }

    /// Sets the fallback lifetime.
    #[must_use]
    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    /// Enables or disables fetching.
    #[must_use]
    pub fn with_polling(mut self, enabled: bool) -> Self {
        self.polling_enabled = enabled;
        self
    }
}

impl Default for RuleCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
