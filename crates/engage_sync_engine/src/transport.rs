//! Transport layer abstraction.

use crate::error::FetchError;
use crate::payload::{PayloadEntry, SendOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Body of a successful rule fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRuleResponse {
    /// JSON rule payload.
    pub body: String,
    /// Server cache hint, if any.
    pub cache_lifetime: Option<Duration>,
}

impl RawRuleResponse {
    /// A response without a cache hint.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            cache_lifetime: None,
        }
    }

    /// Sets the cache hint.
    #[must_use]
    pub fn with_cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.cache_lifetime = Some(lifetime);
        self
    }
}

/// The remote service as seen by the engine.
///
/// Implementations own HTTP semantics and auth. They must classify every
/// send into one of the three [`SendOutcome`]s.
pub trait EngageTransport: Send + Sync {
    /// Fetches the current rule payload.
    fn fetch_rules(&self) -> Result<RawRuleResponse, FetchError>;

    /// Sends one payload.
    fn send_payload(&self, entry: &PayloadEntry) -> SendOutcome;
}

impl<T: EngageTransport + ?Sized> EngageTransport for std::sync::Arc<T> {
    fn fetch_rules(&self) -> Result<RawRuleResponse, FetchError> {
        (**self).fetch_rules()
    }

    fn send_payload(&self, entry: &PayloadEntry) -> SendOutcome {
        (**self).send_payload(entry)
    }
}

/// A scripted transport for testing.
///
/// Rule fetches return queued responses first, then the default response.
/// Sends return queued outcomes first, then success.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    fetch_calls: AtomicUsize,
    fetch_delay: Mutex<Duration>,
    rule_responses: Mutex<VecDeque<Result<RawRuleResponse, FetchError>>>,
    default_rules: Mutex<Option<RawRuleResponse>>,
    send_outcomes: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<PayloadEntry>>,
}

impl MockTransport {
    /// Creates a connected transport with nothing scripted.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fetch_calls: AtomicUsize::new(0),
            fetch_delay: Mutex::new(Duration::ZERO),
            rule_responses: Mutex::new(VecDeque::new()),
            default_rules: Mutex::new(None),
            send_outcomes: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the response returned once the script is exhausted.
    pub fn set_rules(&self, response: RawRuleResponse) {
        *self.default_rules.lock() = Some(response);
    }

    /// Queues one fetch result.
    pub fn push_rules_result(&self, result: Result<RawRuleResponse, FetchError>) {
        self.rule_responses.lock().push_back(result);
    }

    /// Queues one send outcome.
    pub fn push_send_outcome(&self, outcome: SendOutcome) {
        self.send_outcomes.lock().push_back(outcome);
    }

    /// Makes every fetch sleep first, to widen race windows in tests.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    /// Sets the connected state. A disconnected transport fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of fetches attempted.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Every payload a send was attempted for, in order.
    pub fn sent(&self) -> Vec<PayloadEntry> {
        self.sent.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl EngageTransport for MockTransport {
    fn fetch_rules(&self) -> Result<RawRuleResponse, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if !self.is_connected() {
            return Err(FetchError::network("not connected"));
        }
        if let Some(result) = self.rule_responses.lock().pop_front() {
            return result;
        }
        self.default_rules
            .lock()
            .clone()
            .ok_or_else(|| FetchError::network("no mock rules response set"))
    }

    fn send_payload(&self, entry: &PayloadEntry) -> SendOutcome {
        self.sent.lock().push(entry.clone());
        if !self.is_connected() {
            return SendOutcome::retryable("not connected");
        }
        self.send_outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(SendOutcome::success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PayloadKind, PayloadState};
    use uuid::Uuid;

    fn entry() -> PayloadEntry {
        PayloadEntry {
            id: 1,
            nonce: Uuid::nil(),
            kind: PayloadKind::Message,
            body: "{}".into(),
            state: PayloadState::Sending,
            created_at: 0,
            retry_count: 0,
            next_attempt_at: None,
            attachment: None,
            last_error: None,
        }
    }

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert_eq!(
            transport.fetch_rules(),
            Err(FetchError::network("not connected"))
        );
        assert_eq!(
            transport.send_payload(&entry()),
            SendOutcome::retryable("not connected")
        );
    }

    #[test]
    fn scripted_then_default() {
        let transport = MockTransport::new();
        transport.set_rules(RawRuleResponse::new("default"));
        transport.push_rules_result(Err(FetchError::Server { status: 500 }));

        assert!(transport.fetch_rules().is_err());
        assert_eq!(transport.fetch_rules().unwrap().body, "default");
        assert_eq!(transport.fetch_calls(), 2);
    }

    #[test]
    fn sends_are_recorded() {
        let transport = MockTransport::new();
        transport.push_send_outcome(SendOutcome::rejected("too large"));

        assert_eq!(transport.send_payload(&entry()), SendOutcome::rejected("too large"));
        assert_eq!(transport.send_payload(&entry()), SendOutcome::success());
        assert_eq!(transport.sent().len(), 2);
    }
}
