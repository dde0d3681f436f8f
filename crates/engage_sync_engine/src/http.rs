//! HTTP transport implementation.
//!
//! The HTTP client itself is abstracted behind [`HttpClient`] so the engine
//! can run on any HTTP stack the host app already ships. This module only
//! maps endpoints and interprets status codes.

use crate::error::FetchError;
use crate::payload::{PayloadEntry, PayloadKind, ProfileKind, SendOutcome};
use crate::transport::{EngageTransport, RawRuleResponse};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, in received order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response with a status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client abstraction.
///
/// `Err` means no response was received (DNS, connect, TLS, timeout).
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Sends a POST request with a body.
    fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<HttpResponse, String>;
}

/// How a status code is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 408, 429, 5xx and anything unexpected.
    Retryable,
    /// Other 4xx: the request itself is unacceptable.
    Permanent,
}

/// Classifies an HTTP status code.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        408 | 429 => StatusClass::Retryable,
        400..=499 => StatusClass::Permanent,
        _ => StatusClass::Retryable,
    }
}

/// Extracts `max-age` from a `Cache-Control` header value.
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}

/// Endpoint path for a payload kind.
pub fn endpoint_for(kind: PayloadKind) -> &'static str {
    match kind {
        PayloadKind::Message | PayloadKind::HiddenMessage => "/messages",
        PayloadKind::ProfileDiff(ProfileKind::Device) => "/devices",
        PayloadKind::ProfileDiff(ProfileKind::Person) => "/people",
        PayloadKind::Event => "/events",
    }
}

/// HTTP-based transport.
///
/// Rule payloads are fetched with `GET {base}/interactions`; payloads are
/// POSTed as JSON to the endpoint of their kind.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: impl Into<String>) {
        *self.last_error.write() = Some(err.into());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

impl<C: HttpClient> EngageTransport for HttpTransport<C> {
    fn fetch_rules(&self) -> Result<RawRuleResponse, FetchError> {
        let url = format!("{}/interactions", self.base_url);
        let response = self.client.get(&url).map_err(|e| {
            self.set_error(e.as_str());
            FetchError::network(e)
        })?;

        if classify_status(response.status) != StatusClass::Success {
            self.set_error(format!("GET /interactions returned {}", response.status));
            return Err(FetchError::Server {
                status: response.status,
            });
        }
        self.clear_error();

        let cache_lifetime = response.header("cache-control").and_then(parse_max_age);
        let body = String::from_utf8(response.body)
            .map_err(|e| FetchError::network(format!("rule payload is not UTF-8: {e}")))?;
        Ok(RawRuleResponse {
            body,
            cache_lifetime,
        })
    }

    fn send_payload(&self, entry: &PayloadEntry) -> SendOutcome {
        let endpoint = endpoint_for(entry.kind);
        let url = format!("{}{}", self.base_url, endpoint);
        let response = match self.client.post(&url, "application/json", entry.body.as_bytes()) {
            Ok(response) => response,
            Err(e) => {
                self.set_error(e.as_str());
                return SendOutcome::retryable(e);
            }
        };

        debug!(id = entry.id, endpoint, status = response.status, "payload sent");
        match classify_status(response.status) {
            StatusClass::Success => {
                self.clear_error();
                SendOutcome::Success {
                    remote_id: remote_id(&response.body),
                }
            }
            StatusClass::Retryable => {
                let reason = format!("POST {endpoint} returned {}", response.status);
                self.set_error(reason.as_str());
                SendOutcome::retryable(reason)
            }
            StatusClass::Permanent => {
                let reason = format!("POST {endpoint} returned {}", response.status);
                self.set_error(reason.as_str());
                SendOutcome::rejected(reason)
            }
        }
    }
}

fn remote_id(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    json.get("id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
