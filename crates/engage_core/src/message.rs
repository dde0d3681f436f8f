//! Outgoing message drafts.

use engage_codec::{CodecError, CodecResult, Map, Value};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A message composed by the user (or on their behalf) awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    nonce: Uuid,
    body: String,
    attachment: Option<PathBuf>,
    custom_data: Map,
    hidden: bool,
    automated: bool,
}

#[derive(Serialize)]
struct MessageWire<'a> {
    nonce: String,
    body: &'a str,
    client_created_at: f64,
    hidden: bool,
    automated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_name: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_map")]
    custom_data: &'a Map,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    message: MessageWire<'a>,
}

fn is_empty_map(map: &&Map) -> bool {
    map.is_empty()
}

impl MessageDraft {
    /// A visible text message with a fresh nonce.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            nonce: Uuid::new_v4(),
            body: body.into(),
            attachment: None,
            custom_data: Map::new(),
            hidden: false,
            automated: false,
        }
    }

    /// An automated message that is never shown in the conversation thread.
    pub fn automated(body: impl Into<String>) -> Self {
        Self {
            hidden: true,
            automated: true,
            ..Self::new(body)
        }
    }

    /// Attaches a local file.
    #[must_use]
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    /// Adds a custom data entry.
    #[must_use]
    pub fn with_custom_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_data.insert(key.into(), value.into());
        self
    }

    /// Marks the message hidden.
    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Client nonce, stable across retries.
    pub fn nonce(&self) -> Uuid {
        self.nonce
    }

    /// Message text.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Attached file, if any.
    pub fn attachment(&self) -> Option<&Path> {
        self.attachment.as_deref()
    }

    /// Whether the message is hidden.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// JSON payload body: `{"message": {...}}`.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if JSON serialization fails.
    pub fn to_payload_body(&self, created_at_ms: u64) -> CodecResult<String> {
        let wire = MessageWire {
            nonce: self.nonce.to_string(),
            body: &self.body,
            client_created_at: created_at_ms as f64 / 1000.0,
            hidden: self.hidden,
            automated: self.automated,
            attachment_name: self
                .attachment
                .as_deref()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str()),
            custom_data: &self.custom_data,
        };
        serde_json::to_string(&MessageBody { message: wire })
            .map_err(|e| CodecError::encoding_failed(e.to_string()))
    }
}
