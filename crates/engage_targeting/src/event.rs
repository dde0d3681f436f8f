//! Canonical event names.
//!
//! Every engagement event is addressed by a key of the form
//! `vendor#interaction#label`. Target lists in the rule payload are keyed by
//! exactly this string, so the encoding here is part of the wire contract.

use std::fmt;

/// Segment separator in a canonical event key.
pub const SEPARATOR: char = '#';

/// Vendor used for events raised by the host application itself.
pub const LOCAL_VENDOR: &str = "local";

/// Interaction segment used for app-level (non-interaction) events.
pub const APP_INTERACTION: &str = "app";

/// A structured event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    vendor: String,
    interaction: String,
    label: String,
}

impl EventName {
    /// Creates an event name from its three segments.
    pub fn new(
        vendor: impl Into<String>,
        interaction: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            interaction: interaction.into(),
            label: label.into(),
        }
    }

    /// An event raised by the host application (`local#app#<label>`).
    pub fn local(label: impl Into<String>) -> Self {
        Self::new(LOCAL_VENDOR, APP_INTERACTION, label)
    }

    /// Vendor segment.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Interaction segment.
    pub fn interaction(&self) -> &str {
        &self.interaction
    }

    /// Label segment.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The canonical lookup key.
    ///
    /// Each segment is escaped so that it cannot contain the separator.
    /// Empty segments are omitted.
    pub fn canonical(&self) -> String {
        let mut key = String::new();
        for segment in [&self.vendor, &self.interaction, &self.label] {
            if segment.is_empty() {
                continue;
            }
            if !key.is_empty() {
                key.push(SEPARATOR);
            }
            key.push_str(&escape_segment(segment));
        }
        key
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Escapes `%`, `/` and `#` in one segment of an event key.
///
/// `%` is escaped first so that escape sequences already present in the input
/// survive unambiguously.
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '#' => out.push_str("%23"),
            other => out.push(other),
        }
    }
    out
}
