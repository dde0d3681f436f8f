//! Resolve command implementation.

use super::{open_data_dir, CliResult};
use engage_codec::to_json_value;
use engage_core::EventName;
use serde::Serialize;
use std::path::Path;

/// Resolution result.
#[derive(Debug, Serialize)]
pub struct ResolveResult {
    /// Canonical event key.
    pub event: String,
    /// Selected interaction id.
    pub interaction_id: Option<String>,
    /// Selected interaction type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<String>,
    /// Selected interaction configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
}

/// Runs the resolve command.
///
/// Uses the stored counters and confirmed profiles as facts; nothing is
/// recorded or queued.
pub fn run(path: &Path, vendor: &str, interaction: &str, label: &str, format: &str) -> CliResult<()> {
    let data = open_data_dir(path)?;
    let event = EventName::new(vendor, interaction, label);
    let facts = data.engine.facts();
    let selected = data.engine.resolve(&event, &facts);

    let result = ResolveResult {
        event: event.canonical(),
        interaction_id: selected.as_ref().map(|d| d.id.clone()),
        interaction_type: selected.as_ref().map(|d| d.kind.to_string()),
        configuration: selected.as_ref().map(|d| to_json_value(&d.configuration)),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => match (&result.interaction_id, &result.interaction_type) {
            (Some(id), Some(kind)) => println!("{} -> {} ({})", result.event, id, kind),
            _ => println!("{} -> no interaction", result.event),
        },
    }

    Ok(())
}
