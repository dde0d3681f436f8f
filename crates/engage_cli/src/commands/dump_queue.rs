//! Dump queue command implementation.

use super::{format_timestamp, open_data_dir, CliError, CliResult};
use engage_sync_engine::{PayloadEntry, PayloadState};
use serde::Serialize;
use std::path::Path;

/// Queue entry representation for output.
#[derive(Debug, Serialize)]
pub struct QueueEntryInfo {
    /// Local id.
    pub id: u64,
    /// Payload kind.
    pub kind: String,
    /// Delivery state.
    pub state: String,
    /// Client nonce.
    pub nonce: String,
    /// Enqueue time.
    pub created_at: u64,
    /// Retryable failures so far.
    pub retry_count: u32,
    /// Earliest next attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<u64>,
    /// Attached file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    /// Last failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Wire body (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl QueueEntryInfo {
    fn from_entry(entry: &PayloadEntry, with_body: bool) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind.to_string(),
            state: entry.state.to_string(),
            nonce: entry.nonce.to_string(),
            created_at: entry.created_at,
            retry_count: entry.retry_count,
            next_attempt_at: entry.next_attempt_at,
            attachment: entry.attachment.as_ref().map(|p| p.display().to_string()),
            last_error: entry.last_error.clone(),
            body: with_body.then(|| entry.body.clone()),
        }
    }
}

/// Runs the dump-queue command.
pub fn run(
    path: &Path,
    state: Option<&str>,
    limit: Option<usize>,
    bodies: bool,
    format: &str,
) -> CliResult<()> {
    let filter = state.map(parse_state).transpose()?;
    let data = open_data_dir(path)?;

    let entries: Vec<QueueEntryInfo> = data
        .engine
        .queue()
        .entries()
        .iter()
        .filter(|e| filter.map_or(true, |s| e.state == s))
        .take(limit.unwrap_or(usize::MAX))
        .map(|e| QueueEntryInfo::from_entry(e, bodies))
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

/// Parses a state name as printed by the queue.
pub fn parse_state(name: &str) -> CliResult<PayloadState> {
    match name {
        "pending" => Ok(PayloadState::Pending),
        "sending" => Ok(PayloadState::Sending),
        "sent" => Ok(PayloadState::Sent),
        "failed-permanent" | "failed" => Ok(PayloadState::FailedPermanent),
        other => Err(CliError::InvalidArgument {
            what: "state",
            value: other.to_string(),
        }),
    }
}

fn print_text_output(entries: &[QueueEntryInfo]) {
    if entries.is_empty() {
        println!("Queue is empty");
        return;
    }

    for info in entries {
        println!(
            "#{:<6} {:<16} {:<17} retries={} created={}",
            info.id,
            info.kind,
            info.state,
            info.retry_count,
            format_timestamp(Some(info.created_at))
        );
        if let Some(at) = info.next_attempt_at {
            println!("         next attempt: {}", format_timestamp(Some(at)));
        }
        if let Some(path) = &info.attachment {
            println!("         attachment: {}", path);
        }
        if let Some(err) = &info.last_error {
            println!("         last error: {}", err);
        }
        if let Some(body) = &info.body {
            println!("         body: {}", body);
        }
    }
    println!();
    println!("{} entries", entries.len());
}
