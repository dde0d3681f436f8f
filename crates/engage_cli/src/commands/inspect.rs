//! Inspect command implementation.

use super::{format_timestamp, open_data_dir, CliResult};
use engage_core::{
    AutoMessageState, ProfileKind, AUTO_MESSAGE_KEY, BASELINE_KEY, LEDGER_KEY,
};
use engage_sync_engine::{QUEUE_KEY, RULE_CACHE_KEY};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const BLOB_KEYS: [&str; 5] = [
    RULE_CACHE_KEY,
    QUEUE_KEY,
    BASELINE_KEY,
    LEDGER_KEY,
    AUTO_MESSAGE_KEY,
];

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// App version the counters belong to.
    pub app_version: String,
    /// App build the counters belong to.
    pub app_build: String,
    /// First open of the data directory.
    pub installed_at: u64,
    /// Stored blob sizes in bytes; absent blobs are omitted.
    pub blobs: BTreeMap<String, usize>,
    /// Rule cache summary.
    pub rules: RulesSummary,
    /// Queue counts.
    pub queue: QueueSummary,
    /// Number of event keys with counters.
    pub event_keys: usize,
    /// Number of interactions ever shown.
    pub interactions_shown: usize,
    /// Top-level fields in the confirmed device profile.
    pub device_fields: Option<usize>,
    /// Top-level fields in the confirmed person profile.
    pub person_fields: Option<usize>,
    /// Automated message state.
    pub auto_message: String,
    /// Counters by key (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<Vec<CounterRow>>,
}

/// Cached rule summary.
#[derive(Debug, Serialize)]
pub struct RulesSummary {
    /// Interaction definitions.
    pub interactions: usize,
    /// Event keys with targets.
    pub targets: usize,
    /// Fetch time.
    pub fetched_at: Option<u64>,
    /// Expiry time.
    pub expires_at: Option<u64>,
    /// Whether the rules are past expiry now.
    pub expired: bool,
}

/// Queue counts by state.
#[derive(Debug, Serialize)]
pub struct QueueSummary {
    /// Waiting entries.
    pub pending: usize,
    /// In-flight entries.
    pub sending: usize,
    /// Delivered, not yet pruned.
    pub sent: usize,
    /// Rejected, not yet pruned.
    pub failed_permanent: usize,
}

/// One counter line.
#[derive(Debug, Serialize)]
pub struct CounterRow {
    /// `code_point` or `interaction`.
    pub scope: &'static str,
    /// Event key or interaction id.
    pub key: String,
    /// All-time count.
    pub total: u64,
    /// Count since the current version.
    pub version: u64,
    /// Count since the current build.
    pub build: u64,
    /// Last invocation.
    pub last_invoked_at: Option<u64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_counters: bool, format: &str) -> CliResult<()> {
    let data = open_data_dir(path)?;
    let engine = &data.engine;

    let mut blobs = BTreeMap::new();
    for key in BLOB_KEYS {
        if let Some(bytes) = data.store.get(key)? {
            blobs.insert(key.to_string(), bytes.len());
        }
    }

    let snapshot = engine.rules();
    let stats = engine.queue_stats();
    let ledger = engine.ledger();
    let code_points = ledger.code_points();
    let interactions = ledger.interactions();

    let counters = show_counters.then(|| {
        let points = code_points.iter().map(|(k, s)| ("code_point", k, s));
        let shown = interactions.iter().map(|(k, s)| ("interaction", k, s));
        points
            .chain(shown)
            .map(|(scope, key, s)| CounterRow {
                scope,
                key: key.clone(),
                total: s.total,
                version: s.version,
                build: s.build,
                last_invoked_at: s.last_invoked_at,
            })
            .collect()
    });

    let result = InspectResult {
        path: path.display().to_string(),
        app_version: ledger.app_version(),
        app_build: ledger.app_build(),
        installed_at: ledger.installed_at(),
        blobs,
        rules: RulesSummary {
            interactions: snapshot.rules.interaction_count(),
            targets: snapshot.rules.target_count(),
            fetched_at: snapshot.fetched_at,
            expires_at: snapshot.expires_at,
            expired: engine.rules_expired(),
        },
        queue: QueueSummary {
            pending: stats.pending,
            sending: stats.sending,
            sent: stats.sent,
            failed_permanent: stats.failed_permanent,
        },
        event_keys: code_points.len(),
        interactions_shown: interactions.len(),
        device_fields: engine.baseline(ProfileKind::Device).map(|r| r.len()),
        person_fields: engine.baseline(ProfileKind::Person).map(|r| r.len()),
        auto_message: describe_auto_message(engine.auto_message_state()),
        counters,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn describe_auto_message(state: AutoMessageState) -> String {
    match state {
        AutoMessageState::NotShown => "not shown".to_string(),
        AutoMessageState::Shown(kind) => format!("shown ({})", kind.as_str()),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Engagement Data Inspection");
    println!("==========================");
    println!();
    println!("Path:        {}", result.path);
    println!("App:         {} ({})", result.app_version, result.app_build);
    println!("Installed:   {}", format_timestamp(Some(result.installed_at)));
    println!();
    println!("Blobs:");
    for (key, size) in &result.blobs {
        println!("  {:<18} {} bytes", key, size);
    }
    println!();
    println!("Rules:");
    println!("  Interactions:  {}", result.rules.interactions);
    println!("  Target keys:   {}", result.rules.targets);
    println!("  Fetched:       {}", format_timestamp(result.rules.fetched_at));
    println!(
        "  Expires:       {}{}",
        format_timestamp(result.rules.expires_at),
        if result.rules.expired { " (expired)" } else { "" }
    );
    println!();
    println!("Queue:");
    println!("  Pending:           {}", result.queue.pending);
    println!("  Sending:           {}", result.queue.sending);
    println!("  Sent:              {}", result.queue.sent);
    println!("  Failed permanent:  {}", result.queue.failed_permanent);
    println!();
    println!("Engagement:");
    println!("  Event keys:          {}", result.event_keys);
    println!("  Interactions shown:  {}", result.interactions_shown);
    println!("  Auto message:        {}", result.auto_message);
    println!();
    println!("Baselines:");
    println!("  Device:  {}", describe_fields(result.device_fields));
    println!("  Person:  {}", describe_fields(result.person_fields));

    if let Some(counters) = &result.counters {
        println!();
        println!("Counters:");
        for row in counters {
            println!(
                "  [{}] {} total={} version={} build={} last={}",
                row.scope,
                row.key,
                row.total,
                row.version,
                row.build,
                format_timestamp(row.last_invoked_at)
            );
        }
    }
}

fn describe_fields(fields: Option<usize>) -> String {
    match fields {
        Some(n) => format!("{} fields", n),
        None => "none confirmed".to_string(),
    }
}
