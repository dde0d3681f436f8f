//! Engage CLI
//!
//! Command-line tools for inspecting and repairing an engagement data
//! directory offline. Nothing here talks to the server.
//!
//! # Commands
//!
//! - `inspect` - Summarize the stored rules, queue, counters and baselines
//! - `dump-queue` - List payload queue entries
//! - `resolve` - Resolve an event against the stored rules and facts
//! - `import-rules` - Install a rule payload from a file
//! - `prune` - Remove delivered and rejected payloads

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Engagement data directory tools.
#[derive(Parser)]
#[command(name = "engage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the data directory
    Inspect {
        /// List per-event and per-interaction counters
        #[arg(short, long)]
        counters: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List payload queue entries
    DumpQueue {
        /// Only entries in this state (pending, sending, sent, failed-permanent)
        #[arg(short, long)]
        state: Option<String>,

        /// Maximum number of entries to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Include the JSON wire body
        #[arg(short, long)]
        bodies: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resolve an event without recording it
    Resolve {
        /// Event label
        label: String,

        /// Event vendor
        #[arg(long, default_value = "local")]
        vendor: String,

        /// Event interaction segment
        #[arg(long, default_value = "app")]
        interaction: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Install a rule payload from a JSON file
    ImportRules {
        /// Rule payload file
        file: PathBuf,

        /// Cache lifetime in seconds (default: engine default)
        #[arg(short, long)]
        max_age: Option<u64>,
    },

    /// Remove delivered and rejected payloads
    Prune {
        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { counters, format } => {
            let path = cli.path.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&path, counters, &format)?;
        }
        Commands::DumpQueue {
            state,
            limit,
            bodies,
            format,
        } => {
            let path = cli.path.ok_or("Data directory required for dump-queue")?;
            commands::dump_queue::run(&path, state.as_deref(), limit, bodies, &format)?;
        }
        Commands::Resolve {
            label,
            vendor,
            interaction,
            format,
        } => {
            let path = cli.path.ok_or("Data directory required for resolve")?;
            commands::resolve::run(&path, &vendor, &interaction, &label, &format)?;
        }
        Commands::ImportRules { file, max_age } => {
            let path = cli.path.ok_or("Data directory required for import-rules")?;
            commands::import_rules::run(&path, &file, max_age)?;
        }
        Commands::Prune { dry_run } => {
            let path = cli.path.ok_or("Data directory required for prune")?;
            commands::prune::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("Engage CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Engage Core v{}", engage_core::VERSION);
        }
    }

    Ok(())
}
