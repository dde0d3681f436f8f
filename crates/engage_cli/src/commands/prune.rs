//! Prune command implementation.

use super::{open_data_dir, CliResult};
use std::path::Path;

/// Runs the prune command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    let data = open_data_dir(path)?;
    let engine = &data.engine;

    if dry_run {
        let stats = engine.queue_stats();
        println!(
            "Would remove {} entries ({} sent, {} failed permanently)",
            stats.sent + stats.failed_permanent,
            stats.sent,
            stats.failed_permanent
        );
        return Ok(());
    }

    let removed = engine.prune();
    engine.flush()?;
    println!("Removed {} entries", removed.len());
    for entry in &removed {
        println!("  #{} {} ({})", entry.id, entry.kind, entry.state);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::{Engagement, EngineConfig, MessageDraft, MockTransport};
    use tempfile::tempdir;

    #[test]
    fn removes_delivered_entries() {
        let dir = tempdir().unwrap();
        {
            let engine =
                Engagement::open(dir.path(), EngineConfig::new(), MockTransport::new()).unwrap();
            engine.enqueue_message(MessageDraft::new("one")).unwrap();
            engine.enqueue_message(MessageDraft::new("two")).unwrap();
            engine.drain_once().unwrap();
        }

        run(dir.path(), true).unwrap();
        assert_eq!(open_data_dir(dir.path()).unwrap().engine.queue().len(), 2);

        run(dir.path(), false).unwrap();
        let data = open_data_dir(dir.path()).unwrap();
        assert_eq!(data.engine.queue_stats().pending, 1);
        assert_eq!(data.engine.queue().len(), 1);
    }
}
