//! Import rules command implementation.

use super::{open_data_dir, CliResult};
use engage_core::RawRuleResponse;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Runs the import-rules command.
///
/// The file must hold a complete rule payload; a payload that fails to parse
/// leaves the cached rules untouched.
pub fn run(path: &Path, file: &Path, max_age: Option<u64>) -> CliResult<()> {
    let body = std::fs::read_to_string(file)?;
    let data = open_data_dir(path)?;

    let mut response = RawRuleResponse::new(body);
    if let Some(secs) = max_age {
        response = response.with_cache_lifetime(Duration::from_secs(secs));
    }
    let snapshot = data.engine.install_rules(response)?;

    info!(file = %file.display(), "rules imported");
    println!(
        "Imported {} interactions and {} target keys",
        snapshot.rules.interaction_count(),
        snapshot.rules.target_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::EventName;
    use tempfile::tempdir;

    const RULES: &str = r#"{
        "interactions": [{"id": "note-1", "type": "TextModal", "configuration": {}}],
        "targets": {"local#app#launch": [{"interaction_id": "note-1"}]}
    }"#;

    #[test]
    fn imported_rules_resolve() {
        let data_dir = tempdir().unwrap();
        let rules_file = data_dir.path().join("rules.json");
        std::fs::write(&rules_file, RULES).unwrap();

        run(data_dir.path(), &rules_file, Some(3600)).unwrap();

        let data = open_data_dir(data_dir.path()).unwrap();
        let facts = data.engine.facts();
        let selected = data.engine.resolve(&EventName::local("launch"), &facts).unwrap();
        assert_eq!(selected.id, "note-1");
    }

    #[test]
    fn invalid_payload_is_an_error() {
        let data_dir = tempdir().unwrap();
        let rules_file = data_dir.path().join("rules.json");
        std::fs::write(&rules_file, r#"{"targets": {}}"#).unwrap();

        assert!(run(data_dir.path(), &rules_file, None).is_err());
    }
}
