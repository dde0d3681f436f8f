//! Benchmark utilities.

use engage_codec::{Map, Value};
use engage_core::ProfileRecord;
use engage_targeting::{FactSnapshot, InvocationStats};

/// Generates a profile record with `fields` scalar fields and one nested
/// `custom_data` submap of the same width.
pub fn generate_record(fields: usize) -> ProfileRecord {
    let mut record = ProfileRecord::new();
    let mut custom = Map::new();
    for i in 0..fields {
        record.insert(format!("field_{i}"), Value::Integer(i as i64));
        custom.insert(format!("key_{i}"), Value::Text(format!("value {i}")));
    }
    record.insert("custom_data", custom);
    record
}

/// Returns a copy of `record` with every `stride`-th field changed and one
/// custom key removed.
pub fn mutate_record(record: &ProfileRecord, stride: usize) -> ProfileRecord {
    let mut current = record.clone();
    let keys: Vec<String> = record.fields().keys().cloned().collect();
    for key in keys.iter().step_by(stride.max(1)) {
        if key != "custom_data" {
            current.insert(key.clone(), Value::Text("changed".into()));
        }
    }
    if let Some(custom) = record.submap("custom_data") {
        let mut custom = custom.clone();
        custom.remove("key_0");
        current.insert("custom_data", custom);
    }
    current
}

/// Builds a snapshot with `code_points` counted events and a small person
/// profile.
pub fn generate_facts(code_points: usize) -> FactSnapshot {
    let mut person = Map::new();
    person.insert("email".into(), "dev@acme.com".into());
    person.insert("age".into(), 34.into());

    let mut builder = FactSnapshot::builder(1_700_000_000_000)
        .person(person)
        .custom("beta", true);
    for i in 0..code_points {
        let stats = InvocationStats {
            total: i as u64 + 1,
            version: 1,
            build: 1,
            last_invoked_at: Some(1_699_999_000_000),
            recent: Vec::new(),
        };
        builder = builder.code_point(format!("local#app#event_{i}"), stats);
    }
    builder
        .code_point(
            "com.acme#checkout#done",
            InvocationStats {
                total: 2,
                ..InvocationStats::default()
            },
        )
        .build()
}
