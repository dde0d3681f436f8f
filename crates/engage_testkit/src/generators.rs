//! Property-based test generators using proptest.
//!
//! Provides strategies for generating profile records, retry schedules,
//! send outcomes and invocation counters that respect the engine's
//! invariants (no nulls or non-finite floats in records, multipliers of at
//! least 1.0).

use engage_codec::{Map, Value};
use engage_core::ProfileRecord;
use engage_sync_engine::{PayloadKind, ProfileKind, RetryConfig, SendOutcome};
use engage_targeting::{EventName, InvocationStats};
use proptest::prelude::*;
use std::time::Duration;

/// Strategy for profile field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for scalar values. Finite floats are short binary fractions so
/// they survive a JSON round trip exactly; NaN and the infinities show up too,
/// since host apps can hand them to a profile.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => any::<bool>().prop_map(Value::Bool),
        4 => (-1_000_000i64..1_000_000).prop_map(Value::Integer),
        4 => (-4096i32..4096).prop_map(|n| Value::Float(f64::from(n) / 8.0)),
        1 => prop_oneof![
            Just(Value::Float(f64::NAN)),
            Just(Value::Float(f64::INFINITY)),
            Just(Value::Float(f64::NEG_INFINITY)),
        ],
        4 => "[ -~]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for non-null values, nested up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for profile records.
pub fn profile_record_strategy() -> impl Strategy<Value = ProfileRecord> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..8)
        .prop_map(|fields: Map| ProfileRecord::from_map(fields))
}

/// Strategy for a record and a related record that shares some fields.
///
/// Independent records rarely overlap, which would leave the "unchanged
/// field" and "changed submap" paths of a diff untested.
pub fn related_records_strategy() -> impl Strategy<Value = (ProfileRecord, ProfileRecord)> {
    (
        profile_record_strategy(),
        prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..4),
        prop::collection::vec(any::<bool>(), 0..8),
    )
        .prop_map(|(base, extra, drops)| {
            let mut current = base.clone();
            let keys: Vec<String> = base.fields().keys().cloned().collect();
            for (key, drop) in keys.iter().zip(drops) {
                if drop {
                    current.remove(key);
                }
            }
            for (key, value) in extra {
                current.insert(key, value);
            }
            (base, current)
        })
}

/// Strategy for profile kinds.
pub fn profile_kind_strategy() -> impl Strategy<Value = ProfileKind> {
    prop_oneof![Just(ProfileKind::Device), Just(ProfileKind::Person)]
}

/// Strategy for payload kinds.
pub fn payload_kind_strategy() -> impl Strategy<Value = PayloadKind> {
    prop_oneof![
        Just(PayloadKind::Message),
        Just(PayloadKind::HiddenMessage),
        Just(PayloadKind::Event),
        profile_kind_strategy().prop_map(PayloadKind::ProfileDiff),
    ]
}

/// Strategy for retry configurations with bounded delays.
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (0u64..5_000, 0u64..3_600_000, 1.0f64..4.0).prop_map(|(initial, max, multiplier)| {
        RetryConfig::new()
            .with_initial_delay(Duration::from_millis(initial))
            .with_max_delay(Duration::from_millis(max))
            .with_backoff_multiplier(multiplier)
    })
}

/// Strategy for send outcomes, weighted towards success.
pub fn send_outcome_strategy() -> impl Strategy<Value = SendOutcome> {
    prop_oneof![
        3 => Just(SendOutcome::success()),
        2 => "[a-z ]{1,12}".prop_map(|r| SendOutcome::retryable(r)),
        1 => "[a-z ]{1,12}".prop_map(|r| SendOutcome::rejected(r)),
    ]
}

/// Strategy for event names, including separators that need escaping.
pub fn event_name_strategy() -> impl Strategy<Value = EventName> {
    let segment = || prop::string::string_regex("[a-z#/%.]{0,8}").expect("Invalid regex");
    (segment(), segment(), segment())
        .prop_map(|(vendor, interaction, label)| EventName::new(vendor, interaction, label))
}

/// Strategy for invocation counters where version and build never exceed
/// the total.
pub fn invocation_stats_strategy() -> impl Strategy<Value = InvocationStats> {
    (0u64..50)
        .prop_flat_map(|total| (Just(total), 0..=total))
        .prop_flat_map(|(total, version)| (Just(total), Just(version), 0..=version))
        .prop_map(|(total, version, build)| InvocationStats {
            total,
            version,
            build,
            last_invoked_at: (total > 0).then_some(1_000 * total),
            recent: Vec::new(),
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
