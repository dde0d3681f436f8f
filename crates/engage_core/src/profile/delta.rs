//! Field-level profile diffs.
//!
//! A diff maps each changed field to a [`FieldChange`]. Its wire form is a
//! JSON merge patch: changed values as-is, `null` for cleared fields, and a
//! nested object for changes inside a submap.

use super::record::ProfileRecord;
use engage_codec::{CodecError, CodecResult, Map, Value};
use engage_sync_engine::ProfileKind;
use std::collections::BTreeMap;

/// How one field changed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// The field has this new value. Never a map and never null.
    Set(Value),
    /// The field was removed.
    Cleared,
    /// Keys inside a submap changed.
    Nested(ProfileDiff),
}

/// The changes that turn one profile record into another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDiff {
    changes: BTreeMap<String, FieldChange>,
}

impl ProfileDiff {
    /// Changes in key order.
    pub fn changes(&self) -> &BTreeMap<String, FieldChange> {
        &self.changes
    }

    /// The change for one field, if any.
    pub fn get(&self, key: &str) -> Option<&FieldChange> {
        self.changes.get(key)
    }

    /// Number of changed top-level fields.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Applies the diff to a record in place.
    pub fn apply_to(&self, record: &mut ProfileRecord) {
        apply_map(record.fields_mut(), &self.changes);
    }

    /// The merge-patch form of the diff.
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.changes
                .iter()
                .map(|(key, change)| {
                    let value = match change {
                        FieldChange::Set(v) => v.clone(),
                        FieldChange::Cleared => Value::Null,
                        FieldChange::Nested(d) => d.to_value(),
                    };
                    (key.clone(), value)
                })
                .collect(),
        )
    }

    /// Reads a merge patch. Any value other than a map is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_map().map(from_patch)
    }

    /// Serializes the diff as a payload body: `{"<kind>": <patch>}`.
    ///
    /// # Errors
    ///
    /// Returns an encoding error if JSON serialization fails.
    pub fn to_payload_body(&self, kind: ProfileKind) -> CodecResult<String> {
        let wrapped = Value::map_from([(kind.as_str(), self.to_value())]);
        serde_json::to_string(&wrapped).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    /// Reads a diff back from a payload body written by
    /// [`ProfileDiff::to_payload_body`].
    pub fn from_payload_body(kind: ProfileKind, body: &str) -> Option<Self> {
        let value: Value = engage_codec::from_json_slice(body.as_bytes()).ok()?;
        value
            .as_map()
            .and_then(|m| m.get(kind.as_str()))
            .and_then(Self::from_value)
    }
}

/// Computes the changes from `baseline` to `current`.
///
/// Returns `None` when nothing differs. Without a baseline every field of
/// `current` is included. Submaps are compared key by key; a field present in
/// `baseline` but not in `current` is reported as [`FieldChange::Cleared`].
pub fn diff(baseline: Option<&ProfileRecord>, current: &ProfileRecord) -> Option<ProfileDiff> {
    let empty = Map::new();
    let base = baseline.map_or(&empty, ProfileRecord::fields);
    let changes = diff_maps(base, current.fields());
    if changes.is_empty() {
        None
    } else {
        Some(ProfileDiff { changes })
    }
}

fn diff_maps(base: &Map, current: &Map) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();

    for (key, value) in current {
        let old = base.get(key);
        let change = match (old, value) {
            (Some(Value::Map(old)), Value::Map(new)) => {
                let nested = diff_maps(old, new);
                if nested.is_empty() {
                    continue;
                }
                FieldChange::Nested(ProfileDiff { changes: nested })
            }
            (_, Value::Map(new)) => FieldChange::Nested(ProfileDiff {
                changes: diff_maps(&Map::new(), new),
            }),
            (Some(old), new) if old == new => continue,
            (_, new) => FieldChange::Set(new.clone()),
        };
        changes.insert(key.clone(), change);
    }

    for key in base.keys() {
        if !current.contains_key(key) {
            changes.insert(key.clone(), FieldChange::Cleared);
        }
    }

    changes
}

fn apply_map(target: &mut Map, changes: &BTreeMap<String, FieldChange>) {
    for (key, change) in changes {
        match change {
            FieldChange::Set(value) => {
                target.insert(key.clone(), value.clone());
            }
            FieldChange::Cleared => {
                target.remove(key);
            }
            FieldChange::Nested(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Map(Map::new()));
                if !matches!(slot, Value::Map(_)) {
                    *slot = Value::Map(Map::new());
                }
                if let Value::Map(inner) = slot {
                    apply_map(inner, &nested.changes);
                }
            }
        }
    }
}

fn from_patch(patch: &Map) -> ProfileDiff {
    let changes = patch
        .iter()
        .map(|(key, value)| {
            let change = match value {
                Value::Null => FieldChange::Cleared,
                Value::Map(inner) => FieldChange::Nested(from_patch(inner)),
                other => FieldChange::Set(other.clone()),
            };
            (key.clone(), change)
        })
        .collect();
    ProfileDiff { changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ProfileRecord {
        ProfileRecord::new().with("name", "Alice").with("age", 30)
    }

    #[test]
    fn cleared_and_added_fields() {
        let current = ProfileRecord::new().with("name", "Alice").with("city", "NYC");
        let d = diff(Some(&alice()), &current).unwrap();

        assert_eq!(d.len(), 2);
        assert_eq!(d.get("age"), Some(&FieldChange::Cleared));
        assert_eq!(d.get("city"), Some(&FieldChange::Set(Value::from("NYC"))));
        assert_eq!(d.get("name"), None);
    }

    #[test]
    fn identical_records_have_no_diff() {
        assert_eq!(diff(Some(&alice()), &alice()), None);
        assert_eq!(diff(None, &ProfileRecord::new()), None);
    }

    #[test]
    fn first_diff_is_full_record() {
        let d = diff(None, &alice()).unwrap();
        let mut rebuilt = ProfileRecord::new();
        d.apply_to(&mut rebuilt);
        assert_eq!(rebuilt, alice());
    }

    #[test]
    fn submaps_diff_per_key() {
        let base = alice().with(
            "custom_data",
            Value::map_from([("tier", Value::from("gold")), ("pets", Value::from(2))]),
        );
        let current = alice().with(
            "custom_data",
            Value::map_from([("tier", Value::from("gold")), ("vip", Value::from(true))]),
        );

        let d = diff(Some(&base), &current).unwrap();
        let FieldChange::Nested(custom) = d.get("custom_data").unwrap() else {
            panic!("expected nested change");
        };
        assert_eq!(custom.get("pets"), Some(&FieldChange::Cleared));
        assert_eq!(custom.get("vip"), Some(&FieldChange::Set(Value::from(true))));
        assert_eq!(custom.get("tier"), None);

        let mut rebuilt = base.clone();
        d.apply_to(&mut rebuilt);
        assert_eq!(rebuilt, current);
    }

    #[test]
    fn scalar_replaced_by_map() {
        let base = ProfileRecord::new().with("config", "off");
        let current = ProfileRecord::new().with("config", Value::Map(Map::new()));
        let d = diff(Some(&base), &current).unwrap();

        let mut rebuilt = base.clone();
        d.apply_to(&mut rebuilt);
        assert_eq!(rebuilt, current);
    }

    #[test]
    fn wire_form_is_merge_patch() {
        let current = ProfileRecord::new().with("name", "Alice").with("city", "NYC");
        let d = diff(Some(&alice()), &current).unwrap();

        let body = d.to_payload_body(ProfileKind::Person).unwrap();
        assert_eq!(body, r#"{"person":{"age":null,"city":"NYC"}}"#);

        let back = ProfileDiff::from_payload_body(ProfileKind::Person, &body).unwrap();
        assert_eq!(back, d);
        assert!(ProfileDiff::from_payload_body(ProfileKind::Device, &body).is_none());
    }

    #[test]
    fn nan_fields_never_produce_a_diff() {
        let record = alice().with("score", f64::NAN).with(
            "custom_data",
            Value::map_from([("ratio", Value::Float(f64::NAN))]),
        );
        assert_eq!(diff(Some(&record), &record), None);
        assert_eq!(diff(Some(&alice()), &record).map(|d| d.len()), Some(1));
    }

    #[test]
    fn infinite_values_travel_as_cleared() {
        let base = alice().with("score", 1.5);
        let current = alice()
            .with("score", f64::INFINITY)
            .with("floor", f64::NEG_INFINITY);
        let d = diff(Some(&base), &current).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.get("score"), Some(&FieldChange::Cleared));

        let body = d.to_payload_body(ProfileKind::Person).unwrap();
        assert_eq!(body, r#"{"person":{"score":null}}"#);
        let back = ProfileDiff::from_payload_body(ProfileKind::Person, &body).unwrap();
        assert_eq!(back, d);

        let mut rebuilt = base.clone();
        back.apply_to(&mut rebuilt);
        assert_eq!(rebuilt, current);
    }
}
