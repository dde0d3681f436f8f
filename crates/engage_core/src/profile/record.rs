//! Profile records.

use engage_codec::{Map, Value};
use serde::{Deserialize, Serialize};

/// A device or person profile as a tree of named fields.
///
/// Null is never stored: inserting null, NaN or an infinite float removes the
/// field, at any depth. An absent field and a cleared one are therefore the
/// same thing, which keeps the wire form of a diff (null means cleared)
/// unambiguous.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map", into = "Map")]
pub struct ProfileRecord {
    fields: Map,
}

impl ProfileRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a map, dropping null values.
    pub fn from_map(map: Map) -> Self {
        Self {
            fields: strip_nulls(map),
        }
    }

    /// Builds a record from a map value. Any other variant is `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Map(map) => Some(Self::from_map(map)),
            _ => None,
        }
    }

    /// Gets a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Gets a nested map field, such as `custom_data`.
    pub fn submap(&self, key: &str) -> Option<&Map> {
        self.fields.get(key).and_then(Value::as_map)
    }

    /// Sets a field and returns the previous value. Null removes the field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        match normalize(value.into()) {
            Value::Null => self.fields.remove(&key),
            value => self.fields.insert(key, value),
        }
    }

    /// Sets a field, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// All fields in key order.
    pub fn fields(&self) -> &Map {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Map {
        &mut self.fields
    }

    /// Consumes the record.
    pub fn into_map(self) -> Map {
        self.fields
    }

    /// The record as a map value.
    pub fn to_value(&self) -> Value {
        Value::Map(self.fields.clone())
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map> for ProfileRecord {
    fn from(map: Map) -> Self {
        Self::from_map(map)
    }
}

impl From<ProfileRecord> for Map {
    fn from(record: ProfileRecord) -> Self {
        record.fields
    }
}

/// NaN and the infinities have no JSON form and NaN never equals itself, so
/// non-finite floats are stored as null: dropped from maps, null in arrays.
fn normalize(value: Value) -> Value {
    match value {
        Value::Float(f) if !f.is_finite() => Value::Null,
        Value::Map(map) => Value::Map(strip_nulls(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn strip_nulls(map: Map) -> Map {
    map.into_iter()
        .filter_map(|(k, v)| match normalize(v) {
            Value::Null => None,
            v => Some((k, v)),
        })
        .collect()
}
