//! JSON bridging for wire bodies.

use crate::error::{CodecError, CodecResult};
use crate::value::{Map, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts a parsed JSON tree into a [`Value`].
///
/// Numbers that fit in `i64` become integers, everything else becomes a float.
pub fn from_json_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_json_value).collect())
        }
        serde_json::Value::Object(object) => Value::Map(
            object
                .into_iter()
                .map(|(k, v)| (k, from_json_value(v)))
                .collect::<Map>(),
        ),
    }
}

/// Converts a [`Value`] into a JSON tree.
///
/// Non-finite floats have no JSON form and become `null`.
pub fn to_json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json_value).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json_value(v)))
                .collect(),
        ),
    }
}

/// Serializes a wire body to JSON bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON.
pub fn to_json_vec<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Parses a JSON wire body.
///
/// # Errors
///
/// Returns an error if the bytes are not valid JSON for `T`.
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_stay_integers() {
        assert_eq!(from_json_value(json!(3)), Value::Integer(3));
        assert_eq!(from_json_value(json!(3.25)), Value::Float(3.25));
    }

    #[test]
    fn nested_objects_convert_both_ways() {
        let json = json!({"person": {"name": "Alice", "tags": ["a", null, true]}});
        let value = from_json_value(json.clone());
        assert_eq!(
            value.get_path(&["person", "tags", "2"]),
            Some(&Value::Bool(true))
        );
        assert_eq!(to_json_value(&value), json);
    }

    #[test]
    fn non_finite_float_is_null() {
        assert_eq!(to_json_value(&Value::Float(f64::INFINITY)), json!(null));
    }

    #[test]
    fn slice_roundtrip() {
        let bytes = to_json_vec(&Value::from("x")).unwrap();
        let back: Value = from_json_slice(&bytes).unwrap();
        assert_eq!(back, Value::from("x"));
        assert!(from_json_slice::<Value>(b"{not json").is_err());
    }
}
