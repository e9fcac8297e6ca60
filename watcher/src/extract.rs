//! Typed field access for loosely-shaped pool API responses
//!
//! Every accessor returns `None` when the field is missing, null, or cannot
//! be read as the requested type. Callers never see a parse failure.

use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

/// Wrap a response body that is valid JSON but not an object as `{"_raw": value}`
pub fn into_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = JsonObject::new();
            map.insert("_raw".to_string(), other);
            map
        }
    }
}

/// Non-negative integer: JSON integers, integral floats and numeric strings.
/// Values outside `u64` are rejected rather than truncated.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral_f64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integral_f64(v: f64) -> Option<u64> {
    // u64::MAX as f64 rounds up to 2^64, so the bound must be exclusive
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

pub fn u64_field(obj: &JsonObject, key: &str) -> Option<u64> {
    obj.get(key).and_then(as_u64)
}

/// Finite float from a JSON number or numeric string
pub fn f64_field(obj: &JsonObject, key: &str) -> Option<f64> {
    let v = match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}

/// Text from a string or a number rendered as text
pub fn text_field(obj: &JsonObject, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Array elements, or an empty slice when the field is missing or not an array
pub fn list_field<'a>(obj: &'a JsonObject, key: &str) -> &'a [Value] {
    match obj.get(key) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}
