//! Firestore REST typed values <-> plain JSON.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). Documents in this
//! crate are plain `serde_json` maps; this module converts at the wire edge.

use serde_json::{Map, Number, Value, json};

use crate::backend::Fields;
use crate::error::AtemateError;

pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => match n.as_i64() {
            // Firestore carries int64 as a decimal string.
            Some(i) => json!({"integerValue": i.to_string()}),
            None => json!({"doubleValue": n.as_f64().unwrap_or_default()}),
        },
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode).collect();
            json!({"arrayValue": {"values": values}})
        }
        Value::Object(map) => json!({"mapValue": {"fields": encode_fields(map)}}),
    }
}

pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode(v)))
            .collect(),
    )
}

pub fn decode(value: &Value) -> Result<Value, AtemateError> {
    let obj = value
        .as_object()
        .ok_or_else(|| bad(format!("typed value must be an object, got {value}")))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| bad("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| bad(format!("booleanValue: {inner}"))),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| bad(format!("integerValue: {inner}")))
        }
        "doubleValue" => match inner {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            // "NaN" / "Infinity" have no JSON number form.
            Value::String(s) => Ok(s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            _ => Err(bad(format!("doubleValue: {inner}"))),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| bad(format!("{kind}: {inner}"))),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(other) => return Err(bad(format!("arrayValue.values: {other}"))),
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields") {
            Some(fields) => decode_fields(fields).map(Value::Object),
            None => Ok(Value::Object(Map::new())),
        },
        other => Err(bad(format!("unknown value type {other}"))),
    }
}

pub fn decode_fields(fields: &Value) -> Result<Fields, AtemateError> {
    let obj = fields
        .as_object()
        .ok_or_else(|| bad(format!("fields must be an object, got {fields}")))?;
    obj.iter()
        .map(|(k, v)| decode(v).map(|d| (k.clone(), d)))
        .collect()
}

fn bad(msg: String) -> AtemateError {
    AtemateError::SchemaParse(format!("firestore value: {msg}"))
}
