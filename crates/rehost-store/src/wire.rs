//! Firestore REST typed-value codec.
//!
//! Firestore wraps every value in a single-key object naming its type, e.g.
//! `{"stringValue": "a"}` or `{"mapValue": {"fields": {...}}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, json};

use crate::{StoreError, Value};

/// A document as returned by the REST API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// Response of `documents.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<RawDocument>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Decode the `fields` object of a document or map value.
pub fn decode_fields(
    raw: &Map<String, serde_json::Value>,
) -> Result<BTreeMap<String, Value>, StoreError> {
    raw.iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

/// Encode a field map into a `fields` object.
pub fn encode_fields(fields: &BTreeMap<String, Value>) -> Map<String, serde_json::Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Decode one typed value.
pub fn decode_value(raw: &serde_json::Value) -> Result<Value, StoreError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected typed value object, got {}", raw)))?;

    let (tag, inner) = match obj.iter().next() {
        Some(entry) if obj.len() == 1 => entry,
        _ => {
            return Err(StoreError::Decode(format!(
                "typed value must have exactly one key: {}",
                raw
            )));
        }
    };

    match tag.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| StoreError::Decode(format!("bad booleanValue: {}", inner))),
        "integerValue" => decode_integer(inner).map(Value::Integer),
        "doubleValue" => decode_double(inner).map(Value::Double),
        "stringValue" => decode_string(tag, inner).map(Value::String),
        "timestampValue" => decode_string(tag, inner).map(Value::Timestamp),
        "referenceValue" => decode_string(tag, inner).map(Value::Reference),
        "bytesValue" => decode_string(tag, inner).map(Value::Bytes),
        "geoPointValue" => {
            let coord = |key: &str| inner.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
            Ok(Value::GeoPoint {
                latitude: coord("latitude"),
                longitude: coord("longitude"),
            })
        }
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(serde_json::Value::Array(items)) => items,
                Some(other) => {
                    return Err(StoreError::Decode(format!("bad arrayValue: {}", other)));
                }
                None => return Ok(Value::Array(Vec::new())),
            };
            values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "mapValue" => match inner.get("fields") {
            Some(serde_json::Value::Object(fields)) => decode_fields(fields).map(Value::Map),
            Some(other) => Err(StoreError::Decode(format!("bad mapValue: {}", other))),
            None => Ok(Value::Map(BTreeMap::new())),
        },
        other => Err(StoreError::Decode(format!("unknown value type: {}", other))),
    }
}

/// Encode one value in typed form.
pub fn encode_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        Value::Integer(i) => json!({ "integerValue": i.to_string() }),
        Value::Double(d) => match Number::from_f64(*d) {
            Some(n) => json!({ "doubleValue": n }),
            None => json!({ "doubleValue": non_finite_name(*d) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Timestamp(s) => json!({ "timestampValue": s }),
        Value::Reference(s) => json!({ "referenceValue": s }),
        Value::Bytes(s) => json!({ "bytesValue": s }),
        Value::GeoPoint {
            latitude,
            longitude,
        } => json!({ "geoPointValue": { "latitude": latitude, "longitude": longitude } }),
        Value::Array(items) => {
            let values: Vec<_> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Quote a top-level field name for use in an update mask.
///
/// Simple names (`[A-Za-z_][A-Za-z0-9_]*`) pass through; anything else is
/// wrapped in backticks with backslashes and backticks escaped.
pub fn quote_field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if simple {
        name.to_string()
    } else {
        let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
        format!("`{}`", escaped)
    }
}

/// The last path segment of a resource name, i.e. the document ID.
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn decode_string(tag: &str, inner: &serde_json::Value) -> Result<String, StoreError> {
    inner
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode(format!("bad {}: {}", tag, inner)))
}

fn decode_integer(inner: &serde_json::Value) -> Result<i64, StoreError> {
    match inner {
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| StoreError::Decode(format!("bad integerValue: {}", s))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| StoreError::Decode(format!("bad integerValue: {}", n))),
        other => Err(StoreError::Decode(format!("bad integerValue: {}", other))),
    }
}

fn decode_double(inner: &serde_json::Value) -> Result<f64, StoreError> {
    match inner {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| StoreError::Decode(format!("bad doubleValue: {}", n))),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => s
                .parse()
                .map_err(|_| StoreError::Decode(format!("bad doubleValue: {}", s))),
        },
        other => Err(StoreError::Decode(format!("bad doubleValue: {}", other))),
    }
}

fn non_finite_name(d: f64) -> &'static str {
    if d.is_nan() {
        "NaN"
    } else if d.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}
