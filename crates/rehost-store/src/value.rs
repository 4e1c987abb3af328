//! Document value model.
//!
//! Every store backend decodes its records into this tagged union, so the
//! migration never has to inspect backend-specific wire shapes.

use std::collections::BTreeMap;

use serde_json::{Map, Number};

/// A single node of a document tree.
///
/// `Timestamp`, `Reference`, `Bytes` and `GeoPoint` are opaque leaves: they are
/// carried through unchanged and never looked inside.
///
/// Equality compares doubles bitwise, so a tree always equals itself even
/// when it holds a NaN.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    /// RFC 3339 timestamp, kept in its textual form.
    Timestamp(String),
    /// Resource name of another document.
    Reference(String),
    /// Base64-encoded binary payload.
    Bytes(String),
    GeoPoint {
        latitude: f64,
        longitude: f64,
    },
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b))
            | (Value::Timestamp(a), Value::Timestamp(b))
            | (Value::Reference(a), Value::Reference(b))
            | (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (
                Value::GeoPoint {
                    latitude: lat_a,
                    longitude: lng_a,
                },
                Value::GeoPoint {
                    latitude: lat_b,
                    longitude: lng_b,
                },
            ) => lat_a.to_bits() == lat_b.to_bits() && lng_a.to_bits() == lng_b.to_bits(),
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// The string content of a `String` leaf.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Reference(_) => "reference",
            Value::Bytes(_) => "bytes",
            Value::GeoPoint { .. } => "geopoint",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Build a value tree from plain JSON.
    ///
    /// Integral numbers that fit in an `i64` become `Integer`, every other
    /// number becomes `Double`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render the tree as plain JSON.
    ///
    /// Opaque leaves lose their type tag: timestamps, references and bytes
    /// become strings, geo points become `{latitude, longitude}` objects.
    /// Non-finite doubles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Double(d) => Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::Timestamp(s) | Value::Reference(s) | Value::Bytes(s) => {
                serde_json::Value::String(s.clone())
            }
            Value::GeoPoint {
                latitude,
                longitude,
            } => serde_json::json!({ "latitude": latitude, "longitude": longitude }),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Convert a JSON object into a field map. Non-object input yields `None`.
pub fn fields_from_json(json: serde_json::Value) -> Option<BTreeMap<String, Value>> {
    match Value::from_json(json) {
        Value::Map(fields) => Some(fields),
        _ => None,
    }
}

/// Render a field map as a JSON object.
pub fn fields_to_json(fields: &BTreeMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<Map<_, _>>(),
    )
}
