//! Event-data flattening.
//!
//! Custom events carry an arbitrary nested JSON payload. Storage is one row
//! per leaf, so the tree is flattened to `(dotted path, kind, value)` records
//! before persistence. Kind inference is value-based, not schema-based: the
//! same key may carry different kinds across events, and callers must persist
//! the kind tag alongside the value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inferred type tag of a flattened leaf. Selects which typed storage column
/// receives the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Number,
    String,
    Boolean,
    Date,
    Array,
}

impl DataKind {
    /// Numeric code used in the `event_data_type` column.
    pub fn code(self) -> i32 {
        match self {
            DataKind::String => 1,
            DataKind::Number => 2,
            DataKind::Boolean => 3,
            DataKind::Date => 4,
            DataKind::Array => 5,
        }
    }
}

/// One flattened leaf of an event payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatField {
    /// Dotted/bracketed path, e.g. `cart.items[0].price`.
    pub key: String,
    pub kind: DataKind,
    /// String form of the leaf. Numeric and date leaves also carry their
    /// typed representation below.
    pub value: String,
    pub numeric: Option<f64>,
    pub date: Option<DateTime<Utc>>,
}

/// Infer the kind of a single JSON value.
///
/// Strings that parse as a full RFC 3339 date are tagged `Date`. Arrays are
/// tagged `Array` only when flat (all primitive elements); arrays of objects
/// are recursed into by [`flatten`] instead.
pub fn infer_kind(value: &Value) -> DataKind {
    match value {
        Value::Number(_) => DataKind::Number,
        Value::Bool(_) => DataKind::Boolean,
        Value::String(s) => {
            if DateTime::parse_from_rfc3339(s).is_ok() {
                DataKind::Date
            } else {
                DataKind::String
            }
        }
        Value::Array(_) => DataKind::Array,
        _ => DataKind::String,
    }
}

/// Flatten a JSON tree into an ordered list of leaf records.
///
/// Mappings contribute `.` path segments, arrays of mappings contribute `[i]`
/// segments, and arrays of primitives are emitted whole as a single `Array`
/// leaf (serialized string form). Empty objects and arrays produce no leaves;
/// `null` leaves are skipped.
pub fn flatten(value: &Value) -> Vec<FlatField> {
    let mut out = Vec::new();
    walk(value, "", &mut out);
    out
}

fn walk(value: &Value, path: &str, out: &mut Vec<FlatField>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(child, &child_path, out);
            }
        }
        Value::Array(items) if items.iter().any(|v| v.is_object() || v.is_array()) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, &format!("{path}[{i}]"), out);
            }
        }
        Value::Array(items) => {
            if !items.is_empty() && !path.is_empty() {
                out.push(leaf(path, value));
            }
        }
        Value::Null => {}
        _ => {
            if !path.is_empty() {
                out.push(leaf(path, value));
            }
        }
    }
}

fn leaf(path: &str, value: &Value) -> FlatField {
    let kind = infer_kind(value);
    let string_form = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    FlatField {
        key: path.to_string(),
        kind,
        numeric: match kind {
            DataKind::Number => value.as_f64(),
            _ => None,
        },
        date: match kind {
            DataKind::Date => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        },
        value: string_form,
    }
}
