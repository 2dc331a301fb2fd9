//! Field transformation between the local record shape (camelCase keys) and
//! the remote column shape (snake_case, timestamp columns, soft-delete
//! marker).
//!
//! `outbound` and `inbound` are exact inverses for single-word-boundary
//! casing, modulo the backend bookkeeping fields (`created_at`,
//! `updated_at`, `user_id`, `deleted_at`) that outbound adds and inbound
//! strips.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::collections;

/// Fields owned by the remote backend, never surfaced to callers.
const BACKEND_FIELDS: [&str; 4] = ["created_at", "updated_at", "user_id", "deleted_at"];

// ============================================================================
// Key casing
// ============================================================================

/// `wireType` → `wire_type`. Every uppercase letter becomes an underscore
/// plus its lowercase form.
pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `wire_type` → `wireType`. An underscore followed by a lowercase letter
/// collapses to that letter uppercased; other underscores are left alone.
pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            match chars.peek() {
                Some(next) if next.is_ascii_lowercase() => {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn rekey(record: Map<String, Value>, f: impl Fn(&str) -> String) -> Map<String, Value> {
    record.into_iter().map(|(k, v)| (f(&k), v)).collect()
}

// ============================================================================
// Outbound (local → remote)
// ============================================================================

/// Whether a field counts as unset for defaulting purposes.
fn is_unset(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn default_field(obj: &mut Map<String, Value>, key: &str, default: Value) {
    if is_unset(obj.get(key)) {
        obj.insert(key.to_string(), default);
    }
}

/// Coerce a stock field to a number, `0` on parse failure. Fields that are
/// absent are left absent.
fn coerce_numeric(obj: &mut Map<String, Value>, key: &str) {
    let Some(v) = obj.get(key) else { return };
    let n = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    obj.insert(key.to_string(), serde_json::json!(n));
}

fn rename_field(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if obj.contains_key(from) && !obj.contains_key(to) {
        if let Some(v) = obj.remove(from) {
            obj.insert(to.to_string(), v);
        }
    }
}

/// Transform a record into its remote column shape: snake_case keys,
/// creation/update timestamps stamped when absent, per-collection field
/// defaulting, soft-delete marker stripped.
pub fn outbound(collection: &str, record: &Value) -> Value {
    let Some(obj) = record.as_object() else {
        return record.clone();
    };

    let mut out = rekey(obj.clone(), camel_to_snake);

    let now = Utc::now();
    let now_iso = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    if is_unset(out.get("created_at")) {
        out.insert("created_at".to_string(), Value::String(now_iso.clone()));
    }
    if is_unset(out.get("updated_at")) {
        out.insert("updated_at".to_string(), Value::String(now_iso.clone()));
    }

    match collection {
        collections::CUTTING_RECORDS => {
            default_field(&mut out, "wire_type", Value::String(String::new()));
            default_field(&mut out, "operator", Value::String(String::new()));
            default_field(&mut out, "quantity", serde_json::json!(0));
            // The remote column is `timestamp`; local records carry `date`.
            rename_field(&mut out, "date", "timestamp");
        }
        collections::INVENTORY_RECORDS => {
            coerce_numeric(&mut out, "current_stock");
            coerce_numeric(&mut out, "min_stock");
            coerce_numeric(&mut out, "max_stock");
        }
        collections::MAINTENANCE_LOGS => {
            default_field(&mut out, "equipment_id", Value::String(String::new()));
            default_field(&mut out, "technician", Value::String(String::new()));
            default_field(
                &mut out,
                "date",
                Value::String(now.date_naive().to_string()),
            );
        }
        collections::CALCULATOR_HISTORY => {
            if is_unset(out.get("tool_name")) {
                tracing::warn!(
                    collection = collections::CALCULATOR_HISTORY,
                    "calculator history record missing tool_name field"
                );
            }
        }
        collections::SETTINGS => {
            // Structured values are stored as JSON text in the remote column.
            if matches!(out.get("value"), Some(Value::Object(_)) | Some(Value::Array(_))) {
                let serialized = out["value"].to_string();
                out.insert("value".to_string(), Value::String(serialized));
            }
        }
        collections::NOTIFICATIONS => {
            default_field(&mut out, "type", Value::String("info".to_string()));
            default_field(&mut out, "message", Value::String(String::new()));
            default_field(&mut out, "timestamp", Value::String(now_iso));
            if !out.contains_key("read") {
                out.insert("read".to_string(), Value::Bool(false));
            }
        }
        _ => {}
    }

    out.remove("deleted_at");

    Value::Object(out)
}

// ============================================================================
// Inbound (remote → local)
// ============================================================================

/// Transform a remote row into the local record shape: backend bookkeeping
/// fields stripped, keys camelized, per-collection reversals applied.
pub fn inbound(collection: &str, row: &Value) -> Value {
    let Some(obj) = row.as_object() else {
        return row.clone();
    };

    let mut stripped = obj.clone();
    for field in BACKEND_FIELDS {
        stripped.remove(field);
    }

    let mut out = rekey(stripped, snake_to_camel);

    match collection {
        collections::CUTTING_RECORDS => {
            rename_field(&mut out, "timestamp", "date");
        }
        collections::SETTINGS => {
            // Undo the JSON-text encoding; a value that does not parse is an
            // ordinary string and stays as-is.
            if let Some(Value::String(s)) = out.get("value") {
                if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                    out.insert("value".to_string(), parsed);
                }
            }
        }
        _ => {}
    }

    Value::Object(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
