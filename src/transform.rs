// 🧹 Transform Stage - normalize field values, then fingerprint the result
// Repairs records, never drops them. A second pass over its own output is a no-op.

use crate::context::RunContext;
use crate::record::{is_truthy, Record, TransformedRecord};
use crate::schema::{
    TableKind, BIO_MAX, DEFAULT_PRIORITY, DEFAULT_STATUS, DESCRIPTION_MAX, FULL_NAME_MAX,
    LONG_BIO_MAX, PHONE_MAX, PRIORITIES, STATUSES, TITLE_MAX, USERNAME_MAX,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref USERNAME_DISALLOWED: Regex = Regex::new(r"[^a-z0-9_-]").unwrap();
    static ref PHONE_DISALLOWED: Regex = Regex::new(r"[^0-9+]").unwrap();
}

/// Normalize every record for `table` and attach its content hash.
pub fn transform(records: Vec<Record>, table: TableKind, ctx: &mut RunContext) -> Vec<TransformedRecord> {
    ctx.info(format!("Transforming {} data...", table));

    let transformed = transform_records(records, table);

    ctx.stats.transformed += transformed.len() as u64;
    ctx.info(format!("Transformed {} {} records", transformed.len(), table));
    transformed
}

/// Pure part of the stage: no logging, no counters
pub fn transform_records(records: Vec<Record>, table: TableKind) -> Vec<TransformedRecord> {
    records
        .into_iter()
        .map(|record| TransformedRecord::new(normalize(record, table)))
        .collect()
}

pub fn normalize(record: Record, table: TableKind) -> Record {
    match table {
        TableKind::Users => normalize_user(record),
        TableKind::Todos => normalize_todo(record),
        TableKind::Auth => normalize_auth(record),
        _ => record,
    }
}

// ============================================================================
// USERS
// ============================================================================

fn normalize_user(mut user: Record) -> Record {
    if let Some(name) = non_empty_str(&user, "full_name") {
        let cleaned = truncate(name.trim(), FULL_NAME_MAX).trim_end().to_string();
        user.set("full_name", Value::String(cleaned));
    }

    if let Some(username) = non_empty_str(&user, "username") {
        let lowered = username.to_lowercase();
        let stripped = truncate(&USERNAME_DISALLOWED.replace_all(lowered.trim(), ""), USERNAME_MAX);
        user.set("username", Value::String(stripped));
    }

    if let Some(profile) = user.get("profile_json").cloned() {
        if let Some(normalized) = normalize_profile(profile) {
            user.set("profile_json", normalized);
        }
    }

    if let Some(phone) = non_empty_str(&user, "phone_number") {
        let digits = truncate(&PHONE_DISALLOWED.replace_all(phone, ""), PHONE_MAX);
        user.set("phone_number", Value::String(digits));
    }

    truncate_column(&mut user, "bio", BIO_MAX);
    truncate_column(&mut user, "long_bio", LONG_BIO_MAX);

    user
}

/// Lower-case the email inside a profile document. The profile may arrive as
/// an object or as JSON text; anything else is left alone.
fn normalize_profile(profile: Value) -> Option<Value> {
    match profile {
        Value::Object(mut map) => {
            let email = map.get("email").and_then(Value::as_str).map(|e| e.trim().to_lowercase())?;
            map.insert("email".to_string(), Value::String(email));
            Some(Value::Object(map))
        }
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(&text).ok()?;
            if !parsed.is_object() {
                return None;
            }
            let original = parsed.clone();
            let normalized = normalize_profile(parsed)?;
            if normalized == original {
                None
            } else {
                Some(Value::String(normalized.to_string()))
            }
        }
        _ => None,
    }
}

// ============================================================================
// TODOS
// ============================================================================

fn normalize_todo(mut todo: Record) -> Record {
    if let Some(title) = non_empty_str(&todo, "title") {
        let cleaned = truncate(title.trim(), TITLE_MAX).trim_end().to_string();
        todo.set("title", Value::String(cleaned));
    }

    truncate_column(&mut todo, "description", DESCRIPTION_MAX);

    coerce_enum(&mut todo, "priority", &PRIORITIES, DEFAULT_PRIORITY);
    coerce_enum(&mut todo, "status", &STATUSES, DEFAULT_STATUS);

    if let Some(due) = todo.get("due_date") {
        if is_truthy(due) && !is_date_like(due) {
            todo.set("due_date", Value::Null);
        }
    }

    todo
}

/// Present values outside `allowed` are repaired to `fallback`
fn coerce_enum(record: &mut Record, column: &str, allowed: &[&str], fallback: &str) {
    let Some(value) = record.get(column) else {
        return;
    };
    if !is_truthy(value) {
        return;
    }
    let valid = value.as_str().map(|s| allowed.contains(&s)).unwrap_or(false);
    if !valid {
        record.set(column, Value::String(fallback.to_string()));
    }
}

/// Accepts the date shapes the store and API clients produce
pub fn is_date_like(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => parse_date(s.trim()),
        _ => false,
    }
}

fn parse_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDate::parse_from_str(s, "%m/%d/%Y").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

// ============================================================================
// AUTH
// ============================================================================

fn normalize_auth(mut auth: Record) -> Record {
    if let Some(email) = non_empty_str(&auth, "email") {
        let cleaned = email.trim().to_lowercase();
        auth.set("email", Value::String(cleaned));
    }
    auth
}

// ============================================================================
// HELPERS
// ============================================================================

fn non_empty_str<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record.get_str(column).filter(|s| !s.is_empty())
}

/// Keep the first `max` characters
fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn truncate_column(record: &mut Record, column: &str, max: usize) {
    if let Some(text) = record.get_str(column) {
        if text.chars().count() > max {
            let cut = truncate(text, max);
            record.set(column, Value::String(cut));
        }
    }
}
