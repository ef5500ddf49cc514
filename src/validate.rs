// ✅ Validate Stage - domain rules per table
// The only stage that drops records. It never raises; rejections land in the run context.

use crate::context::{Rejection, RunContext};
use crate::record::{is_truthy, Record};
use crate::schema::{
    TableKind, FULL_NAME_MAX, PASSWORD_MIN, PRIORITIES, STATUSES, TITLE_MAX, USERNAME_MIN,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

lazy_static! {
    static ref PHONE_PATTERN: Regex = Regex::new(r"^\+?[0-9\s\-()]+$").unwrap();
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// How many violations the rejection warning carries
const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Violation messages in rule order
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check one record against the rules for `table`. Tables without rules always pass.
pub fn validate_record(record: &Record, table: TableKind) -> ValidationResult {
    let mut errors = Vec::new();

    match table {
        TableKind::Users => {
            let username_ok = record
                .get_str("username")
                .map(|u| u.chars().count() >= USERNAME_MIN)
                .unwrap_or(false);
            if !username_ok {
                errors.push("Username must be at least 3 characters".to_string());
            }
            if let Some(name) = record.get_str("full_name") {
                if name.chars().count() > FULL_NAME_MAX {
                    errors.push("Full name too long".to_string());
                }
            }
            if let Some(phone) = record.get_str("phone_number") {
                if !phone.is_empty() && !PHONE_PATTERN.is_match(phone) {
                    errors.push("Invalid phone number format".to_string());
                }
            }
        }
        TableKind::Todos => {
            let title = record.get_str("title");
            if title.map(|t| t.trim().is_empty()).unwrap_or(true) {
                errors.push("Title is required".to_string());
            }
            if title.map(|t| t.chars().count() > TITLE_MAX).unwrap_or(false) {
                errors.push("Title too long".to_string());
            }
            if !in_set_if_present(record.get("priority"), &PRIORITIES) {
                errors.push("Invalid priority value".to_string());
            }
            if !in_set_if_present(record.get("status"), &STATUSES) {
                errors.push("Invalid status value".to_string());
            }
        }
        TableKind::Auth => {
            let email_ok = record
                .get_str("email")
                .map(|e| EMAIL_PATTERN.is_match(e))
                .unwrap_or(false);
            if !email_ok {
                errors.push("Invalid email format".to_string());
            }
            let password_ok = record
                .get_str("password")
                .map(|p| p.chars().count() >= PASSWORD_MIN)
                .unwrap_or(false);
            if !password_ok {
                errors.push("Password too short".to_string());
            }
        }
        _ => {}
    }

    ValidationResult::from_errors(errors)
}

fn in_set_if_present(value: Option<&Value>, allowed: &[&str]) -> bool {
    match value {
        Some(v) if is_truthy(v) => v.as_str().map(|s| allowed.contains(&s)).unwrap_or(false),
        _ => true,
    }
}

/// Keep the valid subset of `records`, in input order.
///
/// Each rejected record is recorded in `ctx.rejections` and counted in
/// `stats.errors`. Works on raw and transformed records alike.
pub fn validate<R>(records: Vec<R>, table: TableKind, ctx: &mut RunContext) -> Vec<R>
where
    R: AsRef<Record>,
{
    ctx.info(format!("Validating {} data...", table));

    let total = records.len();
    let mut valid = Vec::with_capacity(total);
    let mut rejected = Vec::new();

    for record in records {
        let result = validate_record(record.as_ref(), table);
        if result.is_valid {
            valid.push(record);
        } else {
            rejected.push(Rejection {
                table: table.as_str().to_string(),
                record: record.as_ref().clone(),
                errors: result.errors,
            });
        }
    }

    if !rejected.is_empty() {
        let sample: Vec<Value> = rejected
            .iter()
            .take(SAMPLE_SIZE)
            .map(|r| json!({ "id": r.record.id(), "record": r.record, "errors": r.errors }))
            .collect();
        ctx.warn(
            format!("Found {} invalid records in {}", rejected.len(), table),
            Some(json!({ "sampleErrors": sample })),
        );
    }

    ctx.info(format!(
        "Validation completed: {} valid, {} invalid",
        valid.len(),
        rejected.len()
    ));

    ctx.stats.errors += rejected.len() as u64;
    ctx.rejections.extend(rejected);
    valid
}
