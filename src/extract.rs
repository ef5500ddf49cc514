use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::record::Record;
use crate::schema::TableKind;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Layout of `CURRENT_TIMESTAMP` values, so `updated_at` compares as text
const STORE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractConditions {
    /// Only rows modified after this instant
    pub updated_after: Option<DateTime<Utc>>,
    /// Row cap; must be positive
    pub limit: Option<u32>,
}

impl ExtractConditions {
    pub fn batch(limit: u32) -> Self {
        ExtractConditions {
            updated_after: None,
            limit: Some(limit),
        }
    }

    pub fn updated_after(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.updated_after = at;
        self
    }
}

/// Read rows from `table`, fully materialized.
///
/// Query errors are logged and returned; they end this table's run.
pub fn extract(
    store: &Store,
    table: TableKind,
    conditions: &ExtractConditions,
    ctx: &mut RunContext,
) -> Result<Vec<Record>> {
    ctx.info(format!("Extracting data from {}...", table));

    match select(store, table, conditions, ctx) {
        Ok(rows) => {
            ctx.stats.extracted += rows.len() as u64;
            ctx.info(format!("Extracted {} records from {}", rows.len(), table));
            Ok(rows)
        }
        Err(e) => {
            ctx.error(format!("Data extraction failed for {}", table), &e);
            Err(e)
        }
    }
}

fn select(
    store: &Store,
    table: TableKind,
    conditions: &ExtractConditions,
    ctx: &mut RunContext,
) -> Result<Vec<Record>> {
    let mut sql = format!("SELECT * FROM {}", table.as_str());
    let mut params = Vec::new();

    if let Some(after) = conditions.updated_after {
        if table.has_column("updated_at") {
            params.push(Value::from(after.format(STORE_TIMESTAMP).to_string()));
            sql.push_str(&format!(" WHERE updated_at > ?{}", params.len()));
        } else {
            ctx.debug(format!("{} has no updated_at column, extracting in full", table));
        }
    }

    if table.has_column("id") {
        sql.push_str(" ORDER BY id");
    }

    if let Some(limit) = conditions.limit {
        if limit == 0 {
            return Err(PipelineError::Config("extract limit must be positive".to_string()));
        }
        params.push(Value::from(limit));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
    }

    Ok(store.query(&sql, &params)?.rows)
}
