// 📥 Load Stage - write records back in one transaction per call
// Duplicate keys are skipped per record; any other failure rolls the whole batch back.

use crate::context::RunContext;
use crate::error::Result;
use crate::record::Record;
use crate::schema::TableKind;
use crate::store::{execute_on, Store};
use serde_json::{json, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Update in place on conflict instead of skipping
    pub upsert: bool,
    pub conflict_columns: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            upsert: false,
            conflict_columns: vec!["id".to_string()],
        }
    }
}

impl LoadOptions {
    pub fn upsert_on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LoadOptions {
            upsert: true,
            conflict_columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub loaded: u64,
    pub skipped: u64,
}

/// Write `records` into `table`.
///
/// Columns outside the table's allow-list are dropped with one warning per
/// call. Unknown conflict columns fail before anything is written.
pub fn load<R>(
    store: &Store,
    records: &[R],
    table: TableKind,
    options: &LoadOptions,
    ctx: &mut RunContext,
) -> Result<LoadOutcome>
where
    R: AsRef<Record>,
{
    ctx.info(format!("Loading {} records into {}...", records.len(), table));

    match write_batch(store, records, table, options, ctx) {
        Ok(outcome) => {
            ctx.stats.loaded += outcome.loaded;
            ctx.info(format!(
                "Loaded {} records, skipped {} duplicates",
                outcome.loaded, outcome.skipped
            ));
            Ok(outcome)
        }
        Err(e) => {
            ctx.error(format!("Data loading failed for {}", table), &e);
            Err(e)
        }
    }
}

fn write_batch<R>(
    store: &Store,
    records: &[R],
    table: TableKind,
    options: &LoadOptions,
    ctx: &mut RunContext,
) -> Result<LoadOutcome>
where
    R: AsRef<Record>,
{
    let conflict_columns = options
        .conflict_columns
        .iter()
        .map(|c| table.column(c))
        .collect::<Result<Vec<_>>>()?;

    let mut outcome = LoadOutcome::default();
    let mut dropped = BTreeSet::new();

    // Dropping the transaction without commit rolls it back
    let tx = store.connection().unchecked_transaction()?;

    for record in records {
        let record = record.as_ref();
        let mut columns = Vec::with_capacity(record.len());
        let mut values = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            match table.column(name) {
                Ok(column) => {
                    columns.push(column);
                    values.push(value.clone());
                }
                Err(_) => {
                    dropped.insert(name.clone());
                }
            }
        }

        let sql = if options.upsert {
            upsert_sql(table, &columns, &conflict_columns)
        } else {
            insert_sql(table, &columns)
        };

        match execute_on(&tx, &sql, &values) {
            Ok(_) => outcome.loaded += 1,
            Err(e) if e.is_duplicate_key() => {
                outcome.skipped += 1;
                ctx.stats.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tx.commit()?;

    if !dropped.is_empty() {
        let columns: Vec<Value> = dropped.into_iter().map(Value::String).collect();
        ctx.warn(
            format!("Ignored columns not present on {}", table),
            Some(json!({ "columns": columns })),
        );
    }

    Ok(outcome)
}

fn insert_sql(table: TableKind, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", table.as_str());
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.as_str(),
        columns.join(", "),
        placeholders(columns.len())
    )
}

/// Last write wins: every non-conflict column takes the incoming value
fn upsert_sql(table: TableKind, columns: &[&str], conflict_columns: &[&str]) -> String {
    if columns.is_empty() {
        return insert_sql(table, columns);
    }

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !conflict_columns.contains(c))
        .map(|c| format!("{} = excluded.{}", c, c))
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        table.as_str(),
        columns.join(", "),
        placeholders(columns.len()),
        conflict_columns.join(", "),
        action
    )
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}
