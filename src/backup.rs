// 💾 Backup Stage - full-copy snapshots before anything is mutated
// Plus the retention sweep that drops snapshots past their cutoff

use crate::context::RunContext;
use crate::error::Result;
use crate::schema::{check_identifier, TableKind};
use crate::store::Store;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// Timestamp layout embedded in backup and report names
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%dT%H_%M_%S";

lazy_static! {
    static ref BACKUP_NAME: Regex = Regex::new(
        r"^[a-z_]+?_backup_(\d{4}_\d{2}_\d{2}T\d{2}_\d{2}_\d{2})(?:_\d+)?$"
    )
    .unwrap();
}

pub fn backup_table_name(table: TableKind, infix: &str, at: DateTime<Utc>) -> String {
    format!("{}{}{}", table.as_str(), infix, at.format(TIMESTAMP_FORMAT))
}

/// Timestamp embedded in a backup table name, `None` if the name is not a backup
pub fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let caps = BACKUP_NAME.captures(name)?;
    NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Snapshot every listed table that exists.
///
/// Missing tables are a warning. A failed copy is logged and returned as an
/// error: the caller must not go on to mutate without a safety copy.
pub fn create_backups(
    store: &Store,
    tables: &[TableKind],
    at: DateTime<Utc>,
    ctx: &mut RunContext,
) -> Result<Vec<String>> {
    ctx.info("Creating database backup...");

    match copy_tables(store, tables, at, ctx) {
        Ok(created) => {
            ctx.info(format!(
                "Backup completed. Created {} backup tables",
                created.len()
            ));
            Ok(created)
        }
        Err(e) => {
            ctx.error("Backup creation failed", &e);
            Err(e)
        }
    }
}

fn copy_tables(
    store: &Store,
    tables: &[TableKind],
    at: DateTime<Utc>,
    ctx: &mut RunContext,
) -> Result<Vec<String>> {
    let infix = ctx.kind.backup_infix();
    let mut created = Vec::new();

    for table in tables {
        if !store.table_exists(table.as_str())? {
            ctx.warn(
                format!("Table {} does not exist, skipping backup", table),
                None,
            );
            continue;
        }

        let name = unused_name(store, &backup_table_name(*table, infix, at))?;
        check_identifier(&name)?;

        store.execute(
            &format!("CREATE TABLE {} AS SELECT * FROM {}", name, table.as_str()),
            &[],
        )?;
        ctx.backup_tables.push(name.clone());
        ctx.info(format!("Backup created: {}", name));
        created.push(name);
    }

    Ok(created)
}

/// Same-second re-runs get `_2`, `_3`, ... so an existing backup is never replaced
fn unused_name(store: &Store, base: &str) -> Result<String> {
    if !store.table_exists(base)? {
        return Ok(base.to_string());
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !store.table_exists(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Drop backup tables older than `retention_days`.
///
/// Failures are logged at error level but never abort the run.
pub fn sweep_backups(
    store: &Store,
    retention_days: i64,
    now: DateTime<Utc>,
    ctx: &mut RunContext,
) -> Vec<String> {
    ctx.info("Cleaning up old backups...");

    let cutoff = now - Duration::days(retention_days);
    match drop_expired(store, cutoff, ctx) {
        Ok(dropped) => {
            ctx.info("Old backup cleanup completed");
            dropped
        }
        Err(e) => {
            ctx.error("Old backup cleanup failed", &e);
            Vec::new()
        }
    }
}

fn drop_expired(store: &Store, cutoff: DateTime<Utc>, ctx: &mut RunContext) -> Result<Vec<String>> {
    let mut dropped = Vec::new();

    for name in store.tables_matching(r"%\_backup\_%")? {
        let Some(taken_at) = parse_backup_timestamp(&name) else {
            continue;
        };
        if taken_at >= cutoff {
            continue;
        }

        check_identifier(&name)?;
        store.execute(&format!("DROP TABLE IF EXISTS {}", name), &[])?;
        ctx.info(format!("Dropped old backup table: {}", name));
        dropped.push(name);
    }

    Ok(dropped)
}
