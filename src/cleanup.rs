// 🧽 Cleanup Passes - in-place repairs on the live tables
// Order matters: nulls first, then duplicates, then orphans.
// Only non-zero outcomes are logged at info, so a clean store produces a quiet run.

use crate::context::RunContext;
use crate::error::Result;
use crate::schema::{
    DuplicateKey, DuplicatePolicy, Relationship, DUPLICATE_KEYS, NULL_DEFAULTS, RELATIONSHIPS,
};
use crate::store::Store;

// ============================================================================
// NULL REPAIR
// ============================================================================

/// Fill NULL columns with their per-table defaults. Returns rows updated.
pub fn repair_nulls(store: &Store, ctx: &mut RunContext) -> Result<usize> {
    ctx.debug("Cleaning NULL values...");

    match fill_defaults(store, ctx) {
        Ok(total) => {
            ctx.debug("NULL value cleaning completed");
            Ok(total)
        }
        Err(e) => {
            ctx.error("NULL value cleaning failed", &e);
            Err(e)
        }
    }
}

fn fill_defaults(store: &Store, ctx: &mut RunContext) -> Result<usize> {
    let mut total = 0;

    for (table, defaults) in NULL_DEFAULTS {
        if !store.table_exists(table.as_str())? {
            ctx.warn(format!("Table {} does not exist, skipping NULL repair", table), None);
            continue;
        }
        let live = store.table_columns(*table)?;

        for default in defaults.iter() {
            if !live.iter().any(|c| c == default.column) {
                continue;
            }
            let updated = store.execute(
                &format!(
                    "UPDATE {t} SET {c} = {e} WHERE {c} IS NULL",
                    t = table.as_str(),
                    c = default.column,
                    e = default.expression
                ),
                &[],
            )?;
            if updated > 0 {
                ctx.info(format!("Updated {} NULL {} values in {}", updated, default.column, table));
            }
            total += updated;
        }
    }

    Ok(total)
}

// ============================================================================
// DUPLICATES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuplicateOutcome {
    /// Rows disambiguated in place (soft keys)
    pub renamed: usize,
    /// Rows deleted (hard keys)
    pub removed: usize,
}

/// Resolve every declared duplicate key. The row with the smallest id always survives untouched.
pub fn resolve_duplicates(store: &Store, ctx: &mut RunContext) -> Result<DuplicateOutcome> {
    ctx.debug("Handling duplicates...");

    match resolve_all(store, ctx) {
        Ok(outcome) => {
            ctx.debug("Duplicate handling completed");
            Ok(outcome)
        }
        Err(e) => {
            ctx.error("Duplicate handling failed", &e);
            Err(e)
        }
    }
}

fn resolve_all(store: &Store, ctx: &mut RunContext) -> Result<DuplicateOutcome> {
    let mut outcome = DuplicateOutcome::default();

    for key in DUPLICATE_KEYS {
        if !store.table_exists(key.table.as_str())? {
            ctx.warn(format!("Table {} does not exist, skipping duplicate handling", key.table), None);
            continue;
        }
        let affected = store.execute(&duplicate_sql(key), &[])?;
        if affected == 0 {
            continue;
        }

        match key.policy {
            DuplicatePolicy::Soft => {
                outcome.renamed += affected;
                ctx.info(format!("Handled {} duplicate {} values in {}", affected, key.column, key.table));
            }
            DuplicatePolicy::Hard => {
                outcome.removed += affected;
                ctx.info(format!("Removed {} duplicate {} records from {}", affected, key.column, key.table));
            }
        }
    }

    Ok(outcome)
}

fn duplicate_sql(key: &DuplicateKey) -> String {
    let later_rows = format!(
        "SELECT b.id FROM {t} a JOIN {t} b ON a.{c} = b.{c} AND a.id < b.id WHERE a.{c} IS NOT NULL",
        t = key.table.as_str(),
        c = key.column
    );

    match key.policy {
        DuplicatePolicy::Soft => format!(
            "UPDATE {t} SET {c} = {c} || '_' || id WHERE id IN ({sub})",
            t = key.table.as_str(),
            c = key.column,
            sub = later_rows
        ),
        DuplicatePolicy::Hard => format!(
            "DELETE FROM {t} WHERE id IN ({sub})",
            t = key.table.as_str(),
            sub = later_rows
        ),
    }
}

// ============================================================================
// ORPHANS
// ============================================================================

/// Delete child rows whose parent no longer exists, for every declared relationship
pub fn remove_orphans(store: &Store, ctx: &mut RunContext) -> Result<usize> {
    ctx.debug("Cleaning orphaned records...");

    match delete_orphans(store, ctx) {
        Ok(total) => {
            ctx.debug("Orphaned record cleaning completed");
            Ok(total)
        }
        Err(e) => {
            ctx.error("Orphaned record cleaning failed", &e);
            Err(e)
        }
    }
}

fn delete_orphans(store: &Store, ctx: &mut RunContext) -> Result<usize> {
    let mut total = 0;

    for rel in RELATIONSHIPS {
        let mut skip = false;
        for table in [rel.parent, rel.child] {
            if !store.table_exists(table.as_str())? {
                ctx.warn(format!("Table {} does not exist, skipping orphan cleanup", table), None);
                skip = true;
            }
        }
        if skip {
            continue;
        }
        let removed = store.execute(&orphan_sql(rel), &[])?;
        if removed > 0 {
            ctx.info(format!("Removed {} orphaned {} records", removed, rel.child));
        }
        total += removed;
    }

    Ok(total)
}

fn orphan_sql(rel: &Relationship) -> String {
    format!(
        "DELETE FROM {child} WHERE {fk} IS NOT NULL AND {fk} NOT IN (SELECT id FROM {parent})",
        child = rel.child.as_str(),
        fk = rel.foreign_key,
        parent = rel.parent.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LogLevel, RunKind};
    use crate::store::setup_schema;

    fn test_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        setup_schema(store.connection()).unwrap();
        store
    }

    fn exec(store: &Store, sql: &str) {
        store.execute(sql, &[]).unwrap();
    }

    #[test]
    fn test_nulls_filled_with_defaults() {
        let store = test_store();
        exec(&store, "INSERT INTO users (id, username, full_name) VALUES (4, NULL, NULL)");
        exec(&store, "INSERT INTO todos (id, title, priority, status) VALUES (1, NULL, NULL, NULL)");
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let updated = repair_nulls(&store, &mut ctx).unwrap();

        assert!(updated >= 5);
        let user = &store.query("SELECT username, full_name, phone_number FROM users", &[]).unwrap().rows[0];
        assert_eq!(user.get_str("username"), Some("user_4"));
        assert_eq!(user.get_str("full_name"), Some("Unknown User"));
        assert_eq!(user.get_str("phone_number"), Some("No phone provided"));
        let todo = &store.query("SELECT title, priority, status FROM todos", &[]).unwrap().rows[0];
        assert_eq!(todo.get_str("title"), Some("Untitled Todo"));
        assert_eq!(todo.get_str("priority"), Some("medium"));
        assert_eq!(todo.get_str("status"), Some("pending"));
    }

    #[test]
    fn test_null_repair_skips_absent_columns_and_tables() {
        let store = test_store();
        exec(&store, "DROP TABLE todos");
        exec(&store, "ALTER TABLE users DROP COLUMN long_bio");
        exec(&store, "INSERT INTO users (id, username) VALUES (1, 'ok')");
        let mut ctx = RunContext::new(RunKind::Cleanup);

        repair_nulls(&store, &mut ctx).unwrap();

        assert_eq!(ctx.count_level(LogLevel::Warn), 1);
        assert_eq!(ctx.count_level(LogLevel::Error), 0);
    }

    #[test]
    fn test_soft_duplicates_renamed() {
        let store = test_store();
        exec(&store, "INSERT INTO users (id, username) VALUES (1, 'sam'), (2, 'sam'), (3, 'sam'), (4, 'kim')");
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let outcome = resolve_duplicates(&store, &mut ctx).unwrap();

        assert_eq!(outcome, DuplicateOutcome { renamed: 2, removed: 0 });
        let names: Vec<String> = store
            .query("SELECT username FROM users ORDER BY id", &[])
            .unwrap()
            .rows
            .iter()
            .map(|r| r.get_str("username").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["sam", "sam_2", "sam_3", "kim"]);
    }

    #[test]
    fn test_hard_duplicates_keep_smallest_id() {
        let store = test_store();
        exec(&store, "INSERT INTO auth (id, email) VALUES (5, 'a@b.io'), (2, 'a@b.io'), (9, 'c@d.io')");
        exec(&store, "INSERT INTO users (id, auth_id, username) VALUES (1, 2, 'ann'), (2, 2, 'bob')");
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let outcome = resolve_duplicates(&store, &mut ctx).unwrap();

        assert_eq!(outcome.removed, 2);
        assert_eq!(store.count("SELECT COUNT(*) FROM auth WHERE email = 'a@b.io'", &[]).unwrap(), 1);
        assert_eq!(store.count("SELECT id FROM auth WHERE email = 'a@b.io'", &[]).unwrap(), 2);
        assert_eq!(store.count("SELECT id FROM users WHERE auth_id = 2", &[]).unwrap(), 1);
    }

    #[test]
    fn test_orphans_removed_and_second_pass_quiet() {
        let store = test_store();
        exec(&store, "INSERT INTO auth (id, email) VALUES (1, 'a@b.io')");
        exec(&store, "INSERT INTO users (id, auth_id, username) VALUES (1, 1, 'ann'), (2, 99, 'ghost')");
        exec(&store, "INSERT INTO todos (id, user_id, title) VALUES (1, 1, 'keep'), (2, 2, 'ghost task'), (3, NULL, 'unowned')");
        exec(&store, "INSERT INTO user_profile_updates (id, user_id) VALUES (1, 42)");

        let mut first = RunContext::new(RunKind::Cleanup);
        let removed = remove_orphans(&store, &mut first).unwrap();

        // ghost user, then the todo and profile update that pointed at missing users
        assert_eq!(removed, 3);
        assert_eq!(store.count("SELECT COUNT(*) FROM todos", &[]).unwrap(), 2);

        let mut second = RunContext::new(RunKind::Cleanup);
        assert_eq!(remove_orphans(&store, &mut second).unwrap(), 0);
        assert_eq!(second.count_level(LogLevel::Info), 0);
    }

    #[test]
    fn test_missing_tables_warned_by_duplicate_and_orphan_passes() {
        let store = test_store();
        exec(&store, "DROP TABLE todos");
        exec(&store, "DROP TABLE auth");
        let mut ctx = RunContext::new(RunKind::Cleanup);

        resolve_duplicates(&store, &mut ctx).unwrap();
        assert_eq!(ctx.count_level(LogLevel::Warn), 1);

        remove_orphans(&store, &mut ctx).unwrap();
        // auth -> users, users -> todos; users -> user_profile_updates is intact
        assert_eq!(ctx.count_level(LogLevel::Warn), 3);
        assert_eq!(ctx.count_level(LogLevel::Error), 0);
    }

    #[test]
    fn test_pass_failure_is_logged_and_returned() {
        let store = test_store();
        exec(&store, "DROP TABLE users");
        exec(&store, "CREATE TABLE users (id INTEGER PRIMARY KEY, auth_id INTEGER)");
        exec(&store, "INSERT INTO users (id, auth_id) VALUES (1, 1), (2, 1)");
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let result = resolve_duplicates(&store, &mut ctx);

        assert!(result.is_err());
        assert_eq!(ctx.count_level(LogLevel::Error), 1);
    }
}
