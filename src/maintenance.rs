// 🛠️ Index and statistics maintenance
// A bad index is a warning, never a failed run

use crate::context::RunContext;
use crate::error::Result;
use crate::schema::{IndexDefinition, TableKind, INDEXES};
use crate::store::Store;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub created: usize,
    pub failed: usize,
    pub analyzed: usize,
}

fn index_sql(index: &IndexDefinition) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        index.name,
        index.table.as_str(),
        index.columns.join(", ")
    )
}

/// Ensure every declared index exists, then refresh planner statistics per table
pub fn optimize_indexes(store: &Store, ctx: &mut RunContext) -> Result<IndexOutcome> {
    ctx.info("Optimizing database indexes...");

    let mut outcome = IndexOutcome::default();

    for index in INDEXES {
        if !store.table_exists(index.table.as_str())? {
            ctx.debug(format!("Table {} does not exist, skipping index {}", index.table, index.name));
            continue;
        }
        match store.execute(&index_sql(index), &[]) {
            Ok(_) => {
                outcome.created += 1;
                ctx.debug(format!("Index created: {}", index.name));
            }
            Err(e) => {
                outcome.failed += 1;
                ctx.warn(
                    format!("Failed to create index: {}", index.name),
                    Some(json!({ "error": e.to_string() })),
                );
            }
        }
    }

    for table in TableKind::ALL {
        match analyze_table(store, table) {
            Ok(true) => {
                outcome.analyzed += 1;
                ctx.debug(format!("Analyzed table: {}", table));
            }
            Ok(false) => {}
            Err(e) => ctx.warn(
                format!("Failed to analyze table: {}", table),
                Some(json!({ "error": e.to_string() })),
            ),
        }
    }

    ctx.info("Index optimization completed");
    Ok(outcome)
}

fn analyze_table(store: &Store, table: TableKind) -> Result<bool> {
    if !store.table_exists(table.as_str())? {
        return Ok(false);
    }
    store.connection().execute_batch(&format!("ANALYZE {}", table.as_str()))?;
    Ok(true)
}

/// Refresh statistics for the whole database, then reclaim free pages
pub fn vacuum(store: &Store, ctx: &mut RunContext) -> Result<()> {
    ctx.info("Running database vacuum...");

    let result: Result<()> = store
        .connection()
        .execute_batch("ANALYZE; VACUUM;")
        .map_err(Into::into);

    match result {
        Ok(()) => {
            ctx.info("Database vacuum completed");
            Ok(())
        }
        Err(e) => {
            ctx.error("Database vacuum failed", &e);
            Err(e)
        }
    }
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

    fn index_count(store: &Store) -> i64 {
        store
            .count("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx\\_%' ESCAPE '\\'", &[])
            .unwrap()
    }

    #[test]
    fn test_all_indexes_created() {
        let store = test_store();
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let outcome = optimize_indexes(&store, &mut ctx).unwrap();

        assert_eq!(outcome.created, INDEXES.len());
        assert_eq!(outcome.analyzed, TableKind::ALL.len());
        assert_eq!(index_count(&store), INDEXES.len() as i64);
        assert_eq!(ctx.count_level(LogLevel::Warn), 0);
    }

    #[test]
    fn test_rerun_is_harmless() {
        let store = test_store();
        let mut ctx = RunContext::new(RunKind::Cleanup);
        optimize_indexes(&store, &mut ctx).unwrap();
        optimize_indexes(&store, &mut ctx).unwrap();

        assert_eq!(index_count(&store), INDEXES.len() as i64);
    }

    #[test]
    fn test_missing_table_is_skipped() {
        let store = test_store();
        store.execute("DROP TABLE user_logs", &[]).unwrap();
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let outcome = optimize_indexes(&store, &mut ctx).unwrap();

        assert_eq!(outcome.created, INDEXES.len() - 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.analyzed, TableKind::ALL.len() - 1);
        assert_eq!(ctx.count_level(LogLevel::Warn), 0);
    }

    #[test]
    fn test_failing_index_is_a_warning() {
        let store = test_store();
        store.execute("ALTER TABLE user_logs DROP COLUMN action", &[]).unwrap();
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let outcome = optimize_indexes(&store, &mut ctx).unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.created, INDEXES.len() - 1);
        assert_eq!(ctx.count_level(LogLevel::Warn), 1);
        assert_eq!(ctx.count_level(LogLevel::Error), 0);
    }

    #[test]
    fn test_vacuum() {
        let store = test_store();
        store.execute("INSERT INTO todos (id, title) VALUES (1, 'x')", &[]).unwrap();
        let mut ctx = RunContext::new(RunKind::Cleanup);

        vacuum(&store, &mut ctx).unwrap();

        assert_eq!(ctx.events.last().unwrap().message, "Database vacuum completed");
        assert_eq!(store.count("SELECT COUNT(*) FROM todos", &[]).unwrap(), 1);
    }
}
