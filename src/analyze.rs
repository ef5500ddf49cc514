// 🔍 Data Quality Analysis - read-only counts of what the cleanup passes would fix
// Null columns, duplicate keys, orphaned rows and overdue todos, per table

use crate::context::{LogLevel, RunContext};
use crate::error::Result;
use crate::schema::{TableKind, DUPLICATE_KEYS, RELATIONSHIPS};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columns whose NULL count is reported, per table
const TRACKED_NULLS: &[(TableKind, &[&str])] = &[
    (
        TableKind::Users,
        &["full_name", "username", "bio", "address", "phone_number", "profile_picture_url"],
    ),
    (TableKind::Todos, &["title", "user_id", "priority", "status"]),
    (TableKind::Auth, &["email", "password"]),
];

// ============================================================================
// ANALYSIS RESULT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableQuality {
    pub table: String,
    pub total_rows: i64,
    pub null_counts: BTreeMap<String, i64>,
    /// Distinct values that occur more than once, keyed by column
    pub duplicate_keys: BTreeMap<String, i64>,
    /// Rows whose parent is gone, keyed by foreign key column
    pub orphaned_rows: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overdue_todos: Option<i64>,
}

impl TableQuality {
    pub fn issue_count(&self) -> i64 {
        self.null_counts.values().sum::<i64>()
            + self.duplicate_keys.values().sum::<i64>()
            + self.orphaned_rows.values().sum::<i64>()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub tables: Vec<TableQuality>,
}

impl QualityAnalysis {
    pub fn table(&self, table: TableKind) -> Option<&TableQuality> {
        self.tables.iter().find(|t| t.table == table.as_str())
    }

    pub fn summary(&self) -> String {
        let rows: i64 = self.tables.iter().map(|t| t.total_rows).sum();
        let issues: i64 = self.tables.iter().map(TableQuality::issue_count).sum();
        format!(
            "Tables: {}, Rows: {}, Issues: {} ({} overdue todos)",
            self.tables.len(),
            rows,
            issues,
            self.tables.iter().filter_map(|t| t.overdue_todos).sum::<i64>()
        )
    }

    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(|t| t.issue_count() == 0)
    }
}

// ============================================================================
// ANALYSIS
// ============================================================================

pub fn analyze_data_quality(store: &Store, ctx: &mut RunContext) -> Result<QualityAnalysis> {
    ctx.info("Analyzing data quality...");

    match collect(store) {
        Ok(analysis) => {
            let data = serde_json::to_value(&analysis)?;
            ctx.log(LogLevel::Info, "Data quality analysis completed", Some(data));
            Ok(analysis)
        }
        Err(e) => {
            ctx.error("Data quality analysis failed", &e);
            Err(e)
        }
    }
}

fn collect(store: &Store) -> Result<QualityAnalysis> {
    let mut analysis = QualityAnalysis::default();

    for (table, columns) in TRACKED_NULLS {
        if !store.table_exists(table.as_str())? {
            continue;
        }
        analysis.tables.push(analyze_table(store, *table, columns)?);
    }

    Ok(analysis)
}

fn analyze_table(store: &Store, table: TableKind, columns: &[&str]) -> Result<TableQuality> {
    let name = table.as_str();
    let mut quality = TableQuality {
        table: name.to_string(),
        total_rows: store.count(&format!("SELECT COUNT(*) FROM {}", name), &[])?,
        ..TableQuality::default()
    };

    let live = store.table_columns(table)?;
    for column in columns.iter().filter(|c| live.iter().any(|l| l == *c)) {
        let column = table.column(column)?;
        let nulls = store.count(
            &format!("SELECT COUNT(*) FROM {} WHERE {} IS NULL", name, column),
            &[],
        )?;
        quality.null_counts.insert(column.to_string(), nulls);
    }

    for key in DUPLICATE_KEYS.iter().filter(|k| k.table == table) {
        let groups = store.count(
            &format!(
                "SELECT COUNT(*) FROM (SELECT {c} FROM {t} WHERE {c} IS NOT NULL GROUP BY {c} HAVING COUNT(*) > 1)",
                c = key.column,
                t = name
            ),
            &[],
        )?;
        quality.duplicate_keys.insert(key.column.to_string(), groups);
    }

    for rel in RELATIONSHIPS.iter().filter(|r| r.child == table) {
        if !store.table_exists(rel.parent.as_str())? {
            continue;
        }
        let orphans = store.count(
            &format!(
                "SELECT COUNT(*) FROM {child} WHERE {fk} IS NOT NULL AND {fk} NOT IN (SELECT id FROM {parent})",
                child = name,
                fk = rel.foreign_key,
                parent = rel.parent.as_str()
            ),
            &[],
        )?;
        quality.orphaned_rows.insert(rel.foreign_key.to_string(), orphans);
    }

    if table == TableKind::Todos {
        quality.overdue_todos = Some(store.count(
            "SELECT COUNT(*) FROM todos WHERE due_date < CURRENT_DATE AND status != 'completed'",
            &[],
        )?);
    }

    Ok(quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunKind;
    use crate::store::setup_schema;

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        setup_schema(store.connection()).unwrap();
        for sql in [
            "INSERT INTO auth (id, email, password) VALUES (1, 'a@b.io', 'secret1'), (2, 'a@b.io', NULL)",
            "INSERT INTO users (id, auth_id, username) VALUES (1, 1, 'ann'), (2, 1, 'ann'), (3, 77, NULL)",
            "INSERT INTO todos (id, user_id, title, status, due_date) VALUES
                (1, 1, 'Late', 'pending', '2000-01-01'),
                (2, 1, 'Done', 'completed', '2000-01-01'),
                (3, 9, NULL, 'pending', '2999-01-01')",
        ] {
            store.execute(sql, &[]).unwrap();
        }
        store
    }

    #[test]
    fn test_analysis_counts() {
        let store = seeded_store();
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let analysis = analyze_data_quality(&store, &mut ctx).unwrap();

        let users = analysis.table(TableKind::Users).unwrap();
        assert_eq!(users.total_rows, 3);
        assert_eq!(users.null_counts["username"], 1);
        assert_eq!(users.duplicate_keys["username"], 1);
        assert_eq!(users.duplicate_keys["auth_id"], 1);
        assert_eq!(users.orphaned_rows["auth_id"], 1);

        let todos = analysis.table(TableKind::Todos).unwrap();
        assert_eq!(todos.null_counts["title"], 1);
        assert_eq!(todos.orphaned_rows["user_id"], 1);
        assert_eq!(todos.overdue_todos, Some(1));

        let auth = analysis.table(TableKind::Auth).unwrap();
        assert_eq!(auth.duplicate_keys["email"], 1);
        assert_eq!(auth.null_counts["password"], 1);

        assert!(!analysis.is_clean());
        assert_eq!(store.count("SELECT COUNT(*) FROM users", &[]).unwrap(), 3);
    }

    #[test]
    fn test_analysis_logs_findings() {
        let store = seeded_store();
        let mut ctx = RunContext::new(RunKind::Cleanup);
        analyze_data_quality(&store, &mut ctx).unwrap();

        let done = ctx.events.last().unwrap();
        assert_eq!(done.level, LogLevel::Info);
        assert_eq!(done.message, "Data quality analysis completed");
        assert!(done.data.as_ref().unwrap()["tables"].is_array());
    }

    #[test]
    fn test_missing_tables_are_left_out() {
        let store = Store::open_in_memory().unwrap();
        setup_schema(store.connection()).unwrap();
        store.execute("DROP TABLE auth", &[]).unwrap();
        let mut ctx = RunContext::new(RunKind::Cleanup);

        let analysis = analyze_data_quality(&store, &mut ctx).unwrap();

        assert!(analysis.table(TableKind::Auth).is_none());
        assert!(analysis.table(TableKind::Users).unwrap().orphaned_rows.is_empty());
        assert!(analysis.is_clean());
        assert!(analysis.summary().starts_with("Tables: 2, Rows: 0"));
    }
}
