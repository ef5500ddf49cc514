use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::record::Record;
use crate::schema::TableKind;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode};
use serde_json::Value;
use std::time::Duration;

/// Rows returned by a query plus the affected/returned row count
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub row_count: usize,
}

/// Relational store behind a single SQLite connection.
///
/// Every value goes through bound parameters; identifiers come from the
/// schema catalog.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the database named by `DB_NAME`. The timeout becomes the
    /// connection's busy timeout, the only deadline a query is held to.
    pub fn open(config: &DatabaseConfig, timeout: Duration) -> Result<Self> {
        let conn = if config.name == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.name)?
        };
        conn.busy_timeout(timeout)?;
        // WAL keeps readers going while a load transaction is open
        if config.name != ":memory:" {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Store {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let rows = query_rows(&self.conn, sql, params)?;
        let row_count = rows.len();
        Ok(QueryResult { rows, row_count })
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        execute_on(&self.conn, sql, params)
    }

    /// Run a statement that returns a single integer (COUNT queries)
    pub fn count(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let values: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        let n: i64 = self
            .conn
            .query_row(sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(n)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let n = self.count(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[Value::from(table)],
        )?;
        Ok(n > 0)
    }

    /// Columns of the live table, in declaration order (empty if the table is missing)
    pub fn table_columns(&self, table: TableKind) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table.as_str()))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Table names matching a LIKE pattern (`\` escapes)
    pub fn tables_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name LIKE ?1 ESCAPE '\\'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([pattern], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// Run a SELECT on any connection (including an open transaction)
pub fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
    let values: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (i, name) in columns.iter().enumerate() {
            record.set(name.clone(), from_sql_value(row.get_ref(i)?));
        }
        records.push(record);
    }

    Ok(records)
}

pub fn execute_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize> {
    let values: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
    let affected = conn.execute(sql, params_from_iter(values.iter()))?;
    Ok(affected)
}

/// Map a JSON scalar onto a SQLite value. Objects and arrays are stored as JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

pub fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
    }
}

/// Duplicate-key class: unique index or primary key collision
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Create the workshop tables if they do not exist yet
pub fn setup_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS auth (
            id INTEGER PRIMARY KEY,
            email TEXT,
            password TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            auth_id INTEGER,
            full_name TEXT,
            username TEXT,
            bio TEXT,
            long_bio TEXT,
            address TEXT,
            phone_number TEXT,
            profile_json TEXT,
            profile_picture_url TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            title TEXT,
            description TEXT,
            priority TEXT DEFAULT 'medium',
            status TEXT DEFAULT 'pending',
            due_date TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS user_profile_updates (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            updated_fields TEXT NOT NULL DEFAULT '{}',
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS user_logs (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            action TEXT,
            details TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS user_roles (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            role TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS user_divisions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            division_name TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        setup_schema(store.connection()).unwrap();
        store
    }

    #[test]
    fn test_setup_schema_is_idempotent() {
        let store = test_store();
        setup_schema(store.connection()).unwrap();

        for table in TableKind::ALL {
            assert!(store.table_exists(table.as_str()).unwrap(), "{} missing", table);
        }
    }

    #[test]
    fn test_query_returns_records_in_column_order() {
        let store = test_store();
        store
            .execute(
                "INSERT INTO todos (id, user_id, title, priority) VALUES (?1, ?2, ?3, ?4)",
                &[json!(1), json!(7), json!("Write report"), json!("high")],
            )
            .unwrap();

        let result = store
            .query("SELECT id, title, due_date FROM todos WHERE id = ?1", &[json!(1)])
            .unwrap();

        assert_eq!(result.row_count, 1);
        let row = &result.rows[0];
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "title", "due_date"]);
        assert_eq!(row.get("title"), Some(&json!("Write report")));
        assert_eq!(row.get("due_date"), Some(&Value::Null));
    }

    #[test]
    fn test_unique_violation_detected() {
        let store = test_store();
        store
            .execute("INSERT INTO auth (id, email) VALUES (1, 'a@b.io')", &[])
            .unwrap();

        let err = store
            .connection()
            .execute("INSERT INTO auth (id, email) VALUES (1, 'c@d.io')", [])
            .unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_table_columns_and_missing_table() {
        let store = test_store();
        let columns = store.table_columns(TableKind::Auth).unwrap();
        assert_eq!(columns, vec!["id", "email", "password", "created_at", "updated_at"]);

        store.execute("DROP TABLE user_roles", &[]).unwrap();
        assert!(!store.table_exists("user_roles").unwrap());
        assert!(store.table_columns(TableKind::UserRoles).unwrap().is_empty());
    }

    #[test]
    fn test_json_values_round_trip_as_text() {
        let store = test_store();
        store
            .execute(
                "INSERT INTO users (id, profile_json) VALUES (?1, ?2)",
                &[json!(1), json!({"email": "X@Y.io"})],
            )
            .unwrap();

        let rows = store.query("SELECT profile_json FROM users", &[]).unwrap().rows;
        assert_eq!(rows[0].get_str("profile_json"), Some(r#"{"email":"X@Y.io"}"#));
    }
}
