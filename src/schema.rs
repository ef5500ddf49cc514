// 📐 Schema Catalog - the allow-list every SQL identifier comes from
// Tables, columns, repair defaults, duplicate keys, relationships and indexes

use crate::error::{PipelineError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// FIELD RULES
// ============================================================================

pub const USERNAME_MAX: usize = 50;
pub const USERNAME_MIN: usize = 3;
pub const FULL_NAME_MAX: usize = 100;
pub const PHONE_MAX: usize = 20;
pub const BIO_MAX: usize = 160;
pub const LONG_BIO_MAX: usize = 2000;
pub const TITLE_MAX: usize = 255;
pub const DESCRIPTION_MAX: usize = 1000;
pub const PASSWORD_MIN: usize = 6;

pub const PRIORITIES: [&str; 3] = ["low", "medium", "high"];
pub const DEFAULT_PRIORITY: &str = "medium";

pub const STATUSES: [&str; 3] = ["pending", "in-progress", "completed"];
pub const DEFAULT_STATUS: &str = "pending";

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Auth,
    Users,
    Todos,
    UserProfileUpdates,
    UserLogs,
    UserRoles,
    UserDivisions,
}

impl TableKind {
    pub const ALL: [TableKind; 7] = [
        TableKind::Auth,
        TableKind::Users,
        TableKind::Todos,
        TableKind::UserProfileUpdates,
        TableKind::UserLogs,
        TableKind::UserRoles,
        TableKind::UserDivisions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Auth => "auth",
            TableKind::Users => "users",
            TableKind::Todos => "todos",
            TableKind::UserProfileUpdates => "user_profile_updates",
            TableKind::UserLogs => "user_logs",
            TableKind::UserRoles => "user_roles",
            TableKind::UserDivisions => "user_divisions",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Auth => &["id", "email", "password", "created_at", "updated_at"],
            TableKind::Users => &[
                "id",
                "auth_id",
                "full_name",
                "username",
                "bio",
                "long_bio",
                "address",
                "phone_number",
                "profile_json",
                "profile_picture_url",
                "created_at",
                "updated_at",
            ],
            TableKind::Todos => &[
                "id",
                "user_id",
                "title",
                "description",
                "priority",
                "status",
                "due_date",
                "created_at",
                "updated_at",
            ],
            TableKind::UserProfileUpdates => &["id", "user_id", "updated_fields", "created_at"],
            TableKind::UserLogs => &["id", "user_id", "action", "details", "created_at"],
            TableKind::UserRoles => &["id", "user_id", "role", "created_at"],
            TableKind::UserDivisions => &["id", "user_id", "division_name", "created_at"],
        }
    }

    /// Resolve a column name to its allow-listed spelling
    pub fn column(&self, name: &str) -> Result<&'static str> {
        self.columns()
            .iter()
            .copied()
            .find(|c| *c == name)
            .ok_or_else(|| {
                PipelineError::Identifier(format!("column '{}' on table '{}'", name, self.as_str()))
            })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns().contains(&name)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        TableKind::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PipelineError::Identifier(format!("table '{}'", s)))
    }
}

/// Tables snapshotted before any mutating stage
pub const BACKUP_TABLES: [TableKind; 5] = [
    TableKind::Users,
    TableKind::Auth,
    TableKind::Todos,
    TableKind::UserProfileUpdates,
    TableKind::UserLogs,
];

// ============================================================================
// NULL REPAIR DEFAULTS
// ============================================================================

/// Replacement for NULLs in one column. `expression` is SQL and may reference
/// other columns of the same row.
#[derive(Debug, Clone, Copy)]
pub struct NullDefault {
    pub column: &'static str,
    pub expression: &'static str,
}

const fn null_default(column: &'static str, expression: &'static str) -> NullDefault {
    NullDefault { column, expression }
}

pub const NULL_DEFAULTS: &[(TableKind, &[NullDefault])] = &[
    (
        TableKind::Users,
        &[
            null_default("full_name", "'Unknown User'"),
            null_default("username", "'user_' || id"),
            null_default("bio", "'No bio available'"),
            null_default("long_bio", "'No long bio available'"),
            null_default("address", "'Address not provided'"),
            null_default("phone_number", "'No phone provided'"),
            null_default("profile_json", "'{}'"),
            null_default("profile_picture_url", "'/default-profile.jpg'"),
        ],
    ),
    (
        TableKind::Todos,
        &[
            null_default("title", "'Untitled Todo'"),
            null_default("description", "'No description'"),
            null_default("priority", "'medium'"),
            null_default("status", "'pending'"),
        ],
    ),
];

// ============================================================================
// DUPLICATE KEYS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Cosmetic key: later rows get their own id appended
    Soft,
    /// Identity key: the row with the smallest id survives, the rest are deleted
    Hard,
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateKey {
    pub table: TableKind,
    pub column: &'static str,
    pub policy: DuplicatePolicy,
}

/// Soft keys first: renaming never removes a row a hard pass would keep
pub const DUPLICATE_KEYS: &[DuplicateKey] = &[
    DuplicateKey {
        table: TableKind::Users,
        column: "username",
        policy: DuplicatePolicy::Soft,
    },
    DuplicateKey {
        table: TableKind::Users,
        column: "auth_id",
        policy: DuplicatePolicy::Hard,
    },
    DuplicateKey {
        table: TableKind::Auth,
        column: "email",
        policy: DuplicatePolicy::Hard,
    },
];

// ============================================================================
// RELATIONSHIPS
// ============================================================================

/// `child.foreign_key` references `parent.id`
#[derive(Debug, Clone, Copy)]
pub struct Relationship {
    pub parent: TableKind,
    pub child: TableKind,
    pub foreign_key: &'static str,
}

/// Ordered parent-first so a removed user also frees its todos in the same pass
pub const RELATIONSHIPS: &[Relationship] = &[
    Relationship {
        parent: TableKind::Auth,
        child: TableKind::Users,
        foreign_key: "auth_id",
    },
    Relationship {
        parent: TableKind::Users,
        child: TableKind::Todos,
        foreign_key: "user_id",
    },
    Relationship {
        parent: TableKind::Users,
        child: TableKind::UserProfileUpdates,
        foreign_key: "user_id",
    },
];

// ============================================================================
// INDEXES
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct IndexDefinition {
    pub name: &'static str,
    pub table: TableKind,
    pub columns: &'static [&'static str],
}

const fn index(
    name: &'static str,
    table: TableKind,
    columns: &'static [&'static str],
) -> IndexDefinition {
    IndexDefinition { name, table, columns }
}

pub const INDEXES: &[IndexDefinition] = &[
    index("idx_users_username", TableKind::Users, &["username"]),
    index("idx_users_auth_id", TableKind::Users, &["auth_id"]),
    index("idx_users_created_at", TableKind::Users, &["created_at"]),
    index("idx_users_updated_at", TableKind::Users, &["updated_at"]),
    index("idx_todos_user_id", TableKind::Todos, &["user_id"]),
    index("idx_todos_status", TableKind::Todos, &["status"]),
    index("idx_todos_priority", TableKind::Todos, &["priority"]),
    index("idx_todos_due_date", TableKind::Todos, &["due_date"]),
    index("idx_todos_created_at", TableKind::Todos, &["created_at"]),
    index("idx_todos_user_status_priority", TableKind::Todos, &["user_id", "status", "priority"]),
    index("idx_todos_user_due_date_status", TableKind::Todos, &["user_id", "due_date", "status"]),
    index("idx_auth_email", TableKind::Auth, &["email"]),
    index("idx_auth_created_at", TableKind::Auth, &["created_at"]),
    index("idx_user_roles_user_id", TableKind::UserRoles, &["user_id"]),
    index("idx_user_roles_user_role", TableKind::UserRoles, &["user_id", "role"]),
    index("idx_user_divisions_user_id", TableKind::UserDivisions, &["user_id"]),
    index("idx_user_divisions_user_division", TableKind::UserDivisions, &["user_id", "division_name"]),
    index("idx_user_profile_updates_user_id", TableKind::UserProfileUpdates, &["user_id"]),
    index("idx_user_profile_updates_created_at", TableKind::UserProfileUpdates, &["created_at"]),
    index("idx_user_logs_user_id", TableKind::UserLogs, &["user_id"]),
    index("idx_user_logs_action", TableKind::UserLogs, &["action"]),
    index("idx_user_logs_created_at", TableKind::UserLogs, &["created_at"]),
];

// ============================================================================
// GENERATED IDENTIFIERS
// ============================================================================

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
}

/// Check a generated identifier (backup table names) before it is spliced into SQL
pub fn check_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(PipelineError::Identifier(format!("'{}' is not a plain identifier", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trip_through_name() {
        for table in TableKind::ALL {
            assert_eq!(table.as_str().parse::<TableKind>().unwrap(), table);
        }
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = "users; DROP TABLE auth".parse::<TableKind>().unwrap_err();
        assert!(matches!(err, PipelineError::Identifier(_)));
    }

    #[test]
    fn test_column_allow_list() {
        assert_eq!(TableKind::Todos.column("priority").unwrap(), "priority");
        assert!(TableKind::Todos.column("username").is_err());
        assert!(TableKind::Users.column("id) VALUES (1); --").is_err());
    }

    #[test]
    fn test_catalog_only_names_allowed_columns() {
        for (table, defaults) in NULL_DEFAULTS {
            for d in *defaults {
                assert!(table.has_column(d.column), "{}.{}", table, d.column);
            }
        }
        for key in DUPLICATE_KEYS {
            assert!(key.table.has_column(key.column));
        }
        for rel in RELATIONSHIPS {
            assert!(rel.child.has_column(rel.foreign_key));
            assert!(rel.parent.has_column("id"));
        }
        for idx in INDEXES {
            for c in idx.columns {
                assert!(idx.table.has_column(c), "{} on {}", c, idx.table);
            }
            assert!(check_identifier(idx.name).is_ok());
        }
    }

    #[test]
    fn test_check_identifier() {
        assert!(check_identifier("users_backup_2025_01_15T10_30_00").is_ok());
        assert!(check_identifier("users backup").is_err());
        assert!(check_identifier("1users").is_err());
        assert!(check_identifier("").is_err());
    }
}
