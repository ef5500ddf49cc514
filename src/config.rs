// ⚙️ Configuration - environment for the store, fixed in-code settings for the stages

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// DATABASE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub user: String,
    pub host: String,
    /// Database file for the SQLite backend (`:memory:` for a throwaway store)
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            user: "postgres".to_string(),
            host: "localhost".to_string(),
            name: "workshop_db.sqlite3".to_string(),
            password: String::new(),
            port: 5432,
        }
    }
}

impl DatabaseConfig {
    /// Read `DB_USER`, `DB_HOST`, `DB_NAME`, `DB_PASSWORD` and `DB_PORT`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DatabaseConfig::default();

        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| PipelineError::Config(format!("DB_PORT is not a port number: {}", raw)))?,
            None => defaults.port,
        };

        Ok(DatabaseConfig {
            user: lookup("DB_USER").unwrap_or(defaults.user),
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            name: lookup("DB_NAME").unwrap_or(defaults.name),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            port,
        })
    }

    /// Connection description safe to log (no password)
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{} (password {})",
            self.user,
            self.host,
            self.port,
            self.name,
            if self.password.is_empty() { "unset" } else { "set" }
        )
    }
}

// ============================================================================
// STAGE SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlSettings {
    /// Row cap per extract
    pub batch_size: u32,
    /// Busy timeout handed to the connection
    pub timeout_ms: u64,
    pub validate_data: bool,
    pub create_backup: bool,
    pub incremental: bool,
}

impl Default for EtlSettings {
    fn default() -> Self {
        EtlSettings {
            batch_size: 1000,
            timeout_ms: 30_000,
            validate_data: true,
            create_backup: true,
            incremental: true,
        }
    }
}

impl EtlSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSettings {
    pub remove_nulls: bool,
    pub handle_duplicates: bool,
    pub clean_orphans: bool,
    pub optimize_indexes: bool,
    pub vacuum: bool,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        CleaningSettings {
            remove_nulls: true,
            handle_duplicates: true,
            clean_orphans: true,
            optimize_indexes: true,
            vacuum: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Backups older than this many days are dropped by the retention sweep
    pub retention_days: i64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings { retention_days: 7 }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub etl: EtlSettings,
    pub cleaning: CleaningSettings,
    pub backup: BackupSettings,
    /// Where run reports are written
    pub report_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            database: DatabaseConfig::default(),
            etl: EtlSettings::default(),
            cleaning: CleaningSettings::default(),
            backup: BackupSettings::default(),
            report_dir: PathBuf::from("logs"),
        }
    }
}

impl PipelineConfig {
    /// Load `.env.local` then `.env` (first value wins) and read the database keys
    pub fn from_env() -> Result<Self> {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();

        Ok(PipelineConfig {
            database: DatabaseConfig::from_env()?,
            ..PipelineConfig::default()
        })
    }
}
