// 🧵 Run Context - everything one pipeline run accumulates
// Passed explicitly to each stage; nothing here is global

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// RUN KIND
// ============================================================================

/// Which of the two pipelines is running. Decides the stage plan and the
/// names of backup tables and report files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Etl,
    Cleanup,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Etl => "etl",
            RunKind::Cleanup => "cleanup",
        }
    }

    /// Infix between table name and timestamp in backup table names
    pub fn backup_infix(&self) -> &'static str {
        match self {
            RunKind::Etl => "_etl_backup_",
            RunKind::Cleanup => "_backup_",
        }
    }

    pub fn report_prefix(&self) -> &'static str {
        match self {
            RunKind::Etl => "etl-report",
            RunKind::Cleanup => "cleanup-report",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LOG EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// RUN STATS
// ============================================================================

/// Per-run counters. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub extracted: u64,
    pub transformed: u64,
    pub loaded: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl RunStats {
    pub fn add(&mut self, other: &RunStats) {
        self.extracted += other.extracted;
        self.transformed += other.transformed;
        self.loaded += other.loaded;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }

    /// Loaded rows as a percentage of extracted rows
    pub fn success_rate(&self) -> Option<f64> {
        if self.extracted == 0 {
            None
        } else {
            Some(self.loaded as f64 / self.extracted as f64 * 100.0)
        }
    }
}

/// A record dropped by validation, with its violations in rule order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub table: String,
    pub record: Record,
    pub errors: Vec<String>,
}

// ============================================================================
// RUN CONTEXT
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub stats: RunStats,
    pub events: Vec<LogEvent>,
    pub rejections: Vec<Rejection>,
    pub backup_tables: Vec<String>,
}

impl RunContext {
    pub fn new(kind: RunKind) -> Self {
        Self::starting_at(kind, Utc::now())
    }

    pub fn starting_at(kind: RunKind, started_at: DateTime<Utc>) -> Self {
        RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            kind,
            started_at,
            stats: RunStats::default(),
            events: Vec::new(),
            rejections: Vec::new(),
            backup_tables: Vec::new(),
        }
    }

    /// Empty context for one stage invocation of the same run, folded back with `merge`
    pub fn child(&self) -> Self {
        RunContext {
            run_id: self.run_id.clone(),
            ..Self::starting_at(self.kind, self.started_at)
        }
    }

    /// Record an event and echo it to the tracing subscriber
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        let message = message.into();
        emit(level, &message, data.as_ref());
        self.events.push(LogEvent {
            timestamp: Utc::now(),
            level,
            message,
            data,
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&mut self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Warn, message, data);
    }

    pub fn error(&mut self, message: impl Into<String>, error: &dyn fmt::Display) {
        self.log(
            LogLevel::Error,
            message,
            Some(serde_json::json!({ "error": error.to_string() })),
        );
    }

    pub fn count_level(&self, level: LogLevel) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    /// Fold a context produced by a separate stage invocation into this one
    pub fn merge(&mut self, other: RunContext) {
        self.stats.add(&other.stats);
        self.events.extend(other.events);
        self.events.sort_by_key(|e| e.timestamp);
        self.rejections.extend(other.rejections);
        self.backup_tables.extend(other.backup_tables);
    }
}

fn emit(level: LogLevel, message: &str, data: Option<&Value>) {
    match (level, data) {
        (LogLevel::Debug, Some(d)) => tracing::debug!(data = %d, "{}", message),
        (LogLevel::Debug, None) => tracing::debug!("{}", message),
        (LogLevel::Info, Some(d)) => tracing::info!(data = %d, "{}", message),
        (LogLevel::Info, None) => tracing::info!("{}", message),
        (LogLevel::Warn, Some(d)) => tracing::warn!(data = %d, "{}", message),
        (LogLevel::Warn, None) => tracing::warn!("{}", message),
        (LogLevel::Error, Some(d)) => tracing::error!(data = %d, "{}", message),
        (LogLevel::Error, None) => tracing::error!("{}", message),
    }
}
