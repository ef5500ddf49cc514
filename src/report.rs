// 📊 Run Report - the durable audit trail of one run
// Schema is versioned so downstream tooling can parse reports without guessing their shape

use crate::backup::TIMESTAMP_FORMAT;
use crate::context::{LogEvent, LogLevel, Rejection, RunContext, RunKind, RunStats};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed { error: String },
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: RunStatus,
    pub stats: RunStats,
    pub backup_tables: Vec<String>,
    pub log_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: u32,
    pub run_id: String,
    pub kind: RunKind,
    pub summary: ReportSummary,
    pub logs: Vec<LogEvent>,
    pub rejections: Vec<Rejection>,
    pub recommendations: Vec<String>,
}

/// Build the report for a finished run. Same context and end time, same report.
pub fn generate_report(ctx: &RunContext, ended_at: DateTime<Utc>, failure: Option<&str>) -> Report {
    let status = match failure {
        Some(error) => RunStatus::Failed {
            error: error.to_string(),
        },
        None => RunStatus::Succeeded,
    };

    Report {
        schema_version: REPORT_SCHEMA_VERSION,
        run_id: ctx.run_id.clone(),
        kind: ctx.kind,
        summary: ReportSummary {
            start_time: ctx.started_at,
            end_time: ended_at,
            duration_ms: (ended_at - ctx.started_at).num_milliseconds(),
            status,
            stats: ctx.stats,
            backup_tables: ctx.backup_tables.clone(),
            log_count: ctx.events.len(),
        },
        logs: ctx.events.clone(),
        rejections: ctx.rejections.clone(),
        recommendations: recommendations(ctx),
    }
}

fn recommendations(ctx: &RunContext) -> Vec<String> {
    let stats = &ctx.stats;
    let mut out = Vec::new();

    if stats.errors > 0 {
        out.push(format!("Review {} data validation errors", stats.errors));
    }
    if stats.skipped > 0 {
        out.push(format!("Investigate {} skipped records (duplicates)", stats.skipped));
    }
    if let Some(rate) = stats.success_rate() {
        out.push(format!("ETL success rate: {:.2}%", rate));
    }
    if ctx.count_level(LogLevel::Error) > 0 {
        out.push("Review error logs and fix issues before next run".to_string());
    }
    if ctx.count_level(LogLevel::Warn) > 0 {
        out.push("Address warnings to improve data quality".to_string());
    }
    if !ctx.backup_tables.is_empty() {
        out.push(format!("Monitor backup tables: {}", ctx.backup_tables.join(", ")));
    }

    out
}

/// `attempt` 1 is the plain name; later attempts get `_2`, `_3`, ... like backup tables
pub fn report_file_name(kind: RunKind, at: DateTime<Utc>, attempt: u32) -> String {
    let stem = format!("{}-{}", kind.report_prefix(), at.format(TIMESTAMP_FORMAT));
    match attempt {
        0 | 1 => format!("{}.json", stem),
        n => format!("{}_{}.json", stem, n),
    }
}

/// Write the report as pretty JSON under `dir`, creating it if needed.
///
/// An existing report is never replaced: a name already taken by another run
/// ending in the same second gets the next free suffix.
pub fn write_report(report: &Report, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let body = serde_json::to_string_pretty(report)?;

    let mut attempt = 1;
    loop {
        let path = dir.join(report_file_name(report.kind, report.summary.end_time, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

pub fn read_report(path: &Path) -> Result<Report> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
