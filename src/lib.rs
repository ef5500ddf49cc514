// Workshop ETL - Core Library
// Exposes every pipeline stage for the CLI and the integration tests

pub mod error;
pub mod config;
pub mod record;
pub mod schema;         // Table catalog: columns, defaults, keys, relationships, indexes
pub mod store;
pub mod context;        // Per-run stats, events and rejections
pub mod backup;
pub mod extract;
pub mod transform;
pub mod validate;
pub mod load;
pub mod cleanup;
pub mod analyze;
pub mod maintenance;
pub mod report;
pub mod pipeline;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use config::{BackupSettings, CleaningSettings, DatabaseConfig, EtlSettings, PipelineConfig};
pub use record::{Record, TransformedRecord};
pub use schema::{TableKind, BACKUP_TABLES};
pub use store::{setup_schema, QueryResult, Store};
pub use context::{LogEvent, LogLevel, Rejection, RunContext, RunKind, RunStats};
pub use backup::{create_backups, sweep_backups};
pub use extract::{extract, ExtractConditions};
pub use transform::{transform, transform_records};
pub use validate::{validate, validate_record, ValidationResult};
pub use load::{load, LoadOptions, LoadOutcome};
pub use cleanup::{remove_orphans, repair_nulls, resolve_duplicates, DuplicateOutcome};
pub use analyze::{analyze_data_quality, QualityAnalysis, TableQuality};
pub use maintenance::{optimize_indexes, vacuum, IndexOutcome};
pub use report::{generate_report, read_report, write_report, Report, RunStatus, REPORT_SCHEMA_VERSION};
pub use pipeline::{EtlJob, Pipeline, Plan, PlannedStage, RunOutcome, Stage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
