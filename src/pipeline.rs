// 🚚 Pipeline - an explicit, ordered plan of named stages and the runner that executes it
// Skip decisions are made when the plan is built, not while it runs

use crate::analyze::analyze_data_quality;
use crate::backup::{create_backups, sweep_backups};
use crate::cleanup::{remove_orphans, repair_nulls, resolve_duplicates};
use crate::config::PipelineConfig;
use crate::context::{RunContext, RunKind};
use crate::error::{PipelineError, Result};
use crate::extract::{extract, ExtractConditions};
use crate::load::{load, LoadOptions};
use crate::maintenance::{optimize_indexes, vacuum};
use crate::report::{generate_report, write_report, Report};
use crate::schema::{TableKind, BACKUP_TABLES};
use crate::store::Store;
use crate::transform::transform;
use crate::validate::validate;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Tables the ETL run processes, in order
pub const ETL_TABLES: [TableKind; 3] = [TableKind::Users, TableKind::Todos, TableKind::Auth];

// ============================================================================
// PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EtlJob {
    pub table: TableKind,
    pub conditions: ExtractConditions,
    pub load: LoadOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Backup,
    Analyze,
    Etl(EtlJob),
    RepairNulls,
    ResolveDuplicates,
    RemoveOrphans,
    OptimizeIndexes,
    Vacuum,
    SweepBackups,
}

impl Stage {
    pub fn name(&self) -> String {
        match self {
            Stage::Backup => "backup".to_string(),
            Stage::Analyze => "analyze".to_string(),
            Stage::Etl(job) => format!("etl:{}", job.table),
            Stage::RepairNulls => "repair_nulls".to_string(),
            Stage::ResolveDuplicates => "resolve_duplicates".to_string(),
            Stage::RemoveOrphans => "remove_orphans".to_string(),
            Stage::OptimizeIndexes => "optimize_indexes".to_string(),
            Stage::Vacuum => "vacuum".to_string(),
            Stage::SweepBackups => "sweep_backups".to_string(),
        }
    }

    /// The "disabled" message's subject, worded as the run log shows it
    fn label(&self) -> &'static str {
        match self {
            Stage::Backup => "Backup",
            Stage::Analyze => "Data quality analysis",
            Stage::Etl(_) => "ETL job",
            Stage::RepairNulls => "NULL value cleaning",
            Stage::ResolveDuplicates => "Duplicate handling",
            Stage::RemoveOrphans => "Orphaned record cleaning",
            Stage::OptimizeIndexes => "Index optimization",
            Stage::Vacuum => "Database vacuum",
            Stage::SweepBackups => "Backup retention sweep",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStage {
    pub stage: Stage,
    /// Set when configuration turns this stage off
    pub skip_reason: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub kind: RunKind,
    pub stages: Vec<PlannedStage>,
}

impl Plan {
    pub fn for_kind(kind: RunKind, config: &PipelineConfig, updated_after: Option<DateTime<Utc>>) -> Self {
        let mut stages = vec![Stage::Backup];

        match kind {
            RunKind::Etl => {
                let after = if config.etl.incremental { updated_after } else { None };
                for table in ETL_TABLES {
                    stages.push(Stage::Etl(EtlJob {
                        table,
                        conditions: ExtractConditions::batch(config.etl.batch_size).updated_after(after),
                        load: LoadOptions::upsert_on(["id"]),
                    }));
                }
            }
            RunKind::Cleanup => stages.push(Stage::Analyze),
        }

        stages.extend([
            Stage::RepairNulls,
            Stage::ResolveDuplicates,
            Stage::RemoveOrphans,
            Stage::OptimizeIndexes,
            Stage::Vacuum,
            Stage::SweepBackups,
        ]);

        Plan {
            kind,
            stages: stages
                .into_iter()
                .map(|stage| PlannedStage {
                    skip_reason: skip_reason(&stage, config),
                    stage,
                })
                .collect(),
        }
    }

    /// Stages that will actually run, in order
    pub fn enabled(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|p| p.skip_reason.is_none())
            .map(|p| &p.stage)
    }
}

fn skip_reason(stage: &Stage, config: &PipelineConfig) -> Option<&'static str> {
    let cleaning = &config.cleaning;
    let off = match stage {
        Stage::Backup | Stage::SweepBackups => !config.etl.create_backup,
        Stage::RepairNulls => !cleaning.remove_nulls,
        Stage::ResolveDuplicates => !cleaning.handle_duplicates,
        Stage::RemoveOrphans => !cleaning.clean_orphans,
        Stage::OptimizeIndexes => !cleaning.optimize_indexes,
        Stage::Vacuum => !cleaning.vacuum,
        Stage::Analyze | Stage::Etl(_) => false,
    };
    off.then_some("disabled by configuration")
}

// ============================================================================
// RUNNER
// ============================================================================

pub struct RunOutcome {
    pub report: Report,
    pub report_path: PathBuf,
    /// The error that stopped the run, if any
    pub failure: Option<PipelineError>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct Pipeline<'a> {
    store: &'a Store,
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a Store, config: &'a PipelineConfig) -> Self {
        Pipeline { store, config }
    }

    /// Execute the plan and always write a report, whether or not a stage failed
    pub fn run(&self, plan: &Plan, ctx: &mut RunContext) -> Result<RunOutcome> {
        let title = match plan.kind {
            RunKind::Etl => "ETL pipeline",
            RunKind::Cleanup => "database cleanup pipeline",
        };
        ctx.info(format!("Starting {}...", title));

        let failure = self.execute(plan, ctx).err();
        match &failure {
            None => ctx.info(format!("{} completed successfully", capitalize(title))),
            Some(e) => ctx.error(format!("{} failed", capitalize(title)), e),
        }

        let message = failure.as_ref().map(|e| e.to_string());
        let report = generate_report(ctx, Utc::now(), message.as_deref());
        let report_path = write_report(&report, &self.config.report_dir)?;
        tracing::info!(path = %report_path.display(), "Report generated");

        Ok(RunOutcome {
            report,
            report_path,
            failure,
        })
    }

    /// Run every stage in order, stopping at the first failure
    pub fn execute(&self, plan: &Plan, ctx: &mut RunContext) -> Result<()> {
        for planned in &plan.stages {
            if planned.skip_reason.is_some() {
                ctx.info(format!("{} disabled, skipping...", planned.stage.label()));
                continue;
            }
            self.run_stage(&planned.stage, ctx)?;
        }
        Ok(())
    }

    pub fn run_stage(&self, stage: &Stage, ctx: &mut RunContext) -> Result<()> {
        match stage {
            Stage::Backup => {
                create_backups(self.store, &BACKUP_TABLES, ctx.started_at, ctx)?;
            }
            Stage::Analyze => {
                let analysis = analyze_data_quality(self.store, ctx)?;
                tracing::debug!(summary = %analysis.summary(), "Analysis summary");
            }
            Stage::Etl(job) => {
                let mut job_ctx = ctx.child();
                let result = self.run_etl_job(job, &mut job_ctx);
                ctx.merge(job_ctx);
                result?;
            }
            Stage::RepairNulls => {
                repair_nulls(self.store, ctx)?;
            }
            Stage::ResolveDuplicates => {
                resolve_duplicates(self.store, ctx)?;
            }
            Stage::RemoveOrphans => {
                remove_orphans(self.store, ctx)?;
            }
            Stage::OptimizeIndexes => {
                optimize_indexes(self.store, ctx)?;
            }
            Stage::Vacuum => vacuum(self.store, ctx)?,
            Stage::SweepBackups => {
                sweep_backups(self.store, self.config.backup.retention_days, Utc::now(), ctx);
            }
        }
        Ok(())
    }

    /// Extract, transform, validate and load one table
    pub fn run_etl_job(&self, job: &EtlJob, ctx: &mut RunContext) -> Result<()> {
        let table = job.table;
        if !self.store.table_exists(table.as_str())? {
            ctx.warn(format!("Table {} does not exist, skipping ETL", table), None);
            return Ok(());
        }

        ctx.info(format!("Starting ETL pipeline for {}...", table));

        let records = extract(self.store, table, &job.conditions, ctx)?;
        if records.is_empty() {
            ctx.info(format!("No data to process for {}", table));
            return Ok(());
        }

        let transformed = transform(records, table, ctx);
        let batch = if self.config.etl.validate_data {
            validate(transformed, table, ctx)
        } else {
            transformed
        };

        if !batch.is_empty() {
            load(self.store, &batch, table, &job.load, ctx)?;
        }

        ctx.info(format!("ETL pipeline completed for {}", table));
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
