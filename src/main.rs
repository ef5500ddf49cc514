mod logging;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io;
use std::path::PathBuf;

use workshop_etl::{
    analyze_data_quality, create_backups, extract, optimize_indexes, remove_orphans, repair_nulls,
    resolve_duplicates, setup_schema, transform, validate, ExtractConditions, Pipeline,
    PipelineConfig, Plan, Record, RunContext, RunKind, Store, TableKind, BACKUP_TABLES,
};

#[derive(Parser)]
#[command(name = "workshop-etl", version, about = "Batch ETL and cleanup pipeline for the workshop database")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Which pipeline the command belongs to (backup names, report names, stage plan)
    #[arg(long, global = true, value_enum, default_value_t = KindArg::Etl)]
    kind: KindArg,

    /// Directory for run reports
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write a report
    Run {
        /// Only extract rows updated after this time
        #[arg(long, value_parser = parse_timestamp)]
        updated_after: Option<DateTime<Utc>>,
    },
    /// Print data quality findings without changing anything
    Analyze,
    /// Snapshot the source tables
    Backup,
    /// Repair nulls, resolve duplicates and remove orphans
    Clean,
    /// Print the rows of one table
    Extract {
        table: TableKind,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, value_parser = parse_timestamp)]
        updated_after: Option<DateTime<Utc>>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Print the normalized rows of one table
    Transform { table: TableKind },
    /// Count the rows of one table that pass validation
    Validate { table: TableKind },
    /// Create missing indexes and refresh statistics
    Optimize,
    /// Create the workshop tables
    Init,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Etl,
    Cleanup,
}

impl From<KindArg> for RunKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Etl => RunKind::Etl,
            KindArg::Cleanup => RunKind::Cleanup,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD', got '{}'", raw))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut config = PipelineConfig::from_env().context("Failed to read configuration")?;
    if let Some(dir) = cli.report_dir {
        config.report_dir = dir;
    }

    tracing::debug!(database = %config.database.describe(), "Opening store");
    let store = Store::open(&config.database, config.etl.timeout())
        .with_context(|| format!("Failed to open database {}", config.database.name))?;

    let kind = RunKind::from(cli.kind);
    let mut ctx = RunContext::new(kind);

    match cli.command.unwrap_or(Command::Run { updated_after: None }) {
        Command::Run { updated_after } => {
            let plan = Plan::for_kind(kind, &config, updated_after);
            let outcome = Pipeline::new(&store, &config).run(&plan, &mut ctx)?;

            println!("\n📊 Run summary ({})", kind);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("{}", serde_json::to_string_pretty(&outcome.report.summary.stats)?);
            for recommendation in &outcome.report.recommendations {
                println!("  • {}", recommendation);
            }
            println!("📄 Report: {}", outcome.report_path.display());

            if let Some(err) = outcome.failure {
                eprintln!("❌ Pipeline failed: {}", err);
                std::process::exit(1);
            }
        }
        Command::Analyze => {
            let analysis = analyze_data_quality(&store, &mut ctx)?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            println!("🔍 {}", analysis.summary());
        }
        Command::Backup => {
            let created = create_backups(&store, &BACKUP_TABLES, Utc::now(), &mut ctx)?;
            println!("💾 Created {} backup tables", created.len());
            for name in created {
                println!("  • {}", name);
            }
        }
        Command::Clean => {
            let nulls = repair_nulls(&store, &mut ctx)?;
            let duplicates = resolve_duplicates(&store, &mut ctx)?;
            let orphans = remove_orphans(&store, &mut ctx)?;
            println!("🧽 NULL values repaired: {}", nulls);
            println!("🧽 Duplicates renamed: {}, removed: {}", duplicates.renamed, duplicates.removed);
            println!("🧽 Orphaned rows removed: {}", orphans);
        }
        Command::Extract {
            table,
            limit,
            updated_after,
            format,
        } => {
            let conditions = ExtractConditions {
                updated_after,
                limit: Some(limit.unwrap_or(config.etl.batch_size)),
            };
            let records = extract(&store, table, &conditions, &mut ctx)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Csv => write_csv(&records)?,
            }
        }
        Command::Transform { table } => {
            let conditions = ExtractConditions::batch(config.etl.batch_size);
            let records = extract(&store, table, &conditions, &mut ctx)?;
            let transformed = transform(records, table, &mut ctx);
            println!("{}", serde_json::to_string_pretty(&transformed)?);
        }
        Command::Validate { table } => {
            let conditions = ExtractConditions::batch(config.etl.batch_size);
            let records = extract(&store, table, &conditions, &mut ctx)?;
            let total = records.len();
            let valid = validate(records, table, &mut ctx);
            println!("Valid records: {}/{}", valid.len(), total);
        }
        Command::Optimize => {
            let outcome = optimize_indexes(&store, &mut ctx)?;
            println!(
                "🛠️  Indexes ensured: {}, failed: {}, tables analyzed: {}",
                outcome.created, outcome.failed, outcome.analyzed
            );
        }
        Command::Init => {
            setup_schema(store.connection())?;
            println!("✓ Workshop tables ready in {}", config.database.name);
        }
    }

    Ok(())
}

/// One CSV row per record; the header is every column seen, in first-seen order
fn write_csv(records: &[Record]) -> Result<()> {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        for column in record.columns() {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(&headers)?;
    for record in records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| match record.get(h) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
