// End-to-end runs against an in-memory store

use chrono::{TimeZone, Utc};
use serde_json::json;
use workshop_etl::{
    read_report, remove_orphans, setup_schema, EtlJob, ExtractConditions, LoadOptions, LogLevel,
    Pipeline, PipelineConfig, Plan, RunContext, RunKind, RunStats, RunStatus, Store, TableKind,
};

fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    setup_schema(store.connection()).unwrap();
    store
        .execute("INSERT INTO users (id, username, full_name) VALUES (1, 'ann', 'Ann Lee')", &[])
        .unwrap();
    for (id, title, priority, due) in [
        (1, "Urgent fix", "urgent", "2025-03-01"),
        (2, "Plan sprint", "low", "not-a-date"),
        (3, "", "high", "2025-03-02"),
        (4, "Write docs", "medium", "2025-03-03"),
    ] {
        store
            .execute(
                "INSERT INTO todos (id, user_id, title, priority, status, due_date) VALUES (?1, 1, ?2, ?3, 'pending', ?4)",
                &[json!(id), json!(title), json!(priority), json!(due)],
            )
            .unwrap();
    }
    store
}

fn config_in(dir: &tempfile::TempDir) -> PipelineConfig {
    PipelineConfig {
        report_dir: dir.path().join("logs"),
        ..PipelineConfig::default()
    }
}

fn todos_job() -> EtlJob {
    EtlJob {
        table: TableKind::Todos,
        conditions: ExtractConditions::batch(1000),
        load: LoadOptions::upsert_on(["id"]),
    }
}

#[test]
fn four_todo_scenario() {
    let store = seeded_store();
    let config = PipelineConfig::default();
    let pipeline = Pipeline::new(&store, &config);
    let mut ctx = RunContext::new(RunKind::Etl);

    pipeline.run_etl_job(&todos_job(), &mut ctx).unwrap();

    assert_eq!(
        ctx.stats,
        RunStats {
            extracted: 4,
            transformed: 4,
            loaded: 3,
            skipped: 0,
            errors: 1,
        }
    );
    assert_eq!(ctx.rejections.len(), 1);
    assert_eq!(ctx.rejections[0].errors, vec!["Title is required"]);

    let rows = store
        .query("SELECT id, priority, due_date FROM todos ORDER BY id", &[])
        .unwrap()
        .rows;
    assert_eq!(rows[0].get_str("priority"), Some("medium"));
    assert_eq!(rows[1].get("due_date"), Some(&json!(null)));
    // rejected row is not written back, so the live row keeps its original values
    assert_eq!(rows[2].get_str("priority"), Some("high"));
    assert_eq!(store.count("SELECT COUNT(*) FROM todos", &[]).unwrap(), 4);
}

#[test]
fn rerunning_the_job_converges() {
    let store = seeded_store();
    let config = PipelineConfig::default();
    let pipeline = Pipeline::new(&store, &config);

    let mut first = RunContext::new(RunKind::Etl);
    pipeline.run_etl_job(&todos_job(), &mut first).unwrap();
    let after_first = store.query("SELECT * FROM todos ORDER BY id", &[]).unwrap().rows;

    let mut second = RunContext::new(RunKind::Etl);
    pipeline.run_etl_job(&todos_job(), &mut second).unwrap();
    let after_second = store.query("SELECT * FROM todos ORDER BY id", &[]).unwrap().rows;

    assert_eq!(after_first, after_second);
    assert_eq!(second.stats.loaded, 3);
}

#[test]
fn full_etl_run_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let config = config_in(&dir);
    let plan = Plan::for_kind(RunKind::Etl, &config, None);
    let mut ctx = RunContext::new(RunKind::Etl);

    let outcome = Pipeline::new(&store, &config).run(&plan, &mut ctx).unwrap();

    assert!(outcome.succeeded());
    assert!(outcome.report_path.exists());
    let name = outcome.report_path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("etl-report-"));

    let report = read_report(&outcome.report_path).unwrap();
    assert_eq!(report, outcome.report);
    assert_eq!(report.summary.status, RunStatus::Succeeded);
    assert_eq!(report.summary.stats.errors, 1);
    assert_eq!(report.summary.backup_tables.len(), 5);
    assert!(report
        .recommendations
        .contains(&"Review 1 data validation errors".to_string()));

    for table in &report.summary.backup_tables {
        assert!(store.table_exists(table).unwrap());
    }
}

#[test]
fn failed_run_still_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    store
        .execute(
            "CREATE TRIGGER refuse_writes BEFORE INSERT ON todos
             BEGIN SELECT RAISE(ABORT, 'todos are read-only'); END",
            &[],
        )
        .unwrap();
    let config = config_in(&dir);
    let plan = Plan::for_kind(RunKind::Etl, &config, None);
    let mut ctx = RunContext::new(RunKind::Etl);

    let outcome = Pipeline::new(&store, &config).run(&plan, &mut ctx).unwrap();

    assert!(!outcome.succeeded());
    let report = read_report(&outcome.report_path).unwrap();
    assert!(matches!(report.summary.status, RunStatus::Failed { .. }));
    assert!(report
        .recommendations
        .contains(&"Review error logs and fix issues before next run".to_string()));
    // the todos batch rolled back as a unit, and later stages never ran
    assert_eq!(
        store.count("SELECT COUNT(*) FROM todos WHERE priority = 'urgent'", &[]).unwrap(),
        1
    );
    assert!(!ctx.events.iter().any(|e| e.message == "Running database vacuum..."));
}

#[test]
fn failed_backup_stops_the_run_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    // a view holding the backup's name makes the snapshot copy fail
    store
        .execute(
            "CREATE VIEW users_etl_backup_2025_01_15T10_30_00 AS SELECT * FROM users",
            &[],
        )
        .unwrap();
    let before = store.query("SELECT * FROM todos ORDER BY id", &[]).unwrap().rows;
    let config = config_in(&dir);
    let plan = Plan::for_kind(RunKind::Etl, &config, None);
    let started = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
    let mut ctx = RunContext::starting_at(RunKind::Etl, started);

    let outcome = Pipeline::new(&store, &config).run(&plan, &mut ctx).unwrap();

    assert!(!outcome.succeeded());
    assert!(matches!(outcome.report.summary.status, RunStatus::Failed { .. }));
    assert!(ctx.events.iter().any(|e| e.message == "Backup creation failed"));
    assert!(!ctx.events.iter().any(|e| e.message.starts_with("Starting ETL pipeline for")));
    assert!(!ctx.events.iter().any(|e| e.message == "Cleaning NULL values..."));
    assert!(!ctx.events.iter().any(|e| e.message == "Running database vacuum..."));
    assert_eq!(ctx.stats, RunStats::default());

    let after = store.query("SELECT * FROM todos ORDER BY id", &[]).unwrap().rows;
    assert_eq!(before, after);
    assert!(read_report(&outcome.report_path).is_ok());
}

#[test]
fn cleanup_run_repairs_live_tables() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    store
        .execute("INSERT INTO users (id, username) VALUES (2, 'ann'), (3, NULL)", &[])
        .unwrap();
    store
        .execute("INSERT INTO todos (id, user_id, title) VALUES (9, 404, 'stray')", &[])
        .unwrap();
    let config = config_in(&dir);
    let plan = Plan::for_kind(RunKind::Cleanup, &config, None);
    let mut ctx = RunContext::new(RunKind::Cleanup);

    let outcome = Pipeline::new(&store, &config).run(&plan, &mut ctx).unwrap();

    assert!(outcome.succeeded());
    let names: Vec<String> = store
        .query("SELECT username FROM users ORDER BY id", &[])
        .unwrap()
        .rows
        .iter()
        .map(|r| r.get_str("username").unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["ann", "ann_2", "user_3"]);
    assert_eq!(store.count("SELECT COUNT(*) FROM todos WHERE id = 9", &[]).unwrap(), 0);
    assert!(outcome
        .report_path
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("cleanup-report-"));
    assert!(outcome.report.summary.backup_tables.iter().all(|t| t.contains("_backup_")));
}

#[test]
fn second_orphan_pass_is_quiet() {
    let store = seeded_store();
    store
        .execute("INSERT INTO todos (id, user_id, title) VALUES (9, 404, 'stray')", &[])
        .unwrap();

    let mut first = RunContext::new(RunKind::Cleanup);
    assert_eq!(remove_orphans(&store, &mut first).unwrap(), 1);

    let mut second = RunContext::new(RunKind::Cleanup);
    assert_eq!(remove_orphans(&store, &mut second).unwrap(), 0);
    assert_eq!(second.count_level(LogLevel::Info), 0);
}
