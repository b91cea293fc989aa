use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use issuelens_lib::commands::db::{
    get_db_connection, load_component_kpis, load_global_kpis, load_label_catalog, load_latest_run,
};
use issuelens_lib::commands::pipeline::run_gold_internal;
use issuelens_lib::models::kpi::LabelCategory;
use issuelens_lib::PipelineError;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    bronze: PathBuf,
    config: PathBuf,
    db: PathBuf,
}

fn create_workspace(config: serde_json::Value) -> Workspace {
    let dir = tempfile::tempdir().expect("create temp dir");
    let bronze = dir.path().join("bronze").join("owner__repo");
    fs::create_dir_all(&bronze).expect("create bronze dir");

    let config_path = dir.path().join("issuelens.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).expect("encode config"))
        .expect("write config");

    Workspace {
        bronze,
        config: config_path,
        db: dir.path().join("gold").join("gold.db"),
        _dir: dir,
    }
}

fn default_rules() -> serde_json::Value {
    json!({
        "schema_version": 1,
        "rules": {
            "critical_labels": ["P1-critical"],
            "sla_hours_critical": 240
        }
    })
}

fn write_extraction(workspace: &Workspace, run_id: &str, lines: &[serde_json::Value]) {
    let body: String = lines.iter().map(|line| format!("{line}\n")).collect();
    let path = workspace.bronze.join(format!("issues_{run_id}.jsonl"));
    fs::write(path, body).expect("write bronze file");
}

fn eval_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn month(y: i32, m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

fn run(workspace: &Workspace) -> Result<(), PipelineError> {
    run_gold_internal(&workspace.bronze, &workspace.config, &workspace.db, eval_at()).map(|_| ())
}

fn open_db(path: &Path) -> rusqlite::Connection {
    get_db_connection(path).expect("open gold db")
}

#[test]
fn gold_run_stores_component_and_global_kpis() {
    let workspace = create_workspace(default_rules());
    write_extraction(
        &workspace,
        "20240301_120000",
        &[
            json!({
                "id": 101,
                "labels": [{"name": "area: io"}, {"name": "P1-critical"}],
                "created_at": "2024-01-15T00:00:00Z",
                "closed_at": "2024-03-01T00:00:00Z"
            }),
            json!({
                "id": 102,
                "labels": [{"name": "bug"}],
                "created_at": "2024-02-01T00:00:00Z",
                "closed_at": null
            }),
            json!({
                "id": 103,
                "labels": [{"name": "P1-critical"}],
                "created_at": "2024-02-10T00:00:00Z",
                "pull_request": {"url": "https://example.invalid/pulls/103"}
            }),
        ],
    );

    run(&workspace).expect("gold run");
    let conn = open_db(&workspace.db);

    let rows = load_component_kpis(&conn, None).expect("load component rows");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.component == "io"));
    assert_eq!(
        rows.iter().map(|row| row.month).collect::<Vec<_>>(),
        vec![month(2024, 1), month(2024, 2), month(2024, 3)]
    );
    assert_eq!(rows[0].total_critical_hours, 408.0);
    assert_eq!(rows[1].total_critical_hours, 696.0);
    assert_eq!(rows[2].closed_critical, 1);
    assert_eq!(rows[2].backlog_critical_end, 0);
    assert_eq!(rows[2].sla_breach_rate, Some(1.0));
    assert_eq!(rows[2].resolution.median_resolution_hours, Some(1104.0));

    let global = load_global_kpis(&conn).expect("load global rows");
    assert_eq!(global.len(), 3);
    assert_eq!(global[0].created_critical, 1);

    let catalog = load_label_catalog(&conn).expect("load label catalog");
    let p1 = catalog
        .iter()
        .find(|entry| entry.label == "P1-critical")
        .expect("critical label catalogued");
    assert_eq!(p1.count, 1);
    assert_eq!(p1.category, LabelCategory::Critical);

    let latest = load_latest_run(&conn).expect("load run").expect("run recorded");
    assert_eq!(latest.raw_count, 3);
    assert_eq!(latest.pull_request_count, 1);
    assert_eq!(latest.issue_count, 2);
    assert_eq!(latest.rejected_count, 0);
    assert_eq!(latest.evaluated_at, eval_at().timestamp());
}

#[test]
fn latest_extraction_wins_across_runs() {
    let workspace = create_workspace(default_rules());
    write_extraction(
        &workspace,
        "20240201_000000",
        &[json!({
            "id": 7,
            "labels": ["P1-critical", "component:api"],
            "created_at": "2024-01-01T00:00:00Z"
        })],
    );
    write_extraction(
        &workspace,
        "20240301_000000",
        &[json!({
            "id": 7,
            "labels": ["P1-critical", "component:api"],
            "created_at": "2024-01-01T00:00:00Z",
            "closed_at": "2024-01-02T00:00:00Z"
        })],
    );

    run(&workspace).expect("gold run");
    let rows = load_component_kpis(&open_db(&workspace.db), Some("api")).expect("load rows");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_critical_hours, 24.0);
    assert_eq!(rows[0].closed_critical, 1);
    assert_eq!(rows[0].sla_breach_rate, Some(0.0));
}

#[test]
fn rerun_replaces_rows_with_identical_values() {
    let workspace = create_workspace(default_rules());
    write_extraction(
        &workspace,
        "20240501_000000",
        &[
            json!({"id": 1, "labels": ["P1-critical", "module:net"], "created_at": "2024-02-10T06:30:00Z"}),
            json!({"id": 2, "labels": ["P1-critical"], "created_at": "2024-03-01T00:00:00Z", "closed_at": "2024-03-20T00:00:00Z"}),
        ],
    );

    run(&workspace).expect("first run");
    let conn = open_db(&workspace.db);
    let first = load_component_kpis(&conn, None).expect("first rows");
    let first_run = load_latest_run(&conn).expect("first run row").expect("recorded");

    run(&workspace).expect("second run");
    let second = load_component_kpis(&conn, None).expect("second rows");
    let second_run = load_latest_run(&conn).expect("second run row").expect("recorded");

    assert_eq!(first, second);
    assert_ne!(first_run.run_id, second_run.run_id);

    let run_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM pipeline_runs", [], |row| row.get(0))
        .expect("count runs");
    assert_eq!(run_count, 2);
}

#[test]
fn invalid_configuration_aborts_before_writing() {
    let workspace = create_workspace(json!({
        "rules": { "critical_labels": [], "sla_hours_critical": 240 }
    }));
    write_extraction(
        &workspace,
        "20240501_000000",
        &[json!({"id": 1, "labels": ["P1-critical"], "created_at": "2024-02-10T00:00:00Z"})],
    );

    let err = run(&workspace).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(!workspace.db.exists());
}

#[test]
fn rejection_rate_above_threshold_aborts_the_run() {
    let workspace = create_workspace(default_rules());
    write_extraction(
        &workspace,
        "20240501_000000",
        &[
            json!({"id": 1, "labels": ["P1-critical"], "created_at": "2024-02-10T00:00:00Z"}),
            json!({"id": 2, "labels": ["P1-critical"], "created_at": "2024-02-10T00:00:00Z", "closed_at": "2024-02-01T00:00:00Z"}),
        ],
    );

    let err = run(&workspace).unwrap_err();
    assert!(matches!(
        &err,
        PipelineError::RejectionRate { rejected: 1, total: 2, rejected_ids, .. } if rejected_ids == &vec![2]
    ));
    assert!(!workspace.db.exists());
}

#[test]
fn legacy_configuration_layout_is_migrated() {
    let workspace = create_workspace(json!({
        "rules": {
            "component": { "prefixes": ["team/"] },
            "severity_labels": { "critical": ["sev1"] },
            "sla_hours_by_severity": { "critical": 12 }
        }
    }));
    write_extraction(
        &workspace,
        "20240501_000000",
        &[json!({
            "id": 5,
            "labels": ["sev1", "team/storage"],
            "created_at": "2024-04-01T00:00:00Z",
            "closed_at": "2024-04-02T00:00:00Z"
        })],
    );

    run(&workspace).expect("gold run");
    let rows = load_component_kpis(&open_db(&workspace.db), None).expect("load rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].component, "storage");
    assert_eq!(rows[0].sla_breach_rate, Some(1.0));
}

#[test]
fn missing_bronze_directory_is_reported() {
    let workspace = create_workspace(default_rules());
    let err = run_gold_internal(
        &workspace.bronze.join("does-not-exist"),
        &workspace.config,
        &workspace.db,
        eval_at(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Bronze(_)));
}

#[test]
fn bronze_root_with_several_repositories_is_refused() {
    let workspace = create_workspace(default_rules());
    let root = workspace.bronze.parent().expect("bronze root").to_path_buf();
    fs::create_dir_all(root.join("other__repo")).expect("create second repo");
    write_extraction(
        &workspace,
        "20240101_000000",
        &[json!({"id": 1, "labels": ["P1-critical"], "created_at": "2023-12-01T00:00:00Z"})],
    );
    fs::write(
        root.join("other__repo").join("issues_20240101_000000.jsonl"),
        "{\"id\": 2, \"labels\": [\"P1-critical\"], \"created_at\": \"2023-12-01T00:00:00Z\"}\n",
    )
    .expect("write second repo");

    let err = run_gold_internal(&root, &workspace.config, &workspace.db, eval_at()).unwrap_err();
    assert!(matches!(err, PipelineError::Bronze(_)));
    assert!(!workspace.db.exists());

    run(&workspace).expect("single repository run");
    let global = load_global_kpis(&open_db(&workspace.db)).expect("load global rows");
    assert!(global.iter().all(|row| row.created_critical <= 1));
    assert_eq!(global[0].created_critical, 1);
}
