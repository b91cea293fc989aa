use crate::error::PipelineResult;
use crate::models::kpi::{LabelCatalogEntry, LabelCategory, MonthlyComponentKpi, MonthlyGlobalKpi};
use crate::models::run::{PipelineOutput, PipelineRun};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::de::DeserializeOwned;
use std::path::Path;

const DB_SCHEMA_VERSION: i64 = 1;
const MONTH_FORMAT: &str = "%Y-%m-%d";

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("gold store schema {version} is newer than {DB_SCHEMA_VERSION}; continuing");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id TEXT PRIMARY KEY,
            evaluated_at INTEGER NOT NULL,
            recorded_at INTEGER NOT NULL,
            raw_count INTEGER NOT NULL DEFAULT 0,
            pull_request_count INTEGER NOT NULL DEFAULT 0,
            issue_count INTEGER NOT NULL DEFAULT 0,
            rejected_count INTEGER NOT NULL DEFAULT 0,
            rejected_ids TEXT NOT NULL DEFAULT '[]',
            rejection_reasons TEXT NOT NULL DEFAULT '[]',
            kpi_row_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS kpi_monthly_component (
            month TEXT NOT NULL,
            component TEXT NOT NULL,
            total_critical_hours REAL NOT NULL,
            stability_index REAL NOT NULL,
            sla_breach_rate REAL,
            created_critical INTEGER NOT NULL DEFAULT 0,
            closed_critical INTEGER NOT NULL DEFAULT 0,
            backlog_critical_end INTEGER NOT NULL DEFAULT 0,
            avg_resolution_hours REAL,
            median_resolution_hours REAL,
            p90_resolution_hours REAL,
            resolution_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (month, component)
        );

        CREATE TABLE IF NOT EXISTS kpi_monthly_global (
            month TEXT PRIMARY KEY,
            total_critical_hours REAL NOT NULL,
            sla_breach_rate REAL,
            created_critical INTEGER NOT NULL DEFAULT 0,
            closed_critical INTEGER NOT NULL DEFAULT 0,
            backlog_critical_end INTEGER NOT NULL DEFAULT 0,
            avg_resolution_hours REAL,
            median_resolution_hours REAL,
            p90_resolution_hours REAL,
            resolution_json TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS label_catalog (
            label TEXT PRIMARY KEY,
            count INTEGER NOT NULL,
            category TEXT CHECK(category IN ('critical', 'component', 'other')) NOT NULL DEFAULT 'other'
        );

        CREATE INDEX IF NOT EXISTS idx_kpi_component_component ON kpi_monthly_component(component);
        CREATE INDEX IF NOT EXISTS idx_pipeline_runs_recorded_at ON pipeline_runs(recorded_at);
        ",
    )
}

/// Open the gold store, creating its directory and schema as needed.
pub fn get_db_connection(db_path: &Path) -> PipelineResult<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Replace every gold table with the output of one run and log the run.
/// Either all of it lands or none of it does.
pub fn replace_gold_outputs(
    conn: &Connection,
    run_id: &str,
    output: &PipelineOutput,
) -> Result<PipelineRun> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "DELETE FROM kpi_monthly_component;
         DELETE FROM kpi_monthly_global;
         DELETE FROM label_catalog;",
    )?;

    for row in &output.component_kpis {
        insert_component_kpi(&tx, row)?;
    }
    for row in &output.global_kpis {
        insert_global_kpi(&tx, row)?;
    }
    for entry in &output.label_catalog {
        tx.execute(
            "INSERT INTO label_catalog (label, count, category) VALUES (?1, ?2, ?3)",
            params![entry.label, entry.count as i64, entry.category.as_str()],
        )?;
    }

    let run = PipelineRun {
        run_id: run_id.to_string(),
        evaluated_at: output.evaluated_at.timestamp(),
        recorded_at: chrono::Utc::now().timestamp(),
        raw_count: output.raw_count,
        pull_request_count: output.pull_request_count,
        issue_count: output.issues.len(),
        rejected_count: output.rejections.count(),
        rejected_ids: output.rejections.rejected_ids.clone(),
        rejection_reasons: output.rejections.reasons.clone(),
        kpi_row_count: output.component_kpis.len(),
    };

    tx.execute(
        "INSERT INTO pipeline_runs (run_id, evaluated_at, recorded_at, raw_count, pull_request_count, issue_count, rejected_count, rejected_ids, rejection_reasons, kpi_row_count) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.evaluated_at,
            run.recorded_at,
            run.raw_count as i64,
            run.pull_request_count as i64,
            run.issue_count as i64,
            run.rejected_count as i64,
            json_text(&run.rejected_ids)?,
            json_text(&run.rejection_reasons)?,
            run.kpi_row_count as i64,
        ],
    )?;

    tx.commit()?;
    Ok(run)
}

fn insert_component_kpi(conn: &Connection, row: &MonthlyComponentKpi) -> Result<()> {
    let resolution_json = json_text(&row.resolution)?;
    conn.execute(
        "
        INSERT INTO kpi_monthly_component (
            month,
            component,
            total_critical_hours,
            stability_index,
            sla_breach_rate,
            created_critical,
            closed_critical,
            backlog_critical_end,
            avg_resolution_hours,
            median_resolution_hours,
            p90_resolution_hours,
            resolution_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ",
        params![
            row.month.format(MONTH_FORMAT).to_string(),
            row.component,
            row.total_critical_hours,
            row.stability_index,
            row.sla_breach_rate,
            row.created_critical as i64,
            row.closed_critical as i64,
            row.backlog_critical_end as i64,
            row.resolution.avg_resolution_hours,
            row.resolution.median_resolution_hours,
            row.resolution.p90_resolution_hours,
            resolution_json,
        ],
    )?;
    Ok(())
}

fn insert_global_kpi(conn: &Connection, row: &MonthlyGlobalKpi) -> Result<()> {
    let resolution_json = json_text(&row.resolution)?;
    conn.execute(
        "
        INSERT INTO kpi_monthly_global (
            month,
            total_critical_hours,
            sla_breach_rate,
            created_critical,
            closed_critical,
            backlog_critical_end,
            avg_resolution_hours,
            median_resolution_hours,
            p90_resolution_hours,
            resolution_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ",
        params![
            row.month.format(MONTH_FORMAT).to_string(),
            row.total_critical_hours,
            row.sla_breach_rate,
            row.created_critical as i64,
            row.closed_critical as i64,
            row.backlog_critical_end as i64,
            row.resolution.avg_resolution_hours,
            row.resolution.median_resolution_hours,
            row.resolution.p90_resolution_hours,
            resolution_json,
        ],
    )?;
    Ok(())
}

/// Stored component rows ordered by month then component, optionally for a
/// single component.
pub fn load_component_kpis(conn: &Connection, component: Option<&str>) -> Result<Vec<MonthlyComponentKpi>> {
    let mut stmt = conn.prepare(
        "SELECT month, component, total_critical_hours, stability_index, sla_breach_rate, created_critical, closed_critical, backlog_critical_end, resolution_json
         FROM kpi_monthly_component
         WHERE ?1 IS NULL OR component = ?1
         ORDER BY month ASC, component ASC",
    )?;

    let rows = stmt
        .query_map(params![component], |row| {
            Ok(MonthlyComponentKpi {
                month: month_column(row, 0)?,
                component: row.get(1)?,
                total_critical_hours: row.get(2)?,
                stability_index: row.get(3)?,
                sla_breach_rate: row.get(4)?,
                created_critical: row.get::<_, i64>(5)? as u64,
                closed_critical: row.get::<_, i64>(6)? as u64,
                backlog_critical_end: row.get::<_, i64>(7)? as u64,
                resolution: json_column(row, 8)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn load_global_kpis(conn: &Connection) -> Result<Vec<MonthlyGlobalKpi>> {
    let mut stmt = conn.prepare(
        "SELECT month, total_critical_hours, sla_breach_rate, created_critical, closed_critical, backlog_critical_end, resolution_json
         FROM kpi_monthly_global
         ORDER BY month ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(MonthlyGlobalKpi {
                month: month_column(row, 0)?,
                total_critical_hours: row.get(1)?,
                sla_breach_rate: row.get(2)?,
                created_critical: row.get::<_, i64>(3)? as u64,
                closed_critical: row.get::<_, i64>(4)? as u64,
                backlog_critical_end: row.get::<_, i64>(5)? as u64,
                resolution: json_column(row, 6)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn load_label_catalog(conn: &Connection) -> Result<Vec<LabelCatalogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT label, count, category FROM label_catalog ORDER BY count DESC, label ASC",
    )?;

    let entries = stmt
        .query_map([], |row| {
            let category: String = row.get(2)?;
            Ok(LabelCatalogEntry {
                label: row.get(0)?,
                count: row.get::<_, i64>(1)? as usize,
                category: LabelCategory::parse(&category).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        Type::Text,
                        format!("unknown label category {category:?}").into(),
                    )
                })?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(entries)
}

pub fn load_latest_run(conn: &Connection) -> Result<Option<PipelineRun>> {
    conn.query_row(
        "SELECT run_id, evaluated_at, recorded_at, raw_count, pull_request_count, issue_count, rejected_count, rejected_ids, rejection_reasons, kpi_row_count
         FROM pipeline_runs
         ORDER BY recorded_at DESC, rowid DESC
         LIMIT 1",
        [],
        |row| {
            Ok(PipelineRun {
                run_id: row.get(0)?,
                evaluated_at: row.get(1)?,
                recorded_at: row.get(2)?,
                raw_count: row.get::<_, i64>(3)? as usize,
                pull_request_count: row.get::<_, i64>(4)? as usize,
                issue_count: row.get::<_, i64>(5)? as usize,
                rejected_count: row.get::<_, i64>(6)? as usize,
                rejected_ids: json_column(row, 7)?,
                rejection_reasons: json_column(row, 8)?,
                kpi_row_count: row.get::<_, i64>(9)? as usize,
            })
        },
    )
    .optional()
}

fn month_column(row: &Row<'_>, index: usize) -> Result<NaiveDate> {
    let raw: String = row.get(index)?;
    NaiveDate::parse_from_str(&raw, MONTH_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn json_text<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}
