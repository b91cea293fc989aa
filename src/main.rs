use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use issuelens_lib::commands::db::{get_db_connection, load_component_kpis, load_latest_run};
use issuelens_lib::commands::pipeline::run_gold_internal;
use issuelens_lib::commands::settings::save_engine_config;
use issuelens_lib::models::kpi::MonthlyComponentKpi;
use issuelens_lib::models::rules::{EngineConfig, RuleConfig, ValidationPolicy};

#[derive(Parser, Debug)]
#[command(name = "issuelens")]
#[command(about = "Monthly per-component reliability KPIs from issue-tracker history")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize bronze extractions and rebuild the gold KPI tables
    Gold {
        /// One repository's bronze folder (owner__repo) holding issues_<run id>.jsonl files
        #[arg(long)]
        bronze: PathBuf,

        /// Rule configuration (JSON)
        #[arg(long, default_value = "issuelens.json")]
        config: PathBuf,

        /// Gold SQLite database
        #[arg(long, default_value = "data/gold.db")]
        db: PathBuf,

        /// Evaluation instant for open issues: RFC 3339 or "now"
        #[arg(long)]
        eval_at: String,
    },

    /// Print the most recent stored component KPI rows
    Show {
        #[arg(long, default_value = "data/gold.db")]
        db: PathBuf,

        /// Only rows for this component
        #[arg(long)]
        component: Option<String>,

        /// Number of rows to print
        #[arg(long, default_value = "12")]
        last: usize,
    },

    /// Write a rule configuration with default optional settings
    InitConfig {
        #[arg(long, default_value = "issuelens.json")]
        config: PathBuf,

        /// Label marking an issue as critical (repeatable)
        #[arg(long = "critical-label", required = true)]
        critical_labels: Vec<String>,

        /// Resolution hours after which a critical issue breaches its SLA
        #[arg(long)]
        sla_hours: f64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Gold {
            bronze,
            config,
            db,
            eval_at,
        } => {
            let eval_at = parse_eval_at(&eval_at)?;
            let (output, run) = run_gold_internal(&bronze, &config, &db, eval_at)
                .context("gold run failed")?;
            println!(
                "run {}: {} raw records, {} pull requests dropped, {} issues, {} rejected, {} component rows",
                run.run_id,
                run.raw_count,
                run.pull_request_count,
                run.issue_count,
                run.rejected_count,
                output.component_kpis.len()
            );
            for reason in &run.rejection_reasons {
                println!("  rejected {reason}");
            }
            Ok(())
        }
        Command::Show { db, component, last } => show(&db, component.as_deref(), last),
        Command::InitConfig {
            config,
            critical_labels,
            sla_hours,
        } => {
            if !(sla_hours.is_finite() && sla_hours > 0.0) {
                bail!("--sla-hours must be a positive number");
            }
            let engine = EngineConfig {
                rules: RuleConfig::new(critical_labels, sla_hours),
                validation: ValidationPolicy::default(),
            };
            save_engine_config(&config, &engine)
                .with_context(|| format!("failed to write {}", config.display()))?;
            println!("wrote {}", config.display());
            Ok(())
        }
    }
}

/// The CLI is the caller that owns the clock; the engine only ever sees the
/// resolved instant.
fn parse_eval_at(raw: &str) -> Result<DateTime<Utc>> {
    if raw.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("--eval-at {raw:?} is neither RFC 3339 nor \"now\""))
}

fn show(db: &Path, component: Option<&str>, last: usize) -> Result<()> {
    let conn = get_db_connection(db).with_context(|| format!("failed to open {}", db.display()))?;

    if let Some(run) = load_latest_run(&conn)? {
        let evaluated = DateTime::<Utc>::from_timestamp(run.evaluated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| run.evaluated_at.to_string());
        println!(
            "latest run {} evaluated at {} ({} issues, {} rejected)",
            run.run_id, evaluated, run.issue_count, run.rejected_count
        );
    }

    let rows = load_component_kpis(&conn, component)?;
    let skip = rows.len().saturating_sub(last);
    println!(
        "{:<8} {:<20} {:>10} {:>9} {:>7} {:>7} {:>7} {:>7}",
        "month", "component", "hours", "stability", "breach", "created", "closed", "backlog"
    );
    for row in &rows[skip..] {
        println!("{}", format_row(row));
    }
    Ok(())
}

fn format_row(row: &MonthlyComponentKpi) -> String {
    let breach = row
        .sla_breach_rate
        .map(|rate| format!("{:.0}%", rate * 100.0))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<8} {:<20} {:>10.1} {:>9.3} {:>7} {:>7} {:>7} {:>7}",
        row.month.format("%Y-%m"),
        row.component,
        row.total_critical_hours,
        row.stability_index,
        breach,
        row.created_critical,
        row.closed_critical,
        row.backlog_critical_end
    )
}
