use crate::analysis::dedup::deduplicate;
use crate::analysis::labels::build_label_catalog;
use crate::analysis::monthly::aggregate_monthly;
use crate::analysis::rules::normalize_issue;
use crate::commands::bronze::read_bronze_dir;
use crate::commands::db::{get_db_connection, replace_gold_outputs};
use crate::commands::settings::load_engine_config;
use crate::error::{PipelineError, PipelineResult};
use crate::models::issue::{NormalizedIssue, RawIssueRecord};
use crate::models::rules::{EngineConfig, RuleConfig};
use crate::models::run::{PipelineOutput, PipelineRun, RejectionSummary};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Run dedup, rules and aggregation over one snapshot of raw records.
/// Pure: the same records and `eval_at` always produce the same output.
pub fn run_pipeline(
    raw: Vec<RawIssueRecord>,
    config: &EngineConfig,
    eval_at: DateTime<Utc>,
) -> PipelineResult<PipelineOutput> {
    let raw_count = raw.len();
    let deduplicated = deduplicate(raw);
    log::info!(
        "deduplicated {raw_count} raw records into {} issues ({} pull requests dropped)",
        deduplicated.records.len(),
        deduplicated.pull_requests_dropped
    );

    let (issues, rejections) = normalize_all(&deduplicated.records, &config.rules);
    check_rejection_rate(
        &rejections,
        deduplicated.records.len(),
        config.validation.max_rejection_rate,
    )?;

    let aggregation = aggregate_monthly(&issues, eval_at, &config.rules)?;
    let label_catalog = build_label_catalog(&issues, &config.rules);

    log::info!(
        "aggregated {} critical issues into {} component rows over {} months",
        issues.iter().filter(|i| i.is_critical).count(),
        aggregation.component_kpis.len(),
        aggregation.months.len()
    );

    Ok(PipelineOutput {
        evaluated_at: eval_at,
        raw_count,
        pull_request_count: deduplicated.pull_requests_dropped,
        issues,
        rejections,
        component_kpis: aggregation.component_kpis,
        global_kpis: aggregation.global_kpis,
        label_catalog,
    })
}

/// Apply the rule engine to every record, isolating per-record failures.
pub fn normalize_all(
    records: &[RawIssueRecord],
    rules: &RuleConfig,
) -> (Vec<NormalizedIssue>, RejectionSummary) {
    let mut issues = Vec::with_capacity(records.len());
    let mut rejections = RejectionSummary::default();

    for record in records {
        match normalize_issue(record, rules) {
            Ok(issue) => issues.push(issue),
            Err(error) => {
                log::warn!("rejected record: {error}");
                rejections.record(&error);
            }
        }
    }

    (issues, rejections)
}

fn check_rejection_rate(
    rejections: &RejectionSummary,
    total: usize,
    max_rate: f64,
) -> PipelineResult<()> {
    if rejections.is_empty() || total == 0 {
        return Ok(());
    }

    let rate = rejections.count() as f64 / total as f64;
    log::warn!(
        "{} of {total} issues rejected ({:.2}%): ids {:?}",
        rejections.count(),
        rate * 100.0,
        rejections.rejected_ids
    );

    if rate > max_rate {
        return Err(PipelineError::RejectionRate {
            rejected: rejections.count(),
            total,
            max_rate,
            rejected_ids: rejections.rejected_ids.clone(),
        });
    }
    Ok(())
}

/// Bronze directory in, gold tables out. Configuration is validated before
/// any input is read.
pub fn run_gold_internal(
    bronze_dir: &Path,
    config_path: &Path,
    db_path: &Path,
    eval_at: DateTime<Utc>,
) -> PipelineResult<(PipelineOutput, PipelineRun)> {
    let config = load_engine_config(config_path)?;
    let raw = read_bronze_dir(bronze_dir)?;
    let output = run_pipeline(raw, &config, eval_at)?;

    let conn = get_db_connection(db_path)?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let run = replace_gold_outputs(&conn, &run_id, &output)?;

    log::info!(
        "run {} saved {} component rows and {} global rows to {}",
        run.run_id,
        output.component_kpis.len(),
        output.global_kpis.len(),
        db_path.display()
    );

    Ok((output, run))
}
