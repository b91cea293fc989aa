use crate::analysis::backlog::{carry_forward, reconcile};
use crate::analysis::calendar::{month_of, month_offset, month_range, overlap_hours};
use crate::analysis::resolution::summarize;
use crate::error::{PipelineError, PipelineResult};
use crate::models::issue::NormalizedIssue;
use crate::models::kpi::{MonthlyComponentKpi, MonthlyGlobalKpi};
use crate::models::rules::RuleConfig;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Gold output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyAggregation {
    /// Contiguous covered months, ascending.
    pub months: Vec<NaiveDate>,
    /// Ordered by month, then component.
    pub component_kpis: Vec<MonthlyComponentKpi>,
    /// One row per covered month.
    pub global_kpis: Vec<MonthlyGlobalKpi>,
}

#[derive(Debug, Clone, Default)]
struct MonthCell {
    hours: f64,
    created: u64,
    closed: u64,
    breached: u64,
    known_outcome: u64,
    resolutions: Vec<f64>,
}

impl MonthCell {
    fn breach_rate(&self) -> Option<f64> {
        (self.known_outcome > 0).then(|| self.breached as f64 / self.known_outcome as f64)
    }
}

/// Fold critical issues into monthly per-component KPI rows.
///
/// `eval_at` stands in for "now": issues still open contribute hours up to
/// it. It must not precede any critical timestamp.
pub fn aggregate_monthly(
    issues: &[NormalizedIssue],
    eval_at: DateTime<Utc>,
    rules: &RuleConfig,
) -> PipelineResult<MonthlyAggregation> {
    let mut critical: Vec<&NormalizedIssue> = issues.iter().filter(|i| i.is_critical).collect();
    if critical.is_empty() {
        return Ok(MonthlyAggregation::default());
    }
    // Float sums must not depend on caller ordering.
    critical.sort_by_key(|issue| issue.id);

    let months = covered_months(&critical, eval_at)?;
    let Some(&first) = months.first() else {
        return Ok(MonthlyAggregation::default());
    };

    let mut by_component: BTreeMap<&str, Vec<&NormalizedIssue>> = BTreeMap::new();
    for issue in &critical {
        by_component.entry(issue.component.as_str()).or_default().push(issue);
    }

    let mut component_kpis = Vec::new();
    let mut global_cells = vec![MonthCell::default(); months.len()];
    let mut global_backlog = vec![0u64; months.len()];

    for (component, component_issues) in &by_component {
        let cells = fill_cells(component_issues, &months, first, eval_at);

        let created: Vec<u64> = cells.iter().map(|c| c.created).collect();
        let closed: Vec<u64> = cells.iter().map(|c| c.closed).collect();
        let carried = carry_forward(&created, &closed);
        let backlog = reconcile(component, &months, &carried, component_issues)?;

        for (index, cell) in cells.iter().enumerate() {
            merge_cell(&mut global_cells[index], cell);
            global_backlog[index] += backlog[index];

            let active = cell.created > 0 || cell.closed > 0 || cell.hours > 0.0 || backlog[index] > 0;
            if !active {
                continue;
            }

            component_kpis.push(MonthlyComponentKpi {
                month: months[index],
                component: component.to_string(),
                total_critical_hours: cell.hours,
                stability_index: 1.0 - cell.hours / rules.hours_in_month,
                sla_breach_rate: cell.breach_rate(),
                created_critical: cell.created,
                closed_critical: cell.closed,
                backlog_critical_end: backlog[index],
                resolution: summarize(&cell.resolutions, &rules.time_buckets_hours),
            });
        }
    }

    component_kpis.sort_by(|a, b| a.month.cmp(&b.month).then_with(|| a.component.cmp(&b.component)));

    let global_kpis = months
        .iter()
        .zip(global_cells.iter().zip(&global_backlog))
        .map(|(&month, (cell, &backlog))| MonthlyGlobalKpi {
            month,
            total_critical_hours: cell.hours,
            sla_breach_rate: cell.breach_rate(),
            created_critical: cell.created,
            closed_critical: cell.closed,
            backlog_critical_end: backlog,
            resolution: summarize(&cell.resolutions, &rules.time_buckets_hours),
        })
        .collect();

    Ok(MonthlyAggregation {
        months,
        component_kpis,
        global_kpis,
    })
}

/// From the month of the earliest creation to the month of the latest
/// activity, where open issues extend activity to `eval_at`.
fn covered_months(
    critical: &[&NormalizedIssue],
    eval_at: DateTime<Utc>,
) -> PipelineResult<Vec<NaiveDate>> {
    let earliest = critical.iter().map(|i| i.created_at).min();
    let latest_observed = critical
        .iter()
        .map(|i| i.closed_at.unwrap_or(i.created_at))
        .max();

    let (Some(earliest), Some(latest_observed)) = (earliest, latest_observed) else {
        return Ok(Vec::new());
    };

    if eval_at < latest_observed {
        return Err(PipelineError::Configuration(format!(
            "evaluation instant {} precedes observed activity at {}",
            eval_at.to_rfc3339(),
            latest_observed.to_rfc3339()
        )));
    }

    let any_open = critical.iter().any(|i| i.closed_at.is_none());
    let latest = if any_open { eval_at } else { latest_observed };

    Ok(month_range(month_of(earliest), month_of(latest)))
}

fn fill_cells(
    issues: &[&NormalizedIssue],
    months: &[NaiveDate],
    first: NaiveDate,
    eval_at: DateTime<Utc>,
) -> Vec<MonthCell> {
    let mut cells = vec![MonthCell::default(); months.len()];
    let index_of = |instant: DateTime<Utc>| {
        month_offset(first, month_of(instant)).filter(|&idx| idx < months.len())
    };

    for issue in issues {
        if let Some(idx) = index_of(issue.created_at) {
            cells[idx].created += 1;
        }

        if let Some(closed_at) = issue.closed_at {
            if let Some(idx) = index_of(closed_at) {
                let cell = &mut cells[idx];
                cell.closed += 1;
                if let Some(breached) = issue.sla_breached {
                    cell.known_outcome += 1;
                    cell.breached += u64::from(breached);
                }
                if let Some(hours) = issue.resolution_hours {
                    cell.resolutions.push(hours);
                }
            }
        }

        let open_until = issue.open_until(eval_at);
        let (Some(start_idx), Some(end_idx)) = (index_of(issue.created_at), index_of(open_until)) else {
            continue;
        };
        for idx in start_idx..=end_idx {
            cells[idx].hours += overlap_hours(issue.created_at, open_until, months[idx]);
        }
    }

    cells
}

fn merge_cell(target: &mut MonthCell, cell: &MonthCell) {
    target.hours += cell.hours;
    target.created += cell.created;
    target.closed += cell.closed;
    target.breached += cell.breached;
    target.known_outcome += cell.known_outcome;
    target.resolutions.extend_from_slice(&cell.resolutions);
}
