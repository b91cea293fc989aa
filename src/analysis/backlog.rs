use crate::analysis::calendar::month_end;
use crate::error::{PipelineError, PipelineResult};
use crate::models::issue::NormalizedIssue;
use chrono::NaiveDate;

/// Running backlog: `backlog[m] = backlog[m-1] + created[m] - closed[m]`,
/// starting from zero before the first month.
pub fn carry_forward(created: &[u64], closed: &[u64]) -> Vec<i64> {
    created
        .iter()
        .zip(closed)
        .scan(0i64, |backlog, (&opened, &resolved)| {
            *backlog += opened as i64 - resolved as i64;
            Some(*backlog)
        })
        .collect()
}

/// Issues open at the end of `month`: created before the next month starts
/// and not closed before it.
pub fn open_at_month_end(issues: &[&NormalizedIssue], month: NaiveDate) -> i64 {
    let boundary = month_end(month);
    issues
        .iter()
        .filter(|issue| issue.created_at < boundary)
        .filter(|issue| issue.closed_at.map_or(true, |closed| closed >= boundary))
        .count() as i64
}

/// Compare the carried backlog against a direct recount for every month.
/// Any disagreement aborts with the first offending month.
pub fn reconcile(
    component: &str,
    months: &[NaiveDate],
    carried: &[i64],
    issues: &[&NormalizedIssue],
) -> PipelineResult<Vec<u64>> {
    months
        .iter()
        .zip(carried)
        .map(|(&month, &carried)| {
            let recomputed = open_at_month_end(issues, month);
            if carried != recomputed || carried < 0 {
                return Err(PipelineError::Consistency {
                    month,
                    component: component.to_string(),
                    carried,
                    recomputed,
                });
            }
            Ok(carried as u64)
        })
        .collect()
}
