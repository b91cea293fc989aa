use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One observation of an issue as produced by a single extraction run.
/// Timestamps are kept as raw text until normalization validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIssueRecord {
    pub id: u64,
    pub labels: BTreeSet<String>,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub is_pull_request: bool,
}

/// Deduplicated issue annotated by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIssue {
    pub id: u64,
    pub labels: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub component: String,
    pub is_critical: bool,
    pub resolution_hours: Option<f64>,
    pub sla_breached: Option<bool>,
}

impl NormalizedIssue {
    /// End of the open interval: the close time, or the evaluation instant
    /// for issues that are still open.
    pub fn open_until(&self, eval_at: DateTime<Utc>) -> DateTime<Utc> {
        self.closed_at.unwrap_or(eval_at)
    }
}
