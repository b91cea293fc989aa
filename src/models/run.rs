use crate::error::ValidationError;
use crate::models::issue::NormalizedIssue;
use crate::models::kpi::{LabelCatalogEntry, MonthlyComponentKpi, MonthlyGlobalKpi};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Records rejected during normalization, aggregated for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectionSummary {
    pub rejected_ids: Vec<u64>,
    pub reasons: Vec<String>,
}

impl RejectionSummary {
    pub fn record(&mut self, error: &ValidationError) {
        self.rejected_ids.push(error.issue_id());
        self.reasons.push(error.to_string());
    }

    pub fn count(&self) -> usize {
        self.rejected_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rejected_ids.is_empty()
    }
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub evaluated_at: DateTime<Utc>,
    pub raw_count: usize,
    pub pull_request_count: usize,
    pub issues: Vec<NormalizedIssue>,
    pub rejections: RejectionSummary,
    pub component_kpis: Vec<MonthlyComponentKpi>,
    pub global_kpis: Vec<MonthlyGlobalKpi>,
    pub label_catalog: Vec<LabelCatalogEntry>,
}

/// Stored metadata about a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub evaluated_at: i64,
    pub recorded_at: i64,
    pub raw_count: usize,
    pub pull_request_count: usize,
    pub issue_count: usize,
    pub rejected_count: usize,
    pub rejected_ids: Vec<u64>,
    pub rejection_reasons: Vec<String>,
    pub kpi_row_count: usize,
}
