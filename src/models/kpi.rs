use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Share of critical closures resolved within `hours`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketShare {
    pub hours: f64,
    pub share: f64,
}

/// Resolution time statistics over the critical issues closed in a month.
/// Every field is `None` when nothing was closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub avg_resolution_hours: Option<f64>,
    pub median_resolution_hours: Option<f64>,
    pub p90_resolution_hours: Option<f64>,
    pub share_closed_within: Vec<BucketShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyComponentKpi {
    pub month: NaiveDate,
    pub component: String,
    pub total_critical_hours: f64,
    pub stability_index: f64,
    pub sla_breach_rate: Option<f64>,
    pub created_critical: u64,
    pub closed_critical: u64,
    pub backlog_critical_end: u64,
    pub resolution: ResolutionStats,
}

/// All components folded together for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyGlobalKpi {
    pub month: NaiveDate,
    pub total_critical_hours: f64,
    pub sla_breach_rate: Option<f64>,
    pub created_critical: u64,
    pub closed_critical: u64,
    pub backlog_critical_end: u64,
    pub resolution: ResolutionStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCategory {
    Critical,
    Component,
    Other,
}

impl LabelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelCategory::Critical => "critical",
            LabelCategory::Component => "component",
            LabelCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(LabelCategory::Critical),
            "component" => Some(LabelCategory::Component),
            "other" => Some(LabelCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCatalogEntry {
    pub label: String,
    pub count: usize,
    pub category: LabelCategory,
}
