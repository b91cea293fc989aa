use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_COMPONENT_PREFIXES: [&str; 3] = ["component:", "module:", "area:"];
pub const DEFAULT_COMPONENT: &str = "other";
pub const DEFAULT_HOURS_IN_MONTH: f64 = 720.0;
pub const DEFAULT_TIME_BUCKETS_HOURS: [f64; 4] = [24.0, 72.0, 168.0, 336.0];
pub const DEFAULT_MAX_REJECTION_RATE: f64 = 0.05;

/// Classification, criticality and SLA rules applied to every issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Checked in order; earlier prefixes win.
    pub component_prefixes: Vec<String>,
    pub critical_labels: BTreeSet<String>,
    pub sla_hours_critical: f64,
    pub hours_in_month: f64,
    pub default_component: String,
    pub time_buckets_hours: Vec<f64>,
}

impl RuleConfig {
    /// Rules with every optional setting at its default.
    pub fn new<I, S>(critical_labels: I, sla_hours_critical: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            component_prefixes: DEFAULT_COMPONENT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            critical_labels: critical_labels.into_iter().map(Into::into).collect(),
            sla_hours_critical,
            hours_in_month: DEFAULT_HOURS_IN_MONTH,
            default_component: DEFAULT_COMPONENT.to_string(),
            time_buckets_hours: DEFAULT_TIME_BUCKETS_HOURS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Fraction of deduplicated issues that may be rejected before the run
    /// is aborted.
    pub max_rejection_rate: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_rejection_rate: DEFAULT_MAX_REJECTION_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub rules: RuleConfig,
    pub validation: ValidationPolicy,
}
