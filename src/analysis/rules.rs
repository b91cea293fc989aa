use crate::error::ValidationError;
use crate::models::issue::{NormalizedIssue, RawIssueRecord};
use crate::models::rules::RuleConfig;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Pick the component for a label set.
///
/// Prefixes are tried in configuration order; for each prefix the labels are
/// scanned lexicographically (the `BTreeSet` order) and the first qualifying
/// label wins. Falls back to `default_component` when nothing matches.
pub fn assign_component(
    labels: &BTreeSet<String>,
    prefixes: &[String],
    default_component: &str,
) -> String {
    prefixes
        .iter()
        .find_map(|prefix| {
            labels
                .iter()
                .find_map(|label| strip_component_prefix(label, prefix))
        })
        .unwrap_or_else(|| default_component.to_string())
}

/// `"Area: io"` with prefix `"area:"` → `Some("io")`.
/// Case-insensitive on the prefix; surrounding whitespace is ignored.
/// A label with nothing after the prefix does not qualify.
pub fn strip_component_prefix(label: &str, prefix: &str) -> Option<String> {
    let label = label.trim();
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return None;
    }

    let head = label.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let value = label[prefix.len()..].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// True when any label appears in the critical set.
pub fn is_critical(labels: &BTreeSet<String>, critical_labels: &BTreeSet<String>) -> bool {
    !labels.is_disjoint(critical_labels)
}

/// Elapsed time in fractional hours, millisecond precision.
pub fn resolution_hours(created_at: DateTime<Utc>, closed_at: DateTime<Utc>) -> f64 {
    (closed_at - created_at).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Breach outcome; `None` unless the issue is critical and resolved.
pub fn sla_breached(
    is_critical: bool,
    resolution_hours: Option<f64>,
    sla_hours_critical: f64,
) -> Option<bool> {
    if !is_critical {
        return None;
    }
    resolution_hours.map(|hours| hours > sla_hours_critical)
}

pub fn parse_timestamp(
    id: u64,
    field: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::UnparsableTimestamp {
            id,
            field,
            value: raw.to_string(),
        })
}

/// Validate timestamps and apply every rule to one deduplicated record.
pub fn normalize_issue(
    record: &RawIssueRecord,
    rules: &RuleConfig,
) -> Result<NormalizedIssue, ValidationError> {
    let created_raw = record
        .created_at
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(ValidationError::MissingTimestamp {
            id: record.id,
            field: "created_at",
        })?;
    let created_at = parse_timestamp(record.id, "created_at", created_raw)?;

    let closed_at = match record.closed_at.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(parse_timestamp(record.id, "closed_at", raw)?),
        _ => None,
    };

    if let Some(closed) = closed_at {
        if closed < created_at {
            return Err(ValidationError::ClosedBeforeCreated {
                id: record.id,
                created_at: created_at.to_rfc3339(),
                closed_at: closed.to_rfc3339(),
            });
        }
    }

    let component = assign_component(
        &record.labels,
        &rules.component_prefixes,
        &rules.default_component,
    );
    let critical = is_critical(&record.labels, &rules.critical_labels);
    let hours = closed_at.map(|closed| resolution_hours(created_at, closed));

    Ok(NormalizedIssue {
        id: record.id,
        labels: record.labels.clone(),
        created_at,
        closed_at,
        component,
        is_critical: critical,
        resolution_hours: hours,
        sla_breached: sla_breached(critical, hours, rules.sla_hours_critical),
    })
}
