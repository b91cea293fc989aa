use crate::analysis::rules::strip_component_prefix;
use crate::models::issue::NormalizedIssue;
use crate::models::kpi::{LabelCatalogEntry, LabelCategory};
use crate::models::rules::RuleConfig;
use std::collections::BTreeMap;

/// Count label usage across normalized issues and tag each label with the
/// rule it feeds. Sorted by count descending, then label.
pub fn build_label_catalog(issues: &[NormalizedIssue], rules: &RuleConfig) -> Vec<LabelCatalogEntry> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for issue in issues {
        for label in &issue.labels {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
    }

    let mut catalog: Vec<LabelCatalogEntry> = counts
        .into_iter()
        .map(|(label, count)| LabelCatalogEntry {
            label: label.to_string(),
            count,
            category: categorize(label, rules),
        })
        .collect();

    catalog.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    catalog
}

fn categorize(label: &str, rules: &RuleConfig) -> LabelCategory {
    if rules.critical_labels.contains(label) {
        return LabelCategory::Critical;
    }
    if rules
        .component_prefixes
        .iter()
        .any(|prefix| strip_component_prefix(label, prefix).is_some())
    {
        return LabelCategory::Component;
    }
    LabelCategory::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn issue(id: u64, labels: &[&str]) -> NormalizedIssue {
        NormalizedIssue {
            id,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            closed_at: None,
            component: "other".to_string(),
            is_critical: false,
            resolution_hours: None,
            sla_breached: None,
        }
    }

    #[test]
    fn counts_and_categorizes_labels() {
        let rules = RuleConfig::new(["P1-critical"], 24.0);
        let issues = vec![
            issue(1, &["P1-critical", "area: io", "bug"]),
            issue(2, &["bug", "area: io"]),
            issue(3, &["bug"]),
        ];

        let catalog = build_label_catalog(&issues, &rules);
        let summary: Vec<(&str, usize, LabelCategory)> = catalog
            .iter()
            .map(|e| (e.label.as_str(), e.count, e.category))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("bug", 3, LabelCategory::Other),
                ("area: io", 2, LabelCategory::Component),
                ("P1-critical", 1, LabelCategory::Critical),
            ]
        );
    }

    #[test]
    fn empty_input_gives_empty_catalog() {
        let rules = RuleConfig::new(["P1-critical"], 24.0);
        assert!(build_label_catalog(&[], &rules).is_empty());
    }
}
