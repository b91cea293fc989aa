use crate::models::issue::RawIssueRecord;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Result of collapsing repeated extraction observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deduplicated {
    /// One record per id, ordered by id.
    pub records: Vec<RawIssueRecord>,
    pub pull_requests_dropped: usize,
}

/// Keep one observation per issue id: the latest extraction wins, a closed
/// observation beats an open one from the same extraction. Pull requests are
/// dropped before anything else.
pub fn deduplicate<I>(records: I) -> Deduplicated
where
    I: IntoIterator<Item = RawIssueRecord>,
{
    let mut latest: BTreeMap<u64, RawIssueRecord> = BTreeMap::new();
    let mut pull_requests_dropped = 0;

    for record in records {
        if record.is_pull_request {
            pull_requests_dropped += 1;
            continue;
        }

        match latest.get_mut(&record.id) {
            Some(current) => {
                if observation_order(&record, current) == Ordering::Greater {
                    *current = record;
                }
            }
            None => {
                latest.insert(record.id, record);
            }
        }
    }

    Deduplicated {
        records: latest.into_values().collect(),
        pull_requests_dropped,
    }
}

/// Total order over observations of the same id. The trailing keys only
/// matter for identical extraction runs and keep the winner independent of
/// input order.
fn observation_order(a: &RawIssueRecord, b: &RawIssueRecord) -> Ordering {
    a.extracted_at
        .cmp(&b.extracted_at)
        .then_with(|| a.closed_at.is_some().cmp(&b.closed_at.is_some()))
        .then_with(|| a.closed_at.cmp(&b.closed_at))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.labels.cmp(&b.labels))
}
