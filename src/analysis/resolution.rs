use crate::models::kpi::{BucketShare, ResolutionStats};

/// Quantile with linear interpolation between closest ranks.
/// `sorted` must be ascending.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Mean, median, p90 and bucket shares of resolution times in hours.
pub fn summarize(hours: &[f64], buckets: &[f64]) -> ResolutionStats {
    if hours.is_empty() {
        return ResolutionStats::default();
    }

    let mut sorted = hours.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len() as f64;

    let share_closed_within = buckets
        .iter()
        .map(|&limit| BucketShare {
            hours: limit,
            share: sorted.iter().filter(|&&h| h <= limit).count() as f64 / count,
        })
        .collect();

    ResolutionStats {
        avg_resolution_hours: Some(sorted.iter().sum::<f64>() / count),
        median_resolution_hours: quantile(&sorted, 0.5),
        p90_resolution_hours: quantile(&sorted, 0.9),
        share_closed_within,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_statistics() {
        let stats = summarize(&[], &[24.0]);
        assert_eq!(stats, ResolutionStats::default());
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.5), Some(2.5));
        assert!((quantile(&sorted, 0.9).unwrap() - 3.7).abs() < 1e-9);
        assert_eq!(quantile(&[5.0], 0.9), Some(5.0));
    }

    #[test]
    fn bucket_shares_are_inclusive() {
        let stats = summarize(&[10.0, 24.0, 100.0, 400.0], &[24.0, 72.0, 336.0]);
        let shares: Vec<f64> = stats.share_closed_within.iter().map(|b| b.share).collect();
        assert_eq!(shares, vec![0.5, 0.5, 0.75]);
        assert_eq!(stats.avg_resolution_hours, Some(133.5));
        assert_eq!(stats.median_resolution_hours, Some(62.0));
    }
}
