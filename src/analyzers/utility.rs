use std::cmp::Ordering;

use super::types::SafetyMetrics;
use crate::error::CountOverflow;
use crate::stats::SeverityCounts;

/// Minimum length for the filtered reports.
pub const MIN_REPORT_KM: f64 = 1.0;

/// Divides a count by a length without failing on zero.
///
/// Follows IEEE semantics: a positive count over zero km is `+inf`, zero
/// over zero is `NaN`. An unknown count gives `NaN`.
pub fn per_km(count: Option<i64>, total_km: f64) -> f64 {
    count.map_or(f64::NAN, |c| c as f64 / total_km)
}

/// Computes the three derived metrics from counts and a length.
pub fn safety_metrics(counts: &SeverityCounts, total_km: f64) -> Result<SafetyMetrics, CountOverflow> {
    let fatal_severe_accidents = counts.fatal_severe()?;
    Ok(SafetyMetrics {
        fatal_severe_accidents,
        fatal_severe_accidents_per_km: per_km(fatal_severe_accidents, total_km),
        fatal_accidents_per_km: per_km(counts.severity_fatal_count, total_km),
    })
}

/// Sum of the reported values, failing instead of wrapping.
pub fn checked_sum(
    column: &'static str,
    values: impl IntoIterator<Item = i64>,
) -> Result<i64, CountOverflow> {
    values
        .into_iter()
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or(CountOverflow(column))
}

/// Descending order for rates. `+inf` ranks first and `NaN` always last.
pub fn descending_rate(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Stable sort by descending `fatal_severe_accidents_per_km`.
pub fn rank_by_severity<R>(rows: &mut [R], metrics: impl Fn(&R) -> &SafetyMetrics) {
    rows.sort_by(|a, b| {
        descending_rate(
            metrics(a).fatal_severe_accidents_per_km,
            metrics(b).fatal_severe_accidents_per_km,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_km_zero_length() {
        assert_eq!(per_km(Some(2), 0.0), f64::INFINITY);
        assert_eq!(per_km(Some(-2), 0.0), f64::NEG_INFINITY);
        assert!(per_km(Some(0), 0.0).is_nan());
        assert!(per_km(None, 4.0).is_nan());
        assert_eq!(per_km(Some(2), 4.0), 0.5);
    }

    #[test]
    fn test_checked_sum_reports_overflowing_column() {
        assert_eq!(checked_sum("killed_count", [1, 2, 3]), Ok(6));
        assert_eq!(checked_sum("killed_count", []), Ok(0));
        assert_eq!(
            checked_sum("killed_count", [i64::MAX, 1]),
            Err(CountOverflow("killed_count"))
        );
    }

    #[test]
    fn test_safety_metrics_overflow() {
        let counts = SeverityCounts {
            severity_fatal_count: Some(i64::MAX),
            severity_severe_count: Some(1),
            ..Default::default()
        };
        assert_eq!(
            safety_metrics(&counts, 2.0),
            Err(CountOverflow("fatal_severe_accidents"))
        );
    }

    #[test]
    fn test_descending_rate_places_non_finite() {
        let mut rates = vec![0.5, f64::NAN, f64::INFINITY, 2.0, f64::NEG_INFINITY];
        rates.sort_by(|a, b| descending_rate(*a, *b));

        assert_eq!(rates[0], f64::INFINITY);
        assert_eq!(rates[1], 2.0);
        assert_eq!(rates[2], 0.5);
        assert_eq!(rates[3], f64::NEG_INFINITY);
        assert!(rates[4].is_nan());
    }

    #[test]
    fn test_rank_is_stable() {
        let metric = |rate: f64| SafetyMetrics {
            fatal_severe_accidents: None,
            fatal_severe_accidents_per_km: rate,
            fatal_accidents_per_km: rate,
        };
        let mut rows = vec![
            ("first", metric(1.0)),
            ("top", metric(3.0)),
            ("second", metric(1.0)),
            ("third", metric(1.0)),
        ];

        rank_by_severity(&mut rows, |(_, m)| m);

        let order: Vec<_> = rows.iter().map(|(name, _)| *name).collect();
        assert_eq!(order, vec!["top", "first", "second", "third"]);
    }
}
