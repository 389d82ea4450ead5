//! Pure numeric primitives shared by the anomaly and benchmark engines.
//!
//! Everything operates on plain `&[f64]` slices and is zero-guarded: on
//! valid numeric input only `mean` and `percentile` can fail, and only on
//! empty input. The percentile uses `floor(len * fraction)` indexing rather
//! than interpolation between ranks; the severity and fence constants used
//! downstream were calibrated against that convention, so it is preserved.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use adpulse_core::safe_divide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("empty input sequence")]
    EmptyInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

/// Result of testing one current value against a historical baseline.
/// `severity` and `direction` are only meaningful when `is_outlier` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierAssessment {
    pub is_outlier: bool,
    pub severity: Severity,
    pub direction: Direction,
    pub statistic: OutlierStatistic,
}

/// The statistic that triggered (or cleared) an outlier assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutlierStatistic {
    ZScore {
        z_score: f64,
        mean: f64,
        std_dev: f64,
        threshold: f64,
    },
    IqrFences {
        q1: f64,
        q3: f64,
        iqr: f64,
        lower_fence: f64,
        upper_fence: f64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuddenChange {
    pub percentage_change: f64,
    pub is_spike: bool,
    pub is_drop: bool,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub slope: f64,
}

pub fn mean(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, not sample. 0.0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mu = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
    variance.max(0.0).sqrt()
}

/// Percentile of a pre-sorted slice at `fraction` in `[0, 1]`, using
/// `floor(len * fraction)` indexing clamped to the last element.
pub fn percentile(sorted: &[f64], fraction: f64) -> Result<f64, StatsError> {
    if sorted.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    Ok(percentile_of_sorted(sorted, fraction))
}

fn percentile_of_sorted(sorted: &[f64], fraction: f64) -> f64 {
    let index = ((sorted.len() as f64 * fraction).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

pub fn z_score(value: f64, history: &[f64]) -> f64 {
    let sd = std_dev(history);
    if sd == 0.0 {
        return 0.0;
    }
    let mu = history.iter().sum::<f64>() / history.len() as f64;
    (value - mu) / sd
}

/// Z-score outlier test of `value` against `history` at `threshold`.
pub fn z_score_assessment(value: f64, history: &[f64], threshold: f64) -> OutlierAssessment {
    let mu = mean(history).unwrap_or(0.0);
    let sd = std_dev(history);
    let z = if sd == 0.0 { 0.0 } else { (value - mu) / sd };

    let severity = if z.abs() >= 3.0 {
        Severity::High
    } else if z.abs() >= 2.5 {
        Severity::Moderate
    } else {
        Severity::Low
    };
    let direction = if z > 0.0 {
        Direction::Above
    } else {
        Direction::Below
    };

    OutlierAssessment {
        is_outlier: z.abs() >= threshold,
        severity,
        direction,
        statistic: OutlierStatistic::ZScore {
            z_score: z,
            mean: mu,
            std_dev: sd,
            threshold,
        },
    }
}

/// 1.5x IQR fence test of `value` against `history`.
pub fn iqr_assessment(value: f64, history: &[f64]) -> OutlierAssessment {
    let mut sorted = history.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let (q1, q3) = if sorted.is_empty() {
        (0.0, 0.0)
    } else {
        (
            percentile_of_sorted(&sorted, 0.25),
            percentile_of_sorted(&sorted, 0.75),
        )
    };
    let iqr = q3 - q1;
    let lower_fence = q1 - 1.5 * iqr;
    let upper_fence = q3 + 1.5 * iqr;

    let is_outlier = !sorted.is_empty() && (value < lower_fence || value > upper_fence);
    let direction = if value > upper_fence {
        Direction::Above
    } else {
        Direction::Below
    };

    OutlierAssessment {
        is_outlier,
        severity: Severity::Moderate,
        direction,
        statistic: OutlierStatistic::IqrFences {
            q1,
            q3,
            iqr,
            lower_fence,
            upper_fence,
        },
    }
}

/// Day-over-day percentage change check. A zero `previous` resolves to a 0%
/// change rather than an infinite one.
pub fn sudden_change(current: f64, previous: f64, threshold_pct: f64) -> SuddenChange {
    let percentage_change = safe_divide(current - previous, previous, 0.0) * 100.0;
    let is_spike = percentage_change >= threshold_pct;
    let is_drop = percentage_change <= -threshold_pct;
    let severity = if percentage_change.abs() >= 2.0 * threshold_pct {
        Severity::High
    } else {
        Severity::Moderate
    };

    SuddenChange {
        percentage_change,
        is_spike,
        is_drop,
        severity,
    }
}

/// Least-squares slope of the series over its index, with a qualitative
/// direction. Slopes within +/-0.01 per step read as flat.
pub fn trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend {
            direction: TrendDirection::Flat,
            slope: 0.0,
        };
    }

    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, value) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (value - mean_y);
        denominator += dx * dx;
    }
    let slope = safe_divide(numerator, denominator, 0.0);

    let direction = if slope > 0.01 {
        TrendDirection::Increasing
    } else if slope < -0.01 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Flat
    };

    Trend { direction, slope }
}

/// Removes 1.5x IQR outliers from a pre-sorted slice. An optional domain
/// floor raises the lower fence so junk values below a data-quality minimum
/// are dropped along with true outliers. Fewer than four values come back
/// unchanged.
pub fn remove_outliers_iqr(sorted: &[f64], domain_floor: Option<f64>) -> Vec<f64> {
    if sorted.len() < 4 {
        return sorted.to_vec();
    }

    let q1 = percentile_of_sorted(sorted, 0.25);
    let q3 = percentile_of_sorted(sorted, 0.75);
    let iqr = q3 - q1;
    let mut lower_fence = q1 - 1.5 * iqr;
    if let Some(floor) = domain_floor {
        lower_fence = lower_fence.max(floor);
    }
    let upper_fence = q3 + 1.5 * iqr;

    sorted
        .iter()
        .copied()
        .filter(|v| *v >= lower_fence && *v <= upper_fence)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_rejects_empty_input() {
        assert_eq!(mean(&[]), Err(StatsError::EmptyInput));
        assert_eq!(mean(&[2.0, 4.0]), Ok(3.0));
    }

    #[test]
    fn std_dev_is_population_not_sample() {
        // Population sigma of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2.
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(std_dev(&values), 2.0);
        assert_eq!(std_dev(&[5.0]), 0.0);
    }

    #[test]
    fn percentile_uses_floor_indexing() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        // floor(4 * 0.25) = 1, floor(4 * 0.5) = 2, floor(4 * 0.75) = 3
        assert_eq!(percentile(&sorted, 0.25), Ok(2.0));
        assert_eq!(percentile(&sorted, 0.5), Ok(3.0));
        assert_eq!(percentile(&sorted, 0.75), Ok(4.0));
        // fraction 1.0 clamps to the last element instead of overrunning
        assert_eq!(percentile(&sorted, 1.0), Ok(4.0));
    }

    #[test]
    fn percentile_is_monotone_in_fraction() {
        let sorted = [1.0, 1.5, 2.0, 8.0, 9.0, 20.0, 21.0];
        let p25 = percentile(&sorted, 0.25).unwrap();
        let p50 = percentile(&sorted, 0.5).unwrap();
        let p75 = percentile(&sorted, 0.75).unwrap();
        assert!(p25 <= p50 && p50 <= p75);
    }

    #[test]
    fn z_scores_are_symmetric_around_the_mean() {
        let history = [10.0, 12.0, 11.0, 9.0, 8.0, 10.0];
        let mu = mean(&history).unwrap();
        let sd = std_dev(&history);

        let above = z_score_assessment(mu + 2.0 * sd, &history, 2.0);
        let below = z_score_assessment(mu - 2.0 * sd, &history, 2.0);

        let (z_above, z_below) = match (&above.statistic, &below.statistic) {
            (
                OutlierStatistic::ZScore { z_score: a, .. },
                OutlierStatistic::ZScore { z_score: b, .. },
            ) => (*a, *b),
            _ => panic!("expected z-score statistics"),
        };
        assert_relative_eq!(z_above.abs(), z_below.abs(), epsilon = 1e-9);
        assert_eq!(above.direction, Direction::Above);
        assert_eq!(below.direction, Direction::Below);
        assert!(above.is_outlier && below.is_outlier);
    }

    #[test]
    fn zero_spread_history_never_flags() {
        let flat = [5.0; 10];
        let assessment = z_score_assessment(5.0, &flat, 1.5);
        assert!(!assessment.is_outlier);
        let assessment = z_score_assessment(500.0, &flat, 1.5);
        // sigma = 0 resolves z to 0 by the arithmetic guard
        assert!(!assessment.is_outlier);
    }

    #[test]
    fn z_severity_tiers() {
        let history = [10.0, 12.0, 11.0, 9.0, 8.0, 10.0];
        let mu = mean(&history).unwrap();
        let sd = std_dev(&history);

        assert_eq!(
            z_score_assessment(mu + 3.5 * sd, &history, 2.0).severity,
            Severity::High
        );
        assert_eq!(
            z_score_assessment(mu + 2.7 * sd, &history, 2.0).severity,
            Severity::Moderate
        );
        assert_eq!(
            z_score_assessment(mu + 2.1 * sd, &history, 2.0).severity,
            Severity::Low
        );
    }

    #[test]
    fn iqr_flags_values_outside_the_fences() {
        let history = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0];
        let above = iqr_assessment(40.0, &history);
        assert!(above.is_outlier);
        assert_eq!(above.direction, Direction::Above);

        let inside = iqr_assessment(13.5, &history);
        assert!(!inside.is_outlier);
    }

    #[test]
    fn sudden_change_guards_zero_previous() {
        let change = sudden_change(100.0, 0.0, 50.0);
        assert_eq!(change.percentage_change, 0.0);
        assert!(!change.is_spike && !change.is_drop);
    }

    #[test]
    fn sudden_change_severity_scales_with_magnitude() {
        let spike = sudden_change(160.0, 100.0, 50.0);
        assert!(spike.is_spike);
        assert_eq!(spike.severity, Severity::Moderate);

        let big_spike = sudden_change(250.0, 100.0, 50.0);
        assert!(big_spike.is_spike);
        assert_eq!(big_spike.severity, Severity::High);

        let drop = sudden_change(40.0, 100.0, 50.0);
        assert!(drop.is_drop);
    }

    #[test]
    fn trend_direction_tracks_the_slope() {
        assert_eq!(
            trend(&[1.0, 2.0, 3.0, 4.0, 5.0]).direction,
            TrendDirection::Increasing
        );
        assert_eq!(
            trend(&[5.0, 4.0, 3.0, 2.0, 1.0]).direction,
            TrendDirection::Decreasing
        );
        assert_eq!(trend(&[3.0, 3.0, 3.0, 3.0]).direction, TrendDirection::Flat);
        assert_eq!(trend(&[3.0]).direction, TrendDirection::Flat);
    }

    #[test]
    fn removed_outliers_leave_values_inside_the_fences() {
        let sorted = [1.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 90.0];
        let kept = remove_outliers_iqr(&sorted, None);

        let q1 = percentile(&sorted, 0.25).unwrap();
        let q3 = percentile(&sorted, 0.75).unwrap();
        let iqr = q3 - q1;
        for value in &kept {
            assert!(*value >= q1 - 1.5 * iqr && *value <= q3 + 1.5 * iqr);
        }
        assert!(!kept.contains(&90.0));
    }

    #[test]
    fn domain_floor_raises_the_lower_fence() {
        // 0.05 sits inside the raw fences but below the cpc quality floor.
        let sorted = [0.05, 0.5, 0.6, 0.7, 0.8, 0.9];
        let kept = remove_outliers_iqr(&sorted, Some(0.40));
        assert!(!kept.contains(&0.05));
        assert!(kept.contains(&0.5));
    }

    #[test]
    fn small_samples_skip_outlier_removal() {
        let sorted = [1.0, 2.0, 900.0];
        assert_eq!(remove_outliers_iqr(&sorted, None), sorted.to_vec());
    }
}
