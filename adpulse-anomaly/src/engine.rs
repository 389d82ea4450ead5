use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use adpulse_core::{safe_divide, Metric, MetricSeriesProvider, Scope};
use adpulse_stats::{self as stats, Direction, OutlierStatistic, Severity};

use crate::{
    Anomaly, AnomalyEngineConfig, AnomalyKind, AnomalyReport, ChangeAnalysis, CombinedAnalysis,
    DetectionMethod, IqrAnalysis, Measurements, MethodAnalysis, ReportMetadata, SeasonalAnalysis,
    Sensitivity, ZScoreAnalysis,
};

/// Stateless anomaly detection over a scope's daily metric series.
///
/// Each call fetches its own baseline from the provider and compares the
/// current day's value against it. Missing data and provider failures are
/// folded into a `detected = false` report; nothing in here throws for an
/// expected edge case.
pub struct AnomalyEngine<P> {
    provider: P,
    config: AnomalyEngineConfig,
}

impl<P: MetricSeriesProvider> AnomalyEngine<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, AnomalyEngineConfig::default())
    }

    pub fn with_config(provider: P, config: AnomalyEngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &AnomalyEngineConfig {
        &self.config
    }

    /// Detects anomalies for today's value against the trailing
    /// `lookback_days` baseline (today excluded).
    pub fn detect(
        &self,
        scope: &Scope,
        metric: Metric,
        lookback_days: u32,
        sensitivity: Sensitivity,
        method: DetectionMethod,
    ) -> AnomalyReport {
        self.detect_at(
            scope,
            metric,
            lookback_days,
            sensitivity,
            method,
            Utc::now().date_naive(),
        )
    }

    /// Same as [`detect`](Self::detect) with an explicit "today", which also
    /// makes the day-rollover boundary testable.
    pub fn detect_at(
        &self,
        scope: &Scope,
        metric: Metric,
        lookback_days: u32,
        sensitivity: Sensitivity,
        method: DetectionMethod,
        today: NaiveDate,
    ) -> AnomalyReport {
        let meta = ReportContext {
            metric,
            method,
            sensitivity,
            lookback_days,
        };

        if !scope.is_valid() {
            debug!("anomaly check skipped: invalid scope {scope}");
            return unavailable_report(&meta, 0, 0.0, "invalid scope: empty identifier".into());
        }

        let from = today - Duration::days(i64::from(lookback_days));
        let to = today - Duration::days(1);

        let history = match self.provider.historical_series(scope, metric, from, to) {
            Ok(history) => history,
            Err(err) => {
                return unavailable_report(&meta, 0, 0.0, format!("data source failure: {err}"))
            }
        };
        if history.is_empty() {
            debug!("no historical {metric} data for {scope} in the last {lookback_days} day(s)");
            return unavailable_report(
                &meta,
                0,
                0.0,
                "no historical data in lookback window".into(),
            );
        }

        let current = match self.provider.current_value(scope, metric, today) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("no {metric} value recorded today for {scope}");
                return unavailable_report(
                    &meta,
                    history.len(),
                    0.0,
                    "no value available for today".into(),
                );
            }
            Err(err) => {
                return unavailable_report(
                    &meta,
                    history.len(),
                    0.0,
                    format!("data source failure: {err}"),
                )
            }
        };

        let values: Vec<f64> = history.iter().map(|p| p.value).collect();

        let (anomalies, analysis) = match method {
            DetectionMethod::ZScore => {
                let (anomalies, analysis) =
                    self.run_zscore(metric, current, &values, sensitivity.z_threshold());
                (anomalies, MethodAnalysis::ZScore(analysis))
            }
            DetectionMethod::Iqr => {
                let (anomalies, analysis) = self.run_iqr(metric, current, &values);
                (anomalies, MethodAnalysis::Iqr(analysis))
            }
            DetectionMethod::PercentageChange => {
                let (anomalies, analysis) = self.run_change(metric, current, &values);
                (anomalies, MethodAnalysis::PercentageChange(analysis))
            }
            DetectionMethod::Seasonal => {
                let groups = match self.provider.weekday_series(scope, metric, from, to) {
                    Ok(groups) => groups,
                    Err(err) => {
                        return unavailable_report(
                            &meta,
                            values.len(),
                            current,
                            format!("data source failure: {err}"),
                        )
                    }
                };
                match self.run_seasonal(metric, current, &groups, today.weekday()) {
                    (anomalies, Some(analysis)) => (anomalies, MethodAnalysis::Seasonal(analysis)),
                    (_, None) => (
                        Vec::new(),
                        MethodAnalysis::Unavailable {
                            error: format!(
                                "not enough same-weekday history for a seasonal comparison on {}",
                                today.weekday()
                            ),
                        },
                    ),
                }
            }
            DetectionMethod::Combined => {
                let groups = match self.provider.weekday_series(scope, metric, from, to) {
                    Ok(groups) => groups,
                    Err(err) => {
                        return unavailable_report(
                            &meta,
                            values.len(),
                            current,
                            format!("data source failure: {err}"),
                        )
                    }
                };
                let (anomalies, analysis) =
                    self.run_combined(metric, current, &values, &groups, today.weekday());
                (anomalies, MethodAnalysis::Combined(analysis))
            }
        };

        let detected = !anomalies.is_empty();
        if detected {
            info!(
                "{} {} anomaly(ies) detected for {} via {}",
                anomalies.len(),
                metric,
                scope,
                method
            );
        }

        AnomalyReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            detected,
            anomalies,
            analysis,
            metadata: ReportMetadata {
                metric,
                method,
                sensitivity,
                lookback_days,
                historical_data_points: values.len(),
                current_value: current,
            },
        }
    }

    fn run_zscore(
        &self,
        metric: Metric,
        current: f64,
        values: &[f64],
        threshold: f64,
    ) -> (Vec<Anomaly>, ZScoreAnalysis) {
        let assessment = stats::z_score_assessment(current, values, threshold);
        let analysis = match assessment.statistic {
            OutlierStatistic::ZScore {
                z_score,
                mean,
                std_dev,
                threshold,
            } => ZScoreAnalysis {
                mean,
                std_dev,
                z_score,
                threshold,
            },
            OutlierStatistic::IqrFences { .. } => ZScoreAnalysis {
                mean: 0.0,
                std_dev: 0.0,
                z_score: 0.0,
                threshold,
            },
        };

        let mut anomalies = Vec::new();
        if assessment.is_outlier {
            let pct_from_mean = safe_divide(current - analysis.mean, analysis.mean, 0.0) * 100.0;
            let description = format!(
                "{} value {:.2} is {:.1}% {} the historical average ({:.2}), z-score: {:.2}",
                metric,
                current,
                pct_from_mean.abs(),
                direction_word(assessment.direction),
                analysis.mean,
                analysis.z_score
            );
            anomalies.push(Anomaly {
                kind: AnomalyKind::StatisticalOutlier,
                severity: assessment.severity,
                direction: Some(assessment.direction),
                description,
                measurements: Measurements {
                    current_value: current,
                    expected_value: analysis.mean,
                    deviation: current - analysis.mean,
                    z_score: Some(analysis.z_score),
                    percentage_change: Some(pct_from_mean),
                    historical_avg: Some(analysis.mean),
                    historical_std: Some(analysis.std_dev),
                },
            });
        }

        (anomalies, analysis)
    }

    fn run_iqr(&self, metric: Metric, current: f64, values: &[f64]) -> (Vec<Anomaly>, IqrAnalysis) {
        let assessment = stats::iqr_assessment(current, values);
        let analysis = match assessment.statistic {
            OutlierStatistic::IqrFences {
                q1,
                q3,
                iqr,
                lower_fence,
                upper_fence,
            } => IqrAnalysis {
                q1,
                q3,
                iqr,
                lower_fence,
                upper_fence,
            },
            OutlierStatistic::ZScore { .. } => IqrAnalysis {
                q1: 0.0,
                q3: 0.0,
                iqr: 0.0,
                lower_fence: 0.0,
                upper_fence: 0.0,
            },
        };

        let mut anomalies = Vec::new();
        if assessment.is_outlier {
            let fence = match assessment.direction {
                Direction::Above => analysis.upper_fence,
                Direction::Below => analysis.lower_fence,
            };
            let description = format!(
                "{} value {:.2} falls {} the IQR fence of {:.2}",
                metric,
                current,
                direction_word(assessment.direction),
                fence
            );
            anomalies.push(Anomaly {
                kind: AnomalyKind::IqrOutlier,
                severity: Severity::Moderate,
                direction: Some(assessment.direction),
                description,
                measurements: Measurements {
                    current_value: current,
                    expected_value: (analysis.q1 + analysis.q3) / 2.0,
                    deviation: current - fence,
                    z_score: None,
                    percentage_change: None,
                    historical_avg: None,
                    historical_std: None,
                },
            });
        }

        (anomalies, analysis)
    }

    fn run_change(
        &self,
        metric: Metric,
        current: f64,
        values: &[f64],
    ) -> (Vec<Anomaly>, ChangeAnalysis) {
        // Only the single most recent historical day matters here.
        let previous = values.last().copied().unwrap_or(0.0);
        let threshold = self.config.change_threshold_pct;
        let change = stats::sudden_change(current, previous, threshold);
        let analysis = ChangeAnalysis {
            previous_value: previous,
            percentage_change: change.percentage_change,
            threshold,
        };

        let mut anomalies = Vec::new();
        if change.is_spike || change.is_drop {
            let (kind, direction, verb) = if change.is_spike {
                (AnomalyKind::SuddenSpike, Direction::Above, "jumped")
            } else {
                (AnomalyKind::SuddenDrop, Direction::Below, "fell")
            };
            let description = format!(
                "{} {} {:.1}% against the previous day ({:.2} -> {:.2})",
                metric,
                verb,
                change.percentage_change.abs(),
                previous,
                current
            );
            anomalies.push(Anomaly {
                kind,
                severity: change.severity,
                direction: Some(direction),
                description,
                measurements: Measurements {
                    current_value: current,
                    expected_value: previous,
                    deviation: current - previous,
                    z_score: None,
                    percentage_change: Some(change.percentage_change),
                    historical_avg: None,
                    historical_std: None,
                },
            });
        }

        (anomalies, analysis)
    }

    fn run_seasonal(
        &self,
        metric: Metric,
        current: f64,
        groups: &HashMap<Weekday, Vec<f64>>,
        weekday: Weekday,
    ) -> (Vec<Anomaly>, Option<SeasonalAnalysis>) {
        let samples = match groups.get(&weekday) {
            Some(samples) if samples.len() >= self.config.min_weekday_samples => samples,
            _ => return (Vec::new(), None),
        };

        let weekday_mean = stats::mean(samples).unwrap_or(0.0);
        let band = self.config.seasonal_band_fraction * weekday_mean.abs();
        let expected_low = weekday_mean - band;
        let expected_high = weekday_mean + band;
        let deviation_pct =
            safe_divide((current - weekday_mean).abs(), weekday_mean.abs(), 0.0) * 100.0;

        let analysis = SeasonalAnalysis {
            weekday: weekday.to_string(),
            weekday_mean,
            weekday_samples: samples.len(),
            expected_low,
            expected_high,
            deviation_pct,
        };

        let mut anomalies = Vec::new();
        if current < expected_low || current > expected_high {
            let severity = if deviation_pct > 50.0 {
                Severity::High
            } else {
                Severity::Moderate
            };
            let direction = if current > expected_high {
                Direction::Above
            } else {
                Direction::Below
            };
            let description = format!(
                "{} value {:.2} is {:.1}% away from the typical {} value of {:.2}",
                metric, current, deviation_pct, weekday, weekday_mean
            );
            anomalies.push(Anomaly {
                kind: AnomalyKind::SeasonalAnomaly,
                severity,
                direction: Some(direction),
                description,
                measurements: Measurements {
                    current_value: current,
                    expected_value: weekday_mean,
                    deviation: current - weekday_mean,
                    z_score: None,
                    percentage_change: Some(deviation_pct),
                    historical_avg: Some(weekday_mean),
                    historical_std: Some(stats::std_dev(samples)),
                },
            });
        }

        (anomalies, Some(analysis))
    }

    /// Runs zscore, day-over-day change, trend and seasonal checks together
    /// and unions the findings. Thresholds are fixed (z 2.0, change 50%)
    /// independent of the caller's sensitivity.
    fn run_combined(
        &self,
        metric: Metric,
        current: f64,
        values: &[f64],
        groups: &HashMap<Weekday, Vec<f64>>,
        weekday: Weekday,
    ) -> (Vec<Anomaly>, CombinedAnalysis) {
        let (mut anomalies, zscore) =
            self.run_zscore(metric, current, values, self.config.combined_z_threshold);

        let (change_anomalies, change) = self.run_change(metric, current, values);
        anomalies.extend(change_anomalies);

        let trend = stats::trend(values);

        let (seasonal_anomalies, seasonal) = self.run_seasonal(metric, current, groups, weekday);
        anomalies.extend(seasonal_anomalies);

        (
            anomalies,
            CombinedAnalysis {
                zscore,
                change,
                trend,
                seasonal,
            },
        )
    }
}

struct ReportContext {
    metric: Metric,
    method: DetectionMethod,
    sensitivity: Sensitivity,
    lookback_days: u32,
}

fn unavailable_report(
    context: &ReportContext,
    historical_data_points: usize,
    current_value: f64,
    error: String,
) -> AnomalyReport {
    AnomalyReport {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        detected: false,
        anomalies: Vec::new(),
        analysis: MethodAnalysis::Unavailable { error },
        metadata: ReportMetadata {
            metric: context.metric,
            method: context.method,
            sensitivity: context.sensitivity,
            lookback_days: context.lookback_days,
            historical_data_points,
            current_value,
        },
    }
}

fn direction_word(direction: Direction) -> &'static str {
    match direction {
        Direction::Above => "above",
        Direction::Below => "below",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_core::{AdMetricRow, MemoryMetricStore};
    use approx::assert_relative_eq;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap()
    }

    fn spend_row(day: u32, spend: f64) -> AdMetricRow {
        AdMetricRow {
            date: date(day),
            account_id: "acc-1".into(),
            campaign_id: None,
            spend,
            impressions: 0.0,
            clicks: 0.0,
            conversions: 0.0,
            leads: 0.0,
            calls: 0.0,
            revenue: 0.0,
        }
    }

    fn engine_with_spend(history: &[f64], today_spend: Option<f64>) -> AnomalyEngine<MemoryMetricStore> {
        let mut store = MemoryMetricStore::new();
        // History fills the days immediately before "today" (day 20).
        let start = 20 - history.len() as u32;
        for (offset, spend) in history.iter().enumerate() {
            store.push(spend_row(start + offset as u32, *spend));
        }
        if let Some(spend) = today_spend {
            store.push(spend_row(20, spend));
        }
        AnomalyEngine::new(store)
    }

    fn scope() -> Scope {
        Scope::account("acc-1")
    }

    #[test]
    fn spend_spike_is_a_high_severity_statistical_outlier() {
        let engine = engine_with_spend(&[100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 103.0], Some(300.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::ZScore,
            date(20),
        );

        assert!(report.detected);
        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::StatisticalOutlier);
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.direction, Some(Direction::Above));

        match &report.analysis {
            MethodAnalysis::ZScore(analysis) => {
                assert_relative_eq!(analysis.mean, 100.428, epsilon = 0.01);
                assert!(analysis.z_score > 100.0);
            }
            other => panic!("unexpected analysis payload: {other:?}"),
        }
        assert_eq!(report.metadata.historical_data_points, 7);
        assert_eq!(report.metadata.current_value, 300.0);
    }

    #[test]
    fn flat_series_detects_nothing() {
        let engine = engine_with_spend(&[50.0; 10], Some(50.0));
        for method in [DetectionMethod::ZScore, DetectionMethod::PercentageChange] {
            let report = engine.detect_at(
                &scope(),
                Metric::Spend,
                14,
                Sensitivity::Moderate,
                method,
                date(20),
            );
            assert!(!report.detected, "{method} flagged a flat series");
            assert!(report.anomalies.is_empty());
        }
    }

    #[test]
    fn detected_flag_always_matches_the_finding_count() {
        let engine = engine_with_spend(&[100.0, 101.0, 99.0, 100.0, 102.0], Some(250.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::Combined,
            date(20),
        );
        assert_eq!(report.detected, !report.anomalies.is_empty());
        assert!(report.detected);
    }

    #[test]
    fn empty_history_returns_an_error_report_not_a_failure() {
        let engine = AnomalyEngine::new(MemoryMetricStore::new());
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::ZScore,
            date(20),
        );
        assert!(!report.detected);
        assert_eq!(
            report.error_message(),
            Some("no historical data in lookback window")
        );
    }

    #[test]
    fn missing_today_value_returns_an_error_report() {
        let engine = engine_with_spend(&[100.0, 101.0, 99.0], None);
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::ZScore,
            date(20),
        );
        assert!(!report.detected);
        assert_eq!(report.error_message(), Some("no value available for today"));
        assert_eq!(report.metadata.historical_data_points, 3);
    }

    #[test]
    fn blank_scope_is_rejected_softly() {
        let engine = engine_with_spend(&[100.0], Some(100.0));
        let report = engine.detect_at(
            &Scope::account(""),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::ZScore,
            date(20),
        );
        assert!(!report.detected);
        assert_eq!(
            report.error_message(),
            Some("invalid scope: empty identifier")
        );
    }

    #[test]
    fn percentage_change_compares_only_the_most_recent_day() {
        // Old history is wild, but yesterday matches today: no finding.
        let engine = engine_with_spend(&[500.0, 20.0, 100.0], Some(110.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::PercentageChange,
            date(20),
        );
        assert!(!report.detected);

        let engine = engine_with_spend(&[100.0, 100.0, 100.0], Some(180.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::PercentageChange,
            date(20),
        );
        assert!(report.detected);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::SuddenSpike);
    }

    #[test]
    fn sudden_drop_reports_downward_direction() {
        let engine = engine_with_spend(&[100.0, 100.0, 100.0], Some(30.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::PercentageChange,
            date(20),
        );
        assert!(report.detected);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::SuddenDrop);
        assert_eq!(report.anomalies[0].direction, Some(Direction::Below));
        // -70% is beyond 2x the 50% threshold
        assert_eq!(report.anomalies[0].severity, Severity::High);
    }

    #[test]
    fn iqr_method_reports_fixed_moderate_severity() {
        let engine = engine_with_spend(
            &[100.0, 101.0, 99.0, 102.0, 98.0, 100.0, 101.0, 99.0],
            Some(400.0),
        );
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::Iqr,
            date(20),
        );
        assert!(report.detected);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::IqrOutlier);
        assert_eq!(report.anomalies[0].severity, Severity::Moderate);
    }

    #[test]
    fn seasonal_method_compares_same_weekday_values() {
        let mut store = MemoryMetricStore::new();
        // 2026-06-01, -08 and -15 are Mondays; today (2026-06-22) is too.
        store.push(spend_row(1, 200.0));
        store.push(spend_row(8, 210.0));
        store.push(spend_row(15, 190.0));
        // Noise on other weekdays should not move the Monday baseline.
        store.push(spend_row(3, 20.0));
        store.push(spend_row(10, 25.0));
        store.push(spend_row(22, 400.0));
        let engine = AnomalyEngine::new(store);

        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            21,
            Sensitivity::Moderate,
            DetectionMethod::Seasonal,
            date(22),
        );
        assert!(report.detected);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::SeasonalAnomaly);
        // 400 vs a 200 Monday mean: 100% deviation
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(anomaly.direction, Some(Direction::Above));
    }

    #[test]
    fn seasonal_with_thin_weekday_history_is_unavailable() {
        let mut store = MemoryMetricStore::new();
        store.push(spend_row(15, 190.0)); // one Monday only
        store.push(spend_row(22, 400.0));
        let engine = AnomalyEngine::new(store);

        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            21,
            Sensitivity::Moderate,
            DetectionMethod::Seasonal,
            date(22),
        );
        assert!(!report.detected);
        assert!(report.error_message().is_some());
    }

    #[test]
    fn combined_method_unions_findings_from_all_checks() {
        let engine = engine_with_spend(&[100.0, 101.0, 99.0, 100.0, 102.0], Some(300.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Low, // combined ignores this and uses z 2.0
            DetectionMethod::Combined,
            date(20),
        );

        assert!(report.detected);
        let kinds: Vec<AnomalyKind> = report.anomalies.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AnomalyKind::StatisticalOutlier));
        assert!(kinds.contains(&AnomalyKind::SuddenSpike));

        match &report.analysis {
            MethodAnalysis::Combined(analysis) => {
                assert_eq!(analysis.zscore.threshold, 2.0);
                assert_eq!(analysis.change.threshold, 50.0);
            }
            other => panic!("unexpected analysis payload: {other:?}"),
        }
    }

    #[test]
    fn unknown_method_names_fail_loudly_at_the_parse_boundary() {
        assert!("zscore".parse::<DetectionMethod>().is_ok());
        assert!("percentage_change".parse::<DetectionMethod>().is_ok());
        assert!("voodoo".parse::<DetectionMethod>().is_err());
    }

    #[test]
    fn reports_serialize_with_tagged_analysis() {
        let engine = engine_with_spend(&[100.0, 101.0, 99.0], Some(100.0));
        let report = engine.detect_at(
            &scope(),
            Metric::Spend,
            14,
            Sensitivity::Moderate,
            DetectionMethod::ZScore,
            date(20),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["detected"], serde_json::Value::Bool(false));
        assert_eq!(json["analysis"]["kind"], "z_score");
        assert_eq!(json["metadata"]["metric"], "spend");
        assert_eq!(json["metadata"]["sensitivity"], "moderate");
    }
}
