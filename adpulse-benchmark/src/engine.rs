use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

use adpulse_core::{safe_divide, Result};
use adpulse_stats::{percentile, remove_outliers_iqr};

use crate::{
    AccountAggregate, AccountAggregateProvider, BenchmarkComparison, BenchmarkEngineConfig,
    BenchmarkFilters, BenchmarkMetric, BenchmarkStat, Calculation, IndustryBenchmark,
    PerformanceStatus, ValueRange,
};

/// Builds per-industry benchmark ranges from live account aggregates.
///
/// Stateless: every call re-fetches, re-filters and re-derives. Industries
/// and metrics that fail the small-sample guards are omitted, not errored.
pub struct BenchmarkEngine<P> {
    provider: P,
    config: BenchmarkEngineConfig,
}

impl<P: AccountAggregateProvider> BenchmarkEngine<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, BenchmarkEngineConfig::default())
    }

    pub fn with_config(provider: P, config: BenchmarkEngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn industry_benchmarks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        filters: &BenchmarkFilters,
    ) -> Result<BTreeMap<String, IndustryBenchmark>> {
        let accounts = self.provider.account_aggregates(from, to)?;

        let mut by_industry: BTreeMap<String, Vec<&AccountAggregate>> = BTreeMap::new();
        for account in accounts
            .iter()
            .filter(|a| filters.matches(a) && a.totals.spend > 0.0)
        {
            by_industry
                .entry(account.industry.clone())
                .or_default()
                .push(account);
        }

        let mut benchmarks = BTreeMap::new();
        for (industry, group) in by_industry {
            if group.len() < self.config.min_accounts {
                debug!(
                    "skipping industry '{}': only {} qualifying account(s)",
                    industry,
                    group.len()
                );
                continue;
            }

            let mut metrics = BTreeMap::new();
            for metric in BenchmarkMetric::ALL {
                if let Some(stat) = self.metric_stat(metric, &group) {
                    metrics.insert(metric, stat);
                }
            }

            benchmarks.insert(
                industry,
                IndustryBenchmark {
                    accounts: group.len(),
                    metrics,
                },
            );
        }

        info!(
            "computed benchmarks for {} industr(ies) between {} and {}",
            benchmarks.len(),
            from,
            to
        );
        Ok(benchmarks)
    }

    fn metric_stat(
        &self,
        metric: BenchmarkMetric,
        group: &[&AccountAggregate],
    ) -> Option<BenchmarkStat> {
        let mut values: Vec<f64> = group
            .iter()
            .map(|a| a.totals.value_for(metric.metric()))
            .filter(|v| *v > 0.0)
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let filtered = remove_outliers_iqr(&values, metric.domain_floor());
        if filtered.len() < self.config.min_metric_values {
            debug!(
                "omitting {} benchmark: {} clean value(s) after outlier removal",
                metric,
                filtered.len()
            );
            return None;
        }

        let p25 = percentile(&filtered, 0.25).unwrap_or(0.0);
        let p50 = percentile(&filtered, 0.5).unwrap_or(0.0);
        let p75 = percentile(&filtered, 0.75).unwrap_or(0.0);

        Some(BenchmarkStat {
            min: round2(p25),
            avg: round2(p50),
            max: round2(p75),
            data_points: filtered.len(),
            outliers_removed: values.len() - filtered.len(),
            range: ValueRange {
                lowest: round2(filtered.first().copied().unwrap_or(0.0)),
                highest: round2(filtered.last().copied().unwrap_or(0.0)),
            },
            calculation: Calculation {
                p25: round2(p25),
                p50: round2(p50),
                p75: round2(p75),
                sample_size: values.len(),
            },
        })
    }
}

/// Scores an actual value against a benchmark range on a 0-100 scale by
/// linear interpolation between p25 and p75. Cost metrics invert: at or
/// under `min` is a 100, at or over `max` is a 0.
pub fn score_performance(
    actual: Option<f64>,
    benchmark: &BenchmarkStat,
    metric: BenchmarkMetric,
) -> BenchmarkComparison {
    let performance = actual.map(|value| {
        let span = benchmark.max - benchmark.min;
        let score = if metric.is_cost() {
            if value <= benchmark.min {
                100.0
            } else if value >= benchmark.max {
                0.0
            } else {
                100.0 - safe_divide(value - benchmark.min, span, 0.0) * 100.0
            }
        } else if value >= benchmark.max {
            100.0
        } else if value <= benchmark.min {
            0.0
        } else {
            safe_divide(value - benchmark.min, span, 0.0) * 100.0
        };
        score.clamp(0.0, 100.0)
    });

    BenchmarkComparison {
        actual,
        benchmark: benchmark.clone(),
        performance,
        status: PerformanceStatus::from_score(performance),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
