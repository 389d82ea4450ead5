pub mod engine;
pub mod predict;

pub use engine::{score_performance, BenchmarkEngine};
pub use predict::{predict_expected_results, Objective, PredictionReport, Scenario};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use adpulse_core::{Metric, MetricTotals, PulseError, Result};

/// The five metrics industry benchmarks are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkMetric {
    Ctr,
    Cpc,
    Cpm,
    Cvr,
    Cpl,
}

impl BenchmarkMetric {
    pub const ALL: [BenchmarkMetric; 5] = [
        BenchmarkMetric::Ctr,
        BenchmarkMetric::Cpc,
        BenchmarkMetric::Cpm,
        BenchmarkMetric::Cvr,
        BenchmarkMetric::Cpl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkMetric::Ctr => "ctr",
            BenchmarkMetric::Cpc => "cpc",
            BenchmarkMetric::Cpm => "cpm",
            BenchmarkMetric::Cvr => "cvr",
            BenchmarkMetric::Cpl => "cpl",
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            BenchmarkMetric::Ctr => Metric::Ctr,
            BenchmarkMetric::Cpc => Metric::Cpc,
            BenchmarkMetric::Cpm => Metric::Cpm,
            BenchmarkMetric::Cvr => Metric::Cvr,
            BenchmarkMetric::Cpl => Metric::Cpl,
        }
    }

    /// Cost metrics score "lower is better"; rate metrics the opposite.
    pub fn is_cost(&self) -> bool {
        matches!(
            self,
            BenchmarkMetric::Cpc | BenchmarkMetric::Cpm | BenchmarkMetric::Cpl
        )
    }

    /// Data-quality floor applied when filtering outliers. Cost values below
    /// these are junk rows (test spend, broken currency), not cheap wins.
    pub fn domain_floor(&self) -> Option<f64> {
        match self {
            BenchmarkMetric::Cpc => Some(0.40),
            BenchmarkMetric::Cpl => Some(5.00),
            BenchmarkMetric::Cpm => Some(1.00),
            BenchmarkMetric::Ctr | BenchmarkMetric::Cvr => None,
        }
    }

    /// Fallback median used by predictions when an industry benchmark lacks
    /// this metric.
    pub fn fallback_default(&self) -> f64 {
        match self {
            BenchmarkMetric::Ctr => 1.5,
            BenchmarkMetric::Cpc => 1.0,
            BenchmarkMetric::Cpm => 10.0,
            BenchmarkMetric::Cvr => 3.0,
            BenchmarkMetric::Cpl => 30.0,
        }
    }
}

impl fmt::Display for BenchmarkMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BenchmarkMetric {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ctr" => Ok(BenchmarkMetric::Ctr),
            "cpc" => Ok(BenchmarkMetric::Cpc),
            "cpm" => Ok(BenchmarkMetric::Cpm),
            "cvr" => Ok(BenchmarkMetric::Cvr),
            "cpl" => Ok(BenchmarkMetric::Cpl),
            other => Err(PulseError::Configuration(format!(
                "unknown benchmark metric '{other}'"
            ))),
        }
    }
}

/// One account's summed metrics over a date range, with the cohort
/// attributes benchmarks can be filtered on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAggregate {
    pub account_id: String,
    pub industry: String,
    pub platform: Option<String>,
    pub objective: Option<String>,
    pub funnel_stage: Option<String>,
    pub user_journey: Option<String>,
    pub has_pixel_data: bool,
    pub totals: MetricTotals,
}

/// Cohort selection for a benchmark run. Unset dimensions match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkFilters {
    pub platform: Option<String>,
    pub objective: Option<String>,
    pub funnel_stage: Option<String>,
    pub user_journey: Option<String>,
    pub has_pixel_data: Option<bool>,
}

impl BenchmarkFilters {
    pub fn matches(&self, account: &AccountAggregate) -> bool {
        fn dim(filter: &Option<String>, value: &Option<String>) -> bool {
            match filter {
                Some(wanted) => value.as_deref() == Some(wanted.as_str()),
                None => true,
            }
        }

        dim(&self.platform, &account.platform)
            && dim(&self.objective, &account.objective)
            && dim(&self.funnel_stage, &account.funnel_stage)
            && dim(&self.user_journey, &account.user_journey)
            && self
                .has_pixel_data
                .map_or(true, |wanted| account.has_pixel_data == wanted)
    }
}

/// Supplier of per-account aggregates for a date range. Backed by the
/// metrics warehouse in production; `MemoryAccountStore` in tests.
pub trait AccountAggregateProvider {
    fn account_aggregates(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AccountAggregate>>;
}

/// A raw per-account, per-day metrics row the in-memory store aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDayRow {
    pub date: NaiveDate,
    pub account_id: String,
    pub industry: String,
    pub platform: Option<String>,
    pub objective: Option<String>,
    pub funnel_stage: Option<String>,
    pub user_journey: Option<String>,
    pub has_pixel_data: bool,
    pub totals: MetricTotals,
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    rows: Vec<AccountDayRow>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: AccountDayRow) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = AccountDayRow>) {
        self.rows.extend(rows);
    }
}

impl AccountAggregateProvider for MemoryAccountStore {
    fn account_aggregates(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AccountAggregate>> {
        let mut by_account: BTreeMap<String, AccountAggregate> = BTreeMap::new();
        for row in self.rows.iter().filter(|r| r.date >= from && r.date <= to) {
            let entry = by_account
                .entry(row.account_id.clone())
                .or_insert_with(|| AccountAggregate {
                    account_id: row.account_id.clone(),
                    industry: row.industry.clone(),
                    platform: row.platform.clone(),
                    objective: row.objective.clone(),
                    funnel_stage: row.funnel_stage.clone(),
                    user_journey: row.user_journey.clone(),
                    has_pixel_data: row.has_pixel_data,
                    totals: MetricTotals::default(),
                });
            entry.totals.spend += row.totals.spend;
            entry.totals.impressions += row.totals.impressions;
            entry.totals.clicks += row.totals.clicks;
            entry.totals.conversions += row.totals.conversions;
            entry.totals.leads += row.totals.leads;
            entry.totals.calls += row.totals.calls;
            entry.totals.revenue += row.totals.revenue;
        }
        Ok(by_account.into_values().collect())
    }
}

/// Percentile range for one metric across an industry's accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkStat {
    /// p25: the "good" threshold.
    pub min: f64,
    /// p50: the median.
    pub avg: f64,
    /// p75: the "excellent" threshold.
    pub max: f64,
    pub data_points: usize,
    pub outliers_removed: usize,
    pub range: ValueRange,
    pub calculation: Calculation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueRange {
    pub lowest: f64,
    pub highest: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calculation {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    /// Account values entering the outlier filter.
    pub sample_size: usize,
}

/// Benchmarks for one industry. Metrics without enough clean data are
/// simply absent. Recomputed from live aggregates on every call, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryBenchmark {
    pub accounts: usize,
    pub metrics: BTreeMap<BenchmarkMetric, BenchmarkStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Excellent,
    Good,
    Average,
    BelowAverage,
    Poor,
    NoData,
}

impl PerformanceStatus {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => PerformanceStatus::NoData,
            Some(s) if s >= 80.0 => PerformanceStatus::Excellent,
            Some(s) if s >= 60.0 => PerformanceStatus::Good,
            Some(s) if s >= 40.0 => PerformanceStatus::Average,
            Some(s) if s >= 20.0 => PerformanceStatus::BelowAverage,
            Some(_) => PerformanceStatus::Poor,
        }
    }
}

/// An actual value scored against a benchmark range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub actual: Option<f64>,
    pub benchmark: BenchmarkStat,
    /// 0-100, or `None` when no actual value was available.
    pub performance: Option<f64>,
    pub status: PerformanceStatus,
}

/// Engine knobs; both guards exist so a single stray account can never
/// define an industry's "normal".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkEngineConfig {
    pub min_accounts: usize,
    pub min_metric_values: usize,
}

impl Default for BenchmarkEngineConfig {
    fn default() -> Self {
        Self {
            min_accounts: 2,
            min_metric_values: 2,
        }
    }
}
