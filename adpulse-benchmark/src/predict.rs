//! Spend-based result projection against industry medians.
//!
//! Each scenario scales the industry's median unit economics by a fixed
//! multiplier pair. The pairs are asymmetric on purpose: cost metrics get
//! worse by inflating, rate metrics get worse by shrinking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use adpulse_core::{safe_divide, PulseError, Result};

use crate::{
    AccountAggregateProvider, BenchmarkEngine, BenchmarkFilters, BenchmarkMetric,
    IndustryBenchmark,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Leads,
    Sales,
    Traffic,
    VideoViews,
    Engagement,
    Awareness,
    Reach,
    AppInstalls,
}

impl Objective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Leads => "leads",
            Objective::Sales => "sales",
            Objective::Traffic => "traffic",
            Objective::VideoViews => "video_views",
            Objective::Engagement => "engagement",
            Objective::Awareness => "awareness",
            Objective::Reach => "reach",
            Objective::AppInstalls => "app_installs",
        }
    }

    /// What the primary expected result counts.
    pub fn result_label(&self) -> &'static str {
        match self {
            Objective::Leads => "leads",
            Objective::Sales => "sales",
            Objective::Traffic => "clicks",
            Objective::VideoViews => "video views",
            Objective::Engagement => "engagements",
            Objective::Awareness | Objective::Reach => "people reached",
            Objective::AppInstalls => "installs",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "leads" => Ok(Objective::Leads),
            "sales" => Ok(Objective::Sales),
            "traffic" => Ok(Objective::Traffic),
            "video_views" => Ok(Objective::VideoViews),
            "engagement" => Ok(Objective::Engagement),
            "awareness" => Ok(Objective::Awareness),
            "reach" => Ok(Objective::Reach),
            "app_installs" => Ok(Objective::AppInstalls),
            other => Err(PulseError::Configuration(format!(
                "unknown campaign objective '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Poor,
    Average,
    Good,
    Excellent,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Poor,
        Scenario::Average,
        Scenario::Good,
        Scenario::Excellent,
    ];

    /// Multiplier for ctr/cvr: shrinking makes the scenario worse.
    pub fn rate_multiplier(&self) -> f64 {
        match self {
            Scenario::Poor => 0.3,
            Scenario::Average => 0.65,
            Scenario::Good => 1.0,
            Scenario::Excellent => 1.2,
        }
    }

    /// Multiplier for cpc/cpm/cpl: inflating makes the scenario worse.
    pub fn cost_multiplier(&self) -> f64 {
        match self {
            Scenario::Poor => 1.7,
            Scenario::Average => 1.3,
            Scenario::Good => 1.0,
            Scenario::Excellent => 0.5,
        }
    }
}

/// Median unit economics a prediction starts from, with per-metric
/// fallbacks where the industry benchmark came up short.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BenchmarkMedians {
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub cvr: f64,
    pub cpl: f64,
}

impl BenchmarkMedians {
    pub fn from_benchmark(benchmark: &IndustryBenchmark) -> Self {
        let median = |metric: BenchmarkMetric| {
            benchmark
                .metrics
                .get(&metric)
                .map(|stat| stat.avg)
                .unwrap_or_else(|| {
                    debug!("no {metric} benchmark available, using the fallback default");
                    metric.fallback_default()
                })
        };

        Self {
            ctr: median(BenchmarkMetric::Ctr),
            cpc: median(BenchmarkMetric::Cpc),
            cpm: median(BenchmarkMetric::Cpm),
            cvr: median(BenchmarkMetric::Cvr),
            cpl: median(BenchmarkMetric::Cpl),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioProjection {
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub cvr: f64,
    pub cpl: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub expected_result: f64,
    pub result_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    pub industry: String,
    pub objective: Objective,
    pub spend: f64,
    pub medians: BenchmarkMedians,
    pub scenarios: BTreeMap<Scenario, ScenarioProjection>,
}

/// Projects expected results for `spend` in `industry` across the four
/// scenarios. The industry must be present in `benchmarks`; individual
/// missing metrics fall back to platform-wide defaults instead.
pub fn predict_expected_results(
    spend: f64,
    industry: &str,
    objective: Objective,
    benchmarks: &BTreeMap<String, IndustryBenchmark>,
) -> Result<PredictionReport> {
    let benchmark = benchmarks.get(industry).ok_or_else(|| {
        PulseError::Configuration(format!(
            "not enough data to predict results for industry '{industry}'"
        ))
    })?;
    let medians = BenchmarkMedians::from_benchmark(benchmark);

    let mut scenarios = BTreeMap::new();
    for scenario in Scenario::ALL {
        scenarios.insert(scenario, project(spend, &medians, objective, scenario));
    }

    Ok(PredictionReport {
        industry: industry.to_string(),
        objective,
        spend,
        medians,
        scenarios,
    })
}

fn project(
    spend: f64,
    medians: &BenchmarkMedians,
    objective: Objective,
    scenario: Scenario,
) -> ScenarioProjection {
    let rate = scenario.rate_multiplier();
    let cost = scenario.cost_multiplier();

    let ctr = medians.ctr * rate;
    let cvr = medians.cvr * rate;
    let cpc = medians.cpc * cost;
    let cpm = medians.cpm * cost;
    let cpl = medians.cpl * cost;

    let impressions = safe_divide(spend, cpm, 0.0) * 1000.0;
    // Two click estimators, impression-based and spend-based; trust the
    // larger one.
    let clicks = (impressions * ctr / 100.0).max(safe_divide(spend, cpc, 0.0));

    let expected_result = match objective {
        Objective::Leads | Objective::Sales | Objective::AppInstalls => clicks * cvr / 100.0,
        Objective::Traffic => clicks,
        Objective::VideoViews => clicks * 2.5,
        Objective::Engagement => impressions * 0.02,
        Objective::Awareness | Objective::Reach => impressions * 0.7,
    };

    ScenarioProjection {
        ctr: round2(ctr),
        cpc: round2(cpc),
        cpm: round2(cpm),
        cvr: round2(cvr),
        cpl: round2(cpl),
        impressions: impressions.round(),
        clicks: clicks.round(),
        expected_result: expected_result.round(),
        result_label: objective.result_label().to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl<P: AccountAggregateProvider> BenchmarkEngine<P> {
    /// Convenience wrapper: compute benchmarks for the range, then predict.
    pub fn predict_for_range(
        &self,
        spend: f64,
        industry: &str,
        objective: Objective,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
        filters: &BenchmarkFilters,
    ) -> Result<PredictionReport> {
        let benchmarks = self.industry_benchmarks(from, to, filters)?;
        predict_expected_results(spend, industry, objective, &benchmarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BenchmarkStat, Calculation, ValueRange};
    use approx::assert_relative_eq;

    fn stat(avg: f64) -> BenchmarkStat {
        BenchmarkStat {
            min: avg * 0.8,
            avg,
            max: avg * 1.2,
            data_points: 6,
            outliers_removed: 0,
            range: ValueRange {
                lowest: avg * 0.7,
                highest: avg * 1.3,
            },
            calculation: Calculation {
                p25: avg * 0.8,
                p50: avg,
                p75: avg * 1.2,
                sample_size: 6,
            },
        }
    }

    fn benchmarks_with_medians(
        ctr: f64,
        cpm: f64,
        cvr: f64,
    ) -> BTreeMap<String, IndustryBenchmark> {
        let mut metrics = BTreeMap::new();
        metrics.insert(BenchmarkMetric::Ctr, stat(ctr));
        metrics.insert(BenchmarkMetric::Cpm, stat(cpm));
        metrics.insert(BenchmarkMetric::Cvr, stat(cvr));
        // cpc and cpl intentionally absent: fallbacks cover them.
        let mut out = BTreeMap::new();
        out.insert(
            "real_estate".to_string(),
            IndustryBenchmark {
                accounts: 6,
                metrics,
            },
        );
        out
    }

    #[test]
    fn average_scenario_reproduces_the_formula_chain() {
        let benchmarks = benchmarks_with_medians(2.0, 10.0, 5.0);
        let report =
            predict_expected_results(1_000.0, "real_estate", Objective::Leads, &benchmarks)
                .unwrap();

        let average = &report.scenarios[&Scenario::Average];
        assert_relative_eq!(average.ctr, 1.3);
        assert_relative_eq!(average.cpm, 13.0);
        assert_relative_eq!(average.cvr, 3.25);
        // 1000 / 13 * 1000
        assert_relative_eq!(average.impressions, 76_923.0, epsilon = 1.0);
        // max(76923 * 1.3%, 1000 / 1.3) = max(~1000, ~769)
        assert_relative_eq!(average.clicks, 1_000.0, epsilon = 1.0);
        // clicks * 3.25%
        assert_relative_eq!(average.expected_result, 33.0, epsilon = 1.0);
        assert_eq!(average.result_label, "leads");
    }

    #[test]
    fn scenarios_are_ordered_worst_to_best() {
        let benchmarks = benchmarks_with_medians(2.0, 10.0, 5.0);
        let report =
            predict_expected_results(1_000.0, "real_estate", Objective::Leads, &benchmarks)
                .unwrap();

        let results: Vec<f64> = Scenario::ALL
            .iter()
            .map(|s| report.scenarios[s].expected_result)
            .collect();
        assert!(results.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn missing_metric_uses_its_fallback_not_an_error() {
        let benchmarks = benchmarks_with_medians(2.0, 10.0, 5.0);
        let report =
            predict_expected_results(1_000.0, "real_estate", Objective::Leads, &benchmarks)
                .unwrap();
        // cpc benchmark is absent; good scenario carries the 1.0 default.
        assert_relative_eq!(report.scenarios[&Scenario::Good].cpc, 1.0);
    }

    #[test]
    fn missing_industry_is_a_loud_error() {
        let benchmarks = benchmarks_with_medians(2.0, 10.0, 5.0);
        let err =
            predict_expected_results(1_000.0, "florists", Objective::Leads, &benchmarks)
                .unwrap_err();
        assert!(matches!(err, PulseError::Configuration(_)));
    }

    #[test]
    fn objectives_pick_their_primary_result() {
        let benchmarks = benchmarks_with_medians(2.0, 10.0, 5.0);
        let clicks = predict_expected_results(1_000.0, "real_estate", Objective::Traffic, &benchmarks)
            .unwrap()
            .scenarios[&Scenario::Good]
            .clicks;

        let traffic = predict_expected_results(1_000.0, "real_estate", Objective::Traffic, &benchmarks)
            .unwrap();
        assert_relative_eq!(traffic.scenarios[&Scenario::Good].expected_result, clicks);

        let awareness =
            predict_expected_results(1_000.0, "real_estate", Objective::Awareness, &benchmarks)
                .unwrap();
        let good = &awareness.scenarios[&Scenario::Good];
        assert_relative_eq!(good.expected_result, (good.impressions * 0.7).round());

        let video =
            predict_expected_results(1_000.0, "real_estate", Objective::VideoViews, &benchmarks)
                .unwrap();
        let good = &video.scenarios[&Scenario::Good];
        assert_relative_eq!(good.expected_result, (good.clicks * 2.5).round());
    }

    #[test]
    fn objective_names_parse_and_reject() {
        assert_eq!("video_views".parse::<Objective>().unwrap(), Objective::VideoViews);
        assert!("world_domination".parse::<Objective>().is_err());
    }
}
