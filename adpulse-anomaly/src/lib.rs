pub mod engine;
pub mod suggestions;

pub use engine::AnomalyEngine;
pub use suggestions::suggestions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use adpulse_core::{Metric, PulseError};
use adpulse_stats::{Direction, Severity, Trend};

/// Coarse sensitivity knob, mapped to a z-score threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Moderate,
    High,
}

impl Sensitivity {
    pub fn z_threshold(&self) -> f64 {
        match self {
            Sensitivity::Low => 3.0,
            Sensitivity::Moderate => 2.0,
            Sensitivity::High => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Moderate => "moderate",
            Sensitivity::High => "high",
        }
    }
}

impl FromStr for Sensitivity {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Sensitivity::Low),
            "moderate" => Ok(Sensitivity::Moderate),
            "high" => Ok(Sensitivity::High),
            other => Err(PulseError::Configuration(format!(
                "unknown sensitivity level '{other}'"
            ))),
        }
    }
}

/// Closed set of detection methods. API layers passing strings parse them
/// here, so an unknown name is a loud configuration error instead of a
/// silently ignored default branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    #[default]
    ZScore,
    Iqr,
    PercentageChange,
    Seasonal,
    Combined,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ZScore => "zscore",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::PercentageChange => "percentage_change",
            DetectionMethod::Seasonal => "seasonal",
            DetectionMethod::Combined => "combined",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zscore" => Ok(DetectionMethod::ZScore),
            "iqr" => Ok(DetectionMethod::Iqr),
            "percentage_change" => Ok(DetectionMethod::PercentageChange),
            "seasonal" => Ok(DetectionMethod::Seasonal),
            "combined" => Ok(DetectionMethod::Combined),
            other => Err(PulseError::Configuration(format!(
                "unknown detection method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    StatisticalOutlier,
    IqrOutlier,
    SuddenSpike,
    SuddenDrop,
    SeasonalAnomaly,
}

/// The numbers behind one finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurements {
    pub current_value: f64,
    pub expected_value: f64,
    pub deviation: f64,
    pub z_score: Option<f64>,
    pub percentage_change: Option<f64>,
    pub historical_avg: Option<f64>,
    pub historical_std: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub direction: Option<Direction>,
    pub description: String,
    pub measurements: Measurements,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreAnalysis {
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IqrAnalysis {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub previous_value: f64,
    pub percentage_change: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalAnalysis {
    pub weekday: String,
    pub weekday_mean: f64,
    pub weekday_samples: usize,
    pub expected_low: f64,
    pub expected_high: f64,
    pub deviation_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    pub zscore: ZScoreAnalysis,
    pub change: ChangeAnalysis,
    pub trend: Trend,
    pub seasonal: Option<SeasonalAnalysis>,
}

/// Method-specific analysis payload attached to every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodAnalysis {
    ZScore(ZScoreAnalysis),
    Iqr(IqrAnalysis),
    PercentageChange(ChangeAnalysis),
    Seasonal(SeasonalAnalysis),
    Combined(CombinedAnalysis),
    Unavailable { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub metric: Metric,
    pub method: DetectionMethod,
    pub sensitivity: Sensitivity,
    pub lookback_days: u32,
    pub historical_data_points: usize,
    pub current_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub detected: bool,
    pub anomalies: Vec<Anomaly>,
    pub analysis: MethodAnalysis,
    pub metadata: ReportMetadata,
}

impl AnomalyReport {
    pub fn error_message(&self) -> Option<&str> {
        match &self.analysis {
            MethodAnalysis::Unavailable { error } => Some(error),
            _ => None,
        }
    }
}

/// Engine knobs. Defaults carry the calibrated production constants; the
/// combined method keeps its own fixed thresholds regardless of the caller's
/// sensitivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyEngineConfig {
    pub default_lookback_days: u32,
    pub default_sensitivity: Sensitivity,
    pub change_threshold_pct: f64,
    pub combined_z_threshold: f64,
    pub seasonal_band_fraction: f64,
    pub min_weekday_samples: usize,
}

impl Default for AnomalyEngineConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: 30,
            default_sensitivity: Sensitivity::Moderate,
            change_threshold_pct: 50.0,
            combined_z_threshold: 2.0,
            seasonal_band_fraction: 0.30,
            min_weekday_samples: 2,
        }
    }
}
