//! File/environment configuration for the AdPulse engines.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use adpulse_anomaly::AnomalyEngineConfig;
use adpulse_benchmark::BenchmarkEngineConfig;
use adpulse_core::{PulseError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub anomaly: AnomalyEngineConfig,
    pub benchmark: BenchmarkEngineConfig,
}

pub struct SettingsManager {
    settings: Settings,
}

impl SettingsManager {
    pub fn new() -> Result<Self> {
        Self::from_file("adpulse.yaml")
    }

    /// Loads settings from an optional YAML file, then lets `ADPULSE_*`
    /// environment variables override individual keys.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("ADPULSE").separator("__"))
            .build()
            .map_err(|e| PulseError::Configuration(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| PulseError::Configuration(e.to_string()))?;

        info!("Configuration loaded successfully");

        Ok(Self { settings })
    }

    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("ADPULSE").separator("__"))
            .build()
            .map_err(|e| PulseError::Configuration(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| PulseError::Configuration(e.to_string()))?;

        info!("Configuration loaded from environment");

        Ok(Self { settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn validate(&self) -> Result<()> {
        let anomaly = &self.settings.anomaly;
        if anomaly.default_lookback_days == 0 {
            return Err(PulseError::Configuration(
                "anomaly lookback must cover at least one day".to_string(),
            ));
        }
        if anomaly.change_threshold_pct <= 0.0 {
            return Err(PulseError::Configuration(
                "percentage-change threshold must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&anomaly.seasonal_band_fraction)
            || anomaly.seasonal_band_fraction == 0.0
        {
            return Err(PulseError::Configuration(
                "seasonal band fraction must be in (0, 1]".to_string(),
            ));
        }

        let benchmark = &self.settings.benchmark;
        if benchmark.min_accounts < 2 || benchmark.min_metric_values < 2 {
            return Err(PulseError::Configuration(
                "benchmark sample guards must be at least 2".to_string(),
            ));
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.settings)
            .map_err(|e| PulseError::Configuration(e.to_string()))?;

        std::fs::write(path, yaml).map_err(|e| PulseError::Configuration(e.to_string()))?;

        info!("Configuration saved to file");
        Ok(())
    }
}
