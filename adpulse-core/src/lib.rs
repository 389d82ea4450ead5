pub mod model;
pub mod series;

pub use model::{safe_divide, AdMetricRow, Metric, MetricPoint, MetricTotals, Scope};
pub use series::{MemoryMetricStore, MetricSeriesProvider};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PulseError>;
