use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PulseError;

/// Division with an explicit fallback for a zero denominator.
///
/// A zero denominator is steady-state here (a fresh campaign has no clicks
/// yet), so every ratio in the workspace goes through this guard instead of
/// re-checking at each call site.
pub fn safe_divide(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator == 0.0 {
        fallback
    } else {
        numerator / denominator
    }
}

/// A daily ad performance metric, either summed directly from raw rows or
/// derived from those sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Spend,
    Impressions,
    Clicks,
    Conversions,
    Leads,
    Calls,
    Revenue,
    Cpc,
    Cpm,
    Cpl,
    Cpa,
    Roas,
    Ctr,
    Cvr,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Spend => "spend",
            Metric::Impressions => "impressions",
            Metric::Clicks => "clicks",
            Metric::Conversions => "conversions",
            Metric::Leads => "leads",
            Metric::Calls => "calls",
            Metric::Revenue => "revenue",
            Metric::Cpc => "cpc",
            Metric::Cpm => "cpm",
            Metric::Cpl => "cpl",
            Metric::Cpa => "cpa",
            Metric::Roas => "roas",
            Metric::Ctr => "ctr",
            Metric::Cvr => "cvr",
        }
    }

    pub fn is_calculated(&self) -> bool {
        matches!(
            self,
            Metric::Cpc
                | Metric::Cpm
                | Metric::Cpl
                | Metric::Cpa
                | Metric::Roas
                | Metric::Ctr
                | Metric::Cvr
        )
    }

    /// Cost metrics read "lower is better" when scored against a range.
    pub fn is_cost(&self) -> bool {
        matches!(self, Metric::Cpc | Metric::Cpm | Metric::Cpl | Metric::Cpa)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spend" => Ok(Metric::Spend),
            "impressions" => Ok(Metric::Impressions),
            "clicks" => Ok(Metric::Clicks),
            "conversions" => Ok(Metric::Conversions),
            "leads" => Ok(Metric::Leads),
            "calls" => Ok(Metric::Calls),
            "revenue" => Ok(Metric::Revenue),
            "cpc" => Ok(Metric::Cpc),
            "cpm" => Ok(Metric::Cpm),
            "cpl" => Ok(Metric::Cpl),
            "cpa" => Ok(Metric::Cpa),
            "roas" => Ok(Metric::Roas),
            "ctr" => Ok(Metric::Ctr),
            "cvr" => Ok(Metric::Cvr),
            other => Err(PulseError::Configuration(format!(
                "unknown metric name '{other}'"
            ))),
        }
    }
}

/// The entity a query is computed against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Account(String),
    Campaign(String),
}

impl Scope {
    pub fn account(id: impl Into<String>) -> Self {
        Scope::Account(id.into())
    }

    pub fn campaign(id: impl Into<String>) -> Self {
        Scope::Campaign(id.into())
    }

    pub fn id(&self) -> &str {
        match self {
            Scope::Account(id) | Scope::Campaign(id) => id,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.id().trim().is_empty()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Account(id) => write!(f, "account:{id}"),
            Scope::Campaign(id) => write!(f, "campaign:{id}"),
        }
    }
}

/// One raw metric row as ingested from an ad platform. Several rows may land
/// on the same day for the same campaign; daily values are sums over them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdMetricRow {
    pub date: NaiveDate,
    pub account_id: String,
    pub campaign_id: Option<String>,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub leads: f64,
    pub calls: f64,
    pub revenue: f64,
}

impl AdMetricRow {
    pub fn matches(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Account(id) => &self.account_id == id,
            Scope::Campaign(id) => self.campaign_id.as_deref() == Some(id.as_str()),
        }
    }
}

/// Summed direct metrics over some period (a single day, or a whole date
/// range). Calculated metrics are derived from the sums, never summed
/// themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub leads: f64,
    pub calls: f64,
    pub revenue: f64,
}

impl MetricTotals {
    pub fn add_row(&mut self, row: &AdMetricRow) {
        self.spend += row.spend;
        self.impressions += row.impressions;
        self.clicks += row.clicks;
        self.conversions += row.conversions;
        self.leads += row.leads;
        self.calls += row.calls;
        self.revenue += row.revenue;
    }

    pub fn value_for(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Spend => self.spend,
            Metric::Impressions => self.impressions,
            Metric::Clicks => self.clicks,
            Metric::Conversions => self.conversions,
            Metric::Leads => self.leads,
            Metric::Calls => self.calls,
            Metric::Revenue => self.revenue,
            Metric::Cpc => safe_divide(self.spend, self.clicks, 0.0),
            Metric::Cpm => safe_divide(self.spend, self.impressions, 0.0) * 1000.0,
            Metric::Cpl => safe_divide(self.spend, self.leads, 0.0),
            Metric::Cpa => safe_divide(self.spend, self.conversions, 0.0),
            Metric::Roas => safe_divide(self.revenue, self.spend, 0.0),
            Metric::Ctr => safe_divide(self.clicks, self.impressions, 0.0) * 100.0,
            Metric::Cvr => safe_divide(self.conversions, self.clicks, 0.0) * 100.0,
        }
    }
}

/// A single day's value for one metric in one scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub date: NaiveDate,
    pub value: f64,
}
