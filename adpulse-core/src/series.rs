use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::model::{AdMetricRow, Metric, MetricPoint, MetricTotals, Scope};
use crate::Result;

/// Supplier of ordered daily metric series for a scope.
///
/// Returned series carry one point per day that has data; absent days are
/// missing, not zero-filled. A backing store that can group server-side may
/// override `weekday_series`; the default derives it from the daily series.
pub trait MetricSeriesProvider {
    fn historical_series(
        &self,
        scope: &Scope,
        metric: Metric,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MetricPoint>>;

    /// Value for exactly `today`, if any rows landed on it yet.
    fn current_value(&self, scope: &Scope, metric: Metric, today: NaiveDate)
        -> Result<Option<f64>>;

    fn weekday_series(
        &self,
        scope: &Scope,
        metric: Metric,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<Weekday, Vec<f64>>> {
        let mut grouped: HashMap<Weekday, Vec<f64>> = HashMap::new();
        for point in self.historical_series(scope, metric, from, to)? {
            grouped.entry(point.date.weekday()).or_default().push(point.value);
        }
        Ok(grouped)
    }
}

/// In-memory metric store over raw ad rows. Sums rows per day on demand and
/// derives calculated metrics from the daily sums.
#[derive(Debug, Default)]
pub struct MemoryMetricStore {
    rows: Vec<AdMetricRow>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: AdMetricRow) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = AdMetricRow>) {
        self.rows.extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn daily_totals(
        &self,
        scope: &Scope,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeMap<NaiveDate, MetricTotals> {
        let mut days: BTreeMap<NaiveDate, MetricTotals> = BTreeMap::new();
        for row in self
            .rows
            .iter()
            .filter(|r| r.matches(scope) && r.date >= from && r.date <= to)
        {
            days.entry(row.date).or_default().add_row(row);
        }
        days
    }
}

impl MetricSeriesProvider for MemoryMetricStore {
    fn historical_series(
        &self,
        scope: &Scope,
        metric: Metric,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MetricPoint>> {
        let series: Vec<MetricPoint> = self
            .daily_totals(scope, from, to)
            .into_iter()
            .map(|(date, totals)| MetricPoint {
                date,
                value: totals.value_for(metric),
            })
            .collect();

        debug!(
            "built {} daily {} point(s) for {} between {} and {}",
            series.len(),
            metric,
            scope,
            from,
            to
        );

        Ok(series)
    }

    fn current_value(
        &self,
        scope: &Scope,
        metric: Metric,
        today: NaiveDate,
    ) -> Result<Option<f64>> {
        let days = self.daily_totals(scope, today, today);
        Ok(days.get(&today).map(|totals| totals.value_for(metric)))
    }
}
