//! Remediation hints for anomaly findings.
//!
//! A static lookup over (finding kind / direction, metric), not an
//! algorithm. Unknown combinations fall back to a generic hint.

use adpulse_core::Metric;
use adpulse_stats::Direction;

use crate::{Anomaly, AnomalyKind, AnomalyReport};

/// Human-readable suggestions for every finding in a report, deduplicated
/// in order of first appearance.
pub fn suggestions(report: &AnomalyReport) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for anomaly in &report.anomalies {
        let text = suggestion_for(anomaly, report.metadata.metric);
        if !out.contains(&text) {
            out.push(text);
        }
    }
    out
}

fn suggestion_for(anomaly: &Anomaly, metric: Metric) -> String {
    // Spikes and drops carry their direction in the kind; generic outliers
    // use the assessed direction.
    let direction = match anomaly.kind {
        AnomalyKind::SuddenSpike => Some(Direction::Above),
        AnomalyKind::SuddenDrop => Some(Direction::Below),
        _ => anomaly.direction,
    };

    match (metric, direction) {
        (Metric::Spend, Some(Direction::Above)) => {
            "Spend is rising fast: check for recent budget or bid increases and runaway automated rules.".into()
        }
        (Metric::Spend, Some(Direction::Below)) => {
            "Spend dropped: verify billing status and that campaigns are still delivering.".into()
        }
        (Metric::Clicks | Metric::Ctr, Some(Direction::Below)) => {
            "Review ad creative and placements; creative fatigue usually shows up as falling clicks first.".into()
        }
        (Metric::Clicks | Metric::Ctr, Some(Direction::Above)) => {
            "Click volume surged: confirm traffic quality before scaling budgets further.".into()
        }
        (Metric::Impressions, Some(Direction::Below)) => {
            "Impression volume fell: check campaign status, daily budgets and audience overlap.".into()
        }
        (Metric::Impressions, Some(Direction::Above)) => {
            "Impressions spiked: a broadened audience or a new placement may have gone live.".into()
        }
        (Metric::Conversions | Metric::Leads | Metric::Calls, Some(Direction::Below)) => {
            "Conversions dropped: verify tracking pixels still fire and landing pages load.".into()
        }
        (Metric::Conversions | Metric::Leads | Metric::Calls, Some(Direction::Above)) => {
            "Conversion volume spiked: confirm the tracking setup before attributing the lift.".into()
        }
        (Metric::Cpc | Metric::Cpm | Metric::Cpl | Metric::Cpa, Some(Direction::Above)) => {
            "Costs are above their usual range: review bids, audience saturation and auction competition.".into()
        }
        (Metric::Cpc | Metric::Cpm | Metric::Cpl | Metric::Cpa, Some(Direction::Below)) => {
            "Costs are unusually low: confirm delivery quality has not degraded.".into()
        }
        (Metric::Revenue | Metric::Roas, Some(Direction::Below)) => {
            "Return dropped: compare conversion values against platform reports and recent price changes.".into()
        }
        (Metric::Revenue | Metric::Roas, Some(Direction::Above)) => {
            "Return jumped: validate the conversion values feed before reallocating budget.".into()
        }
        (Metric::Cvr, Some(Direction::Below)) => {
            "Conversion rate fell: test the landing page funnel and check form or pixel errors.".into()
        }
        _ => format!(
            "Unusual movement in {metric}: monitor and investigate the underlying campaigns."
        ),
    }
}
