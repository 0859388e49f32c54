//! Aggregate risk scoring over a scan's severity histogram.

use crate::core::{Severity, SeverityHistogram};

/// `min(10, (critical*10 + high*7 + medium*4 + low*1) / 10)`, rounded to
/// two decimals. Pure function of the histogram, always in [0, 10].
pub fn risk_score(histogram: &SeverityHistogram) -> f64 {
    let weighted = histogram.critical as f64 * f64::from(Severity::Critical.weight())
        + histogram.high as f64 * f64::from(Severity::High.weight())
        + histogram.medium as f64 * f64::from(Severity::Medium.weight())
        + histogram.low as f64 * f64::from(Severity::Low.weight());

    let score = (weighted / 10.0).min(10.0);
    (score * 100.0).round() / 100.0
}
