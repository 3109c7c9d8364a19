//! Plausibility checks on reconciled values

use crate::domain::ids::MetricId;
use crate::domain::record::Anomaly;
use crate::domain::units::Dimension;

/// Flags raised for `value` as a value of `metric` (in its canonical unit)
pub fn detect(metric: &MetricId, value: f64) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    match metric.dimension() {
        Dimension::Share if !(0.0..=100.0).contains(&value) => {
            anomalies.push(Anomaly::ShareOutOfRange)
        }
        Dimension::Energy if value < 0.0 => anomalies.push(Anomaly::NegativeValue),
        _ => {}
    }
    anomalies
}
