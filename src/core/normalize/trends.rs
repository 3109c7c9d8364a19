//! Trailing twelve-month totals and year-over-year growth
//!
//! For each additive series of one source:
//!
//! - `<family>_ttm` is the sum of a month and the eleven before it, emitted
//!   only when all twelve are present
//! - `<family>_yoy` is the growth in percent against the same month (or, for
//!   annual series, the previous year)
//! - `<family>_ttm_yoy` is the growth of the trailing total against the one
//!   twelve months earlier
//!
//! Growth is only computed against a positive base.

use crate::domain::ids::{CountryCode, MetricId, SourceKey};
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use crate::domain::units::Unit;
use std::collections::BTreeMap;

type SeriesKey = (SourceKey, CountryCode, MetricId);

/// Growth of `value` over `base` in percent
fn growth(value: f64, base: f64) -> Option<f64> {
    (base > 0.0).then(|| (value / base - 1.0) * 100.0)
}

fn derived_from(
    template: &CanonicalRecord,
    metric: MetricId,
    value: f64,
    unit: Unit,
) -> CanonicalRecord {
    CanonicalRecord {
        metric,
        value,
        unit,
        derived: true,
        ..template.clone()
    }
}

/// Trend records for every additive series in `records`
///
/// Only the new records are returned.
pub fn derive_trends<'a>(
    records: impl IntoIterator<Item = &'a CanonicalRecord>,
) -> Vec<CanonicalRecord> {
    let mut series: BTreeMap<SeriesKey, BTreeMap<Period, &CanonicalRecord>> = BTreeMap::new();
    for record in records.into_iter().filter(|r| r.metric.is_additive()) {
        let points = series
            .entry((
                record.source_key.clone(),
                record.country.clone(),
                record.metric.clone(),
            ))
            .or_default();
        // A reported value wins over a derived one for the same period
        let replace = points
            .get(&record.period)
            .map_or(true, |existing| existing.derived && !record.derived);
        if replace {
            points.insert(record.period, record);
        }
    }

    let mut derived = Vec::new();
    for ((_, _, metric), points) in &series {
        let (Ok(ttm_metric), Ok(yoy_metric)) = (metric.variant("ttm"), metric.variant("yoy"))
        else {
            continue;
        };
        let Ok(ttm_yoy_metric) = ttm_metric.variant("yoy") else {
            continue;
        };

        let mut trailing: BTreeMap<Period, f64> = BTreeMap::new();
        for (period, record) in points {
            let base = if period.is_annual() {
                Period::year(period.year_value() - 1).ok()
            } else {
                period.months_earlier(12)
            };
            if let Some(change) = base
                .and_then(|b| points.get(&b))
                .and_then(|b| growth(record.value, b.value))
            {
                derived.push(derived_from(
                    record,
                    yoy_metric.clone(),
                    change,
                    Unit::PercentChange,
                ));
            }

            if period.is_annual() {
                continue;
            }
            let window: Option<f64> = (0..12)
                .map(|back| {
                    period
                        .months_earlier(back)
                        .and_then(|p| points.get(&p))
                        .map(|r| r.value)
                })
                .sum();
            let Some(total) = window else {
                continue;
            };
            trailing.insert(*period, total);
            derived.push(derived_from(record, ttm_metric.clone(), total, record.unit));

            if let Some(change) = period
                .months_earlier(12)
                .and_then(|p| trailing.get(&p))
                .and_then(|&base| growth(total, base))
            {
                derived.push(derived_from(
                    record,
                    ttm_yoy_metric.clone(),
                    change,
                    Unit::PercentChange,
                ));
            }
        }
    }

    if !derived.is_empty() {
        tracing::debug!(
            series = series.len(),
            records = derived.len(),
            "Derived trend metrics"
        );
    }
    derived
}
