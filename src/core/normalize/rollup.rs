//! Annual roll-ups of monthly series
//!
//! A source that reports all twelve months of an energy metric for a year
//! gets a derived annual record (the sum) so that it can be reconciled
//! against sources that only publish annual figures. Only additive metrics
//! are summed (never shares, growth rates or trailing totals), and a source's
//! own annual figure always takes precedence over the roll-up.

use crate::domain::ids::{CountryCode, MetricId, SourceKey};
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use std::collections::{BTreeMap, BTreeSet};

type SeriesKey = (SourceKey, CountryCode, MetricId, i32);

/// Derived annual records for every complete monthly energy series
///
/// Only the new records are returned; the input is left untouched.
pub fn derive_annual_totals(records: &[CanonicalRecord]) -> Vec<CanonicalRecord> {
    let mut months: BTreeMap<SeriesKey, BTreeMap<u32, &CanonicalRecord>> = BTreeMap::new();
    let mut direct_annual: BTreeSet<SeriesKey> = BTreeSet::new();

    for record in records.iter().filter(|r| r.metric.is_additive()) {
        let key = (
            record.source_key.clone(),
            record.country.clone(),
            record.metric.clone(),
            record.period.year_value(),
        );
        match record.period.month_value() {
            Some(month) => {
                months.entry(key).or_default().insert(month, record);
            }
            None => {
                direct_annual.insert(key);
            }
        }
    }

    let mut derived = Vec::new();
    for (key, by_month) in months {
        if by_month.len() != 12 || direct_annual.contains(&key) {
            continue;
        }
        let (source_key, country, metric, year) = key;
        let Ok(period) = Period::year(year) else {
            continue;
        };

        let mut value = 0.0;
        let mut latest = None;
        for record in by_month.values() {
            value += record.value;
            latest = match latest {
                Some(current) if record_is_newer(current, record) => Some(*record),
                None => Some(*record),
                keep => keep,
            };
        }
        let Some(template) = latest else {
            continue;
        };

        derived.push(CanonicalRecord {
            country,
            metric,
            period,
            value,
            unit: template.unit,
            source_key,
            observed_at: template.observed_at,
            trust_rank: template.trust_rank,
            artifact_hash: template.artifact_hash.clone(),
            derived: true,
        });
    }

    if !derived.is_empty() {
        tracing::debug!(records = derived.len(), "Derived annual totals");
    }
    derived
}

fn record_is_newer(current: &CanonicalRecord, candidate: &CanonicalRecord) -> bool {
    candidate.observed_at > current.observed_at
}
