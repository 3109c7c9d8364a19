//! Generation mix totals and low-carbon shares
//!
//! Ember reports one series per fuel plus aggregate series (such as
//! "Renewables" or "Fossil") that overlap them. Totals are built from the
//! non-aggregate series only. Net imports are left out of both the total and
//! the low-carbon figure, so a total is domestic generation and comparable
//! with sources that report it directly.

use crate::domain::ids::{CountryCode, MetricId, SourceKey};
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use crate::domain::units::Unit;
use std::collections::{BTreeMap, BTreeSet};

/// Series slugs counted as low-carbon generation
pub const LOW_CARBON_SERIES: [&str; 6] = [
    "bioenergy",
    "hydro",
    "nuclear",
    "other_renewables",
    "solar",
    "wind",
];

const NET_IMPORTS: &str = "net_imports";

pub const GENERATION_TOTAL: &str = "electricity.generation.total";
pub const GENERATION_LOW_CARBON: &str = "electricity.generation.low_carbon";
pub const SHARE_LOW_CARBON: &str = "electricity.share.low_carbon";

/// (low-carbon generation, total generation, resulting share) metric triples
const SHARE_INPUTS: [(&str, &str, &str); 2] = [
    (GENERATION_LOW_CARBON, GENERATION_TOTAL, SHARE_LOW_CARBON),
    (
        "electricity.generation_ttm.low_carbon",
        "electricity.generation_ttm.total",
        "electricity.share_ttm.low_carbon",
    ),
];

/// Generation summed over the series of one country and month
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MixTotals {
    pub total: f64,
    pub low_carbon: f64,
}

impl MixTotals {
    /// Adds one series' generation, ignoring net imports
    pub fn add(&mut self, series_slug: &str, twh: f64) {
        if series_slug == NET_IMPORTS {
            return;
        }
        self.total += twh;
        if LOW_CARBON_SERIES.contains(&series_slug) {
            self.low_carbon += twh;
        }
    }

    /// Low-carbon generation as a percentage of the total; `None` when
    /// nothing was generated
    pub fn low_carbon_share(&self) -> Option<f64> {
        (self.total > 0.0).then(|| self.low_carbon / self.total * 100.0)
    }
}

/// Accumulates non-aggregate series per (country, period)
#[derive(Debug, Default)]
pub struct GenerationMix {
    periods: BTreeMap<(CountryCode, Period), MixTotals>,
}

impl GenerationMix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, country: &CountryCode, period: Period, series_slug: &str, twh: f64) {
        self.periods
            .entry((country.clone(), period))
            .or_default()
            .add(series_slug, twh);
    }

    /// Totals in (country, period) order
    pub fn into_totals(self) -> impl Iterator<Item = (CountryCode, Period, MixTotals)> {
        self.periods
            .into_iter()
            .map(|((country, period), totals)| (country, period, totals))
    }
}

type ShareKey = (SourceKey, CountryCode, Period);

/// Low-carbon shares for every period where a source has both low-carbon
/// and total generation but no share yet
///
/// Covers derived annual and trailing twelve-month figures; monthly shares
/// come straight from the adapter. Only the new records are returned.
pub fn derive_low_carbon_shares<'a>(
    records: impl IntoIterator<Item = &'a CanonicalRecord>,
) -> Vec<CanonicalRecord> {
    let records: Vec<&CanonicalRecord> = records.into_iter().collect();
    let mut derived = Vec::new();

    for (low_carbon_id, total_id, share_id) in SHARE_INPUTS {
        let Ok(share_metric) = MetricId::new(share_id) else {
            continue;
        };

        let mut low_carbon: BTreeMap<ShareKey, f64> = BTreeMap::new();
        let mut totals: BTreeMap<ShareKey, &CanonicalRecord> = BTreeMap::new();
        let mut existing: BTreeSet<ShareKey> = BTreeSet::new();
        for &record in &records {
            let key = (
                record.source_key.clone(),
                record.country.clone(),
                record.period,
            );
            match record.metric.as_str() {
                id if id == low_carbon_id => {
                    low_carbon.insert(key, record.value);
                }
                id if id == total_id => {
                    totals.insert(key, record);
                }
                id if id == share_id => {
                    existing.insert(key);
                }
                _ => {}
            }
        }

        for (key, total) in totals {
            if existing.contains(&key) {
                continue;
            }
            let Some(share) = low_carbon.get(&key).and_then(|&low_carbon| {
                MixTotals {
                    total: total.value,
                    low_carbon,
                }
                .low_carbon_share()
            }) else {
                continue;
            };
            derived.push(CanonicalRecord {
                metric: share_metric.clone(),
                value: share,
                unit: Unit::Percent,
                derived: true,
                ..total.clone()
            });
        }
    }

    if !derived.is_empty() {
        tracing::debug!(records = derived.len(), "Derived low-carbon shares");
    }
    derived
}
