//! Read-only access to committed snapshots
//!
//! Presentation code reads through [`SnapshotView`]; nothing here writes.

use crate::adapters::storage::traits::SnapshotStore;
use crate::domain::ids::{CountryCode, MetricId};
use crate::domain::period::Period;
use crate::domain::record::{RecordKey, ReconciledRecord};
use crate::domain::snapshot::Snapshot;
use crate::domain::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Filters for [`SnapshotView::query`]; unset filters match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotQuery {
    pub country: Option<CountryCode>,
    /// Whole dot segments: `electricity.generation` matches
    /// `electricity.generation.wind` but not `electricity.generations`
    pub metric_prefix: Option<String>,
    /// Earliest period, inclusive
    pub from: Option<Period>,
    /// Latest period, inclusive
    pub to: Option<Period>,
    /// Only annual or only monthly periods
    pub annual: Option<bool>,
}

impl SnapshotQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn country(mut self, country: CountryCode) -> Self {
        self.country = Some(country);
        self
    }

    pub fn metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = Some(prefix.into());
        self
    }

    /// Exactly one period
    pub fn period(mut self, period: Period) -> Self {
        self.from = Some(period);
        self.to = Some(period);
        self
    }

    pub fn between(mut self, from: Period, to: Period) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn annual(mut self, annual: bool) -> Self {
        self.annual = Some(annual);
        self
    }

    fn matches(&self, record: &ReconciledRecord) -> bool {
        if let Some(country) = &self.country {
            if &record.country != country {
                return false;
            }
        }
        if let Some(prefix) = &self.metric_prefix {
            let metric = record.metric.as_str();
            let segment_match = metric == prefix
                || (metric.starts_with(prefix.as_str())
                    && metric.as_bytes().get(prefix.len()) == Some(&b'.'));
            if !segment_match {
                return false;
            }
        }
        if let Some(annual) = self.annual {
            if record.period.is_annual() != annual {
                return false;
            }
        }
        // Range checks compare like with like so that `2023` selects the
        // year record and `2023-01..2023-12` the months
        if let Some(from) = &self.from {
            if record.period.is_annual() == from.is_annual() && record.period < *from {
                return false;
            }
            if record.period.is_annual() != from.is_annual()
                && record.period.year_value() < from.year_value()
            {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if record.period.is_annual() == to.is_annual() && record.period > *to {
                return false;
            }
            if record.period.is_annual() != to.is_annual()
                && record.period.year_value() > to.year_value()
            {
                return false;
            }
        }
        true
    }
}

/// An immutable, in-memory view of one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotView {
    snapshot: Snapshot,
    records: Vec<ReconciledRecord>,
}

impl SnapshotView {
    /// View of the current snapshot, or `None` before the first commit
    pub async fn current(store: &(dyn SnapshotStore + Send + Sync)) -> Result<Option<Self>> {
        match store.current().await? {
            Some(snapshot) => {
                let records = store.load_records(snapshot.version).await?;
                Ok(Some(Self { snapshot, records }))
            }
            None => Ok(None),
        }
    }

    /// View of a retained snapshot
    pub async fn version(store: &(dyn SnapshotStore + Send + Sync), version: u64) -> Result<Self> {
        let snapshot = store
            .list_snapshots()
            .await?
            .into_iter()
            .find(|s| s.version == version)
            .ok_or_else(|| {
                crate::domain::GridError::Storage(format!("Snapshot {version} is not retained"))
            })?;
        let records = store.load_records(version).await?;
        Ok(Self { snapshot, records })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn records(&self) -> &[ReconciledRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact lookup by key
    pub fn get(&self, key: &RecordKey) -> Option<&ReconciledRecord> {
        self.records
            .binary_search_by(|record| record.key().cmp(key))
            .ok()
            .map(|index| &self.records[index])
    }

    /// Records matching `query`, in key order
    pub fn query(&self, query: &SnapshotQuery) -> Vec<&ReconciledRecord> {
        self.records.iter().filter(|r| query.matches(r)).collect()
    }

    /// Number of distinct months of `year` with a value for `metric`
    pub fn months_reported(&self, country: &CountryCode, metric: &MetricId, year: i32) -> usize {
        self.records
            .iter()
            .filter(|r| &r.country == country && &r.metric == metric)
            .filter(|r| r.period.year_value() == year && !r.period.is_annual())
            .count()
    }

    /// Whether all twelve months of `year` are present, so that annual
    /// figures for it are final rather than year-to-date
    pub fn is_complete_year(&self, country: &CountryCode, metric: &MetricId, year: i32) -> bool {
        self.months_reported(country, metric, year) == 12
    }

    /// For an annual record with monthly values behind it, whether its year
    /// is complete; `None` for monthly records and annual-only series
    pub fn year_completeness(&self, record: &ReconciledRecord) -> Option<bool> {
        if !record.period.is_annual() {
            return None;
        }
        let year = record.period.year_value();
        match self.months_reported(&record.country, &record.metric, year) {
            0 => None,
            months => Some(months == 12),
        }
    }
}

/// A value that differs between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub key: RecordKey,
    pub before: f64,
    pub after: f64,
}

/// Key-level difference between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotDiff {
    pub from_version: u64,
    pub to_version: u64,
    pub added: Vec<RecordKey>,
    pub removed: Vec<RecordKey>,
    pub changed: Vec<ValueChange>,
    pub unchanged: usize,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare two snapshot views key by key
pub fn diff(from: &SnapshotView, to: &SnapshotView) -> SnapshotDiff {
    let before: BTreeMap<RecordKey, f64> =
        from.records.iter().map(|r| (r.key(), r.value)).collect();
    let after: BTreeMap<RecordKey, f64> = to.records.iter().map(|r| (r.key(), r.value)).collect();

    let mut result = SnapshotDiff {
        from_version: from.snapshot.version,
        to_version: to.snapshot.version,
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
        unchanged: 0,
    };

    for (key, old) in &before {
        match after.get(key) {
            None => result.removed.push(key.clone()),
            Some(new) if new.to_bits() != old.to_bits() => result.changed.push(ValueChange {
                key: key.clone(),
                before: *old,
                after: *new,
            }),
            Some(_) => result.unchanged += 1,
        }
    }
    result.added = after
        .keys()
        .filter(|key| !before.contains_key(*key))
        .cloned()
        .collect();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, Resolution, SourceKey, Unit};
    use chrono::Utc;

    fn record(country: &str, metric: &str, period: &str, value: f64) -> ReconciledRecord {
        ReconciledRecord {
            country: CountryCode::new(country).unwrap(),
            metric: MetricId::new(metric).unwrap(),
            period: period.parse().unwrap(),
            value,
            unit: Unit::TerawattHours,
            provenance: Provenance {
                chosen_source: SourceKey::new("iea").unwrap(),
                resolution: Resolution::SingleSource,
                contributors: vec![],
                conflict: None,
                anomalies: vec![],
            },
        }
    }

    fn view(version: u64, mut records: Vec<ReconciledRecord>) -> SnapshotView {
        records.sort_by_key(|r| r.key());
        SnapshotView {
            snapshot: Snapshot {
                version,
                run_id: "r".to_string(),
                created_at: Utc::now(),
                record_count: records.len(),
                checksum: String::new(),
                sources: vec![],
                degraded_sources: vec![],
            },
            records,
        }
    }

    fn sample() -> SnapshotView {
        view(
            1,
            vec![
                record("DEU", "electricity.generation.wind", "2023", 140.0),
                record("DEU", "electricity.generation.wind", "2023-01", 14.0),
                record("DEU", "electricity.generation.wind", "2024-01", 15.0),
                record("DEU", "electricity.generations.x", "2023", 1.0),
                record("FRA", "electricity.generation.nuclear", "2023", 320.0),
            ],
        )
    }

    #[test]
    fn test_query_by_country_and_metric_prefix() {
        let view = sample();
        let query = SnapshotQuery::new()
            .country(CountryCode::new("DEU").unwrap())
            .metric_prefix("electricity.generation");
        assert_eq!(view.query(&query).len(), 3);
    }

    #[test]
    fn test_query_single_period() {
        let view = sample();
        let query = SnapshotQuery::new().period(Period::year(2023).unwrap()).annual(true);
        let values: Vec<f64> = view.query(&query).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![140.0, 1.0, 320.0]);
    }

    #[test]
    fn test_query_monthly_range() {
        let view = sample();
        let query = SnapshotQuery::new().between(
            Period::month(2023, 1).unwrap(),
            Period::month(2023, 12).unwrap(),
        );
        let values: Vec<f64> = view.query(&query).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![140.0, 14.0, 1.0, 320.0]);
    }

    #[test]
    fn test_get_by_key() {
        let view = sample();
        let key = record("FRA", "electricity.generation.nuclear", "2023", 0.0).key();
        assert_eq!(view.get(&key).unwrap().value, 320.0);
    }

    #[test]
    fn test_complete_year() {
        let mut records: Vec<ReconciledRecord> = (1..=12)
            .map(|m| {
                record(
                    "DEU",
                    "electricity.generation.wind",
                    &format!("2023-{m:02}"),
                    10.0,
                )
            })
            .collect();
        records.push(record("DEU", "electricity.generation.wind", "2024-01", 11.0));
        records.push(record("DEU", "electricity.generation.wind", "2024", 11.0));
        let view = view(1, records);

        let deu = CountryCode::new("DEU").unwrap();
        let wind = MetricId::new("electricity.generation.wind").unwrap();
        assert!(view.is_complete_year(&deu, &wind, 2023));
        assert_eq!(view.months_reported(&deu, &wind, 2024), 1);
        assert!(!view.is_complete_year(&deu, &wind, 2024));
        assert!(!view.is_complete_year(&CountryCode::new("FRA").unwrap(), &wind, 2023));

        let annual = view
            .get(&record("DEU", "electricity.generation.wind", "2024", 0.0).key())
            .unwrap();
        assert_eq!(view.year_completeness(annual), Some(false));
        let monthly = view
            .get(&record("DEU", "electricity.generation.wind", "2024-01", 0.0).key())
            .unwrap();
        assert_eq!(view.year_completeness(monthly), None);
    }

    #[test]
    fn test_diff() {
        let before = sample();
        let after = view(
            2,
            vec![
                record("DEU", "electricity.generation.wind", "2023", 141.0),
                record("DEU", "electricity.generation.wind", "2023-01", 14.0),
                record("ITA", "electricity.generation.solar", "2023", 30.0),
            ],
        );

        let diff = diff(&before, &after);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed.len(), 3);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].after, 141.0);
        assert_eq!(diff.unchanged, 1);
    }
}
