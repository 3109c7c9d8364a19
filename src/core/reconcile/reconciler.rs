//! Conflict resolution across sources
//!
//! Candidates for one (country, metric, period) key are ordered by trust rank
//! (lower first), then observation time (newer first), then reported before
//! derived, then source key. The first candidate wins. The order is total
//! over the candidates' own contents, so the result does not depend on input
//! order.
//!
//! Repeated values from one source collapse into a single contributor only
//! when they agree. A source that contradicts itself keeps every distinct
//! value as a contributor and the key carries a conflict.

use super::anomaly;
use crate::config::schema::ReconcileConfig;
use crate::domain::errors::GridError;
use crate::domain::ids::MetricId;
use crate::domain::record::{
    CanonicalRecord, Conflict, Contribution, Provenance, RecordKey, ReconciledRecord, Resolution,
};
use crate::domain::units::{convert, Unit};
use crate::domain::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Agreement and strictness settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    /// Relative difference under which two values agree
    pub tolerance: f64,
    /// Absolute difference treated as agreement near zero
    pub absolute_epsilon: f64,
    /// Refuse winners chosen by an ordering rule alone
    pub require_agreement: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for ReconcilePolicy {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            absolute_epsilon: config.absolute_epsilon,
            require_agreement: config.require_agreement,
        }
    }
}

/// A key left out of the snapshot because no winner could be justified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedConflict {
    pub key: RecordKey,
    /// All candidates in precedence order
    pub candidates: Vec<Contribution>,
}

impl UnresolvedConflict {
    pub fn to_error(&self) -> GridError {
        let sources: Vec<String> = self
            .candidates
            .iter()
            .map(|c| format!("{}={}", c.source_key, c.value))
            .collect();
        GridError::UnresolvableConflict {
            key: self.key.to_string(),
            message: format!(
                "candidates tie on trust and observation time but disagree ({})",
                sources.join(", ")
            ),
        }
    }
}

/// Result of reconciling one run's records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// One record per key, sorted by key
    pub records: Vec<ReconciledRecord>,
    pub unresolved: Vec<UnresolvedConflict>,
}

impl ReconcileOutcome {
    pub fn conflict_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.provenance.has_conflict())
            .count()
    }

    pub fn anomaly_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.provenance.anomalies.is_empty())
            .count()
    }
}

/// A candidate value converted to the metric's canonical unit
#[derive(Debug, Clone)]
struct Candidate {
    record: CanonicalRecord,
    value: f64,
}

/// Precedence order between two candidates of the same key
fn precedence(a: &Candidate, b: &Candidate) -> Ordering {
    a.record
        .trust_rank
        .cmp(&b.record.trust_rank)
        .then_with(|| b.record.observed_at.cmp(&a.record.observed_at))
        .then_with(|| a.record.derived.cmp(&b.record.derived))
        .then_with(|| a.record.source_key.cmp(&b.record.source_key))
        .then_with(|| a.value.total_cmp(&b.value))
        .then_with(|| a.record.artifact_hash.cmp(&b.record.artifact_hash))
}

/// Why `winner` precedes `rival`
fn deciding_rule(winner: &Candidate, rival: &Candidate) -> Resolution {
    if winner.record.trust_rank != rival.record.trust_rank {
        Resolution::TrustRank
    } else if winner.record.observed_at != rival.record.observed_at {
        Resolution::Recency
    } else if winner.record.derived != rival.record.derived {
        Resolution::DirectOverDerived
    } else if winner.record.source_key != rival.record.source_key {
        Resolution::SourceKeyOrder
    } else {
        Resolution::WithinSource
    }
}

pub struct Reconciler {
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(ReconcilePolicy::from(config))
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Reconcile all candidate records into one record per key
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Reconciliation`] when a candidate's unit does not
    /// measure what its metric measures.
    pub fn reconcile(&self, records: Vec<CanonicalRecord>) -> Result<ReconcileOutcome> {
        let mut groups: BTreeMap<RecordKey, Vec<Candidate>> = BTreeMap::new();
        for record in records {
            let value = canonical_value(&record)?;
            groups
                .entry(record.key())
                .or_default()
                .push(Candidate { record, value });
        }

        let mut outcome = ReconcileOutcome::default();
        for (key, mut candidates) in groups {
            candidates.sort_by(precedence);
            let candidates = self.collapse_repeats(candidates);

            match self.resolve(&key, &candidates) {
                Resolved::Record(record) => outcome.records.push(record),
                Resolved::Unresolved(unresolved) => {
                    tracing::warn!(error = %unresolved.to_error(), "Key omitted from snapshot");
                    outcome.unresolved.push(unresolved);
                }
            }
        }

        tracing::info!(
            records = outcome.records.len(),
            conflicts = outcome.conflict_count(),
            anomalies = outcome.anomaly_count(),
            unresolved = outcome.unresolved.len(),
            "Reconciliation complete"
        );
        Ok(outcome)
    }

    /// Drop candidates that repeat an agreeing value already kept for the
    /// same source. Input must be in precedence order.
    fn collapse_repeats(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let repeat = kept.iter().any(|k| {
                k.record.source_key == candidate.record.source_key
                    && k.record.derived == candidate.record.derived
                    && self.agrees(candidate.value, k.value)
            });
            if !repeat {
                kept.push(candidate);
            }
        }
        kept
    }

    fn relative_difference(&self, value: f64, reference: f64) -> f64 {
        let diff = (value - reference).abs();
        if diff <= self.policy.absolute_epsilon {
            return 0.0;
        }
        let scale = if reference.abs() > self.policy.absolute_epsilon {
            reference.abs()
        } else {
            value.abs()
        };
        diff / scale
    }

    fn agrees(&self, value: f64, reference: f64) -> bool {
        self.relative_difference(value, reference) <= self.policy.tolerance + 1e-12
    }

    fn resolve(&self, key: &RecordKey, candidates: &[Candidate]) -> Resolved {
        // Groups are never empty: each exists because a record was pushed
        let winner = &candidates[0];

        let contributors: Vec<Contribution> = candidates
            .iter()
            .map(|c| Contribution {
                source_key: c.record.source_key.clone(),
                value: c.value,
                trust_rank: c.record.trust_rank,
                observed_at: c.record.observed_at,
                artifact_hash: c.record.artifact_hash.clone(),
                agrees: self.agrees(c.value, winner.value),
                derived: c.record.derived,
            })
            .collect();

        let first_dissenter = candidates
            .iter()
            .zip(&contributors)
            .skip(1)
            .find(|(_, contribution)| !contribution.agrees)
            .map(|(candidate, _)| candidate);

        let (resolution, conflict) = match (candidates.len(), first_dissenter) {
            (1, _) => (Resolution::SingleSource, None),
            (_, None) => (Resolution::Corroborated, None),
            (_, Some(rival)) => {
                let max_relative_difference = candidates
                    .iter()
                    .map(|c| self.relative_difference(c.value, winner.value))
                    .fold(0.0, f64::max);
                let conflict = Conflict {
                    chosen_value: winner.value,
                    max_relative_difference,
                    dissenting_sources: contributors
                        .iter()
                        .filter(|c| !c.agrees)
                        .map(|c| c.source_key.clone())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect(),
                };
                (deciding_rule(winner, rival), Some(conflict))
            }
        };

        if resolution.is_arbitrary() && self.policy.require_agreement {
            return Resolved::Unresolved(UnresolvedConflict {
                key: key.clone(),
                candidates: contributors,
            });
        }

        if let Some(conflict) = &conflict {
            tracing::debug!(
                key = %key,
                chosen = %winner.record.source_key,
                rule = ?resolution,
                max_relative_difference = conflict.max_relative_difference,
                "Conflict resolved"
            );
        }

        let unit = canonical_unit(&key.metric);
        let anomalies = anomaly::detect(&key.metric, winner.value);

        Resolved::Record(ReconciledRecord {
            country: key.country.clone(),
            metric: key.metric.clone(),
            period: key.period,
            value: winner.value,
            unit,
            provenance: Provenance {
                chosen_source: winner.record.source_key.clone(),
                resolution,
                contributors,
                conflict,
                anomalies,
            },
        })
    }
}

enum Resolved {
    Record(ReconciledRecord),
    Unresolved(UnresolvedConflict),
}

fn canonical_unit(metric: &MetricId) -> Unit {
    metric.dimension().canonical_unit()
}

fn canonical_value(record: &CanonicalRecord) -> Result<f64> {
    let target = canonical_unit(&record.metric);
    convert(record.value, record.unit, target).map_err(|e| {
        GridError::Reconciliation(format!(
            "{} from source '{}': {e}",
            record.key(),
            record.source_key
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{CountryCode, SourceKey};
    use crate::domain::period::Period;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn record(source: &str, trust: u32, value: f64, observed_at: DateTime<Utc>) -> CanonicalRecord {
        CanonicalRecord {
            country: CountryCode::new("DEU").unwrap(),
            metric: MetricId::new("electricity.generation.total").unwrap(),
            period: Period::year(2022).unwrap(),
            value,
            unit: Unit::TerawattHours,
            source_key: SourceKey::new(source).unwrap(),
            observed_at,
            trust_rank: trust,
            artifact_hash: format!("{source}-hash"),
            derived: false,
        }
    }

    fn reconcile(records: Vec<CanonicalRecord>) -> ReconcileOutcome {
        Reconciler::new(ReconcilePolicy::default())
            .reconcile(records)
            .unwrap()
    }

    #[test]
    fn test_single_source() {
        let outcome = reconcile(vec![record("iea", 1, 500.0, at(0))]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].provenance.resolution,
            Resolution::SingleSource
        );
    }

    #[test]
    fn test_disagreement_won_by_trust() {
        let outcome = reconcile(vec![
            record("ember", 2, 105.0, at(0)),
            record("iea", 1, 100.0, at(0)),
        ]);
        let reconciled = &outcome.records[0];

        assert_eq!(reconciled.value, 100.0);
        assert_eq!(reconciled.provenance.chosen_source.as_str(), "iea");
        assert_eq!(reconciled.provenance.resolution, Resolution::TrustRank);
        assert_eq!(reconciled.provenance.contributors.len(), 2);
        let conflict = reconciled.provenance.conflict.as_ref().unwrap();
        assert_eq!(conflict.dissenting_sources[0].as_str(), "ember");
        assert!((conflict.max_relative_difference - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_within_tolerance_is_corroborated() {
        let outcome = reconcile(vec![
            record("iea", 1, 100.0, at(0)),
            record("ember", 2, 100.5, at(0)),
        ]);
        let reconciled = &outcome.records[0];

        assert_eq!(reconciled.value, 100.0);
        assert_eq!(reconciled.provenance.resolution, Resolution::Corroborated);
        assert!(!reconciled.provenance.has_conflict());
        assert!(reconciled.provenance.contributors.iter().all(|c| c.agrees));
    }

    #[test]
    fn test_trust_tie_won_by_recency() {
        let outcome = reconcile(vec![
            record("a", 1, 10.0, at(1)),
            record("b", 1, 20.0, at(5)),
        ]);
        assert_eq!(outcome.records[0].value, 20.0);
        assert_eq!(outcome.records[0].provenance.resolution, Resolution::Recency);
    }

    #[test]
    fn test_full_tie_won_by_source_key() {
        let outcome = reconcile(vec![
            record("zeta", 1, 10.0, at(1)),
            record("alpha", 1, 20.0, at(1)),
        ]);
        assert_eq!(outcome.records[0].value, 20.0);
        assert_eq!(
            outcome.records[0].provenance.resolution,
            Resolution::SourceKeyOrder
        );
    }

    #[test]
    fn test_strict_mode_omits_key_order_ties() {
        let reconciler = Reconciler::new(ReconcilePolicy {
            require_agreement: true,
            ..ReconcilePolicy::default()
        });
        let mut other = record("alpha", 1, 20.0, at(1));
        other.country = CountryCode::new("FRA").unwrap();

        let outcome = reconciler
            .reconcile(vec![
                record("zeta", 1, 10.0, at(1)),
                record("alpha", 1, 20.0, at(1)),
                other,
            ])
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].country.as_str(), "FRA");
        assert_eq!(outcome.unresolved.len(), 1);
        assert!(matches!(
            outcome.unresolved[0].to_error(),
            GridError::UnresolvableConflict { .. }
        ));
    }

    #[test]
    fn test_order_independent() {
        let records = vec![
            record("a", 2, 10.0, at(1)),
            record("b", 1, 11.0, at(2)),
            record("c", 1, 12.0, at(3)),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(reconcile(records), reconcile(reversed));
    }

    #[test]
    fn test_units_converted_before_comparison() {
        let mut gwh = record("tso", 2, 100_400.0, at(0));
        gwh.unit = Unit::GigawattHours;
        let outcome = reconcile(vec![record("iea", 1, 100.0, at(0)), gwh]);

        let reconciled = &outcome.records[0];
        assert_eq!(reconciled.unit, Unit::TerawattHours);
        assert_eq!(reconciled.provenance.resolution, Resolution::Corroborated);
        assert!((reconciled.provenance.contributors[1].value - 100.4).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_unit_fails() {
        let mut bad = record("tso", 2, 40.0, at(0));
        bad.unit = Unit::Percent;
        let err = Reconciler::new(ReconcilePolicy::default())
            .reconcile(vec![bad])
            .unwrap_err();
        assert!(matches!(err, GridError::Reconciliation(_)));
    }

    #[test]
    fn test_duplicate_source_rows_collapse() {
        let outcome = reconcile(vec![
            record("iea", 1, 100.0, at(0)),
            record("iea", 1, 100.5, at(0)),
        ]);
        let reconciled = &outcome.records[0];
        assert_eq!(reconciled.provenance.contributors.len(), 1);
        assert_eq!(reconciled.value, 100.0);
        assert_eq!(reconciled.provenance.resolution, Resolution::SingleSource);
    }

    #[test]
    fn test_self_contradicting_source_keeps_both_values() {
        let mut low = record("iea", 1, 100.0, at(0));
        low.country = CountryCode::new("KOR").unwrap();
        low.metric = MetricId::new("energy.supply.total").unwrap();
        let mut high = low.clone();
        high.value = 500.0;

        let outcome = reconcile(vec![high, low]);
        let reconciled = &outcome.records[0];

        assert_eq!(reconciled.value, 100.0);
        assert_eq!(reconciled.provenance.resolution, Resolution::WithinSource);
        let values: Vec<f64> = reconciled
            .provenance
            .contributors
            .iter()
            .map(|c| c.value)
            .collect();
        assert_eq!(values, vec![100.0, 500.0]);
        let conflict = reconciled.provenance.conflict.as_ref().unwrap();
        assert_eq!(conflict.dissenting_sources.len(), 1);
        assert_eq!(conflict.dissenting_sources[0].as_str(), "iea");
        assert!((conflict.max_relative_difference - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_strict_mode_omits_self_contradiction() {
        let reconciler = Reconciler::new(ReconcilePolicy {
            require_agreement: true,
            ..ReconcilePolicy::default()
        });
        let outcome = reconciler
            .reconcile(vec![
                record("iea", 1, 100.0, at(0)),
                record("iea", 1, 500.0, at(0)),
            ])
            .unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.unresolved[0].candidates.len(), 2);
    }

    #[test]
    fn test_strict_mode_keeps_agreeing_ties() {
        let reconciler = Reconciler::new(ReconcilePolicy {
            require_agreement: true,
            ..ReconcilePolicy::default()
        });
        let outcome = reconciler
            .reconcile(vec![
                record("zeta", 1, 100.0, at(1)),
                record("alpha", 1, 100.5, at(1)),
            ])
            .unwrap();

        assert!(outcome.unresolved.is_empty());
        let reconciled = &outcome.records[0];
        assert_eq!(reconciled.provenance.resolution, Resolution::Corroborated);
        assert_eq!(reconciled.provenance.chosen_source.as_str(), "alpha");
        assert_eq!(reconciled.provenance.contributors.len(), 2);
    }

    #[test]
    fn test_reported_value_beats_derived_roll_up() {
        let mut rolled_up = record("ember", 1, 480.0, at(0));
        rolled_up.derived = true;

        let outcome = reconcile(vec![rolled_up, record("iea", 1, 500.0, at(0))]);
        let reconciled = &outcome.records[0];

        assert_eq!(reconciled.value, 500.0);
        assert_eq!(reconciled.provenance.chosen_source.as_str(), "iea");
        assert_eq!(
            reconciled.provenance.resolution,
            Resolution::DirectOverDerived
        );
        let contributors = &reconciled.provenance.contributors;
        assert!(!contributors[0].derived);
        assert_eq!(contributors[1].source_key.as_str(), "ember");
        assert!(contributors[1].derived);
        assert!(!contributors[1].agrees);
    }

    #[test]
    fn test_agreeing_roll_up_corroborates_reported_value() {
        let mut rolled_up = record("ember", 1, 500.2, at(0));
        rolled_up.derived = true;

        let outcome = reconcile(vec![rolled_up, record("iea", 1, 500.0, at(0))]);
        let reconciled = &outcome.records[0];

        assert_eq!(reconciled.provenance.chosen_source.as_str(), "iea");
        assert_eq!(reconciled.provenance.resolution, Resolution::Corroborated);
        assert!(reconciled.provenance.contributors[1].derived);
    }

    #[test]
    fn test_growth_metric_reconciled_in_percent_change() {
        let mut growth = record("ember", 2, -12.5, at(0));
        growth.metric = MetricId::new("electricity.generation_yoy.coal").unwrap();
        growth.unit = Unit::PercentChange;

        let outcome = reconcile(vec![growth]);
        let reconciled = &outcome.records[0];
        assert_eq!(reconciled.unit, Unit::PercentChange);
        assert!(reconciled.provenance.anomalies.is_empty());
    }

    #[test]
    fn test_negative_value_flagged() {
        let outcome = reconcile(vec![record("iea", 1, -3.0, at(0))]);
        assert_eq!(
            outcome.records[0].provenance.anomalies,
            vec![crate::domain::record::Anomaly::NegativeValue]
        );
    }

    #[test]
    fn test_output_sorted_by_key() {
        let mut fra = record("iea", 1, 1.0, at(0));
        fra.country = CountryCode::new("FRA").unwrap();
        let mut aut = record("iea", 1, 1.0, at(0));
        aut.country = CountryCode::new("AUT").unwrap();

        let outcome = reconcile(vec![fra, record("iea", 1, 1.0, at(0)), aut]);
        let countries: Vec<&str> = outcome.records.iter().map(|r| r.country.as_str()).collect();
        assert_eq!(countries, vec!["AUT", "DEU", "FRA"]);
    }
}
