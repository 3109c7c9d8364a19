//! Canonical and reconciled records
//!
//! A [`CanonicalRecord`] is one source's normalized observation. Many of them
//! may share a [`RecordKey`]; reconciliation collapses each key into exactly
//! one [`ReconciledRecord`] carrying its [`Provenance`].

use super::ids::{CountryCode, MetricId, SourceKey};
use super::period::Period;
use super::units::Unit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The (country, metric, period) identity of an observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub country: CountryCode,
    pub metric: MetricId,
    pub period: Period,
}

impl RecordKey {
    pub fn new(country: CountryCode, metric: MetricId, period: Period) -> Self {
        Self {
            country,
            metric,
            period,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.country, self.metric, self.period)
    }
}

/// One normalized observation from one source artifact
///
/// Values are expected in the canonical unit of their dimension by the time
/// an adapter emits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub country: CountryCode,
    pub metric: MetricId,
    pub period: Period,
    pub value: f64,
    pub unit: Unit,

    /// Source the observation came from
    pub source_key: SourceKey,

    /// When the artifact carrying this observation was fetched
    pub observed_at: DateTime<Utc>,

    /// Trust rank of the source at parse time (lower is more authoritative)
    pub trust_rank: u32,

    /// Content hash of the artifact this record was parsed from
    pub artifact_hash: String,

    /// True for values computed by gridstats (e.g. annual roll-ups)
    #[serde(default)]
    pub derived: bool,
}

impl CanonicalRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.country.clone(), self.metric.clone(), self.period)
    }
}

/// How the winning value of a key was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Only one source reported this key
    SingleSource,
    /// Several sources agreed within tolerance
    Corroborated,
    /// Disagreement, won by the most trusted source
    TrustRank,
    /// Disagreement with tied trust, won by the most recent observation
    Recency,
    /// Disagreement with tied trust and time, won by a reported value over
    /// one computed by gridstats
    DirectOverDerived,
    /// Disagreement with tied trust and time, won by source key order
    SourceKeyOrder,
    /// One source reported disagreeing values; the lowest was kept
    WithinSource,
}

impl Resolution {
    /// Whether the winner was picked by an ordering rule rather than by
    /// anything known about the sources
    pub fn is_arbitrary(&self) -> bool {
        matches!(self, Resolution::SourceKeyOrder | Resolution::WithinSource)
    }
}

/// Data-quality flags raised during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    /// An energy quantity below zero
    NegativeValue,
    /// A share outside 0-100 %
    ShareOutOfRange,
}

/// One source's candidate value for a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub source_key: SourceKey,
    /// Value converted to the reconciled record's unit
    pub value: f64,
    pub trust_rank: u32,
    pub observed_at: DateTime<Utc>,
    pub artifact_hash: String,
    /// Whether this value is within tolerance of the chosen value
    pub agrees: bool,
    #[serde(default)]
    pub derived: bool,
}

/// Recorded disagreement between sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub chosen_value: f64,
    /// Largest relative difference between a candidate and the chosen value
    pub max_relative_difference: f64,
    /// Sources whose values fell outside tolerance
    pub dissenting_sources: Vec<SourceKey>,
}

/// Where a reconciled value came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub chosen_source: SourceKey,
    pub resolution: Resolution,
    /// Every candidate, winner first
    pub contributors: Vec<Contribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
}

impl Provenance {
    pub fn has_conflict(&self) -> bool {
        self.conflict.is_some()
    }
}

/// The single agreed value for a key, as persisted in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub country: CountryCode,
    pub metric: MetricId,
    pub period: Period,
    pub value: f64,
    pub unit: Unit,
    pub provenance: Provenance,
}

impl ReconciledRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.country.clone(), self.metric.clone(), self.period)
    }
}
