//! Source adapter abstraction

use crate::core::normalize::countries::CountryResolver;
use crate::domain::ids::{CountryCode, MetricId};
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use crate::domain::source::{AdapterKind, FetchArtifact, Source};
use crate::domain::units::{to_canonical, Unit};
use crate::domain::Result;
use std::collections::BTreeSet;

/// Turns one fetched artifact into canonical records
///
/// Parsing is pure in the artifact: the same bytes always yield the same
/// records. Shape mismatches fail with [`GridError::MalformedSource`] and are
/// never retried; rows that are merely unusable (aggregates, unknown
/// countries, missing values) are skipped.
///
/// [`GridError::MalformedSource`]: crate::domain::GridError::MalformedSource
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn parse(
        &self,
        source: &Source,
        artifact: &FetchArtifact,
        countries: &CountryResolver,
    ) -> Result<Vec<CanonicalRecord>>;
}

/// Shared record construction and skip bookkeeping for adapters
pub(crate) struct RecordSink<'a> {
    source: &'a Source,
    artifact: &'a FetchArtifact,
    records: Vec<CanonicalRecord>,
    unmapped_countries: BTreeSet<String>,
    skipped: usize,
}

impl<'a> RecordSink<'a> {
    pub(crate) fn new(source: &'a Source, artifact: &'a FetchArtifact) -> Self {
        Self {
            source,
            artifact,
            records: Vec::new(),
            unmapped_countries: BTreeSet::new(),
            skipped: 0,
        }
    }

    /// Resolve a country, remembering names that could not be mapped
    pub(crate) fn country(&mut self, countries: &CountryResolver, raw: &str) -> Option<CountryCode> {
        let resolved = countries.resolve(raw);
        if resolved.is_none() {
            self.unmapped_countries.insert(raw.trim().to_string());
        }
        resolved
    }

    pub(crate) fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Push a record, converting its value to the canonical unit
    pub(crate) fn push(
        &mut self,
        country: CountryCode,
        metric: MetricId,
        period: Period,
        value: f64,
        unit: Unit,
    ) {
        self.push_record(country, metric, period, value, unit, false);
    }

    /// Push a value the adapter computed from other rows of the artifact
    pub(crate) fn push_derived(
        &mut self,
        country: CountryCode,
        metric: MetricId,
        period: Period,
        value: f64,
        unit: Unit,
    ) {
        self.push_record(country, metric, period, value, unit, true);
    }

    fn push_record(
        &mut self,
        country: CountryCode,
        metric: MetricId,
        period: Period,
        value: f64,
        unit: Unit,
        derived: bool,
    ) {
        if !value.is_finite() {
            self.skipped += 1;
            return;
        }
        let (value, unit) = to_canonical(value, unit);
        self.records.push(CanonicalRecord {
            country,
            metric,
            period,
            value,
            unit,
            source_key: self.source.key.clone(),
            observed_at: self.artifact.fetched_at(),
            trust_rank: self.source.trust_rank,
            artifact_hash: self.artifact.content_hash().to_string(),
            derived,
        });
    }

    pub(crate) fn finish(self) -> Vec<CanonicalRecord> {
        if !self.unmapped_countries.is_empty() {
            tracing::debug!(
                source = %self.source.key,
                names = ?self.unmapped_countries,
                "Skipped rows for unmapped countries"
            );
        }
        tracing::info!(
            source = %self.source.key,
            records = self.records.len(),
            skipped = self.skipped,
            unmapped_countries = self.unmapped_countries.len(),
            "Artifact adapted"
        );
        self.records
    }
}
