//! Ember monthly electricity generation
//!
//! Reads the JSON returned by
//! `GET /v1/electricity-generation/monthly?entity_code=...&start_date=YYYY-MM`:
//!
//! ```json
//! {"data": [{"entity": "Germany", "entity_code": "DEU", "is_aggregate_entity": false,
//!            "date": "2024-01-01", "series": "Wind", "is_aggregate_series": false,
//!            "generation_twh": 14.2, "share_of_generation_pct": 33.1}]}
//! ```
//!
//! Each row yields `electricity.generation.<series>` in TWh and
//! `electricity.share.<series>` in percent for its month. Non-aggregate
//! series also feed the month's generation mix, which adds derived
//! `electricity.generation.total`, `electricity.generation.low_carbon` and
//! `electricity.share.low_carbon` records (see [`GenerationMix`]).

use super::traits::{RecordSink, SourceAdapter};
use crate::core::normalize::countries::CountryResolver;
use crate::core::normalize::mix::{
    GenerationMix, GENERATION_LOW_CARBON, GENERATION_TOTAL, SHARE_LOW_CARBON,
};
use crate::domain::ids::{slugify, MetricId};
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use crate::domain::source::{AdapterKind, FetchArtifact, Source};
use crate::domain::units::Unit;
use crate::domain::{GridError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EmberResponse {
    data: Vec<EmberRow>,
}

#[derive(Debug, Deserialize)]
struct EmberRow {
    entity: String,
    #[serde(default)]
    entity_code: Option<String>,
    #[serde(default)]
    is_aggregate_entity: bool,
    date: String,
    series: String,
    #[serde(default)]
    is_aggregate_series: bool,
    #[serde(default)]
    generation_twh: Option<f64>,
    #[serde(default)]
    share_of_generation_pct: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmberMonthlyAdapter;

impl SourceAdapter for EmberMonthlyAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::EmberMonthly
    }

    fn parse(
        &self,
        source: &Source,
        artifact: &FetchArtifact,
        countries: &CountryResolver,
    ) -> Result<Vec<CanonicalRecord>> {
        let response: EmberResponse = serde_json::from_slice(&artifact.bytes)
            .map_err(|e| GridError::malformed(source.key.as_str(), format!("Invalid Ember JSON: {e}")))?;

        let malformed = |message: String| GridError::malformed(source.key.as_str(), message);
        let (Ok(total_metric), Ok(low_carbon_metric), Ok(share_metric)) = (
            MetricId::new(GENERATION_TOTAL),
            MetricId::new(GENERATION_LOW_CARBON),
            MetricId::new(SHARE_LOW_CARBON),
        ) else {
            return Err(malformed("Invalid generation mix metric IDs".to_string()));
        };

        let mut sink = RecordSink::new(source, artifact);
        let mut mix = GenerationMix::new();

        for row in response.data {
            if row.is_aggregate_entity {
                sink.skip();
                continue;
            }

            let country = match row.entity_code.as_deref().filter(|c| !c.trim().is_empty()) {
                Some(code) => countries
                    .resolve(code)
                    .or_else(|| sink.country(countries, &row.entity)),
                None => sink.country(countries, &row.entity),
            };
            let Some(country) = country else {
                continue;
            };

            let period: Period = row
                .date
                .parse()
                .map_err(|e| malformed(format!("Row for {}: {e}", row.entity)))?;
            if period.is_annual() {
                return Err(malformed(format!(
                    "Expected a monthly date, got '{}'",
                    row.date
                )));
            }

            let generation = MetricId::with_slug("electricity.generation", &row.series);
            let share = MetricId::with_slug("electricity.share", &row.series);
            let (generation, share) = match (generation, share) {
                (Ok(g), Ok(s)) => (g, s),
                _ => return Err(malformed(format!("Unusable series name '{}'", row.series))),
            };

            match row.generation_twh {
                Some(value) => {
                    if !row.is_aggregate_series && value.is_finite() {
                        mix.add(&country, period, &slugify(&row.series), value);
                    }
                    sink.push(
                        country.clone(),
                        generation,
                        period,
                        value,
                        Unit::TerawattHours,
                    )
                }
                None => sink.skip(),
            }
            match row.share_of_generation_pct {
                Some(value) => sink.push(country, share, period, value, Unit::Percent),
                None => sink.skip(),
            }
        }

        for (country, period, totals) in mix.into_totals() {
            sink.push_derived(
                country.clone(),
                total_metric.clone(),
                period,
                totals.total,
                Unit::TerawattHours,
            );
            sink.push_derived(
                country.clone(),
                low_carbon_metric.clone(),
                period,
                totals.low_carbon,
                Unit::TerawattHours,
            );
            if let Some(share) = totals.low_carbon_share() {
                sink.push_derived(country, share_metric.clone(), period, share, Unit::Percent);
            }
        }

        Ok(sink.finish())
    }
}
