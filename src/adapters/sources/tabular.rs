//! Long-format CSV with a configurable column mapping
//!
//! One observation per row, e.g. a grid operator export:
//!
//! ```text
//! country,month,metric,value,unit
//! DEU,2024-01,electricity.generation.wind,14200,GWh
//! ```
//!
//! Metric and unit can also be fixed for the whole file through the
//! source's `[sources.tabular]` mapping.

use super::traits::{RecordSink, SourceAdapter};
use crate::core::normalize::countries::CountryResolver;
use crate::domain::ids::MetricId;
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use crate::domain::source::{AdapterKind, FetchArtifact, Source, TabularMapping};
use crate::domain::units::Unit;
use crate::domain::{GridError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct TabularCsvAdapter;

/// A field that is either read from a column or fixed by the mapping
enum Field<T> {
    Column(usize),
    Fixed(T),
}

impl SourceAdapter for TabularCsvAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::TabularCsv
    }

    fn parse(
        &self,
        source: &Source,
        artifact: &FetchArtifact,
        countries: &CountryResolver,
    ) -> Result<Vec<CanonicalRecord>> {
        let malformed = |message: String| GridError::malformed(source.key.as_str(), message);

        let mapping: &TabularMapping = source
            .tabular
            .as_ref()
            .ok_or_else(|| malformed("No tabular mapping configured".to_string()))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(mapping.delimiter as u8)
            .trim(csv::Trim::All)
            .from_reader(artifact.bytes.as_slice());

        let headers = reader
            .headers()
            .map_err(|e| malformed(format!("Unreadable header: {e}")))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| malformed(format!("Missing '{name}' column")))
        };

        let country_col = column(&mapping.country_column)?;
        let period_col = column(&mapping.period_column)?;
        let value_col = column(&mapping.value_column)?;
        let metric_field = match (&mapping.metric_column, &mapping.metric) {
            (Some(name), _) => Field::Column(column(name)?),
            (None, Some(fixed)) => Field::Fixed(MetricId::new(fixed.as_str()).map_err(malformed)?),
            (None, None) => return Err(malformed("Mapping has no metric".to_string())),
        };
        let unit_field = match (&mapping.unit_column, &mapping.unit) {
            (Some(name), _) => Field::Column(column(name)?),
            (None, Some(fixed)) => Field::Fixed(fixed.parse::<Unit>().map_err(malformed)?),
            (None, None) => return Err(malformed("Mapping has no unit".to_string())),
        };

        let mut sink = RecordSink::new(source, artifact);

        for (line, row) in reader.records().enumerate() {
            let line = line + 2;
            let row = row.map_err(|e| malformed(format!("Line {line}: {e}")))?;
            let cell = |index: usize| row.get(index).unwrap_or_default();

            let raw_value = cell(value_col);
            if raw_value.is_empty() {
                sink.skip();
                continue;
            }

            let Some(country) = sink.country(countries, cell(country_col)) else {
                continue;
            };

            let period: Period = cell(period_col)
                .parse()
                .map_err(|e| malformed(format!("Line {line}: {e}")))?;
            let metric = match &metric_field {
                Field::Column(index) => MetricId::new(cell(*index))
                    .map_err(|e| malformed(format!("Line {line}: {e}")))?,
                Field::Fixed(metric) => metric.clone(),
            };
            let unit = match &unit_field {
                Field::Column(index) => cell(*index)
                    .parse::<Unit>()
                    .map_err(|e| malformed(format!("Line {line}: {e}")))?,
                Field::Fixed(unit) => *unit,
            };
            if metric.dimension() != unit.dimension() {
                return Err(malformed(format!(
                    "Line {line}: unit {} does not fit metric {metric}",
                    unit.symbol()
                )));
            }

            let value: f64 = raw_value
                .parse()
                .map_err(|_| malformed(format!("Line {line}: non-numeric value '{raw_value}'")))?;

            sink.push(country, metric, period, value, unit);
        }

        Ok(sink.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sources::test_support::{artifact, source};

    fn mapping() -> TabularMapping {
        TabularMapping {
            country_column: "country".to_string(),
            period_column: "month".to_string(),
            value_column: "value".to_string(),
            metric_column: Some("metric".to_string()),
            metric: None,
            unit_column: Some("unit".to_string()),
            unit: None,
            delimiter: ',',
        }
    }

    fn parse_with(mapping: TabularMapping, body: &str) -> Result<Vec<CanonicalRecord>> {
        let mut src = source("tso", AdapterKind::TabularCsv, 3);
        src.tabular = Some(mapping);
        TabularCsvAdapter.parse(&src, &artifact(&src, body), &CountryResolver::builtin())
    }

    #[test]
    fn test_columns_mapped_and_units_converted() {
        let body = "country,month,metric,value,unit\n\
DEU,2024-01,electricity.generation.wind,14200,GWh\n\
Germany,2024-02,electricity.share.wind,31.5,%\n";
        let records = parse_with(mapping(), body).unwrap();

        assert_eq!(records.len(), 2);
        assert!((records[0].value - 14.2).abs() < 1e-9);
        assert_eq!(records[0].unit, Unit::TerawattHours);
        assert_eq!(records[1].country.as_str(), "DEU");
        assert_eq!(records[1].unit, Unit::Percent);
        assert_eq!(records[1].trust_rank, 3);
    }

    #[test]
    fn test_fixed_metric_and_unit() {
        let mapping = TabularMapping {
            metric_column: None,
            metric: Some("electricity.generation.total".to_string()),
            unit_column: None,
            unit: Some("TWh".to_string()),
            delimiter: ';',
            ..mapping()
        };
        let body = "country;month;value\nFRA;2023;494.0\nFRA;2022;\n";
        let records = parse_with(mapping, body).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].period.is_annual());
    }

    #[test]
    fn test_unit_incompatible_with_metric_is_malformed() {
        let body = "country,month,metric,value,unit\n\
DEU,2024-01,electricity.share.wind,14,TWh\n";
        assert!(matches!(
            parse_with(mapping(), body).unwrap_err(),
            GridError::MalformedSource { .. }
        ));
    }

    #[test]
    fn test_missing_mapped_column_is_malformed() {
        let body = "nation,month,metric,value,unit\nDEU,2024-01,electricity.generation.wind,1,TWh\n";
        let err = parse_with(mapping(), body).unwrap_err();
        assert!(err.to_string().contains("country"));
    }

    #[test]
    fn test_unknown_country_skipped() {
        let body = "country,month,metric,value,unit\n\
Narnia,2024-01,electricity.generation.wind,1,TWh\n";
        assert!(parse_with(mapping(), body).unwrap().is_empty());
    }
}
