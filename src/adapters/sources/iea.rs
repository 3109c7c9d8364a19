//! IEA World Energy Balances
//!
//! Wide CSV export: an optional `Source: ...` line, then a header
//! `Country,Product,Flow[,NoCountry,NoProduct,NoFlow],2000,2001,...` where
//! year columns may read `2024 Provisional`. Cells use `..`, `x` and `c` for
//! missing, confidential or not applicable values.
//!
//! Kept rows:
//!
//! | Product | Flow | Metric |
//! |---|---|---|
//! | `Electricity` | `Electricity, CHP and heat plants (PJ)` | `electricity.generation.total` |
//! | primary products, `Total` | `Total energy supply (PJ)` | `energy.supply.<product>` |
//!
//! Values are petajoules and come out as TWh.

use super::traits::{RecordSink, SourceAdapter};
use crate::core::normalize::countries::CountryResolver;
use crate::domain::ids::MetricId;
use crate::domain::period::Period;
use crate::domain::record::CanonicalRecord;
use crate::domain::source::{AdapterKind, FetchArtifact, Source};
use crate::domain::units::Unit;
use crate::domain::{GridError, Result};
use std::collections::BTreeMap;

/// Earliest year kept
pub const MIN_YEAR: i32 = 2000;

const ELECTRICITY_PRODUCT: &str = "Electricity";
const ELECTRICITY_OUTPUT_FLOW: &str = "Electricity, CHP and heat plants (PJ)";
const TOTAL_SUPPLY_FLOW: &str = "Total energy supply (PJ)";

const SUPPLY_PRODUCTS: &[&str] = &[
    "Coal, peat and oil shale",
    "Crude, NGL and feedstocks",
    "Natural gas",
    "Nuclear",
    "Renewables and waste",
    "Total",
];

const MISSING_MARKERS: &[&str] = &["", "..", "x", "c"];

#[derive(Debug, Default, Clone, Copy)]
pub struct IeaBalancesAdapter;

/// Metric a (product, flow) row maps to, if it is kept
fn metric_for(product: &str, flow: &str) -> Option<std::result::Result<MetricId, String>> {
    if product == ELECTRICITY_PRODUCT && flow == ELECTRICITY_OUTPUT_FLOW {
        return Some(MetricId::new("electricity.generation.total"));
    }
    if flow == TOTAL_SUPPLY_FLOW && SUPPLY_PRODUCTS.contains(&product) {
        return Some(MetricId::with_slug("energy.supply", product));
    }
    None
}

/// Parses `2019` or `2024 Provisional`; the flag is true for provisional columns
fn parse_year_header(header: &str) -> Option<(i32, bool)> {
    let mut parts = header.split_whitespace();
    let year = parts
        .next()
        .filter(|p| p.len() == 4 && p.chars().all(|c| c.is_ascii_digit()))?
        .parse()
        .ok()?;
    match parts.next() {
        None => Some((year, false)),
        Some(word) if word.eq_ignore_ascii_case("provisional") && parts.next().is_none() => {
            Some((year, true))
        }
        Some(_) => None,
    }
}

impl SourceAdapter for IeaBalancesAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::IeaBalances
    }

    fn parse(
        &self,
        source: &Source,
        artifact: &FetchArtifact,
        countries: &CountryResolver,
    ) -> Result<Vec<CanonicalRecord>> {
        let malformed = |message: String| GridError::malformed(source.key.as_str(), message);

        let text = std::str::from_utf8(&artifact.bytes)
            .map_err(|e| malformed(format!("Not valid UTF-8: {e}")))?;
        let text = text.trim_start_matches('\u{feff}');
        let body = match text.split_once('\n') {
            Some((first, rest)) if first.trim_start().starts_with("Source:") => rest,
            _ => text,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| malformed(format!("Unreadable header: {e}")))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| malformed(format!("Missing '{name}' column")))
        };
        let country_col = column("Country")?;
        let product_col = column("Product")?;
        let flow_col = column("Flow")?;

        // One column per year; a final column wins over a provisional one
        let mut year_columns: BTreeMap<i32, (usize, bool)> = BTreeMap::new();
        for (index, header) in headers.iter().enumerate() {
            let Some((year, provisional)) = parse_year_header(header) else {
                continue;
            };
            if year < MIN_YEAR {
                continue;
            }
            match year_columns.get(&year) {
                Some((_, false)) => {}
                Some((_, true)) if provisional => {}
                _ => {
                    year_columns.insert(year, (index, provisional));
                }
            }
        }
        if year_columns.is_empty() {
            return Err(malformed(format!("No year columns from {MIN_YEAR} onwards")));
        }

        let mut sink = RecordSink::new(source, artifact);

        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| malformed(format!("Row {}: {e}", line + 1)))?;
            let product = row.get(product_col).unwrap_or_default();
            let flow = row.get(flow_col).unwrap_or_default();

            let Some(metric) = metric_for(product, flow) else {
                continue;
            };
            let metric = metric.map_err(malformed)?;

            let Some(country) = sink.country(countries, row.get(country_col).unwrap_or_default())
            else {
                continue;
            };

            for (year, (index, _)) in &year_columns {
                let cell = row.get(*index).unwrap_or_default();
                if MISSING_MARKERS.contains(&cell) {
                    sink.skip();
                    continue;
                }
                let value: f64 = cell.replace(',', "").parse().map_err(|_| {
                    malformed(format!(
                        "Row {}: non-numeric value '{cell}' for {year}",
                        line + 1
                    ))
                })?;
                let period = Period::year(*year).map_err(malformed)?;
                sink.push(
                    country.clone(),
                    metric.clone(),
                    period,
                    value,
                    Unit::Petajoules,
                );
            }
        }

        Ok(sink.finish())
    }
}
