//! Query command implementation
//!
//! Prints records of the current snapshot (or a retained one) filtered by
//! country, metric prefix and period.

use super::{load_or_report, EXIT_CONFIG, EXIT_FATAL};
use crate::adapters::storage::open_store;
use crate::core::load::{SnapshotQuery, SnapshotView};
use crate::domain::{CountryCode, Period, ReconciledRecord};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// ISO 3166-1 alpha-3 country code
    #[arg(long)]
    pub country: Option<String>,

    /// Metric id or dot-segment prefix (e.g. electricity.generation)
    #[arg(long)]
    pub metric: Option<String>,

    /// Earliest period, YYYY or YYYY-MM
    #[arg(long)]
    pub from: Option<String>,

    /// Latest period, YYYY or YYYY-MM
    #[arg(long)]
    pub to: Option<String>,

    /// Only annual values
    #[arg(long, conflicts_with = "monthly")]
    pub annual: bool,

    /// Only monthly values
    #[arg(long)]
    pub monthly: bool,

    /// Query a retained snapshot instead of the current one
    #[arg(long)]
    pub version: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl QueryArgs {
    fn to_query(&self) -> Result<SnapshotQuery, String> {
        let mut query = SnapshotQuery::new();
        if let Some(country) = &self.country {
            query = query.country(CountryCode::new(country.as_str())?);
        }
        if let Some(metric) = &self.metric {
            query = query.metric_prefix(metric.as_str());
        }
        query.from = self.from.as_deref().map(Period::from_str).transpose()?;
        query.to = self.to.as_deref().map(Period::from_str).transpose()?;
        if self.annual {
            query = query.annual(true);
        } else if self.monthly {
            query = query.annual(false);
        }
        Ok(query)
    }

    /// Execute the query command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let query = match self.to_query() {
            Ok(query) => query,
            Err(e) => {
                eprintln!("Invalid query: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        let (store, _) = match open_store(&config.store).await {
            Ok(handles) => handles,
            Err(e) => {
                eprintln!("Failed to open store at {}: {e}", config.store.path);
                return Ok(EXIT_FATAL);
            }
        };

        let view = match self.version {
            Some(version) => SnapshotView::version(store.as_ref(), version).await?,
            None => match SnapshotView::current(store.as_ref()).await? {
                Some(view) => view,
                None => {
                    eprintln!("No snapshot committed yet.");
                    return Ok(0);
                }
            },
        };

        let records = view.query(&query);
        tracing::debug!(
            version = view.snapshot().version,
            matched = records.len(),
            "Query executed"
        );
        let rows: Vec<Row> = records
            .into_iter()
            .map(|record| Row {
                complete: view.year_completeness(record),
                record,
            })
            .collect();

        match self.format {
            OutputFormat::Table => print_table(&rows),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            OutputFormat::Csv => write_csv(&rows, std::io::stdout())?,
        }
        Ok(0)
    }
}

/// A matched record plus, for annual values, whether its year is complete
#[derive(Debug, Serialize)]
struct Row<'a> {
    #[serde(flatten)]
    record: &'a ReconciledRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    complete: Option<bool>,
}

fn print_table(rows: &[Row]) {
    println!(
        "{:<8} {:<40} {:<8} {:>14} {:<5} {:<16} {:<10}",
        "Country", "Metric", "Period", "Value", "Unit", "Source", "Resolution"
    );
    println!("{}", "-".repeat(107));
    for Row { record, complete } in rows {
        let mut flag = String::new();
        if record.provenance.has_conflict() {
            flag.push_str(" ⚠️");
        }
        if *complete == Some(false) {
            flag.push_str(" (partial year)");
        }
        println!(
            "{:<8} {:<40} {:<8} {:>14.4} {:<5} {:<16} {:?}{}",
            record.country.as_str(),
            record.metric.as_str(),
            record.period.to_string(),
            record.value,
            record.unit.to_string(),
            record.provenance.chosen_source.as_str(),
            record.provenance.resolution,
            flag
        );
    }
    println!();
    println!("{} record(s)", rows.len());
}

fn write_csv<W: std::io::Write>(rows: &[Row], out: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "country", "metric", "period", "value", "unit", "source", "conflict", "complete",
    ])?;
    for Row { record, complete } in rows {
        writer.write_record([
            record.country.as_str(),
            record.metric.as_str(),
            &record.period.to_string(),
            &record.value.to_string(),
            &record.unit.to_string(),
            record.provenance.chosen_source.as_str(),
            if record.provenance.has_conflict() {
                "true"
            } else {
                "false"
            },
            match complete {
                Some(true) => "true",
                Some(false) => "false",
                None => "",
            },
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> QueryArgs {
        QueryArgs {
            country: None,
            metric: None,
            from: None,
            to: None,
            annual: false,
            monthly: false,
            version: None,
            format: OutputFormat::Table,
        }
    }

    #[test]
    fn test_empty_args_match_everything() {
        assert_eq!(args().to_query().unwrap(), SnapshotQuery::new());
    }

    #[test]
    fn test_filters_translated() {
        let query = QueryArgs {
            country: Some("fra".to_string()),
            metric: Some("electricity.generation".to_string()),
            from: Some("2023".to_string()),
            to: Some("2024-06".to_string()),
            annual: true,
            ..args()
        }
        .to_query()
        .unwrap();

        assert_eq!(query.country.unwrap().as_str(), "FRA");
        assert_eq!(query.from, Some(Period::year(2023).unwrap()));
        assert_eq!(query.to, Some(Period::month(2024, 6).unwrap()));
        assert_eq!(query.annual, Some(true));
    }

    #[test]
    fn test_bad_period_rejected() {
        let err = QueryArgs {
            from: Some("June".to_string()),
            ..args()
        }
        .to_query();
        assert!(err.is_err());
    }

    #[test]
    fn test_csv_header_only_for_no_records() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "country,metric,period,value,unit,source,conflict,complete\n"
        );
    }
}
