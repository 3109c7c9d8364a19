//! Sources and fetched artifacts
//!
//! A [`Source`] is the immutable runtime description of one upstream dataset.
//! A [`FetchArtifact`] is the raw payload retrieved for it at one point in time.

use super::ids::SourceKey;
use crate::config::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Parser used to turn a source's artifact into canonical records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Ember monthly electricity generation JSON API
    EmberMonthly,
    /// IEA World Energy Balances wide CSV export
    IeaBalances,
    /// Long-format CSV with a configurable column mapping
    TabularCsv,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::EmberMonthly => "ember_monthly",
            AdapterKind::IeaBalances => "iea_balances",
            AdapterKind::TabularCsv => "tabular_csv",
        }
    }

    /// Artifact format this adapter reads
    pub fn expected_format(&self) -> ArtifactFormat {
        match self {
            AdapterKind::EmberMonthly => ArtifactFormat::Json,
            AdapterKind::IeaBalances | AdapterKind::TabularCsv => ArtifactFormat::Csv,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ember_monthly" => Ok(AdapterKind::EmberMonthly),
            "iea_balances" => Ok(AdapterKind::IeaBalances),
            "tabular_csv" => Ok(AdapterKind::TabularCsv),
            other => Err(format!(
                "Unknown adapter '{other}'. Must be one of: ember_monthly, iea_balances, tabular_csv"
            )),
        }
    }
}

/// Wire format of a source artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Json,
    Csv,
}

/// Where and how to retrieve a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDescriptor {
    /// `http(s)://` URL, `file://` URL or plain filesystem path
    pub location: String,
    pub format: ArtifactFormat,
}

/// Column mapping for long-format CSV sources
///
/// Either `metric_column` or `metric` must be set, and either `unit_column`
/// or `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularMapping {
    pub country_column: String,
    pub period_column: String,
    pub value_column: String,
    #[serde(default)]
    pub metric_column: Option<String>,
    /// Fixed metric id when the file carries a single metric
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub unit_column: Option<String>,
    /// Fixed unit when the file carries a single unit
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl TabularMapping {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("country_column", &self.country_column),
            ("period_column", &self.period_column),
            ("value_column", &self.value_column),
        ] {
            if value.trim().is_empty() {
                return Err(format!("tabular.{name} cannot be empty"));
            }
        }
        if self.metric_column.is_none() && self.metric.is_none() {
            return Err("tabular mapping needs either metric_column or metric".to_string());
        }
        if self.unit_column.is_none() && self.unit.is_none() {
            return Err("tabular mapping needs either unit_column or unit".to_string());
        }
        if !self.delimiter.is_ascii() {
            return Err("tabular.delimiter must be a single ASCII character".to_string());
        }
        Ok(())
    }
}

/// Runtime description of an upstream source
///
/// Built once from configuration and never mutated by the pipeline.
#[derive(Debug, Clone)]
pub struct Source {
    pub key: SourceKey,
    pub name: String,
    pub descriptor: FetchDescriptor,
    pub adapter: AdapterKind,
    /// Lower is more authoritative
    pub trust_rank: u32,
    /// Refresh cadence
    pub refresh_interval: chrono::Duration,
    /// Minimum spacing between two requests to this source
    pub min_request_interval: Duration,
    pub api_key: Option<SecretString>,
    pub api_key_param: String,
    pub tabular: Option<TabularMapping>,
}

impl Source {
    /// Whether the source is due for a refresh at `as_of`
    pub fn is_due(&self, as_of: DateTime<Utc>, last_success: Option<DateTime<Utc>>) -> bool {
        match last_success {
            None => true,
            Some(last) => as_of - last >= self.refresh_interval,
        }
    }
}

/// Whether an artifact differs from the last one cached for its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// New content, stored in the cache by this fetch
    Fresh,
    /// Same content hash as a cached artifact; the cached copy is returned
    Unchanged,
}

/// How the bytes were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportStatus {
    Http { status: u16 },
    File,
}

/// Metadata persisted next to every cached artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub source_key: SourceKey,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
    pub transport: TransportStatus,
    pub size_bytes: u64,
    pub location: String,
}

/// Raw payload retrieved for a source
#[derive(Debug, Clone)]
pub struct FetchArtifact {
    pub meta: ArtifactMeta,
    pub cache_status: CacheStatus,
    /// Path of the cached raw bytes, if the artifact cache is enabled
    pub cache_path: Option<PathBuf>,
    pub bytes: Vec<u8>,
}

impl FetchArtifact {
    pub fn source_key(&self) -> &SourceKey {
        &self.meta.source_key
    }

    pub fn content_hash(&self) -> &str {
        &self.meta.content_hash
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.meta.fetched_at
    }

    pub fn is_unchanged(&self) -> bool {
        self.cache_status == CacheStatus::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(refresh_hours: i64) -> Source {
        Source {
            key: SourceKey::new("ember").unwrap(),
            name: "Ember".to_string(),
            descriptor: FetchDescriptor {
                location: "https://api.example.org".to_string(),
                format: ArtifactFormat::Json,
            },
            adapter: AdapterKind::EmberMonthly,
            trust_rank: 2,
            refresh_interval: chrono::Duration::hours(refresh_hours),
            min_request_interval: Duration::from_millis(0),
            api_key: None,
            api_key_param: "api_key".to_string(),
            tabular: None,
        }
    }

    #[test]
    fn test_never_fetched_is_due() {
        assert!(source(24).is_due(Utc::now(), None));
    }

    #[test]
    fn test_due_after_cadence() {
        let now = Utc::now();
        let s = source(24);
        assert!(!s.is_due(now, Some(now - chrono::Duration::hours(23))));
        assert!(s.is_due(now, Some(now - chrono::Duration::hours(24))));
    }

    #[test]
    fn test_adapter_kind_parse() {
        assert_eq!(
            AdapterKind::from_str("iea_balances").unwrap(),
            AdapterKind::IeaBalances
        );
        assert!(AdapterKind::from_str("html_table").is_err());
        assert_eq!(
            AdapterKind::EmberMonthly.expected_format(),
            ArtifactFormat::Json
        );
    }

    #[test]
    fn test_tabular_mapping_validation() {
        let mut mapping = TabularMapping {
            country_column: "country".to_string(),
            period_column: "month".to_string(),
            value_column: "value".to_string(),
            metric_column: None,
            metric: Some("electricity.generation.total".to_string()),
            unit_column: None,
            unit: Some("GWh".to_string()),
            delimiter: ',',
        };
        assert!(mapping.validate().is_ok());

        mapping.metric = None;
        assert!(mapping.validate().is_err());

        mapping.metric_column = Some("metric".to_string());
        mapping.unit = None;
        assert!(mapping.validate().is_err());
    }
}
