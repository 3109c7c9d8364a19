//! Source registry
//!
//! Built once per run from the `[[sources]]` configuration and read-only
//! afterwards. Decides which sources are due for a refresh.

use crate::config::schema::{GridConfig, SourceConfig};
use crate::domain::ids::SourceKey;
use crate::domain::source::{AdapterKind, FetchDescriptor, Source};
use crate::domain::{GridError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

/// Registered sources, keyed by [`SourceKey`]
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceKey, Source>,
}

impl SourceRegistry {
    /// Build the registry from every enabled source in `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate keys, empty locations or
    /// unknown adapters.
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        let mut sources = BTreeMap::new();
        for source_config in config.sources.iter().filter(|s| s.enabled) {
            let source = build_source(source_config)?;
            if sources.contains_key(&source.key) {
                return Err(GridError::Configuration(format!(
                    "Duplicate source key '{}'",
                    source.key
                )));
            }
            sources.insert(source.key.clone(), source);
        }

        if sources.is_empty() {
            return Err(GridError::Configuration(
                "No enabled sources configured".to_string(),
            ));
        }

        tracing::debug!(sources = sources.len(), "Source registry built");
        Ok(Self { sources })
    }

    /// Registry over already-built sources
    pub fn from_sources(sources: impl IntoIterator<Item = Source>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for source in sources {
            if map.insert(source.key.clone(), source).is_some() {
                return Err(GridError::Configuration(
                    "Duplicate source key".to_string(),
                ));
            }
        }
        Ok(Self { sources: map })
    }

    /// Look up one source
    pub fn get(&self, key: &SourceKey) -> Result<&Source> {
        self.sources
            .get(key)
            .ok_or_else(|| GridError::UnknownSource(key.to_string()))
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.sources.contains_key(key)
    }

    /// All sources in (trust rank, key) order
    pub fn all(&self) -> Vec<&Source> {
        let mut all: Vec<&Source> = self.sources.values().collect();
        all.sort_by(|a, b| (a.trust_rank, &a.key).cmp(&(b.trust_rank, &b.key)));
        all
    }

    pub fn keys(&self) -> impl Iterator<Item = &SourceKey> {
        self.sources.keys()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources whose refresh interval has elapsed since their last success,
    /// in (trust rank, key) order. Sources never fetched are always due.
    pub fn list_due_sources(
        &self,
        as_of: DateTime<Utc>,
        last_success: &HashMap<SourceKey, DateTime<Utc>>,
    ) -> Vec<&Source> {
        self.all()
            .into_iter()
            .filter(|source| source.is_due(as_of, last_success.get(&source.key).copied()))
            .collect()
    }
}

/// Turn one `[[sources]]` entry into a runtime [`Source`]
pub fn build_source(config: &SourceConfig) -> Result<Source> {
    let key = SourceKey::new(config.key.as_str()).map_err(GridError::Configuration)?;

    if config.location.trim().is_empty() {
        return Err(GridError::Configuration(format!(
            "Source '{key}' has an empty location"
        )));
    }

    let adapter = AdapterKind::from_str(&config.adapter)
        .map_err(|e| GridError::Configuration(format!("Source '{key}': {e}")))?;

    let refresh_hours = i64::try_from(config.refresh_hours).map_err(|_| {
        GridError::Configuration(format!("Source '{key}': refresh_hours out of range"))
    })?;

    Ok(Source {
        name: config.display_name().to_string(),
        descriptor: FetchDescriptor {
            location: config.location.trim().to_string(),
            format: config.format.unwrap_or_else(|| adapter.expected_format()),
        },
        adapter,
        trust_rank: config.trust_rank,
        refresh_interval: chrono::Duration::hours(refresh_hours),
        min_request_interval: Duration::from_millis(config.min_interval_ms),
        api_key: config.api_key.clone(),
        api_key_param: config.api_key_param.clone(),
        tabular: config.tabular.clone(),
        key,
    })
}
