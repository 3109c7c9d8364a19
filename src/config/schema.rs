//! Configuration schema types
//!
//! Every section has serde defaults so a minimal file only needs its
//! `[[sources]]` entries. `validate()` is run by the loader after environment
//! overrides are applied.

use crate::config::SecretString;
use crate::domain::ids::{CountryCode, SourceKey};
use crate::domain::source::{AdapterKind, ArtifactFormat, TabularMapping};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

/// Runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment
    #[default]
    Development,
    /// Staging environment
    Staging,
    /// Production environment
    Production,
}

/// Root configuration, mapped one-to-one onto the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GridConfig {
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Source registry entries
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl GridConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid setting found
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.pipeline.validate()?;
        self.fetch.validate()?;
        self.reconcile.validate()?;
        self.normalize.validate()?;
        self.store.validate()?;
        self.logging.validate()?;

        if self.sources.is_empty() {
            return Err("At least one [[sources]] entry is required".to_string());
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate(&self.environment)?;
            if !seen.insert(source.key.as_str()) {
                return Err(format!("Duplicate source key '{}'", source.key));
            }
        }

        Ok(())
    }

    /// Looks up a source entry by key
    pub fn source(&self, key: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.key == key)
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Fetch, adapt and reconcile but never commit a snapshot
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Pipeline scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of sources fetched and parsed concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Reuse the last successfully adapted records of a source that fails
    #[serde(default = "default_true")]
    pub stale_fallback: bool,
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), String> {
        if self.parallelism == 0 || self.parallelism > 64 {
            return Err("pipeline.parallelism must be between 1 and 64".to_string());
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            stale_fallback: true,
        }
    }
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err("fetch.retry.max_attempts must be between 1 and 10".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            return Err("fetch.retry.backoff_multiplier must be >= 1.0".to_string());
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("fetch.retry.max_delay_ms must be >= initial_delay_ms".to_string());
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single fetch attempt
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Root directory of the content-addressed artifact cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl FetchConfig {
    fn validate(&self) -> Result<(), String> {
        if self.timeout_seconds == 0 {
            return Err("fetch.timeout_seconds must be > 0".to_string());
        }
        if self.cache_dir.trim().is_empty() {
            return Err("fetch.cache_dir cannot be empty".to_string());
        }
        self.retry.validate()
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
            cache_dir: default_cache_dir(),
            retry: RetryConfig::default(),
        }
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Relative difference under which two values agree (0.02 = 2 %)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Absolute difference under which values agree when the winner is zero
    #[serde(default = "default_absolute_epsilon")]
    pub absolute_epsilon: f64,

    /// Refuse to pick a winner by source key order alone
    #[serde(default)]
    pub require_agreement: bool,

    /// Derive annual totals from complete monthly series before reconciling
    #[serde(default = "default_true")]
    pub derive_annual_totals: bool,

    /// Derive trailing twelve-month totals and year-over-year growth
    #[serde(default = "default_true")]
    pub derive_trends: bool,
}

impl ReconcileConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err("reconcile.tolerance must be in [0, 1)".to_string());
        }
        if self.absolute_epsilon < 0.0 {
            return Err("reconcile.absolute_epsilon must be >= 0".to_string());
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            absolute_epsilon: default_absolute_epsilon(),
            require_agreement: false,
            derive_annual_totals: true,
            derive_trends: true,
        }
    }
}

/// Country-name normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NormalizeConfig {
    /// Extra source spellings mapped to ISO alpha-3 codes
    #[serde(default)]
    pub country_aliases: BTreeMap<String, String>,
}

impl NormalizeConfig {
    fn validate(&self) -> Result<(), String> {
        for (alias, code) in &self.country_aliases {
            CountryCode::new(code.as_str())
                .map_err(|e| format!("normalize.country_aliases['{alias}']: {e}"))?;
        }
        Ok(())
    }
}

/// Canonical store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the snapshot store
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Number of snapshots kept, current included
    #[serde(default = "default_retain_snapshots")]
    pub retain_snapshots: usize,

    /// Records appended to a candidate generation per write
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

impl StoreConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("store.path cannot be empty".to_string());
        }
        if self.retain_snapshots == 0 {
            return Err("store.retain_snapshots must be >= 1".to_string());
        }
        if self.write_batch_size == 0 {
            return Err("store.write_batch_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            retain_snapshots: default_retain_snapshots(),
            write_batch_size: default_write_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable JSON file logging in addition to the console
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is on".to_string());
        }
        Ok(())
    }

    /// Console-only logging, used before a configuration file is loaded
    pub fn console_only() -> Self {
        Self {
            local_enabled: false,
            ..Self::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

/// One `[[sources]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable key (lowercase, digits, `_`, `-`)
    pub key: String,

    /// Human-readable name; defaults to the key
    #[serde(default)]
    pub name: Option<String>,

    /// URL or filesystem path of the artifact
    pub location: String,

    /// Adapter kind (ember_monthly, iea_balances, tabular_csv)
    pub adapter: String,

    /// Artifact format; defaults to what the adapter reads
    #[serde(default)]
    pub format: Option<ArtifactFormat>,

    /// Precedence among sources, lower wins
    #[serde(default = "default_trust_rank")]
    pub trust_rank: u32,

    /// Refresh cadence in hours
    #[serde(default = "default_refresh_hours")]
    pub refresh_hours: u64,

    /// Minimum milliseconds between two requests to this source
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// API key appended as a query parameter
    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_api_key_param")]
    pub api_key_param: String,

    /// Column mapping for `tabular_csv` sources
    #[serde(default)]
    pub tabular: Option<TabularMapping>,

    /// Disabled sources stay in the file but are never fetched
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceConfig {
    fn validate(&self, environment: &Environment) -> Result<(), String> {
        use secrecy::ExposeSecret;

        SourceKey::new(self.key.as_str())?;

        if self.location.trim().is_empty() {
            return Err(format!("sources['{}'].location cannot be empty", self.key));
        }

        let adapter = AdapterKind::from_str(&self.adapter)
            .map_err(|e| format!("sources['{}']: {e}", self.key))?;

        if let Some(format) = self.format {
            if format != adapter.expected_format() {
                return Err(format!(
                    "sources['{}']: adapter '{}' reads {:?}, not {:?}",
                    self.key,
                    adapter,
                    adapter.expected_format(),
                    format
                ));
            }
        }

        if adapter == AdapterKind::TabularCsv {
            match &self.tabular {
                Some(mapping) => mapping
                    .validate()
                    .map_err(|e| format!("sources['{}']: {e}", self.key))?,
                None => {
                    return Err(format!(
                        "sources['{}']: tabular_csv sources need a [sources.tabular] mapping",
                        self.key
                    ))
                }
            }
        }

        if self.refresh_hours == 0 {
            return Err(format!("sources['{}'].refresh_hours must be > 0", self.key));
        }

        if let Some(key) = &self.api_key {
            if key.expose_secret().is_empty() {
                return Err(format!("sources['{}'].api_key is set but empty", self.key));
            }
        }

        // Production runs only talk to upstreams over TLS
        if *environment == Environment::Production && self.location.starts_with("http://") {
            return Err(format!(
                "sources['{}'] uses plain http, which is not allowed in production. \
                Use an https:// location or set environment = \"development\"",
                self.key
            ));
        }

        Ok(())
    }

    /// Display name
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_parallelism() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("gridstats/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cache_dir() -> String {
    "data/artifacts".to_string()
}

fn default_tolerance() -> f64 {
    0.02
}

fn default_absolute_epsilon() -> f64 {
    1e-9
}

fn default_store_path() -> String {
    "data/store".to_string()
}

fn default_retain_snapshots() -> usize {
    5
}

fn default_write_batch_size() -> usize {
    5000
}

fn default_local_path() -> String {
    "logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_trust_rank() -> u32 {
    10
}

fn default_refresh_hours() -> u64 {
    24
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_api_key_param() -> String {
    "api_key".to_string()
}
