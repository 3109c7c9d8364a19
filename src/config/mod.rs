//! Configuration management for gridstats.
//!
//! gridstats is configured with a single TOML file. It supports:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Default values for every optional setting
//! - `GRIDSTATS_<SECTION>_<KEY>` environment overrides
//! - Validation on load
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and dry-run flag
//! - [`PipelineConfig`] - Parallelism and stale-data fallback
//! - [`FetchConfig`] - Timeouts, retry policy and the artifact cache
//! - [`ReconcileConfig`] - Agreement tolerance and strict mode
//! - [`NormalizeConfig`] - Extra country aliases
//! - [`StoreConfig`] - Snapshot store location and retention
//! - [`LoggingConfig`] - Local JSON log files
//! - [`SourceConfig`] - One entry per upstream source
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [reconcile]
//! tolerance = 0.02
//!
//! [store]
//! path = "data/store"
//! retain_snapshots = 5
//!
//! [[sources]]
//! key = "ember"
//! location = "https://api.ember-energy.org/v1/electricity-generation/monthly"
//! adapter = "ember_monthly"
//! trust_rank = 2
//! api_key = "${EMBER_API_KEY}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, Environment, FetchConfig, GridConfig, LoggingConfig, NormalizeConfig,
    PipelineConfig, ReconcileConfig, RetryConfig, SourceConfig, StoreConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
