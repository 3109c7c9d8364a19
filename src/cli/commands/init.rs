//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use super::{EXIT_CONFIG, EXIT_FATAL};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "gridstats.toml")]
    pub output: String,

    /// Include every setting with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing gridstats configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIG);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} and list your [[sources]]", self.output);
                println!("  2. Put API keys in a .env file (e.g. EMBER_API_KEY=...)");
                println!("  3. Validate configuration: gridstats validate-config");
                println!("  4. Try a dry run: gridstats run --dry-run");
                println!("  5. Build the first snapshot: gridstats run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# gridstats configuration

[application]
log_level = "info"

[store]
path = "data/store"

[[sources]]
key = "ember"
name = "Ember monthly electricity"
location = "https://api.ember-energy.org/v1/electricity-generation/monthly"
adapter = "ember_monthly"
trust_rank = 2
refresh_hours = 24

[[sources]]
key = "iea"
name = "IEA World Energy Balances"
location = "data/sources/iea_world_energy_balances.csv"
adapter = "iea_balances"
trust_rank = 1
refresh_hours = 720
"#
        .to_string()
    }

    /// Generate configuration with every setting and comments
    fn generate_config_with_examples() -> String {
        r#"# gridstats configuration
#
# Values of the form ${VAR} are replaced from the environment (and .env).
# Any setting can also be overridden with GRIDSTATS_<SECTION>_<KEY>,
# e.g. GRIDSTATS_STORE_PATH=/srv/gridstats.

# development | staging | production (production forbids plain http sources)
environment = "development"

# ============================================================================
# Application
# ============================================================================
[application]
# trace | debug | info | warn | error
log_level = "info"

# Fetch, adapt and reconcile, but never commit a snapshot
dry_run = false

# ============================================================================
# Pipeline
# ============================================================================
[pipeline]
# Sources fetched concurrently (1-64)
parallelism = 4

# Use a failing source's last adapted records instead of dropping it
stale_fallback = true

# ============================================================================
# Fetching
# ============================================================================
[fetch]
timeout_seconds = 60
user_agent = "gridstats"

# Content-addressed cache of every artifact ever fetched
cache_dir = "data/cache"

[fetch.retry]
# Attempts for transient failures (timeouts, 429, 5xx), 1-10
max_attempts = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

# ============================================================================
# Reconciliation
# ============================================================================
[reconcile]
# Relative difference under which sources agree (0.02 = 2%)
tolerance = 0.02

# Absolute difference treated as agreement regardless of tolerance
absolute_epsilon = 1e-9

# Omit keys whose conflict can only be broken by source key order
require_agreement = false

# Sum 12 months into a derived annual value when no annual value exists
derive_annual_totals = true

# Trailing 12-month totals and year-over-year growth for every energy series
derive_trends = true

# ============================================================================
# Normalization
# ============================================================================
[normalize.country_aliases]
# "Kosovo (under UNSCR 1244)" = "XKX"

# ============================================================================
# Snapshot store
# ============================================================================
[store]
path = "data/store"

# Snapshots kept for rollback (the current one is always kept)
retain_snapshots = 5

# Records per candidate write
write_batch_size = 5000

# ============================================================================
# Logging
# ============================================================================
[logging]
# JSON log files in addition to the console
local_enabled = false
local_path = "logs"
# daily | hourly
local_rotation = "daily"

# ============================================================================
# Sources
#
# Lower trust_rank wins conflicts. adapter is one of ember_monthly,
# iea_balances or tabular_csv.
# ============================================================================
[[sources]]
key = "ember"
name = "Ember monthly electricity"
location = "https://api.ember-energy.org/v1/electricity-generation/monthly"
adapter = "ember_monthly"
trust_rank = 2
refresh_hours = 24
# Minimum spacing between requests to this host
min_interval_ms = 1000
# api_key = "${EMBER_API_KEY}"
# api_key_param = "api_key"

[[sources]]
key = "iea"
name = "IEA World Energy Balances"
location = "data/sources/iea_world_energy_balances.csv"
adapter = "iea_balances"
trust_rank = 1
refresh_hours = 720

[[sources]]
key = "national"
name = "National grid operator statistics"
location = "data/sources/national.csv"
adapter = "tabular_csv"
trust_rank = 1
refresh_hours = 168
enabled = false

[sources.tabular]
country_column = "country"
period_column = "month"
value_column = "value"
metric_column = "metric"
unit = "GWh"
"#
        .to_string()
    }
}
