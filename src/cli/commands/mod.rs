//! CLI command implementations
//!
//! Every command returns the process exit code: 0 success, 1 completed with
//! degraded sources, 2 configuration error, 5 fatal error, 130 interrupted.

pub mod init;
pub mod query;
pub mod run;
pub mod snapshots;
pub mod status;
pub mod validate;

use crate::config::{load_config, GridConfig};

/// Exit code for configuration errors
pub const EXIT_CONFIG: i32 = 2;

/// Exit code for fatal errors
pub const EXIT_FATAL: i32 = 5;

/// Load the configuration, printing the failure the way every command does
pub(crate) fn load_or_report(config_path: &str) -> Result<GridConfig, i32> {
    load_config(config_path).map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        println!("❌ Failed to load configuration file");
        println!("   Error: {e}");
        EXIT_CONFIG
    })
}
