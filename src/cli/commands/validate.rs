//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the gridstats configuration file.

use super::{load_or_report, EXIT_CONFIG};
use crate::config::GridConfig;
use crate::core::normalize::CountryResolver;
use crate::core::registry::SourceRegistry;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

/// Checks that go beyond the schema: every source must build into a runtime
/// source and every alias must name a well-formed country code
pub(crate) fn check_runtime(config: &GridConfig) -> crate::domain::Result<SourceRegistry> {
    CountryResolver::new(&config.normalize.country_aliases)?;
    SourceRegistry::from_config(config)
}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_or_report(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(code) => return Ok(code),
        };

        let registry = match check_runtime(&config) {
            Ok(registry) => registry,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(EXIT_CONFIG);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Parallelism: {}", config.pipeline.parallelism);
        println!("  Stale Fallback: {}", config.pipeline.stale_fallback);
        println!(
            "  Retry: {} attempts, {}ms initial, {}ms max",
            config.fetch.retry.max_attempts,
            config.fetch.retry.initial_delay_ms,
            config.fetch.retry.max_delay_ms
        );
        println!("  Artifact Cache: {}", config.fetch.cache_dir);
        println!(
            "  Tolerance: {:.2}%{}",
            config.reconcile.tolerance * 100.0,
            if config.reconcile.require_agreement {
                " (strict)"
            } else {
                ""
            }
        );
        println!(
            "  Store: {} (retain {})",
            config.store.path, config.store.retain_snapshots
        );
        println!("  Sources ({} enabled):", registry.len());
        for source in registry.all() {
            println!(
                "    - {} [{}] rank {}, every {}h: {}",
                source.key,
                source.adapter,
                source.trust_rank,
                source.refresh_interval.num_hours(),
                source.descriptor.location
            );
        }
        println!();
        Ok(0)
    }
}
