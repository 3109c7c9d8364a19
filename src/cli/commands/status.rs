//! Status command implementation
//!
//! This module implements the `status` command for displaying source
//! watermarks, the current snapshot and recent runs.

use super::{load_or_report, EXIT_FATAL};
use crate::adapters::storage::open_store;
use crate::core::registry::SourceRegistry;
use crate::core::state::{FetchStatus, SourceWatermark, StateManager};
use chrono::Utc;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this source
    #[arg(long)]
    pub source: Option<String>,

    /// Number of recent runs to show
    #[arg(long, default_value_t = 5)]
    pub runs: usize,
}

fn status_label(watermark: &SourceWatermark) -> &'static str {
    match watermark.status {
        FetchStatus::Completed => "✅ Completed",
        FetchStatus::Unchanged => "✅ Unchanged",
        FetchStatus::InProgress => "🔄 In Progress",
        FetchStatus::Failed => "❌ Failed",
        FetchStatus::NotStarted => "⏸️  Not Started",
    }
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking pipeline status");

        println!("📊 Pipeline Status");
        println!();

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let registry = SourceRegistry::from_config(&config)?;

        let (snapshots, state_storage) = match open_store(&config.store).await {
            Ok(handles) => handles,
            Err(e) => {
                println!("❌ Failed to open store at {}", config.store.path);
                println!("   Error: {e}");
                return Ok(EXIT_FATAL);
            }
        };
        let state_manager = StateManager::new_with_storage(state_storage);

        let now = Utc::now();
        let last_success = state_manager.last_success_map().await?;
        let due: Vec<_> = registry
            .list_due_sources(now, &last_success)
            .into_iter()
            .map(|s| s.key.clone())
            .collect();

        println!(
            "{:<20} {:<6} {:<16} {:>9} {:<20} {:<5}",
            "Source", "Trust", "Status", "Records", "Last Success", "Due"
        );
        println!("{}", "-".repeat(82));

        for source in registry.all() {
            if let Some(ref only) = self.source {
                if source.key.as_str() != only {
                    continue;
                }
            }
            let watermark = state_manager.watermark_or_default(&source.key).await?;
            let last_success = watermark
                .last_success_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Never".to_string());

            println!(
                "{:<20} {:<6} {:<16} {:>9} {:<20} {:<5}",
                source.key.as_str(),
                source.trust_rank,
                status_label(&watermark),
                watermark.record_count,
                last_success,
                if due.contains(&source.key) { "yes" } else { "no" }
            );
            if let Some(error) = &watermark.last_error {
                println!(
                    "    last error ({} consecutive): {error}",
                    watermark.consecutive_failures
                );
            }
        }
        println!();

        match snapshots.current().await? {
            Some(snapshot) => {
                println!(
                    "📦 Current snapshot: v{} ({} records, run {})",
                    snapshot.version, snapshot.record_count, snapshot.run_id
                );
                println!(
                    "   Created: {}",
                    snapshot.created_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!("   Checksum: {}", snapshot.checksum);
                if !snapshot.degraded_sources.is_empty() {
                    let degraded: Vec<&str> =
                        snapshot.degraded_sources.iter().map(|k| k.as_str()).collect();
                    println!("   Degraded sources: {}", degraded.join(", "));
                }
            }
            None => {
                println!("No snapshot committed yet.");
                println!("Run 'gridstats run' to build the first one.");
            }
        }
        println!();

        let runs = state_manager.recent_runs(self.runs).await?;
        if !runs.is_empty() {
            println!("🕑 Recent runs:");
            for run in runs {
                let degraded = run.summary.as_ref().map_or(0, |s| s.degraded.len());
                println!(
                    "  {} {} {:<10} degraded: {}{}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.run_id,
                    run.state.to_string(),
                    degraded,
                    if run.dry_run { " (dry run)" } else { "" }
                );
            }
            println!();
        }

        Ok(0)
    }
}
