//! Run command implementation
//!
//! This module implements the `run` command: one pass of the pipeline
//! followed by a printed summary.

use super::{load_or_report, EXIT_CONFIG, EXIT_FATAL};
use crate::core::pipeline::{Pipeline, RunOutcome, RunReport, RunRequest, SourceDisposition};
use crate::domain::{GridError, SourceKey};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Re-fetch and re-parse every source, ignoring refresh intervals
    #[arg(long)]
    pub full_rebuild: bool,

    /// Only re-fetch these sources (comma-separated keys)
    #[arg(long)]
    pub sources: Option<String>,

    /// Fetch, adapt and reconcile without committing a snapshot
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Parse `--sources` into keys
    fn source_keys(&self) -> Result<Option<Vec<SourceKey>>, String> {
        let Some(sources) = &self.sources else {
            return Ok(None);
        };
        let keys = sources
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SourceKey::new)
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Err("--sources needs at least one source key".to_string());
        }
        Ok(Some(keys))
    }

    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting run command");

        let mut config = match load_or_report(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        let sources = match self.source_keys() {
            Ok(sources) => sources,
            Err(e) => {
                eprintln!("Invalid --sources: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - No snapshot will be committed");
            println!();
        }

        let pipeline = match Pipeline::new(config, shutdown_signal).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize pipeline");
                eprintln!("Failed to initialize pipeline: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("🚀 Starting run...");
        println!();

        let request = RunRequest {
            full_rebuild: self.full_rebuild,
            sources,
            dry_run: self.dry_run,
        };
        let report = match pipeline.run(request).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Run rejected");
                eprintln!("Run rejected: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        print_report(&report);
        Ok(report.outcome.exit_code())
    }
}

fn exit_code_for(error: &GridError) -> i32 {
    match error {
        GridError::Configuration(_) | GridError::UnknownSource(_) => EXIT_CONFIG,
        _ => EXIT_FATAL,
    }
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;

    println!("📊 Run Summary ({})", summary.run_id);
    println!(
        "  {:<20} {:<16} {:>10} {:>10}",
        "Source", "Disposition", "Records", "Time (ms)"
    );
    println!("  {}", "-".repeat(60));
    for source in &summary.sources {
        let marker = match source.disposition {
            SourceDisposition::Fetched | SourceDisposition::Unchanged => "✅",
            SourceDisposition::Reused => "♻️ ",
            SourceDisposition::StaleFallback => "⚠️ ",
            SourceDisposition::Degraded | SourceDisposition::Missing => "❌",
            SourceDisposition::Cancelled => "⏹️ ",
        };
        println!(
            "{} {:<20} {:<16} {:>10} {:>10}",
            marker,
            source.source_key.as_str(),
            source.disposition.to_string(),
            source.records,
            source.duration_ms
        );
    }
    println!();
    println!("  Candidate records: {}", summary.candidate_records);
    println!("  Reconciled records: {}", summary.reconciled_records);
    println!("  Conflicts: {}", summary.conflicts);
    println!("  Anomalies: {}", summary.anomalies);
    println!("  Duration: {:.2}s", summary.duration_ms as f64 / 1000.0);
    println!();

    if !summary.degraded.is_empty() {
        println!("⚠️  Degraded sources:");
        for degraded in &summary.degraded {
            println!("  - {}: {}", degraded.source_key, degraded.reason);
        }
        println!();
    }

    if !summary.unresolved.is_empty() {
        println!("⚠️  Unresolved conflicts (keys omitted):");
        for (i, unresolved) in summary.unresolved.iter().enumerate() {
            if i < 10 {
                println!("  - {unresolved}");
            }
        }
        if summary.unresolved.len() > 10 {
            println!("  ... and {} more", summary.unresolved.len() - 10);
        }
        println!();
    }

    match &report.outcome {
        RunOutcome::Committed(snapshot) => {
            println!(
                "✅ Snapshot {} committed ({} records)",
                snapshot.version, snapshot.record_count
            );
        }
        RunOutcome::CommittedWithDegradedSources(snapshot, degraded) => {
            println!(
                "⚠️  Snapshot {} committed with {} degraded source(s)",
                snapshot.version,
                degraded.len()
            );
        }
        RunOutcome::DryRun { records, .. } => {
            println!("🔍 Dry run complete: {records} record(s) would be committed");
        }
        RunOutcome::Failed(reason) => {
            println!("❌ Run failed: {reason}");
            println!("   The previous snapshot remains current.");
        }
        RunOutcome::Cancelled => {
            println!("⚠️  Run interrupted. Nothing was committed.");
            tracing::info!("Run interrupted by user signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(sources: Option<&str>) -> RunArgs {
        RunArgs {
            full_rebuild: false,
            sources: sources.map(str::to_string),
            dry_run: false,
        }
    }

    #[test]
    fn test_source_keys_absent() {
        assert_eq!(args(None).source_keys().unwrap(), None);
    }

    #[test]
    fn test_source_keys_split_and_trimmed() {
        let keys = args(Some("ember, iea ,")).source_keys().unwrap().unwrap();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["ember", "iea"]);
    }

    #[test]
    fn test_source_keys_empty_rejected() {
        assert!(args(Some(" , ")).source_keys().is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&GridError::UnknownSource("x".into())), 2);
        assert_eq!(exit_code_for(&GridError::Storage("disk".into())), 5);
    }
}
