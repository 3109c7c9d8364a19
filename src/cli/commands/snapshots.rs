//! Snapshots command implementation
//!
//! `snapshots list`, `snapshots rollback <version>` and
//! `snapshots diff <from> [to]`.

use super::{load_or_report, EXIT_FATAL};
use crate::adapters::storage::open_store;
use crate::core::load::{diff, Loader, SnapshotView};
use clap::{Args, Subcommand};

/// Arguments for the snapshots command
#[derive(Args, Debug)]
pub struct SnapshotsArgs {
    #[command(subcommand)]
    pub action: SnapshotAction,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotAction {
    /// List retained snapshots
    List,

    /// Point "current" back at a retained snapshot
    Rollback {
        /// Version to make current
        version: u64,
    },

    /// Show keys added, removed or changed between two snapshots
    Diff {
        /// Older version
        from: u64,

        /// Newer version (defaults to the current snapshot)
        to: Option<u64>,

        /// Maximum changed keys to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

impl SnapshotsArgs {
    /// Execute the snapshots command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        let (store, _) = match open_store(&config.store).await {
            Ok(handles) => handles,
            Err(e) => {
                println!("❌ Failed to open store at {}", config.store.path);
                println!("   Error: {e}");
                return Ok(EXIT_FATAL);
            }
        };

        match &self.action {
            SnapshotAction::List => {
                let current = store.current().await?.map(|s| s.version);
                let snapshots = store.list_snapshots().await?;
                if snapshots.is_empty() {
                    println!("No snapshots retained.");
                    return Ok(0);
                }
                println!(
                    "{:<3}{:<9} {:<20} {:>9} {:<18} {:<10}",
                    "", "Version", "Created", "Records", "Checksum", "Degraded"
                );
                println!("{}", "-".repeat(72));
                for snapshot in snapshots.iter().rev() {
                    let marker = if Some(snapshot.version) == current {
                        "➡️ "
                    } else {
                        "   "
                    };
                    println!(
                        "{}{:<9} {:<20} {:>9} {:<18} {:<10}",
                        marker,
                        snapshot.version,
                        snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                        snapshot.record_count,
                        &snapshot.checksum[..snapshot.checksum.len().min(16)],
                        snapshot.degraded_sources.len()
                    );
                }
                Ok(0)
            }
            SnapshotAction::Rollback { version } => {
                tracing::info!(version = version, "Rolling back current snapshot");
                let loader = Loader::new(store, &config.store);
                match loader.rollback(*version).await {
                    Ok(snapshot) => {
                        println!(
                            "✅ Current snapshot is now v{} ({} records)",
                            snapshot.version, snapshot.record_count
                        );
                        Ok(0)
                    }
                    Err(e) => {
                        println!("❌ Rollback failed");
                        println!("   Error: {e}");
                        Ok(EXIT_FATAL)
                    }
                }
            }
            SnapshotAction::Diff { from, to, limit } => {
                let before = SnapshotView::version(store.as_ref(), *from).await?;
                let after = match to {
                    Some(version) => SnapshotView::version(store.as_ref(), *version).await?,
                    None => match SnapshotView::current(store.as_ref()).await? {
                        Some(view) => view,
                        None => {
                            println!("No current snapshot to compare against.");
                            return Ok(0);
                        }
                    },
                };

                let changes = diff(&before, &after);
                println!(
                    "🔍 v{} → v{}: {} added, {} removed, {} changed, {} unchanged",
                    changes.from_version,
                    changes.to_version,
                    changes.added.len(),
                    changes.removed.len(),
                    changes.changed.len(),
                    changes.unchanged
                );
                for key in changes.added.iter().take(*limit) {
                    println!("  + {key}");
                }
                for key in changes.removed.iter().take(*limit) {
                    println!("  - {key}");
                }
                for change in changes.changed.iter().take(*limit) {
                    println!("  ~ {} {} → {}", change.key, change.before, change.after);
                }
                Ok(0)
            }
        }
    }
}
