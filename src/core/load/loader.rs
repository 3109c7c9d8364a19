//! Atomic snapshot commits
//!
//! A commit writes the reconciled records into a fresh candidate generation
//! in batches, reads the candidate back and validates it, and only then
//! switches the store's "current" pointer. Any failure before the switch
//! discards the candidate, leaving the previous snapshot current.

use crate::adapters::storage::traits::{CommitGuard, SnapshotStore};
use crate::config::schema::StoreConfig;
use crate::core::verification::checksum::{encode_record_line, RecordSetHasher};
use crate::domain::ids::SourceKey;
use crate::domain::record::ReconciledRecord;
use crate::domain::snapshot::{CandidateId, Snapshot};
use crate::domain::{GridError, Result};
use crate::log_snapshot_committed;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct Loader {
    store: Arc<dyn SnapshotStore + Send + Sync>,
    batch_size: usize,
    retain: usize,
}

impl Loader {
    pub fn new(store: Arc<dyn SnapshotStore + Send + Sync>, config: &StoreConfig) -> Self {
        Self {
            store,
            batch_size: config.write_batch_size.max(1),
            retain: config.retain_snapshots.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore + Send + Sync> {
        &self.store
    }

    /// Commit `records` as the new current snapshot
    ///
    /// `records` must be sorted by key with each key at most once, as the
    /// reconciler produces them.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::StorageCommitFailed`] if anything goes wrong
    /// before the switch; the previous snapshot then remains current.
    pub async fn commit(
        &self,
        run_id: &str,
        records: &[ReconciledRecord],
        degraded_sources: Vec<SourceKey>,
    ) -> Result<Snapshot> {
        let expected_checksum = checked_checksum(records).map_err(commit_failed)?;

        let guard = self
            .store
            .acquire_commit_lock()
            .await
            .map_err(commit_failed)?;
        let candidate = self.store.begin_candidate().await.map_err(commit_failed)?;

        let manifest = match self
            .write_and_publish(&candidate, &guard, run_id, records, &expected_checksum, degraded_sources)
            .await
        {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!(candidate = %candidate, error = %e, "Commit failed; discarding candidate");
                if let Err(discard_error) = self.store.discard(&candidate).await {
                    tracing::warn!(candidate = %candidate, error = %discard_error, "Failed to discard candidate");
                }
                return Err(commit_failed(e));
            }
        };

        log_snapshot_committed!(manifest.version, manifest.record_count, manifest.checksum);

        // The snapshot is committed; pruning problems only leave extra generations
        if let Err(e) = self.store.prune(self.retain, &guard).await {
            tracing::warn!(error = %e, "Failed to prune old snapshots");
        }

        Ok(manifest)
    }

    async fn write_and_publish(
        &self,
        candidate: &CandidateId,
        guard: &CommitGuard,
        run_id: &str,
        records: &[ReconciledRecord],
        expected_checksum: &str,
        degraded_sources: Vec<SourceKey>,
    ) -> Result<Snapshot> {
        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            self.store.write_batch(candidate, batch).await?;
            tracing::debug!(candidate = %candidate, batch = index + 1, records = batch.len(), "Wrote batch");
        }

        let written = self.store.read_candidate(candidate).await?;
        if written.len() != records.len() {
            return Err(GridError::Validation(format!(
                "Candidate holds {} records, expected {}",
                written.len(),
                records.len()
            )));
        }
        let written_checksum = checked_checksum(&written)?;
        if written_checksum != expected_checksum {
            return Err(GridError::Validation(format!(
                "Candidate checksum {written_checksum} does not match {expected_checksum}"
            )));
        }

        let sources: BTreeSet<SourceKey> = records
            .iter()
            .flat_map(|r| r.provenance.contributors.iter().map(|c| c.source_key.clone()))
            .collect();

        let manifest = Snapshot {
            version: self.store.next_version().await?,
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            record_count: records.len(),
            checksum: written_checksum,
            sources: sources.into_iter().collect(),
            degraded_sources,
        };

        self.store.publish(candidate, &manifest, guard).await?;
        Ok(manifest)
    }

    /// Point "current" back at a retained snapshot
    ///
    /// # Errors
    ///
    /// Fails if the version is not retained or another commit holds the lock.
    pub async fn rollback(&self, version: u64) -> Result<Snapshot> {
        let guard = self.store.acquire_commit_lock().await?;
        let target = self
            .store
            .list_snapshots()
            .await?
            .into_iter()
            .find(|s| s.version == version)
            .ok_or_else(|| GridError::Storage(format!("Snapshot {version} is not retained")))?;

        let records = self.store.load_records(version).await?;
        let checksum = checked_checksum(&records)?;
        if checksum != target.checksum {
            return Err(GridError::Validation(format!(
                "Snapshot {version} fails its checksum; refusing to roll back"
            )));
        }

        self.store.set_current(version, &guard).await?;
        tracing::info!(version = version, "Rolled back current snapshot");
        Ok(target)
    }
}

/// Checksum of records that must be sorted with unique keys
fn checked_checksum(records: &[ReconciledRecord]) -> Result<String> {
    let mut hasher = RecordSetHasher::new();
    let mut previous = None;
    for record in records {
        let key = record.key();
        if let Some(previous) = &previous {
            if key <= *previous {
                return Err(GridError::Validation(format!(
                    "Record {key} is duplicated or out of order"
                )));
            }
        }
        hasher.update_line(&encode_record_line(record)?);
        previous = Some(key);
    }
    Ok(hasher.finalize())
}

fn commit_failed(error: GridError) -> GridError {
    match error {
        GridError::StorageCommitFailed(_) => error,
        other => GridError::StorageCommitFailed(other.to_string()),
    }
}
