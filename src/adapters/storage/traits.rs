//! Storage abstraction traits
//!
//! [`SnapshotStore`] holds snapshot generations and the "current" pointer.
//! [`StateStorage`] holds pipeline bookkeeping (watermarks, adapted-record
//! caches, run records). Both are implemented by the file store; the split
//! keeps the loader and the state manager independent of each other.

use crate::core::pipeline::run_state::RunRecord;
use crate::core::state::adapted::AdaptedRecords;
use crate::core::state::watermark::SourceWatermark;
use crate::domain::ids::SourceKey;
use crate::domain::record::ReconciledRecord;
use crate::domain::snapshot::{CandidateId, Snapshot};
use crate::domain::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::OwnedMutexGuard;

/// Proof that the holder may move the "current" pointer
///
/// Holds the in-process commit mutex and, when the backend uses one, an
/// on-disk lock file that is removed on drop.
#[derive(Debug)]
pub struct CommitGuard {
    _process_guard: OwnedMutexGuard<()>,
    lock_file: Option<PathBuf>,
}

impl CommitGuard {
    pub fn new(process_guard: OwnedMutexGuard<()>, lock_file: Option<PathBuf>) -> Self {
        Self {
            _process_guard: process_guard,
            lock_file,
        }
    }
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        if let Some(path) = self.lock_file.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove commit lock file");
            }
        }
    }
}

/// Versioned snapshot storage with a single atomically switched "current"
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Serialize commits; waits for any other in-process commit and fails if
    /// another process holds the store
    async fn acquire_commit_lock(&self) -> Result<CommitGuard>;

    /// Create an empty, invisible candidate generation
    async fn begin_candidate(&self) -> Result<CandidateId>;

    /// Append records to a candidate
    async fn write_batch(&self, candidate: &CandidateId, records: &[ReconciledRecord])
        -> Result<()>;

    /// Read a candidate back exactly as written
    async fn read_candidate(&self, candidate: &CandidateId) -> Result<Vec<ReconciledRecord>>;

    /// Turn a candidate into generation `manifest.version` and make it current
    async fn publish(
        &self,
        candidate: &CandidateId,
        manifest: &Snapshot,
        guard: &CommitGuard,
    ) -> Result<()>;

    /// Throw a candidate away
    async fn discard(&self, candidate: &CandidateId) -> Result<()>;

    /// Version number the next published generation should use
    async fn next_version(&self) -> Result<u64>;

    /// Manifest of the current snapshot, if any has been committed
    async fn current(&self) -> Result<Option<Snapshot>>;

    /// Records of a retained generation
    async fn load_records(&self, version: u64) -> Result<Vec<ReconciledRecord>>;

    /// Manifests of all retained generations, oldest first
    async fn list_snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Point "current" at a retained generation
    async fn set_current(&self, version: u64, guard: &CommitGuard) -> Result<()>;

    /// Delete all but the newest `retain` generations (never the current one),
    /// any leftover candidates, and run records beyond the newest `retain`
    /// that belong to no retained generation; returns the removed versions
    async fn prune(&self, retain: usize, guard: &CommitGuard) -> Result<Vec<u64>>;
}

/// Pipeline bookkeeping storage
#[async_trait]
pub trait StateStorage: Send + Sync {
    async fn load_watermark(&self, source_key: &SourceKey) -> Result<Option<SourceWatermark>>;

    async fn save_watermark(&self, watermark: &SourceWatermark) -> Result<()>;

    async fn all_watermarks(&self) -> Result<Vec<SourceWatermark>>;

    async fn load_adapted(&self, source_key: &SourceKey) -> Result<Option<AdaptedRecords>>;

    async fn save_adapted(&self, adapted: &AdaptedRecords) -> Result<()>;

    async fn save_run(&self, run: &RunRecord) -> Result<()>;

    /// Newest first
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}
