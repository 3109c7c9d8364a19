//! Snapshot commits are all-or-nothing
//!
//! A store wrapper injects failures at different points of a commit; in every
//! case the previously current snapshot must stay current and the candidate
//! must be thrown away.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gridstats::adapters::storage::{CommitGuard, FileStore, SnapshotStore};
use gridstats::config::StoreConfig;
use gridstats::core::load::Loader;
use gridstats::domain::{
    CandidateId, Contribution, CountryCode, GridError, MetricId, Period, Provenance,
    ReconciledRecord, Resolution, Result, Snapshot, SourceKey, Unit,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    None,
    /// Fail the second and later batch writes
    SecondBatch,
    /// Drop a record when reading the candidate back
    LosesRecord,
    /// Fail at the switch itself
    Publish,
}

struct FlakyStore {
    inner: FileStore,
    failure: Failure,
    batches: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: FileStore, failure: Failure) -> Self {
        Self {
            inner,
            failure,
            batches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn acquire_commit_lock(&self) -> Result<CommitGuard> {
        self.inner.acquire_commit_lock().await
    }

    async fn begin_candidate(&self) -> Result<CandidateId> {
        self.inner.begin_candidate().await
    }

    async fn write_batch(
        &self,
        candidate: &CandidateId,
        records: &[ReconciledRecord],
    ) -> Result<()> {
        let n = self.batches.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::SecondBatch && n >= 1 {
            return Err(GridError::Io("disk full".to_string()));
        }
        self.inner.write_batch(candidate, records).await
    }

    async fn read_candidate(&self, candidate: &CandidateId) -> Result<Vec<ReconciledRecord>> {
        let mut records = self.inner.read_candidate(candidate).await?;
        if self.failure == Failure::LosesRecord {
            records.pop();
        }
        Ok(records)
    }

    async fn publish(
        &self,
        candidate: &CandidateId,
        manifest: &Snapshot,
        guard: &CommitGuard,
    ) -> Result<()> {
        if self.failure == Failure::Publish {
            return Err(GridError::Io("rename failed".to_string()));
        }
        self.inner.publish(candidate, manifest, guard).await
    }

    async fn discard(&self, candidate: &CandidateId) -> Result<()> {
        self.inner.discard(candidate).await
    }

    async fn next_version(&self) -> Result<u64> {
        self.inner.next_version().await
    }

    async fn current(&self) -> Result<Option<Snapshot>> {
        self.inner.current().await
    }

    async fn load_records(&self, version: u64) -> Result<Vec<ReconciledRecord>> {
        self.inner.load_records(version).await
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.inner.list_snapshots().await
    }

    async fn set_current(&self, version: u64, guard: &CommitGuard) -> Result<()> {
        self.inner.set_current(version, guard).await
    }

    async fn prune(&self, retain: usize, guard: &CommitGuard) -> Result<Vec<u64>> {
        self.inner.prune(retain, guard).await
    }
}

fn record(country: &str, year: i32, value: f64) -> ReconciledRecord {
    let source = SourceKey::new("iea").unwrap();
    ReconciledRecord {
        country: CountryCode::new(country).unwrap(),
        metric: MetricId::new("electricity.generation.total").unwrap(),
        period: Period::year(year).unwrap(),
        value,
        unit: Unit::TerawattHours,
        provenance: Provenance {
            chosen_source: source.clone(),
            resolution: Resolution::SingleSource,
            contributors: vec![Contribution {
                source_key: source,
                value,
                trust_rank: 1,
                observed_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                artifact_hash: "abc".to_string(),
                agrees: true,
                derived: false,
            }],
            conflict: None,
            anomalies: vec![],
        },
    }
}

fn records() -> Vec<ReconciledRecord> {
    // Sorted by key: country, then metric, then period
    vec![
        record("DEU", 2022, 577.0),
        record("DEU", 2023, 514.0),
        record("ESP", 2023, 270.0),
        record("FRA", 2023, 490.0),
    ]
}

fn store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().to_string_lossy().into_owned(),
        retain_snapshots: 5,
        write_batch_size: 2,
    }
}

/// Commit one good snapshot, then attempt a second through a flaky store
async fn commit_then_fail(failure: Failure) -> (TempDir, Snapshot, GridError) {
    let dir = TempDir::new().unwrap();
    let config = store_config(&dir);

    let good = Loader::new(Arc::new(FileStore::open(dir.path()).await.unwrap()), &config);
    let first = good.commit("run-1", &records()[..2], vec![]).await.unwrap();

    let flaky = FlakyStore::new(FileStore::open(dir.path()).await.unwrap(), failure);
    let loader = Loader::new(Arc::new(flaky), &config);
    let err = loader.commit("run-2", &records(), vec![]).await.unwrap_err();

    (dir, first, err)
}

async fn assert_untouched(dir: &TempDir, previous: &Snapshot) {
    let store = FileStore::open(dir.path()).await.unwrap();
    assert_eq!(store.current().await.unwrap().as_ref(), Some(previous));
    assert_eq!(
        store.load_records(previous.version).await.unwrap(),
        records()[..2].to_vec()
    );

    let staging = dir.path().join("staging");
    let leftovers = match std::fs::read_dir(&staging) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    };
    assert_eq!(leftovers, 0, "candidate was not discarded");

    let versions: Vec<u64> = store
        .list_snapshots()
        .await
        .unwrap()
        .iter()
        .map(|s| s.version)
        .collect();
    assert_eq!(versions, vec![previous.version]);
}

#[tokio::test]
async fn test_healthy_commit_publishes() {
    let dir = TempDir::new().unwrap();
    let config = store_config(&dir);
    let store = FlakyStore::new(FileStore::open(dir.path()).await.unwrap(), Failure::None);
    let loader = Loader::new(Arc::new(store), &config);

    let snapshot = loader.commit("run-1", &records(), vec![]).await.unwrap();

    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.record_count, 4);
    let store = FileStore::open(dir.path()).await.unwrap();
    assert_eq!(store.current().await.unwrap(), Some(snapshot));
}

#[tokio::test]
async fn test_failure_mid_write_leaves_current_unchanged() {
    let (dir, previous, err) = commit_then_fail(Failure::SecondBatch).await;

    assert!(matches!(err, GridError::StorageCommitFailed(_)));
    assert_untouched(&dir, &previous).await;
}

#[tokio::test]
async fn test_lost_record_fails_validation() {
    let (dir, previous, err) = commit_then_fail(Failure::LosesRecord).await;

    assert!(matches!(err, GridError::StorageCommitFailed(_)));
    assert_untouched(&dir, &previous).await;
}

#[tokio::test]
async fn test_failed_switch_leaves_current_unchanged() {
    let (dir, previous, err) = commit_then_fail(Failure::Publish).await;

    assert!(matches!(err, GridError::StorageCommitFailed(_)));
    assert_untouched(&dir, &previous).await;
}

#[tokio::test]
async fn test_commit_after_failure_succeeds() {
    let (dir, previous, _) = commit_then_fail(Failure::SecondBatch).await;

    let loader = Loader::new(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        &store_config(&dir),
    );
    let next = loader.commit("run-3", &records(), vec![]).await.unwrap();

    assert!(next.version > previous.version);
    assert_eq!(next.record_count, 4);
}
