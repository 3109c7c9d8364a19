//! Filesystem-backed snapshot and state store
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                         version number of the current generation
//! .commit.lock                    present while a commit is in flight
//! generations/000007/records.jsonl
//! generations/000007/manifest.json
//! staging/<candidate-id>/records.jsonl
//! state/sources/<source>.json     watermarks
//! state/adapted/<source>.json     last adapted records
//! runs/<started-millis>-<run-id>.json
//! ```
//!
//! A candidate only becomes a generation through a directory rename, and a
//! generation only becomes current through an atomic rename of `CURRENT`.

use super::traits::{CommitGuard, SnapshotStore, StateStorage};
use crate::core::pipeline::run_state::RunRecord;
use crate::core::state::adapted::AdaptedRecords;
use crate::core::state::watermark::SourceWatermark;
use crate::domain::ids::SourceKey;
use crate::domain::record::ReconciledRecord;
use crate::domain::snapshot::{CandidateId, Snapshot};
use crate::domain::{GridError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const CURRENT_FILE: &str = "CURRENT";
const LOCK_FILE: &str = ".commit.lock";
const RECORDS_FILE: &str = "records.jsonl";
const MANIFEST_FILE: &str = "manifest.json";

/// A lock file older than this is assumed to belong to a crashed process
const STALE_LOCK_HOURS: i64 = 6;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Who holds an existing lock file, as far as can be told
#[derive(Debug)]
struct LockHolder {
    pid: Option<u32>,
    since: DateTime<Utc>,
}

impl LockHolder {
    fn is_stale(&self) -> bool {
        Utc::now() - self.since > chrono::Duration::hours(STALE_LOCK_HOURS)
    }
}

/// Reads the lock file at `path`; `None` when it no longer exists
///
/// A lock file that cannot be parsed (for example one caught half-written)
/// still counts as held, dated by its modification time.
async fn inspect_lock(path: &Path) -> Result<Option<LockHolder>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage_err("read", path, e)),
    };
    if let Ok(info) = serde_json::from_slice::<LockInfo>(&bytes) {
        return Ok(Some(LockHolder {
            pid: Some(info.pid),
            since: info.acquired_at,
        }));
    }

    let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage_err("stat", path, e)),
    };
    tracing::debug!(path = %path.display(), "Unreadable commit lock, using its mtime");
    Ok(Some(LockHolder {
        pid: None,
        since: DateTime::<Utc>::from(modified),
    }))
}

/// Snapshot and state store rooted at a local directory
pub struct FileStore {
    root: PathBuf,
    commit_mutex: Arc<Mutex<()>>,
}

impl FileStore {
    /// Opens (and if needed creates) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["generations", "staging", "state/sources", "state/adapted", "runs"] {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| storage_err("create directory", &path, e))?;
        }
        tracing::debug!(root = %root.display(), "Opened file store");
        Ok(Self {
            root,
            commit_mutex: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join("generations")
    }

    fn generation_dir(&self, version: u64) -> PathBuf {
        self.generations_dir().join(format!("{version:06}"))
    }

    fn staging_dir(&self, candidate: &CandidateId) -> PathBuf {
        self.root.join("staging").join(candidate.as_str())
    }

    fn watermark_path(&self, key: &SourceKey) -> PathBuf {
        self.root
            .join("state/sources")
            .join(format!("{}.json", key.as_str()))
    }

    fn adapted_path(&self, key: &SourceKey) -> PathBuf {
        self.root
            .join("state/adapted")
            .join(format!("{}.json", key.as_str()))
    }

    async fn generation_versions(&self) -> Result<Vec<u64>> {
        let dir = self.generations_dir();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| storage_err("list", &dir, e))?;
        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("list", &dir, e))?
        {
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn current_version(&self) -> Result<Option<u64>> {
        let path = self.root.join(CURRENT_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => text
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|e| storage_err("parse", &path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("read", &path, e)),
        }
    }

    async fn read_manifest(&self, version: u64) -> Result<Snapshot> {
        let path = self.generation_dir(version).join(MANIFEST_FILE);
        read_json(&path)
            .await?
            .ok_or_else(|| GridError::Storage(format!("Snapshot {version} has no manifest")))
    }

    /// Run history files, oldest first
    async fn run_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.root.join("runs");
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| storage_err("list", &dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("list", &dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                names.push(path);
            }
        }
        // Zero-padded start times make name order chronological
        names.sort();
        Ok(names)
    }

    /// Removes run records beyond the newest `retain`, except those of runs
    /// that produced a snapshot still on disk
    async fn prune_runs(&self, retain: usize) -> Result<usize> {
        let mut kept_runs = std::collections::HashSet::new();
        for version in self.generation_versions().await? {
            kept_runs.insert(self.read_manifest(version).await?.run_id);
        }

        let files = self.run_files().await?;
        let keep_from = files.len().saturating_sub(retain);
        let mut removed = 0;
        for path in files.iter().take(keep_from) {
            let run_id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.split_once('-'))
                .map(|(_, run_id)| run_id);
            if run_id.is_some_and(|id| kept_runs.contains(id)) {
                continue;
            }
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| storage_err("remove", path, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn try_create_lock(&self, path: &Path) -> std::io::Result<()> {
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let body = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
        file.write_all(&body).await?;
        file.flush().await
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn acquire_commit_lock(&self) -> Result<CommitGuard> {
        let process_guard = self.commit_mutex.clone().lock_owned().await;
        let lock_path = self.root.join(LOCK_FILE);

        match self.try_create_lock(&lock_path).await {
            Ok(()) => return Ok(CommitGuard::new(process_guard, Some(lock_path))),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(storage_err("create", &lock_path, e)),
        }

        let busy = |pid: Option<u32>| {
            let holder = pid.map_or_else(|| "unknown pid".to_string(), |pid| format!("pid {pid}"));
            GridError::Storage(format!(
                "Another commit is in progress ({holder}); lock file {}",
                lock_path.display()
            ))
        };

        if let Some(holder) = inspect_lock(&lock_path).await? {
            if !holder.is_stale() {
                return Err(busy(holder.pid));
            }
            tracing::warn!(
                path = %lock_path.display(),
                since = %holder.since,
                "Removing stale commit lock"
            );
            match tokio::fs::remove_file(&lock_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(storage_err("remove", &lock_path, e)),
            }
        }

        match self.try_create_lock(&lock_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(busy(None)),
            Err(e) => return Err(storage_err("create", &lock_path, e)),
        }
        Ok(CommitGuard::new(process_guard, Some(lock_path)))
    }

    async fn begin_candidate(&self) -> Result<CandidateId> {
        let candidate = CandidateId::generate();
        let dir = self.staging_dir(&candidate);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_err("create", &dir, e))?;
        let records = dir.join(RECORDS_FILE);
        tokio::fs::File::create(&records)
            .await
            .map_err(|e| storage_err("create", &records, e))?;
        tracing::debug!(candidate = %candidate, "Candidate generation created");
        Ok(candidate)
    }

    async fn write_batch(
        &self,
        candidate: &CandidateId,
        records: &[ReconciledRecord],
    ) -> Result<()> {
        let path = self.staging_dir(candidate).join(RECORDS_FILE);
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| storage_err("open", &path, e))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| storage_err("write", &path, e))?;
        file.flush()
            .await
            .map_err(|e| storage_err("flush", &path, e))?;
        Ok(())
    }

    async fn read_candidate(&self, candidate: &CandidateId) -> Result<Vec<ReconciledRecord>> {
        read_jsonl(&self.staging_dir(candidate).join(RECORDS_FILE)).await
    }

    async fn publish(
        &self,
        candidate: &CandidateId,
        manifest: &Snapshot,
        _guard: &CommitGuard,
    ) -> Result<()> {
        let staging = self.staging_dir(candidate);
        let records = staging.join(RECORDS_FILE);
        let file = tokio::fs::File::open(&records)
            .await
            .map_err(|e| storage_err("open", &records, e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_err("sync", &records, e))?;

        write_json_atomic(&staging.join(MANIFEST_FILE), manifest).await?;

        let target = self.generation_dir(manifest.version);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(GridError::Storage(format!(
                "Generation {} already exists",
                manifest.version
            )));
        }
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| storage_err("rename", &staging, e))?;

        write_atomic(
            &self.root.join(CURRENT_FILE),
            format!("{}\n", manifest.version).as_bytes(),
        )
        .await
    }

    async fn discard(&self, candidate: &CandidateId) -> Result<()> {
        let dir = self.staging_dir(candidate);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(candidate = %candidate, "Candidate generation discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("remove", &dir, e)),
        }
    }

    async fn next_version(&self) -> Result<u64> {
        let highest_generation = self.generation_versions().await?.last().copied();
        let current = self.current_version().await?;
        Ok(highest_generation.max(current).unwrap_or(0) + 1)
    }

    async fn current(&self) -> Result<Option<Snapshot>> {
        match self.current_version().await? {
            Some(version) => Ok(Some(self.read_manifest(version).await?)),
            None => Ok(None),
        }
    }

    async fn load_records(&self, version: u64) -> Result<Vec<ReconciledRecord>> {
        let path = self.generation_dir(version).join(RECORDS_FILE);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(GridError::Storage(format!(
                "Snapshot {version} is not retained"
            )));
        }
        read_jsonl(&path).await
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        for version in self.generation_versions().await? {
            snapshots.push(self.read_manifest(version).await?);
        }
        Ok(snapshots)
    }

    async fn set_current(&self, version: u64, _guard: &CommitGuard) -> Result<()> {
        // Fails if the generation is gone or incomplete
        self.read_manifest(version).await?;
        write_atomic(
            &self.root.join(CURRENT_FILE),
            format!("{version}\n").as_bytes(),
        )
        .await
    }

    async fn prune(&self, retain: usize, _guard: &CommitGuard) -> Result<Vec<u64>> {
        let current = self.current_version().await?;
        let versions = self.generation_versions().await?;
        let keep_from = versions.len().saturating_sub(retain);

        let mut removed = Vec::new();
        for (index, version) in versions.iter().enumerate() {
            if index >= keep_from || Some(*version) == current {
                continue;
            }
            let dir = self.generation_dir(*version);
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| storage_err("remove", &dir, e))?;
            removed.push(*version);
        }

        // Leftover candidates from interrupted runs; safe because the guard
        // excludes any concurrent commit
        let staging = self.root.join("staging");
        let mut entries = tokio::fs::read_dir(&staging)
            .await
            .map_err(|e| storage_err("list", &staging, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("list", &staging, e))?
        {
            let path = entry.path();
            tracing::debug!(path = %path.display(), "Removing leftover candidate");
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| storage_err("remove", &path, e))?;
        }

        let removed_runs = self.prune_runs(retain).await?;

        if !removed.is_empty() || removed_runs > 0 {
            tracing::info!(
                removed = ?removed,
                removed_runs = removed_runs,
                retain = retain,
                "Pruned old snapshots"
            );
        }
        Ok(removed)
    }
}

#[async_trait]
impl StateStorage for FileStore {
    async fn load_watermark(&self, source_key: &SourceKey) -> Result<Option<SourceWatermark>> {
        read_json(&self.watermark_path(source_key)).await
    }

    async fn save_watermark(&self, watermark: &SourceWatermark) -> Result<()> {
        write_json_atomic(&self.watermark_path(&watermark.source_key), watermark).await
    }

    async fn all_watermarks(&self) -> Result<Vec<SourceWatermark>> {
        let mut watermarks: Vec<SourceWatermark> =
            read_json_dir(&self.root.join("state/sources")).await?;
        watermarks.sort_by(|a, b| a.source_key.cmp(&b.source_key));
        Ok(watermarks)
    }

    async fn load_adapted(&self, source_key: &SourceKey) -> Result<Option<AdaptedRecords>> {
        read_json(&self.adapted_path(source_key)).await
    }

    async fn save_adapted(&self, adapted: &AdaptedRecords) -> Result<()> {
        write_json_atomic(&self.adapted_path(&adapted.source_key), adapted).await
    }

    async fn save_run(&self, run: &RunRecord) -> Result<()> {
        let name = format!(
            "{:015}-{}.json",
            run.started_at.timestamp_millis(),
            run.run_id
        );
        write_json_atomic(&self.root.join("runs").join(name), run).await
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut names = self.run_files().await?;
        names.reverse();

        let mut runs = Vec::new();
        for path in names.into_iter().take(limit) {
            if let Some(run) = read_json(&path).await? {
                runs.push(run);
            }
        }
        Ok(runs)
    }
}

fn storage_err(action: &str, path: &Path, error: impl Display) -> GridError {
    GridError::Storage(format!("Failed to {action} {}: {error}", path.display()))
}

/// Writes `bytes` to a sibling temp file and renames it over `path`
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GridError::Storage(format!("Invalid path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| storage_err("create", &tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| storage_err("write", &tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| storage_err("sync", &tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| storage_err("rename", &tmp, e))
}

async fn write_json_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| storage_err("parse", path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(storage_err("read", path, e)),
    }
}

async fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| storage_err("list", dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| storage_err("list", dir, e))?
    {
        let path = entry.path();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if is_json && !is_tmp {
            if let Some(item) = read_json(&path).await? {
                items.push(item);
            }
        }
    }
    Ok(items)
}

async fn read_jsonl(path: &Path) -> Result<Vec<ReconciledRecord>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| storage_err("read", path, e))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                GridError::Storage(format!(
                    "Corrupt record at line {} of {}: {e}",
                    index + 1,
                    path.display()
                ))
            })
        })
        .collect()
}
