//! Append-only artifact cache
//!
//! Every fetched payload with new content is kept under
//! `<cache_dir>/<source>/<millis>-<hash prefix>.raw` with a JSON metadata
//! sidecar. Content seen before is never written twice; the earliest copy
//! and its metadata are handed back instead, so repeated fetches of the same
//! bytes carry the same observation time.

use crate::adapters::storage::file::write_atomic;
use crate::domain::ids::SourceKey;
use crate::domain::source::ArtifactMeta;
use crate::domain::{GridError, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_dir(&self, source_key: &SourceKey) -> PathBuf {
        self.root.join(source_key.as_str())
    }

    /// Earliest cached artifact of `source_key` with the given content hash
    pub async fn lookup(
        &self,
        source_key: &SourceKey,
        content_hash: &str,
    ) -> Result<Option<(ArtifactMeta, PathBuf)>> {
        let dir = self.source_dir(source_key);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_err("list", &dir, e)),
        };

        let mut sidecars = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| cache_err("list", &dir, e))?
        {
            let path = entry.path();
            let visible = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| !n.starts_with('.'))
                .unwrap_or(false);
            if visible && path.extension().and_then(|e| e.to_str()) == Some("json") {
                sidecars.push(path);
            }
        }
        // Names start with the fetch time, so lexical order is chronological
        sidecars.sort();

        for sidecar in sidecars {
            let bytes = tokio::fs::read(&sidecar)
                .await
                .map_err(|e| cache_err("read", &sidecar, e))?;
            let meta: ArtifactMeta = match serde_json::from_slice(&bytes) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(path = %sidecar.display(), error = %e, "Skipping unreadable cache metadata");
                    continue;
                }
            };
            let raw = sidecar.with_extension("raw");
            if meta.content_hash == content_hash && tokio::fs::try_exists(&raw).await.unwrap_or(false)
            {
                return Ok(Some((meta, raw)));
            }
        }
        Ok(None)
    }

    /// Store a new artifact and its metadata; returns the path of the raw bytes
    pub async fn store(&self, meta: &ArtifactMeta, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.source_dir(&meta.source_key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| cache_err("create", &dir, e))?;

        let hash_prefix: String = meta.content_hash.chars().take(16).collect();
        let stem = format!("{:015}-{hash_prefix}", meta.fetched_at.timestamp_millis());
        let raw = dir.join(format!("{stem}.raw"));
        let sidecar = dir.join(format!("{stem}.json"));

        // Raw bytes first: a sidecar without its payload is ignored by lookup
        write_atomic(&raw, bytes).await?;
        write_atomic(&sidecar, &serde_json::to_vec_pretty(meta)?).await?;

        tracing::debug!(
            source = %meta.source_key,
            hash = %meta.content_hash,
            path = %raw.display(),
            "Cached artifact"
        );
        Ok(raw)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| cache_err("read", path, e))
    }
}

fn cache_err(action: &str, path: &Path, error: std::io::Error) -> GridError {
    GridError::Storage(format!(
        "Artifact cache failed to {action} {}: {error}",
        path.display()
    ))
}
