//! State manager for watermarks, adapted-record caches and run records

use crate::adapters::storage::traits::StateStorage;
use crate::core::pipeline::run_state::RunRecord;
use crate::core::state::adapted::AdaptedRecords;
use crate::core::state::watermark::{SourceWatermark, SourceWatermarkBuilder};
use crate::domain::ids::SourceKey;
use crate::domain::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Front for whichever [`StateStorage`] backend is configured
pub struct StateManager {
    storage: Arc<dyn StateStorage + Send + Sync>,
}

impl StateManager {
    pub fn new_with_storage(storage: Arc<dyn StateStorage + Send + Sync>) -> Self {
        Self { storage }
    }

    /// Load a watermark, or `Ok(None)` for a source never attempted
    pub async fn load_watermark(&self, source_key: &SourceKey) -> Result<Option<SourceWatermark>> {
        self.storage.load_watermark(source_key).await
    }

    /// Load a watermark, or a fresh `NotStarted` one
    pub async fn watermark_or_default(&self, source_key: &SourceKey) -> Result<SourceWatermark> {
        Ok(self
            .load_watermark(source_key)
            .await?
            .unwrap_or_else(|| SourceWatermarkBuilder::new(source_key.clone()).build()))
    }

    pub async fn save_watermark(&self, watermark: &SourceWatermark) -> Result<()> {
        tracing::debug!(
            source = %watermark.source_key,
            status = ?watermark.status,
            records = watermark.record_count,
            "Saving watermark"
        );
        self.storage.save_watermark(watermark).await
    }

    pub async fn all_watermarks(&self) -> Result<Vec<SourceWatermark>> {
        self.storage.all_watermarks().await
    }

    /// Last successful fetch time per source, as the registry expects it
    pub async fn last_success_map(&self) -> Result<HashMap<SourceKey, DateTime<Utc>>> {
        Ok(self
            .all_watermarks()
            .await?
            .into_iter()
            .filter_map(|w| w.last_success_at.map(|at| (w.source_key, at)))
            .collect())
    }

    pub async fn load_adapted(&self, source_key: &SourceKey) -> Result<Option<AdaptedRecords>> {
        self.storage.load_adapted(source_key).await
    }

    pub async fn save_adapted(&self, adapted: &AdaptedRecords) -> Result<()> {
        self.storage.save_adapted(adapted).await
    }

    pub async fn record_run(&self, run: &RunRecord) -> Result<()> {
        self.storage.save_run(run).await
    }

    /// Most recent runs, newest first
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.storage.list_runs(limit).await
    }
}
