//! Last successfully adapted records of a source
//!
//! Partial runs and stale fallback reconcile against these instead of
//! re-fetching every source.

use crate::domain::ids::SourceKey;
use crate::domain::record::CanonicalRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedRecords {
    pub source_key: SourceKey,
    /// Hash of the artifact the records were parsed from
    pub content_hash: String,
    pub adapted_at: DateTime<Utc>,
    pub records: Vec<CanonicalRecord>,
}

impl AdaptedRecords {
    pub fn new(
        source_key: SourceKey,
        content_hash: impl Into<String>,
        records: Vec<CanonicalRecord>,
    ) -> Self {
        Self {
            source_key,
            content_hash: content_hash.into(),
            adapted_at: Utc::now(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
