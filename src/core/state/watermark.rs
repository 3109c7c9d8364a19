//! Per-source fetch watermarks
//!
//! A watermark records when a source was last attempted and last fetched
//! successfully, and which artifact content that success produced. The
//! registry uses `last_success_at` to decide which sources are due.

use crate::domain::ids::SourceKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fetch status of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Fetch or parse is in progress
    InProgress,
    /// New content fetched and adapted
    Completed,
    /// Fetched content matched the cached artifact
    Unchanged,
    /// Fetch or parse failed; the source was degraded
    Failed,
    /// Never attempted
    #[default]
    NotStarted,
}

/// Watermark for one source
///
/// # Examples
///
/// ```
/// use gridstats::core::state::watermark::{FetchStatus, SourceWatermarkBuilder};
/// use gridstats::domain::ids::SourceKey;
///
/// let watermark = SourceWatermarkBuilder::new(SourceKey::new("ember").unwrap())
///     .record_count(1200)
///     .build();
///
/// assert_eq!(watermark.record_count, 1200);
/// assert_eq!(watermark.status, FetchStatus::NotStarted);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWatermark {
    pub source_key: SourceKey,

    /// Start of the most recent attempt
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// End of the most recent successful fetch (changed or unchanged)
    pub last_success_at: Option<DateTime<Utc>>,

    /// Content hash of the last successfully adapted artifact
    pub content_hash: Option<String>,

    /// Cache path of that artifact
    pub artifact_path: Option<String>,

    /// Records produced by the last successful parse
    pub record_count: usize,

    pub status: FetchStatus,

    /// Message of the last failure, cleared on success
    pub last_error: Option<String>,

    pub consecutive_failures: u32,
}

impl SourceWatermark {
    pub fn is_in_progress(&self) -> bool {
        self.status == FetchStatus::InProgress
    }

    pub fn is_failed(&self) -> bool {
        self.status == FetchStatus::Failed
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.last_attempt_at = Some(at);
        self.status = FetchStatus::InProgress;
    }

    /// Records a fetch that produced new, successfully adapted content
    pub fn mark_completed(
        &mut self,
        at: DateTime<Utc>,
        content_hash: String,
        artifact_path: Option<String>,
        record_count: usize,
    ) {
        self.last_success_at = Some(at);
        self.content_hash = Some(content_hash);
        self.artifact_path = artifact_path;
        self.record_count = record_count;
        self.status = FetchStatus::Completed;
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    /// Records a fetch whose content matched the cached artifact
    pub fn mark_unchanged(&mut self, at: DateTime<Utc>) {
        self.last_success_at = Some(at);
        self.status = FetchStatus::Unchanged;
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = FetchStatus::Failed;
        self.last_error = Some(error.into());
        self.consecutive_failures += 1;
    }
}

/// Builder for creating SourceWatermark instances
pub struct SourceWatermarkBuilder {
    source_key: SourceKey,
    last_attempt_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    content_hash: Option<String>,
    record_count: usize,
    status: FetchStatus,
}

impl SourceWatermarkBuilder {
    pub fn new(source_key: SourceKey) -> Self {
        Self {
            source_key,
            last_attempt_at: None,
            last_success_at: None,
            content_hash: None,
            record_count: 0,
            status: FetchStatus::NotStarted,
        }
    }

    pub fn last_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(at);
        self
    }

    pub fn last_success_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_success_at = Some(at);
        self
    }

    pub fn content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn record_count(mut self, count: usize) -> Self {
        self.record_count = count;
        self
    }

    pub fn status(mut self, status: FetchStatus) -> Self {
        self.status = status;
        self
    }

    pub fn build(self) -> SourceWatermark {
        SourceWatermark {
            source_key: self.source_key,
            last_attempt_at: self.last_attempt_at,
            last_success_at: self.last_success_at,
            content_hash: self.content_hash,
            artifact_path: None,
            record_count: self.record_count,
            status: self.status,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}
