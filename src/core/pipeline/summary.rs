//! Run summaries and outcomes

use crate::domain::ids::SourceKey;
use crate::domain::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What happened to one source during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDisposition {
    /// New content fetched and adapted
    Fetched,
    /// Content identical to the last adapted artifact; cached records used
    Unchanged,
    /// Not fetched this run; last adapted records used
    Reused,
    /// Fetch or parse failed; last adapted records used instead
    StaleFallback,
    /// Fetch or parse failed and nothing could stand in for it
    Degraded,
    /// Not fetched this run and never adapted before
    Missing,
    /// Not attempted because the run was cancelled
    Cancelled,
}

impl fmt::Display for SourceDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceDisposition::Fetched => "fetched",
            SourceDisposition::Unchanged => "unchanged",
            SourceDisposition::Reused => "reused",
            SourceDisposition::StaleFallback => "stale fallback",
            SourceDisposition::Degraded => "degraded",
            SourceDisposition::Missing => "missing",
            SourceDisposition::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_key: SourceKey,
    pub disposition: SourceDisposition,
    /// Candidate records the source contributed to this run
    pub records: usize,
    pub content_hash: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A source that did not contribute fresh data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedSource {
    pub source_key: SourceKey,
    pub reason: String,
}

/// Counters and per-source reports of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub sources: Vec<SourceReport>,
    pub degraded: Vec<DegradedSource>,
    /// Records fed to the reconciler
    pub candidate_records: usize,
    pub reconciled_records: usize,
    pub conflicts: usize,
    pub anomalies: usize,
    /// Keys left out under `require_agreement`, with the reason
    pub unresolved: Vec<String>,
    pub snapshot_version: Option<u64>,
    pub checksum: Option<String>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn degraded_keys(&self) -> Vec<SourceKey> {
        self.degraded.iter().map(|d| d.source_key.clone()).collect()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            sources = self.sources.len(),
            degraded = self.degraded.len(),
            candidates = self.candidate_records,
            reconciled = self.reconciled_records,
            conflicts = self.conflicts,
            anomalies = self.anomalies,
            unresolved = self.unresolved.len(),
            snapshot = ?self.snapshot_version,
            duration_ms = self.duration_ms,
            "Run finished"
        );

        if !self.degraded.is_empty() {
            tracing::warn!(
                degraded = ?self.degraded_keys(),
                "Run completed with degraded sources"
            );
        }
    }
}

/// Final result of a run, mapped onto process exit codes
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Committed(Snapshot),
    CommittedWithDegradedSources(Snapshot, Vec<DegradedSource>),
    /// Reconciled without loading
    DryRun {
        records: usize,
        degraded: Vec<DegradedSource>,
    },
    Failed(String),
    Cancelled,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Committed(_) => 0,
            RunOutcome::CommittedWithDegradedSources(..) => 1,
            RunOutcome::DryRun { degraded, .. } if degraded.is_empty() => 0,
            RunOutcome::DryRun { .. } => 1,
            RunOutcome::Failed(_) => 5,
            RunOutcome::Cancelled => 130,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            RunOutcome::Committed(snapshot) | RunOutcome::CommittedWithDegradedSources(snapshot, _) => {
                Some(snapshot)
            }
            _ => None,
        }
    }
}

/// Outcome plus summary, as returned to the CLI
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub summary: RunSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot() -> Snapshot {
        Snapshot {
            version: 1,
            run_id: "r".to_string(),
            created_at: Utc::now(),
            record_count: 0,
            checksum: String::new(),
            sources: vec![],
            degraded_sources: vec![],
        }
    }

    #[test]
    fn test_exit_codes() {
        let degraded = vec![DegradedSource {
            source_key: SourceKey::new("iea").unwrap(),
            reason: "timeout".to_string(),
        }];

        assert_eq!(RunOutcome::Committed(snapshot()).exit_code(), 0);
        assert_eq!(
            RunOutcome::CommittedWithDegradedSources(snapshot(), degraded.clone()).exit_code(),
            1
        );
        assert_eq!(
            RunOutcome::DryRun {
                records: 3,
                degraded: vec![]
            }
            .exit_code(),
            0
        );
        assert_eq!(RunOutcome::DryRun { records: 3, degraded }.exit_code(), 1);
        assert_eq!(RunOutcome::Failed("x".to_string()).exit_code(), 5);
        assert_eq!(RunOutcome::Cancelled.exit_code(), 130);
    }
}
