//! Snapshot manifests
//!
//! The records of a snapshot live in the store; the manifest describes them
//! and is what the "current" pointer ultimately resolves to.

use super::ids::SourceKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest of a committed snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonically increasing generation number
    pub version: u64,

    /// Pipeline run that produced it
    pub run_id: String,

    pub created_at: DateTime<Utc>,

    pub record_count: usize,

    /// Checksum of the record set as stored
    pub checksum: String,

    /// Sources that contributed at least one candidate value
    pub sources: Vec<SourceKey>,

    /// Sources that were degraded during the producing run
    #[serde(default)]
    pub degraded_sources: Vec<SourceKey>,
}

/// Opaque handle of an uncommitted candidate generation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
