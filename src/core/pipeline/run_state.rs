//! Run lifecycle
//!
//! ```text
//! Pending -> Fetching -> Adapting -> Reconciling -> Loading -> Committed
//!                                              \-> DryRun
//! any non-terminal state -> Failed
//! any state before the switch in Loading -> Cancelled
//! ```

use super::summary::RunSummary;
use crate::domain::ids::SourceKey;
use crate::domain::{GridError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Fetching,
    Adapting,
    Reconciling,
    Loading,
    Committed,
    /// Reconciled but deliberately not loaded
    DryRun,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Committed | RunState::DryRun | RunState::Failed | RunState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) | (_, Cancelled) => true,
            (Pending, Fetching)
            | (Fetching, Adapting)
            | (Adapting, Reconciling)
            | (Reconciling, Loading)
            | (Reconciling, DryRun)
            | (Loading, Committed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Fetching => "fetching",
            RunState::Adapting => "adapting",
            RunState::Reconciling => "reconciling",
            RunState::Loading => "loading",
            RunState::Committed => "committed",
            RunState::DryRun => "dry_run",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// Persisted record of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub full_rebuild: bool,
    /// Sources named on the command line; `None` for a scheduled run
    pub requested_sources: Option<Vec<SourceKey>>,
    pub dry_run: bool,
    pub state: RunState,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub summary: Option<RunSummary>,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<String>,
        full_rebuild: bool,
        requested_sources: Option<Vec<SourceKey>>,
        dry_run: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            started_at: now,
            finished_at: None,
            full_rebuild,
            requested_sources,
            dry_run,
            state: RunState::Pending,
            transitions: vec![Transition {
                state: RunState::Pending,
                at: now,
            }],
            summary: None,
        }
    }

    /// Move to `next`, recording the time
    ///
    /// # Errors
    ///
    /// Returns a state error for illegal transitions.
    pub fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(GridError::State(format!(
                "Illegal run transition {} -> {next}",
                self.state
            )));
        }
        let at = Utc::now();
        tracing::debug!(run_id = %self.run_id, from = %self.state, to = %next, "Run state change");
        self.state = next;
        self.transitions.push(Transition { state: next, at });
        if next.is_terminal() {
            self.finished_at = Some(at);
        }
        Ok(())
    }
}
