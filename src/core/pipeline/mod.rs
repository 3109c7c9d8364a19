//! Run orchestration
//!
//! [`Pipeline`] ties the stages together; [`RunRecord`] tracks a run's
//! lifecycle and [`RunReport`] is what callers get back.

pub mod orchestrator;
pub mod run_state;
pub mod summary;

pub use orchestrator::{Pipeline, RunRequest};
pub use run_state::{RunRecord, RunState, Transition};
pub use summary::{
    DegradedSource, RunOutcome, RunReport, RunSummary, SourceDisposition, SourceReport,
};
