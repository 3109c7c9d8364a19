//! Reconciliation of candidate records into one value per key

pub mod anomaly;
pub mod reconciler;

pub use reconciler::{ReconcileOutcome, ReconcilePolicy, Reconciler, UnresolvedConflict};
