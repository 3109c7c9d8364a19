//! Snapshot commits and read access
//!
//! - [`loader`] - atomic commit, retention, rollback
//! - [`reader`] - [`SnapshotView`] queries and snapshot diffs

pub mod loader;
pub mod reader;

pub use loader::Loader;
pub use reader::{diff, SnapshotDiff, SnapshotQuery, SnapshotView, ValueChange};
