//! Snapshot and state storage
//!
//! Trait-based so the loader and state manager can be tested against
//! in-memory or failing stores.

pub mod factory;
pub mod file;
pub mod traits;

pub use factory::{open_store, StoreHandles};
pub use file::FileStore;
pub use traits::{CommitGuard, SnapshotStore, StateStorage};
