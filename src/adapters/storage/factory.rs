//! Store factory
//!
//! Builds the snapshot store and the state storage from configuration. Both
//! are served by one [`FileStore`] so they share a root directory.

use crate::adapters::storage::file::FileStore;
use crate::adapters::storage::traits::{SnapshotStore, StateStorage};
use crate::config::schema::StoreConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Snapshot store and state storage opened from the same backend
pub type StoreHandles = (
    Arc<dyn SnapshotStore + Send + Sync>,
    Arc<dyn StateStorage + Send + Sync>,
);

/// Open the configured store
///
/// # Errors
///
/// Returns an error if the store directories cannot be created
pub async fn open_store(config: &StoreConfig) -> Result<StoreHandles> {
    tracing::info!(path = %config.path, "Opening file store");
    let store = Arc::new(FileStore::open(&config.path).await?);
    Ok((
        store.clone() as Arc<dyn SnapshotStore + Send + Sync>,
        store as Arc<dyn StateStorage + Send + Sync>,
    ))
}
