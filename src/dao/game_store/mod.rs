#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

pub use memory::MemoryGameStore;

use crate::dao::models::{MatchStateEntity, ProgressEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer for the match snapshot and device progress.
pub trait GameStore: Send + Sync {
    /// Replace the persisted match snapshot.
    fn save_match(&self, snapshot: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the persisted match snapshot, if any.
    fn load_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>>;
    /// Upsert the progress document of a device.
    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the progress document of a device.
    fn find_progress(
        &self,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>>;
    /// Cheap liveness check.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
