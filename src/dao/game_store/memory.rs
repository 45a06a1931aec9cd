//! Process-local store used when no database is configured and in tests.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::dao::{
    game_store::GameStore,
    models::{MatchStateEntity, ProgressEntity},
    storage::StorageResult,
};

#[derive(Default)]
struct MemoryInner {
    snapshot: Option<MatchStateEntity>,
    progress: HashMap<String, ProgressEntity>,
}

/// [`GameStore`] keeping everything in memory; data is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryGameStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for MemoryGameStore {
    fn save_match(&self, snapshot: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.snapshot = Some(snapshot);
            Ok(())
        })
    }

    fn load_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.snapshot.clone()) })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .write()
                .await
                .progress
                .insert(progress.device_id.clone(), progress);
            Ok(())
        })
    }

    fn find_progress(
        &self,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.progress.get(&device_id).cloned()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
