use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc};
use tokio::{sync::RwLock, time::sleep};
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoMatchDocument, MongoProgressDocument, doc_id},
};
use crate::{
    dao::{
        game_store::GameStore,
        models::{MATCH_STATE_KEY, MatchStateEntity, ProgressEntity},
        storage::StorageResult,
    },
    state::progress::PROGRESS_STORAGE_KEY,
};

/// [`GameStore`] backed by MongoDB: one collection for the match snapshot,
/// one for device progress.
#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // keeps the connection pool alive
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_millis(250);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(5);

impl MongoState {
    /// Build a client and wait until the server answers a ping.
    async fn open(config: &MongoConfig) -> MongoResult<Self> {
        let client = Client::with_options(config.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&config.database_name);

        let mut attempt = 1;
        let mut delay = CONNECT_BACKOFF;
        loop {
            match database.run_command(doc! { "ping": 1 }).await {
                Ok(_) => return Ok(Self { client, database }),
                Err(source) if attempt >= CONNECT_ATTEMPTS => {
                    return Err(MongoDaoError::InitialPing {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    debug!(attempt, error = %err, "MongoDB ping failed; retrying");
                    sleep(delay).await;
                    delay = (delay * 2).min(CONNECT_BACKOFF_MAX);
                    attempt += 1;
                }
            }
        }
    }
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let fresh = MongoState::open(&self.config).await?;
        *self.state.write().await = fresh;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let state = MongoState::open(&config).await?;
        let inner = Arc::new(MongoInner {
            state: RwLock::new(state),
            config,
        });

        Ok(Self { inner })
    }

    async fn match_collection(&self) -> Collection<MongoMatchDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMatchDocument>(MATCH_STATE_KEY)
    }

    async fn progress_collection(&self) -> Collection<MongoProgressDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoProgressDocument>(PROGRESS_STORAGE_KEY)
    }

    async fn save_match(&self, snapshot: MatchStateEntity) -> MongoResult<()> {
        let document: MongoMatchDocument = snapshot.into();
        self.match_collection()
            .await
            .replace_one(doc_id(MATCH_STATE_KEY), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { source })?;
        Ok(())
    }

    async fn load_match(&self) -> MongoResult<Option<MatchStateEntity>> {
        let document = self
            .match_collection()
            .await
            .find_one(doc_id(MATCH_STATE_KEY))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { source })?;
        Ok(document.map(Into::into))
    }

    async fn save_progress(&self, progress: ProgressEntity) -> MongoResult<()> {
        let device_id = progress.device_id.clone();
        let document: MongoProgressDocument = progress.into();
        self.progress_collection()
            .await
            .replace_one(doc_id(&device_id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveProgress { device_id, source })?;
        Ok(())
    }

    async fn find_progress(&self, device_id: String) -> MongoResult<Option<ProgressEntity>> {
        let document = self
            .progress_collection()
            .await
            .find_one(doc_id(&device_id))
            .await
            .map_err(|source| MongoDaoError::LoadProgress { device_id, source })?;
        Ok(document.map(Into::into))
    }
}

impl GameStore for MongoGameStore {
    fn save_match(&self, snapshot: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(snapshot).await.map_err(Into::into) })
    }

    fn load_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_match().await.map_err(Into::into) })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_progress(progress).await.map_err(Into::into) })
    }

    fn find_progress(
        &self,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_progress(device_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
