use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::{
    game_store::GameStore,
    models::{MATCH_STATE_KEY, MatchStateEntity, ProgressEntity},
    storage::StorageResult,
};

use super::{
    config::{CouchConfig, CouchCredentials},
    error::{CouchDaoError, CouchResult},
    models::{CouchMatchDocument, CouchProgressDocument, progress_doc_id},
};

/// [`GameStore`] backed by a CouchDB database over its HTTP API.
#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    database_url: Arc<str>,
    database: Arc<str>,
    credentials: Option<Arc<CouchCredentials>>,
}

impl CouchGameStore {
    /// Build the client and create the database when it does not exist yet.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            database_url: format!("{}/{}", config.base_url, config.database).into(),
            database: config.database.into(),
            credentials: config.credentials.map(Arc::new),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.as_deref() {
            Some(CouchCredentials { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            None => builder,
        }
    }

    fn request(&self, method: Method, doc_id: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.database_url, doc_id);
        self.authorized(self.client.request(method, url))
    }

    /// Send a database-level request and return its status.
    async fn database_call(&self, method: Method, op: &'static str) -> CouchResult<StatusCode> {
        self.authorized(self.client.request(method, self.database_url.as_ref()))
            .send()
            .await
            .map(|response| response.status())
            .map_err(|source| CouchDaoError::Database {
                op,
                database: self.database.to_string(),
                source,
            })
    }

    fn database_status(&self, op: &'static str, status: StatusCode) -> CouchDaoError {
        CouchDaoError::DatabaseStatus {
            op,
            database: self.database.to_string(),
            status,
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        match self.database_call(Method::GET, "lookup").await? {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(database = %self.database, "creating CouchDB database");
                match self.database_call(Method::PUT, "create").await? {
                    status if status.is_success() => Ok(()),
                    // created concurrently by another instance
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(self.database_status("create", status)),
                }
            }
            status => Err(self.database_status("lookup", status)),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                doc_id: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeDocument {
                        doc_id: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                doc_id: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Current `_rev` of a document, needed to overwrite it.
    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        #[derive(serde::Deserialize)]
        struct RevOnly {
            #[serde(rename = "_rev")]
            rev: Option<String>,
        }

        Ok(self
            .get_document::<RevOnly>(doc_id)
            .await?
            .and_then(|doc| doc.rev))
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                doc_id: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                doc_id: doc_id.to_string(),
            }),
            status => Err(CouchDaoError::RequestStatus {
                doc_id: doc_id.to_string(),
                status,
            }),
        }
    }

    /// Overwrite a document, retrying once with a fresh `_rev` when another
    /// writer got there first.
    async fn upsert_document<T, F>(&self, doc_id: &str, build: F) -> CouchResult<()>
    where
        T: Serialize,
        F: Fn(Option<String>) -> T,
    {
        let mut retried = false;
        loop {
            let rev = self.current_rev(doc_id).await?;
            match self.put_document(doc_id, &build(rev)).await {
                Err(CouchDaoError::RevisionConflict { .. }) if !retried => {
                    debug!(doc_id, "revision conflict; retrying with the latest revision");
                    retried = true;
                }
                other => return other,
            }
        }
    }
}

impl GameStore for CouchGameStore {
    fn save_match(&self, snapshot: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_document(MATCH_STATE_KEY, |rev| {
                    CouchMatchDocument::from((snapshot.clone(), rev))
                })
                .await
                .map_err(Into::into)
        })
    }

    fn load_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchMatchDocument>(MATCH_STATE_KEY)
                .await?;
            Ok(maybe_doc.map(|doc| doc.snapshot))
        })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = progress_doc_id(&progress.device_id);
            store
                .upsert_document(&doc_id, |rev| {
                    CouchProgressDocument::from((progress.clone(), rev))
                })
                .await
                .map_err(Into::into)
        })
    }

    fn find_progress(
        &self,
        device_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = progress_doc_id(&device_id);
            let maybe_doc = store.get_document::<CouchProgressDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.progress))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            match store.database_call(Method::GET, "health check").await? {
                status if status.is_success() => Ok(()),
                status => Err(store.database_status("health check", status).into()),
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
