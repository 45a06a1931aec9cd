//! MultiversQuest Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multivers_quest_back::{
    config::{AppConfig, StorageBackend},
    dao::{
        game_store::{GameStore, MemoryGameStore},
        storage::StorageError,
    },
    routes,
    services::{storage_supervisor, ticker},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = StorageBackend::from_env();
    info!(?backend, "selected storage backend");

    let app_state = AppState::new(config);

    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_store(backend)
    }));
    tokio::spawn(storage_supervisor::run_persister(app_state.clone()));
    tokio::spawn(ticker::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Open the configured backend; the supervisor retries on failure.
async fn connect_store(backend: StorageBackend) -> Result<Arc<dyn GameStore>, StorageError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryGameStore::new())),
        #[cfg(feature = "couch-store")]
        StorageBackend::Couch => {
            use multivers_quest_back::dao::game_store::couchdb::{CouchConfig, CouchGameStore};

            let config = CouchConfig::from_env()?;
            Ok(Arc::new(CouchGameStore::connect(config).await?))
        }
        #[cfg(feature = "mongo-store")]
        StorageBackend::Mongo => {
            use multivers_quest_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

            let config = MongoConfig::from_env().await?;
            Ok(Arc::new(MongoGameStore::connect(config).await?))
        }
        #[allow(unreachable_patterns)]
        other => {
            warn!(backend = ?other, "backend not compiled in; using memory");
            Ok(Arc::new(MemoryGameStore::new()))
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
