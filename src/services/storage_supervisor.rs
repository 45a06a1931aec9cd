use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    error::ServiceError,
    services::sse_events,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;
/// Quiet period collapsing bursts of changes into one snapshot write.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_secs(2);

/// Reconnect to the storage backend and keep the shared state in degraded mode when it is unavailable.
///
/// The persisted match is restored on the first successful connection only;
/// later reconnections keep the in-memory match.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;
    let mut restored = false;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_game_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                if !restored {
                    restored = true;
                    if let Err(err) = restore_match(&state, store.as_ref()).await {
                        warn!(error = %err, "failed to restore the persisted match; starting fresh");
                    }
                }

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(_) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!(
                                            "storage reconnection succeeded after health check failure"
                                        );
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering in degraded mode"
                                            );
                                            state.update_degraded(true).await;
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.update_degraded(false).await;
                                // writes may have been skipped while degraded
                                state.mark_dirty();
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted storage reconnect attempts; staying in degraded mode"
                                );
                                state.clear_game_store().await;
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Load the persisted match into the shared state and announce it.
pub async fn restore_match(state: &SharedState, store: &dyn GameStore) -> Result<(), ServiceError> {
    let Some(entity) = store.load_match().await? else {
        info!("no persisted match found");
        return Ok(());
    };
    let teams = entity.teams.len();
    let status = state.restore_match(entity).await?;
    info!(?status, teams, "restored persisted match");

    let snapshot = state.game_snapshot().await;
    sse_events::broadcast_full_state(state, &snapshot);
    Ok(())
}

/// Write the match snapshot whenever it changed, at most once per debounce window.
pub async fn run_persister(state: SharedState) {
    loop {
        state.dirty().notified().await;
        sleep(PERSIST_DEBOUNCE).await;
        persist_once(&state).await;
    }
}

/// Save the current match if storage is available; otherwise keep it dirty.
pub async fn persist_once(state: &SharedState) {
    let Ok(store) = state.require_game_store().await else {
        debug!("storage unavailable; match snapshot not written");
        return;
    };
    let entity = state.match_entity().await;
    match store.save_match(entity).await {
        Ok(()) => debug!("match snapshot written"),
        Err(err) => {
            warn!(error = %err, "failed to write match snapshot; will retry");
            state.mark_dirty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::MemoryGameStore,
        state::{AppState, state_machine::GameStatus},
    };

    #[tokio::test]
    async fn snapshots_round_trip_through_storage() {
        let store = Arc::new(MemoryGameStore::new());
        let state = AppState::new(AppConfig::default());
        state.set_game_store(store.clone()).await;
        state
            .with_match_mut(|game| game.add_team("Alpha", None))
            .await
            .unwrap();
        persist_once(&state).await;

        let restarted = AppState::new(AppConfig::default());
        restore_match(&restarted, store.as_ref()).await.unwrap();
        let snapshot = restarted.game_snapshot().await;
        assert_eq!(snapshot.teams.len(), 1);
        assert_eq!(snapshot.teams[0].name, "Alpha");
        assert!(!snapshot.teams[0].connected);
        assert_eq!(snapshot.status, GameStatus::Lobby);
    }

    #[tokio::test]
    async fn nothing_is_written_while_degraded() {
        let store = MemoryGameStore::new();
        let state = AppState::new(AppConfig::default());
        persist_once(&state).await;
        assert!(store.load_match().await.unwrap().is_none());
    }
}
