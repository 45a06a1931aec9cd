//! Per-device progress: cached in memory, persisted when storage is available.

use std::time::SystemTime;

use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::{
    dao::models::ProgressEntity,
    dto::{
        progress::{ExportResponse, ProgressActionResponse},
        validation::validate_device_id,
    },
    error::ServiceError,
    state::{
        AppState,
        progress::{PlayerProgress, ProgressAction, ProgressEvent, now_millis, reduce},
    },
};

fn check_device_id(device_id: &str) -> Result<(), ServiceError> {
    validate_device_id(device_id).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| "invalid device id".into()),
        )
    })
}

/// Current progress of a device.
///
/// Devices without a successful update are read from storage (or start from
/// the default progression) without being cached, so lookups alone never grow
/// the cache. Unreadable stored documents are replaced by defaults.
pub async fn load_progress(
    state: &AppState,
    device_id: &str,
) -> Result<PlayerProgress, ServiceError> {
    check_device_id(device_id)?;
    if let Some(cached) = state.progress_cache().get(device_id) {
        return Ok(cached.clone());
    }
    Ok(fetch_progress(state, device_id).await)
}

async fn fetch_progress(state: &AppState, device_id: &str) -> PlayerProgress {
    let config = state.config();
    let catalogue = config.catalogue();
    let stored = match state.game_store().await {
        Some(store) if !state.is_degraded().await => {
            match store.find_progress(device_id.to_string()).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(device_id, error = %err, "failed to load progress; using defaults");
                    None
                }
            }
        }
        _ => None,
    };

    match stored {
        Some(entity) => PlayerProgress::from_stored(entity.state, catalogue).unwrap_or_else(|err| {
            warn!(device_id, error = %err, "stored progress is corrupted; resetting to defaults");
            PlayerProgress::new(catalogue)
        }),
        None => PlayerProgress::new(catalogue),
    }
}

/// Reduce `action` against the device progress and persist the result.
///
/// The read, the reduction and the write-back happen under the device's cache
/// entry lock, so concurrent updates of one device apply one after the other.
/// Storage is written after the lock is released.
pub async fn apply_action(
    state: &AppState,
    device_id: &str,
    action: ProgressAction,
) -> Result<ProgressActionResponse, ServiceError> {
    check_device_id(device_id)?;
    let config = state.config();
    let catalogue = config.catalogue();
    let cache = state.progress_cache();

    let reduction = loop {
        if let Some(mut current) = cache.get_mut(device_id) {
            let reduction = reduce(&current, catalogue, action)?;
            *current = reduction.state.clone();
            break reduction;
        }

        let loaded = fetch_progress(state, device_id).await;
        match cache.entry(device_id.to_string()) {
            // another update cached the device while it was loading
            Entry::Occupied(_) => continue,
            Entry::Vacant(slot) => {
                let reduction = reduce(&loaded, catalogue, action)?;
                slot.insert(reduction.state.clone());
                break reduction;
            }
        }
    };

    persist_progress(state, device_id, &reduction.state).await;
    debug!(device_id, events = reduction.events.len(), "progress updated");

    Ok(ProgressActionResponse {
        state: reduction.state,
        events: reduction.events,
    })
}

/// QR save payload of a device.
pub async fn export_progress(
    state: &AppState,
    device_id: &str,
) -> Result<ExportResponse, ServiceError> {
    let progress = load_progress(state, device_id).await?;
    let payload = progress.export_save(now_millis())?;
    Ok(ExportResponse::new(payload))
}

/// Replace a device progress with a scanned save payload.
pub async fn import_progress(
    state: &AppState,
    device_id: &str,
    payload: String,
) -> Result<ProgressActionResponse, ServiceError> {
    apply_action(state, device_id, ProgressAction::ImportSave { payload }).await
}

/// Mirror a match completion into the device progress.
///
/// Returns the new progress, or `None` when the completion does not apply to
/// this device (locked universe, unknown device); those cases are only logged.
pub async fn merge_completion(
    state: &AppState,
    device_id: &str,
    universe_id: &str,
    activity_id: &str,
    score: u32,
) -> Option<(PlayerProgress, Vec<ProgressEvent>)> {
    let action = ProgressAction::CompleteActivity {
        universe_id: universe_id.to_string(),
        activity_id: activity_id.to_string(),
        score,
    };
    match apply_action(state, device_id, action).await {
        Ok(response) => Some((response.state, response.events)),
        Err(err) => {
            warn!(device_id, activity_id, error = %err, "could not merge completion into device progress");
            None
        }
    }
}

async fn persist_progress(state: &AppState, device_id: &str, progress: &PlayerProgress) {
    let Some(store) = state.game_store().await else {
        debug!(device_id, "no storage installed; progress kept in memory");
        return;
    };
    let value = match serde_json::to_value(progress) {
        Ok(value) => value,
        Err(err) => {
            warn!(device_id, error = %err, "failed to encode progress");
            return;
        }
    };
    let entity = ProgressEntity {
        device_id: device_id.to_string(),
        state: value,
        updated_at: SystemTime::now(),
    };
    if let Err(err) = store.save_progress(entity).await {
        warn!(device_id, error = %err, "failed to persist progress; kept in memory");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::{GameStore, MemoryGameStore},
        state::{catalogue::fixtures::small_catalogue, progress::UnlockStatus},
    };

    fn config() -> AppConfig {
        AppConfig::default().with_catalogue(small_catalogue())
    }

    #[tokio::test]
    async fn progress_survives_a_cache_miss_through_storage() {
        let store = MemoryGameStore::new();
        let state = AppState::new(config());
        state.set_game_store(Arc::new(store.clone())).await;

        apply_action(
            &state,
            "phone-1",
            ProgressAction::CompleteActivity {
                universe_id: "space".into(),
                activity_id: "space-seq".into(),
                score: 700,
            },
        )
        .await
        .unwrap();

        let fresh = AppState::new(config());
        fresh.set_game_store(Arc::new(store)).await;
        let progress = load_progress(&fresh, "phone-1").await.unwrap();
        assert_eq!(progress.points, 700);
        assert_eq!(
            progress.activity("space", "space-seq").unwrap().status,
            UnlockStatus::Completed
        );
    }

    #[tokio::test]
    async fn corrupted_documents_fall_back_to_defaults() {
        let store = MemoryGameStore::new();
        store
            .save_progress(ProgressEntity {
                device_id: "phone-2".into(),
                state: json!({"teamName": 12}),
                updated_at: SystemTime::now(),
            })
            .await
            .unwrap();
        let state = AppState::new(config());
        state.set_game_store(Arc::new(store)).await;

        let progress = load_progress(&state, "phone-2").await.unwrap();
        assert_eq!(progress, PlayerProgress::new(&small_catalogue()));
    }

    #[tokio::test]
    async fn rejected_actions_keep_the_previous_state() {
        let state = AppState::new(config());
        let err = apply_action(
            &state,
            "phone-3",
            ProgressAction::CompleteActivity {
                universe_id: "ocean".into(),
                activity_id: "ocean-seq".into(),
                score: 10,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(load_progress(&state, "phone-3").await.unwrap().points, 0);

        assert!(matches!(
            load_progress(&state, "bad id").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn lookups_do_not_fill_the_cache() {
        let state = AppState::new(config());
        for n in 0..20 {
            load_progress(&state, &format!("visitor-{n}")).await.unwrap();
        }
        export_progress(&state, "visitor-x").await.unwrap();
        assert!(state.progress_cache().is_empty());

        let failed = apply_action(
            &state,
            "visitor-y",
            ProgressAction::UnlockUniverse {
                universe_id: "desert".into(),
            },
        )
        .await;
        assert!(failed.is_err());
        assert!(state.progress_cache().is_empty());

        apply_action(&state, "visitor-1", ProgressAction::Reset)
            .await
            .unwrap();
        assert_eq!(state.progress_cache().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_on_one_device_are_all_kept() {
        let state = AppState::new(config());
        for round in 0..200 {
            let device = format!("tablet-{round}");
            let barrier = Arc::new(tokio::sync::Barrier::new(2));
            let tasks: Vec<_> = ["space-seq", "space-decode"]
                .into_iter()
                .map(|activity| {
                    let state = state.clone();
                    let device = device.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        apply_action(
                            &state,
                            &device,
                            ProgressAction::CompleteActivity {
                                universe_id: "space".into(),
                                activity_id: activity.into(),
                                score: 100,
                            },
                        )
                        .await
                        .unwrap();
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let progress = load_progress(&state, &device).await.unwrap();
            assert_eq!(
                progress.universe_status("space"),
                Some(UnlockStatus::Completed),
                "round {round} lost an update"
            );
            assert_eq!(progress.points, 200);
        }
    }

    #[tokio::test]
    async fn export_then_import_restores_progress() {
        let state = AppState::new(config());
        apply_action(
            &state,
            "phone-4",
            ProgressAction::SetTeam {
                team_name: "Alpha".into(),
                avatar_style: None,
            },
        )
        .await
        .unwrap();
        let exported = export_progress(&state, "phone-4").await.unwrap();
        assert_eq!(exported.length, exported.payload.len());

        let imported = import_progress(&state, "phone-5", exported.payload)
            .await
            .unwrap();
        assert_eq!(imported.state.team_name, "Alpha");
    }
}
