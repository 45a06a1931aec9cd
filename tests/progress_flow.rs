use std::sync::Arc;

use multivers_quest_back::{
    config::AppConfig,
    dao::game_store::MemoryGameStore,
    dto::{
        game::CreateTeamRequest,
        ws::ActivityCompletePayload,
    },
    error::ServiceError,
    services::{admin_service, game_service, progress_service},
    state::{
        AppState,
        progress::{ProgressAction, ProgressEvent, UnlockStatus},
    },
};

const FIRST: &str = "odyssee-spatiale";
const SECOND: &str = "cite-cyberpunk";

fn complete(universe_id: &str, activity_id: &str, score: u32) -> ProgressAction {
    ProgressAction::CompleteActivity {
        universe_id: universe_id.into(),
        activity_id: activity_id.into(),
        score,
    }
}

#[tokio::test]
async fn finishing_a_universe_unlocks_the_next_one() {
    let state = AppState::new(AppConfig::default());
    let device = "tablet-7";

    let initial = progress_service::load_progress(&state, device).await.unwrap();
    assert_eq!(initial.universes[FIRST].status, UnlockStatus::Unlocked);
    assert_eq!(initial.universes[SECOND].status, UnlockStatus::Locked);

    let locked = progress_service::apply_action(&state, device, complete(SECOND, "neon-hack", 10)).await;
    assert!(matches!(locked, Err(ServiceError::InvalidState(_))));

    progress_service::apply_action(&state, device, complete(FIRST, "orbit-sequence", 900))
        .await
        .unwrap();
    progress_service::apply_action(&state, device, complete(FIRST, "signal-decode", 500))
        .await
        .unwrap();
    let last = progress_service::apply_action(
        &state,
        device,
        complete(FIRST, "constellation-drawing", 400),
    )
    .await
    .unwrap();

    assert!(last.events.contains(&ProgressEvent::UniverseCompleted(FIRST.into())));
    assert!(last.events.contains(&ProgressEvent::UniverseUnlocked(SECOND.into())));
    assert_eq!(last.state.fragments, 1);
    assert_eq!(last.state.points, 1800);
    assert_eq!(last.state.universes[SECOND].status, UnlockStatus::Unlocked);
    assert_eq!(last.state.universes["royaume-medieval"].status, UnlockStatus::Locked);

    // a worse run never lowers the best score
    let worse = progress_service::apply_action(&state, device, complete(FIRST, "orbit-sequence", 100))
        .await
        .unwrap();
    assert_eq!(
        worse.state.universes[FIRST].activities["orbit-sequence"].best_score,
        900
    );
    assert_eq!(worse.state.points, 1800);
}

#[tokio::test]
async fn qr_saves_move_progress_between_devices() {
    let state = AppState::new(AppConfig::default());
    progress_service::apply_action(
        &state,
        "phone-a",
        ProgressAction::SetTeam {
            team_name: "Alpha".into(),
            avatar_style: Some("bottts".into()),
        },
    )
    .await
    .unwrap();
    progress_service::apply_action(&state, "phone-a", complete(FIRST, "signal-decode", 640))
        .await
        .unwrap();

    let export = progress_service::export_progress(&state, "phone-a").await.unwrap();
    assert!(export.length <= 2000);

    let imported = progress_service::import_progress(&state, "phone-b", export.payload)
        .await
        .unwrap();
    let original = progress_service::load_progress(&state, "phone-a").await.unwrap();
    assert_eq!(imported.state.team_name, "Alpha");
    assert_eq!(imported.state.points, original.points);
    assert_eq!(imported.state.fragments, original.fragments);
    assert_eq!(imported.state.universes, original.universes);

    let garbage = progress_service::import_progress(&state, "phone-b", "not a save".into()).await;
    assert!(matches!(garbage, Err(ServiceError::InvalidInput(_))));
}

#[tokio::test]
async fn match_completions_reach_the_device_progress() {
    let state = AppState::new(AppConfig::default());
    state.set_game_store(Arc::new(MemoryGameStore::new())).await;
    let team = game_service::register_team(
        &state,
        CreateTeamRequest {
            name: "Alpha".into(),
            avatar_style: None,
        },
    )
    .await
    .unwrap();
    admin_service::start_game(&state).await.unwrap();

    let outcome = game_service::complete_activity(
        &state,
        team.team.id,
        Some("phone-a"),
        ActivityCompletePayload {
            activity_id: "signal-decode".into(),
            universe_id: Some(FIRST.into()),
            kind: None,
            points: Some(720),
            metrics: None,
        },
    )
    .await
    .unwrap();

    let progress = outcome.progress.unwrap();
    assert_eq!(progress.points, 720);
    assert_eq!(
        progress.universes[FIRST].activities["signal-decode"].status,
        UnlockStatus::Completed
    );

    // survives a cache miss through the store
    state.progress_cache().clear();
    let reloaded = progress_service::load_progress(&state, "phone-a").await.unwrap();
    assert_eq!(reloaded.points, 720);
}

#[tokio::test]
async fn invalid_device_ids_are_rejected() {
    let state = AppState::new(AppConfig::default());
    let result = progress_service::load_progress(&state, "no spaces allowed").await;
    assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
}
