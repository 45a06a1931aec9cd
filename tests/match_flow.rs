use std::{sync::Arc, time::SystemTime};

use multivers_quest_back::{
    config::AppConfig,
    dao::game_store::{GameStore, MemoryGameStore},
    dto::{
        admin::{ScenarioRequest, ScoreAdjustmentRequest},
        game::CreateTeamRequest,
        ws::{ActivityCompletePayload, ActivityMetrics},
    },
    error::ServiceError,
    services::{admin_service, game_service, storage_supervisor, ticker},
    state::{AppState, SharedState, mirror::GameMirror, state_machine::GameStatus},
};
use uuid::Uuid;

async fn register(state: &SharedState, name: &str) -> Uuid {
    game_service::register_team(
        state,
        CreateTeamRequest {
            name: name.into(),
            avatar_style: None,
        },
    )
    .await
    .unwrap()
    .team
    .id
}

fn completion(activity_id: &str) -> ActivityCompletePayload {
    ActivityCompletePayload {
        activity_id: activity_id.into(),
        universe_id: None,
        kind: None,
        points: None,
        metrics: None,
    }
}

#[tokio::test]
async fn a_match_from_lobby_to_final_ranking() {
    let state = AppState::new(AppConfig::default());
    let alpha = register(&state, "Alpha").await;
    let beta = register(&state, "Beta").await;

    // completions only count while the game runs
    let early = game_service::complete_activity(
        &state,
        alpha,
        None,
        ActivityCompletePayload {
            points: Some(100),
            ..completion("orbit-sequence")
        },
    )
    .await;
    assert!(matches!(early, Err(ServiceError::InvalidState(_))));

    admin_service::start_game(&state).await.unwrap();

    let outcome = game_service::complete_activity(
        &state,
        alpha,
        None,
        ActivityCompletePayload {
            metrics: Some(ActivityMetrics {
                errors: 0,
                duration_secs: 12,
            }),
            ..completion("orbit-sequence")
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome.points, 1200);

    let replay = game_service::complete_activity(
        &state,
        alpha,
        None,
        ActivityCompletePayload {
            points: Some(10),
            ..completion("orbit-sequence")
        },
    )
    .await;
    assert!(replay.is_err());

    let capped = game_service::complete_activity(
        &state,
        beta,
        None,
        ActivityCompletePayload {
            points: Some(50_000),
            ..completion("netrunner-quiz")
        },
    )
    .await
    .unwrap();
    assert_eq!(capped.points, 500);

    admin_service::adjust_score(
        &state,
        ScoreAdjustmentRequest {
            team_id: beta,
            delta: 700,
            reason: Some("bonus".into()),
        },
    )
    .await
    .unwrap();

    admin_service::end_game(&state).await.unwrap();
    let ranking = game_service::ranking(&state).await;
    assert_eq!(state.status().await, GameStatus::Ended);
    assert_eq!(ranking[0].team_id, alpha);
    assert_eq!(ranking[1].team_id, beta);
    assert_eq!(ranking[0].rank, 1);
    assert_eq!(ranking[1].rank, 1);

    let late = game_service::register_team(
        &state,
        CreateTeamRequest {
            name: "Gamma".into(),
            avatar_style: None,
        },
    )
    .await;
    assert!(late.is_err());
}

#[tokio::test]
async fn mirror_converges_on_the_public_stream() {
    let state = AppState::new(AppConfig::default().with_game_duration_secs(120));
    let mut mirror = GameMirror::new(state.config().history_limit());
    mirror.on_connect();
    let initial = serde_json::to_value(state.game_snapshot().await).unwrap();
    mirror.apply("game:fullState", initial).unwrap();

    let mut events = state.public_sse().subscribe();

    let alpha = register(&state, "Alpha").await;
    let beta = register(&state, "Beta").await;
    admin_service::start_game(&state).await.unwrap();
    admin_service::set_phase(&state, "Acte II".into()).await.unwrap();
    game_service::complete_activity(
        &state,
        beta,
        None,
        ActivityCompletePayload {
            points: Some(400),
            ..completion("signal-decode")
        },
    )
    .await
    .unwrap();
    admin_service::adjust_score(
        &state,
        ScoreAdjustmentRequest {
            team_id: alpha,
            delta: 150,
            reason: None,
        },
    )
    .await
    .unwrap();
    admin_service::trigger_scenario(
        &state,
        ScenarioRequest {
            effect: "glitch".into(),
            duration_secs: Some(30),
            message: None,
        },
    )
    .await
    .unwrap();
    ticker::tick_once(&state, SystemTime::now()).await;
    admin_service::pause_game(&state).await.unwrap();

    while let Ok(event) = events.try_recv() {
        let name = event.event.unwrap_or_default();
        let data = serde_json::from_str(&event.data).unwrap();
        mirror.apply(&name, data).unwrap();
    }

    assert!(!mirror.needs_resync());
    assert_eq!(mirror.snapshot(), &state.game_snapshot().await);
    assert_eq!(mirror.snapshot().global_timer, 119);
    assert_eq!(mirror.snapshot().status, GameStatus::Paused);
}

#[tokio::test]
async fn reset_clears_the_match_and_reopens_the_lobby() {
    let state = AppState::new(AppConfig::default());
    register(&state, "Alpha").await;
    admin_service::start_game(&state).await.unwrap();
    admin_service::end_game(&state).await.unwrap();

    let snapshot = game_service::reset_game(&state).await.unwrap();
    assert_eq!(snapshot.status, GameStatus::Lobby);
    assert!(snapshot.teams.is_empty());
    assert_eq!(
        snapshot.global_timer,
        state.config().game_duration_secs()
    );
    register(&state, "Alpha").await;
}

#[tokio::test]
async fn a_running_match_survives_a_restart_paused() {
    let store = Arc::new(MemoryGameStore::new());
    let state = AppState::new(AppConfig::default());
    state.set_game_store(store.clone()).await;

    let alpha = register(&state, "Alpha").await;
    admin_service::start_game(&state).await.unwrap();
    game_service::complete_activity(
        &state,
        alpha,
        None,
        ActivityCompletePayload {
            points: Some(300),
            ..completion("constellation-drawing")
        },
    )
    .await
    .unwrap();
    storage_supervisor::persist_once(&state).await;
    assert!(store.load_match().await.unwrap().is_some());

    let restarted = AppState::new(AppConfig::default());
    storage_supervisor::restore_match(&restarted, store.as_ref())
        .await
        .unwrap();

    assert_eq!(restarted.status().await, GameStatus::Paused);
    let teams = game_service::list_teams(&restarted).await;
    assert_eq!(teams[0].score, 300);
    assert_eq!(teams[0].completed_activities.len(), 1);
    admin_service::resume_game(&restarted).await.unwrap();
}
