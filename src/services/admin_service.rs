//! Business logic powering the admin REST routes and socket `admin:action`
//! messages. Lifecycle changes go through the state machine one at a time.

use std::time::{Duration, SystemTime};

use serde_json::Value;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    dto::{
        admin::{
            ActionResponse, PhaseRequest, ScenarioRequest, ScoreAdjustmentRequest,
            ScoreUpdateResponse, StatusResponse, WarroomRequest,
        },
        game::team_summaries,
        ws::AdminAction,
    },
    error::ServiceError,
    services::{game_service, sse_events},
    state::{
        AppState, SharedState,
        game::{HistoryEntry, HistoryKind},
        state_machine::{EndReason, GameEvent},
        transitions::run_transition_with_broadcast,
    },
};

/// Compare `key` with the configured admin key.
pub fn check_admin_key(state: &AppState, key: Option<&str>) -> Result<(), ServiceError> {
    match key {
        Some(key) if key == state.config().admin_key() => Ok(()),
        Some(_) => {
            warn!("rejected admin request with a wrong key");
            Err(ServiceError::Unauthorized("invalid admin key".into()))
        }
        None => Err(ServiceError::Unauthorized("missing admin key".into())),
    }
}

async fn transition(state: &SharedState, event: GameEvent) -> Result<StatusResponse, ServiceError> {
    run_transition_with_broadcast(state, event, || async { Ok(()) }).await?;
    Ok(StatusResponse {
        status: state.status().await,
    })
}

/// LOBBY to PLAYING.
pub async fn start_game(state: &SharedState) -> Result<StatusResponse, ServiceError> {
    transition(state, GameEvent::Start).await
}

/// PLAYING to PAUSED.
pub async fn pause_game(state: &SharedState) -> Result<StatusResponse, ServiceError> {
    transition(state, GameEvent::Pause).await
}

/// PAUSED to PLAYING.
pub async fn resume_game(state: &SharedState) -> Result<StatusResponse, ServiceError> {
    transition(state, GameEvent::Resume).await
}

/// End the match and publish the final ranking.
pub async fn end_game(state: &SharedState) -> Result<StatusResponse, ServiceError> {
    transition(state, GameEvent::End(EndReason::Manual)).await
}

/// Change the free-form phase label.
pub async fn set_phase(state: &SharedState, phase: String) -> Result<ActionResponse, ServiceError> {
    let phase = phase.trim().to_string();
    state
        .with_match_mut(|game| game.phase = phase.clone())
        .await;
    sse_events::broadcast_phase(state, &phase);
    Ok(ActionResponse::new(format!("phase set to `{phase}`")))
}

/// Add `delta` to a team score, flooring it at zero.
pub async fn adjust_score(
    state: &SharedState,
    request: ScoreAdjustmentRequest,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let ScoreAdjustmentRequest {
        team_id,
        delta,
        reason,
    } = request;

    let (score, applied, entry, teams) = state
        .with_match_mut(|game| {
            let (score, applied) = game.adjust_score(team_id, delta)?;
            let name = game
                .teams
                .get(&team_id)
                .map(|team| team.name.clone())
                .unwrap_or_default();
            let message = match reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                Some(reason) => format!("{name}: {applied:+} points ({reason})"),
                None => format!("{name}: {applied:+} points"),
            };
            let entry =
                HistoryEntry::new(HistoryKind::ScoreAdjusted, Some(team_id), message, Some(applied));
            game.push_history(entry.clone());
            Ok::<_, ServiceError>((score, applied, entry, team_summaries(game)))
        })
        .await?;

    info!(team_id = %team_id, delta, applied, score, "score adjusted");
    sse_events::broadcast_score(state, team_id, score, applied);
    sse_events::broadcast_teams(state, teams);
    sse_events::broadcast_history(state, &entry);

    Ok(ScoreUpdateResponse {
        team_id,
        score,
        delta: applied,
    })
}

/// Start a scenario effect on every display.
pub async fn trigger_scenario(
    state: &SharedState,
    request: ScenarioRequest,
) -> Result<ActionResponse, ServiceError> {
    let ScenarioRequest {
        effect,
        duration_secs,
        message,
    } = request;
    let effect = effect.trim().to_string();
    let duration = duration_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config().scenario_duration());

    let (active, entry) = state
        .with_match_mut(|game| {
            let active = game.add_effect(&effect, duration, SystemTime::now())?;
            let text = message
                .clone()
                .unwrap_or_else(|| format!("Scenario event: {effect}"));
            let entry = HistoryEntry::new(HistoryKind::Scenario, None, text, None);
            game.push_history(entry.clone());
            Ok::<_, ServiceError>((active, entry))
        })
        .await?;

    info!(effect = %effect, duration_secs = duration.as_secs(), "scenario triggered");
    sse_events::broadcast_scenario(state, &active, message);
    sse_events::broadcast_history(state, &entry);
    Ok(ActionResponse::new(format!("effect `{effect}` triggered")))
}

/// Relay a cosmetic command to War Room displays.
pub fn warroom_command(state: &AppState, command: &str, payload: Value) -> ActionResponse {
    sse_events::broadcast_warroom(state, command, payload);
    ActionResponse::new(format!("command `{command}` sent"))
}

/// Execute an action received over a socket.
///
/// Payloads go through the same validation as their REST counterparts.
pub async fn apply_action(
    state: &SharedState,
    action: AdminAction,
) -> Result<ActionResponse, ServiceError> {
    let response = match action {
        AdminAction::Start => status_message(start_game(state).await?),
        AdminAction::Pause => status_message(pause_game(state).await?),
        AdminAction::Resume => status_message(resume_game(state).await?),
        AdminAction::End => status_message(end_game(state).await?),
        AdminAction::Reset => {
            game_service::reset_game(state).await?;
            ActionResponse::new("game reset")
        }
        AdminAction::SetPhase { phase } => {
            let request = validated(PhaseRequest { phase })?;
            set_phase(state, request.phase).await?
        }
        AdminAction::AdjustScore {
            team_id,
            delta,
            reason,
        } => {
            let updated = adjust_score(
                state,
                ScoreAdjustmentRequest {
                    team_id,
                    delta,
                    reason,
                },
            )
            .await?;
            ActionResponse::new(format!("score is now {}", updated.score))
        }
        AdminAction::TriggerScenario {
            effect,
            duration_secs,
            message,
        } => {
            let request = validated(ScenarioRequest {
                effect,
                duration_secs,
                message,
            })?;
            trigger_scenario(state, request).await?
        }
        AdminAction::Warroom { command, payload } => {
            let request = validated(WarroomRequest { command, payload })?;
            warroom_command(state, &request.command, request.payload)
        }
        AdminAction::DeleteTeam { team_id } => game_service::delete_team(state, team_id).await?,
    };
    Ok(response)
}

fn validated<T: Validate>(request: T) -> Result<T, ServiceError> {
    request.validate()?;
    Ok(request)
}

fn status_message(response: StatusResponse) -> ActionResponse {
    ActionResponse::new(format!("game is now {:?}", response.status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::game::CreateTeamRequest,
        state::state_machine::GameStatus,
    };

    #[tokio::test]
    async fn admin_key_is_required() {
        let state = AppState::new(AppConfig::default().with_admin_key("secret"));
        assert!(check_admin_key(&state, Some("secret")).is_ok());
        assert!(check_admin_key(&state, Some("guess")).is_err());
        assert!(check_admin_key(&state, None).is_err());
    }

    #[tokio::test]
    async fn score_adjustments_floor_at_zero_and_are_logged() {
        let state = AppState::new(AppConfig::default());
        let created = game_service::register_team(
            &state,
            CreateTeamRequest {
                name: "Alpha".into(),
                avatar_style: None,
            },
        )
        .await
        .unwrap();
        let team_id = created.team.id;

        let updated = adjust_score(
            &state,
            ScoreAdjustmentRequest {
                team_id,
                delta: -50,
                reason: Some("penalty".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.score, 0);
        assert_eq!(updated.delta, 0);

        let snapshot = state.game_snapshot().await;
        assert_eq!(snapshot.history[0].kind, HistoryKind::ScoreAdjusted);
        assert!(snapshot.history[0].message.contains("penalty"));
    }

    #[tokio::test]
    async fn socket_actions_drive_the_lifecycle() {
        let state = AppState::new(AppConfig::default());
        apply_action(&state, AdminAction::Start).await.unwrap();
        apply_action(&state, AdminAction::Pause).await.unwrap();
        assert_eq!(state.status().await, GameStatus::Paused);
        assert!(apply_action(&state, AdminAction::Pause).await.is_err());
        apply_action(&state, AdminAction::End).await.unwrap();
        assert_eq!(state.status().await, GameStatus::Ended);
        apply_action(&state, AdminAction::Reset).await.unwrap();
        assert_eq!(state.status().await, GameStatus::Lobby);
    }

    #[tokio::test]
    async fn socket_payloads_are_validated_like_rest_bodies() {
        let state = AppState::new(AppConfig::default());

        let endless = apply_action(
            &state,
            AdminAction::TriggerScenario {
                effect: "blackout".into(),
                duration_secs: Some(u64::MAX),
                message: None,
            },
        )
        .await;
        assert!(matches!(endless, Err(ServiceError::InvalidInput(_))));
        assert!(state.game_snapshot().await.active_effects.is_empty());

        let long_phase = apply_action(
            &state,
            AdminAction::SetPhase {
                phase: "x".repeat(200),
            },
        )
        .await;
        assert!(matches!(long_phase, Err(ServiceError::InvalidInput(_))));

        let blank = apply_action(
            &state,
            AdminAction::Warroom {
                command: " ".into(),
                payload: Value::Null,
            },
        )
        .await;
        assert!(matches!(blank, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn out_of_range_effects_fail_without_panicking() {
        let state = AppState::new(AppConfig::default());
        let result = trigger_scenario(
            &state,
            ScenarioRequest {
                effect: "blackout".into(),
                duration_secs: Some(u64::MAX),
                message: None,
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert_eq!(state.game_snapshot().await.history.len(), 0);
    }

    #[tokio::test]
    async fn retriggered_effects_replace_the_previous_one() {
        let state = AppState::new(AppConfig::default());
        for _ in 0..2 {
            trigger_scenario(
                &state,
                ScenarioRequest {
                    effect: "blackout".into(),
                    duration_secs: Some(5),
                    message: None,
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(state.game_snapshot().await.active_effects.len(), 1);
    }
}
