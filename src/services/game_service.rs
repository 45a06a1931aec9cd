//! Match operations shared by the REST routes and the socket handler.

use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        admin::ActionResponse,
        game::{
            AdminGameSnapshot, CreateTeamRequest, CreateTeamResponse, GameSnapshot, StandingSummary,
            TeamSummary, team_summaries,
        },
        ws::ActivityCompletePayload,
    },
    error::ServiceError,
    services::{avatar_service, progress_service, sse_events},
    state::{
        SharedState,
        catalogue::{ActivityDef, Catalogue},
        game::{HistoryEntry, HistoryKind},
        progress::PlayerProgress,
        scoring::ScoreInput,
        state_machine::{GameEvent, GameStatus},
        transitions::run_transition_with_broadcast,
    },
};

/// Register a team; refused once the match has ended.
pub async fn register_team(
    state: &SharedState,
    request: CreateTeamRequest,
) -> Result<CreateTeamResponse, ServiceError> {
    if state.status().await == GameStatus::Ended {
        return Err(ServiceError::InvalidState(
            "teams cannot join a finished game".into(),
        ));
    }

    let name = request.name.trim().to_string();
    let avatar_url = avatar_service::avatar_url(state, &name, request.avatar_style.as_deref()).await?;

    let (team_id, team, entry, teams) = state
        .with_match_mut(|game| {
            let (team_id, team) = game.add_team(&name, Some(avatar_url))?;
            let entry = HistoryEntry::new(
                HistoryKind::TeamJoined,
                Some(team_id),
                format!("{} joined the game", team.name),
                None,
            );
            game.push_history(entry.clone());
            Ok::<_, ServiceError>((team_id, team, entry, team_summaries(game)))
        })
        .await?;

    info!(team_id = %team_id, name = %team.name, "team registered");
    sse_events::broadcast_teams(state, teams);
    sse_events::broadcast_history(state, &entry);
    sse_events::broadcast_team_token(state, team_id, &team.name, &team.token);

    let team_token = team.token.clone();
    Ok(CreateTeamResponse {
        team: TeamSummary::from((team_id, team)),
        team_token,
    })
}

/// Remove a team from the match.
pub async fn delete_team(state: &SharedState, team_id: Uuid) -> Result<ActionResponse, ServiceError> {
    let (team, entry, teams) = state
        .with_match_mut(|game| {
            let team = game.remove_team(team_id)?;
            let entry = HistoryEntry::new(
                HistoryKind::TeamRemoved,
                Some(team_id),
                format!("{} left the game", team.name),
                None,
            );
            game.push_history(entry.clone());
            Ok::<_, ServiceError>((team, entry, team_summaries(game)))
        })
        .await?;

    info!(team_id = %team_id, name = %team.name, "team deleted");
    sse_events::broadcast_teams(state, teams);
    sse_events::broadcast_history(state, &entry);
    Ok(ActionResponse::new(format!("team `{}` deleted", team.name)))
}

/// Back to an empty lobby with a full timer.
pub async fn reset_game(state: &SharedState) -> Result<GameSnapshot, ServiceError> {
    run_transition_with_broadcast(state, GameEvent::Reset, || async {
        state.with_match_mut(|game| game.reset()).await;
        Ok(())
    })
    .await?;

    let snapshot = state.game_snapshot().await;
    sse_events::broadcast_game_reset(state);
    sse_events::broadcast_full_state(state, &snapshot);
    info!("game reset");
    Ok(snapshot)
}

/// Public projection of the match.
pub async fn public_state(state: &SharedState) -> GameSnapshot {
    state.game_snapshot().await
}

/// Match projection with team tokens, for administrators.
pub async fn admin_state(state: &SharedState) -> AdminGameSnapshot {
    let status = state.status().await;
    state
        .read_match(|game| AdminGameSnapshot::build(game, status))
        .await
}

/// Teams in registration order.
pub async fn list_teams(state: &SharedState) -> Vec<TeamSummary> {
    state.read_match(team_summaries).await
}

/// Current standings.
pub async fn ranking(state: &SharedState) -> Vec<StandingSummary> {
    state
        .read_match(|game| game.ranking().into_iter().map(Into::into).collect())
        .await
}

/// Outcome of an accepted activity completion.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Points awarded to the team.
    pub points: u32,
    /// Team score after the award.
    pub score: i32,
    /// Device progress after the merge, when a device was identified.
    pub progress: Option<PlayerProgress>,
}

/// Award a completed activity to a team while the match is running.
///
/// Points sent by the device are capped at what the activity can award;
/// raw metrics are scored server-side. Each activity counts once per team.
pub async fn complete_activity(
    state: &SharedState,
    team_id: Uuid,
    device_id: Option<&str>,
    payload: ActivityCompletePayload,
) -> Result<CompletionOutcome, ServiceError> {
    let config = state.config();
    let (universe_id, activity) = resolve_activity(config.catalogue(), &payload)?;
    let points = award(&activity, &payload)?;
    let signed_points = i32::try_from(points).unwrap_or(i32::MAX);

    let (score, entry, teams) = state
        .with_match_while(GameStatus::Playing, |game| {
            let score = game.record_completion(team_id, &activity.id, signed_points)?;
            let team_name = game
                .teams
                .get(&team_id)
                .map(|team| team.name.clone())
                .unwrap_or_default();
            let entry = HistoryEntry::new(
                HistoryKind::ActivityCompleted,
                Some(team_id),
                format!("{team_name} completed {}", activity.name),
                Some(signed_points),
            );
            game.push_history(entry.clone());
            Ok((score, entry, team_summaries(game)))
        })
        .await?;

    info!(team_id = %team_id, activity_id = %activity.id, points, score, "activity completed");
    sse_events::broadcast_score(state, team_id, score, signed_points);
    sse_events::broadcast_teams(state, teams);
    sse_events::broadcast_history(state, &entry);

    let progress = match device_id {
        Some(device_id) => progress_service::merge_completion(
            state,
            device_id,
            &universe_id,
            &activity.id,
            points,
        )
        .await
        .map(|(progress, _)| progress),
        None => None,
    };

    Ok(CompletionOutcome {
        points,
        score,
        progress,
    })
}

fn resolve_activity(
    catalogue: &Catalogue,
    payload: &ActivityCompletePayload,
) -> Result<(String, ActivityDef), ServiceError> {
    let found = match payload.universe_id.as_deref() {
        Some(universe_id) => catalogue
            .activity(universe_id, &payload.activity_id)
            .map(|activity| (universe_id.to_string(), activity.clone())),
        None => catalogue
            .find_activity(&payload.activity_id)
            .map(|(universe, activity)| (universe.id.clone(), activity.clone())),
    };
    let (universe_id, activity) = found.ok_or_else(|| {
        ServiceError::InvalidInput(format!("unknown activity `{}`", payload.activity_id))
    })?;

    if let Some(kind) = payload.kind
        && kind != activity.kind
    {
        return Err(ServiceError::InvalidInput(format!(
            "activity `{}` is a {:?} activity, not {:?}",
            activity.id, activity.kind, kind
        )));
    }
    Ok((universe_id, activity))
}

fn award(activity: &ActivityDef, payload: &ActivityCompletePayload) -> Result<u32, ServiceError> {
    match (payload.points, payload.metrics) {
        (Some(points), _) => Ok(points.min(activity.kind.max_award(activity.max_points))),
        (None, Some(metrics)) => Ok(activity.kind.score(ScoreInput {
            max_points: activity.max_points,
            errors: metrics.errors,
            duration: Duration::from_secs(metrics.duration_secs),
        })),
        (None, None) => Err(ServiceError::InvalidInput(
            "either points or metrics must be provided".into(),
        )),
    }
}
