use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::game::{
        AvatarRequest, AvatarResponse, CreateTeamRequest, CreateTeamResponse, StandingSummary,
        TeamSummary,
    },
    error::AppError,
    services::{avatar_service, game_service},
    state::SharedState,
};

/// Public match endpoints used by player devices and displays.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/teams", get(list_teams).post(register_team))
        .route("/api/ranking", get(ranking))
        .route("/api/generate-avatar", post(generate_avatar))
}

/// Join the match; the returned token identifies the team on sockets.
#[utoipa::path(
    post,
    path = "/api/teams",
    tag = "game",
    request_body = CreateTeamRequest,
    responses(
        (status = 200, description = "Team registered", body = CreateTeamResponse),
        (status = 400, description = "Invalid team name"),
        (status = 409, description = "Name taken or game over")
    )
)]
pub async fn register_team(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateTeamRequest>>,
) -> Result<Json<CreateTeamResponse>, AppError> {
    Ok(Json(game_service::register_team(&state, payload).await?))
}

#[utoipa::path(
    get,
    path = "/api/teams",
    tag = "game",
    responses((status = 200, description = "Registered teams", body = [TeamSummary]))
)]
/// Teams in registration order.
pub async fn list_teams(State(state): State<SharedState>) -> Json<Vec<TeamSummary>> {
    Json(game_service::list_teams(&state).await)
}

#[utoipa::path(
    get,
    path = "/api/ranking",
    tag = "game",
    responses((status = 200, description = "Current standings", body = [StandingSummary]))
)]
/// Teams by descending score; equal scores share a rank.
pub async fn ranking(State(state): State<SharedState>) -> Json<Vec<StandingSummary>> {
    Json(game_service::ranking(&state).await)
}

#[utoipa::path(
    post,
    path = "/api/generate-avatar",
    tag = "game",
    request_body = AvatarRequest,
    responses(
        (status = 200, description = "Avatar URL", body = AvatarResponse),
        (status = 400, description = "Unknown style")
    )
)]
/// Avatar URL seeded by the team name.
pub async fn generate_avatar(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<AvatarRequest>>,
) -> Result<Json<AvatarResponse>, AppError> {
    Ok(Json(avatar_service::generate_avatar(&state, payload).await?))
}
