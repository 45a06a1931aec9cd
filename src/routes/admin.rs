use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        admin::{
            ActionResponse, PhaseRequest, ScenarioRequest, ScoreAdjustmentRequest,
            ScoreUpdateResponse, StatusResponse, WarroomRequest,
        },
        game::{AdminGameSnapshot, GameSnapshot},
    },
    error::AppError,
    services::{admin_service, game_service},
    state::SharedState,
};

/// Header carrying the admin key on REST calls.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Game master endpoints, all gated by the admin key.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/teams/{id}", delete(delete_team))
        .route("/api/game/reset", post(reset_game))
        .route("/api/admin/start", post(start_game))
        .route("/api/admin/pause", post(pause_game))
        .route("/api/admin/resume", post(resume_game))
        .route("/api/admin/end", post(end_game))
        .route("/api/admin/phase", post(set_phase))
        .route("/api/admin/score", post(adjust_score))
        .route("/api/admin/scenario", post(trigger_scenario))
        .route("/api/admin/warroom", post(warroom_command))
        .route_layer(middleware::from_fn_with_state(state, require_admin_key))
}

/// Full match state including team tokens.
#[utoipa::path(
    get,
    path = "/api/state",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    responses((status = 200, description = "Current match state", body = AdminGameSnapshot))
)]
pub async fn get_state(State(state): State<SharedState>) -> Json<AdminGameSnapshot> {
    Json(game_service::admin_state(&state).await)
}

/// Remove a team from the match.
#[utoipa::path(
    delete,
    path = "/api/teams/{id}",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key"),
    ("id" = Uuid, Path, description = "Identifier of the team to delete")),
    responses(
        (status = 200, description = "Team deleted", body = ActionResponse),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn delete_team(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(game_service::delete_team(&state, id).await?))
}

/// Put the match back in the lobby with no teams.
#[utoipa::path(
    post,
    path = "/api/game/reset",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    responses((status = 200, description = "Match reset", body = GameSnapshot))
)]
pub async fn reset_game(State(state): State<SharedState>) -> Result<Json<GameSnapshot>, AppError> {
    Ok(Json(game_service::reset_game(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/start",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    responses(
        (status = 200, description = "Game started", body = StatusResponse),
        (status = 409, description = "Game is not in the lobby")
    )
)]
/// Start the match.
pub async fn start_game(State(state): State<SharedState>) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(admin_service::start_game(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/pause",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    responses((status = 200, description = "Game paused", body = StatusResponse))
)]
/// Freeze the timer.
pub async fn pause_game(State(state): State<SharedState>) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(admin_service::pause_game(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/resume",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    responses((status = 200, description = "Game resumed", body = StatusResponse))
)]
/// Resume a paused match.
pub async fn resume_game(
    State(state): State<SharedState>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(admin_service::resume_game(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/end",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    responses((status = 200, description = "Game ended", body = StatusResponse))
)]
/// End the match and publish the final ranking.
pub async fn end_game(State(state): State<SharedState>) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(admin_service::end_game(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/phase",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    request_body = PhaseRequest,
    responses((status = 200, description = "Phase changed", body = ActionResponse))
)]
/// Change the phase label shown on displays.
pub async fn set_phase(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PhaseRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::set_phase(&state, payload.phase).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/score",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    request_body = ScoreAdjustmentRequest,
    responses(
        (status = 200, description = "Score adjusted", body = ScoreUpdateResponse),
        (status = 404, description = "Unknown team")
    )
)]
/// Add or remove points by hand.
pub async fn adjust_score(
    State(state): State<SharedState>,
    Json(payload): Json<ScoreAdjustmentRequest>,
) -> Result<Json<ScoreUpdateResponse>, AppError> {
    Ok(Json(admin_service::adjust_score(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/scenario",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    request_body = ScenarioRequest,
    responses((status = 200, description = "Effect triggered", body = ActionResponse))
)]
/// Trigger a timed scenario effect.
pub async fn trigger_scenario(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ScenarioRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::trigger_scenario(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/warroom",
    tag = "admin",
    params(("x-admin-key" = String, Header, description = "Admin key")),
    request_body = WarroomRequest,
    responses((status = 200, description = "Command relayed", body = ActionResponse))
)]
/// Relay a command to the War Room displays.
pub async fn warroom_command(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<WarroomRequest>>,
) -> Json<ActionResponse> {
    Json(admin_service::warroom_command(
        &state,
        payload.command.trim(),
        payload.payload,
    ))
}

async fn require_admin_key(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    admin_service::check_admin_key(&state, provided)?;
    Ok(next.run(req).await)
}
