use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::progress::{ExportResponse, ImportRequest, ProgressActionResponse},
    error::AppError,
    services::progress_service,
    state::{
        SharedState,
        progress::{PlayerProgress, ProgressAction},
    },
};

/// Per-device progression endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/progress/{device_id}", get(get_progress))
        .route("/api/progress/{device_id}/actions", post(apply_action))
        .route("/api/progress/{device_id}/export", get(export_progress))
        .route("/api/progress/{device_id}/import", post(import_progress))
}

#[utoipa::path(
    get,
    path = "/api/progress/{device_id}",
    tag = "progress",
    params(("device_id" = String, Path, description = "Device identifier")),
    responses(
        (status = 200, description = "Device progress", body = PlayerProgress),
        (status = 400, description = "Invalid device id")
    )
)]
/// Progress of a device; unknown devices get the starting state.
pub async fn get_progress(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
) -> Result<Json<PlayerProgress>, AppError> {
    Ok(Json(progress_service::load_progress(&state, &device_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/progress/{device_id}/actions",
    tag = "progress",
    params(("device_id" = String, Path, description = "Device identifier")),
    request_body = ProgressAction,
    responses(
        (status = 200, description = "Updated progress and the events it produced", body = ProgressActionResponse),
        (status = 400, description = "Unknown universe or activity"),
        (status = 409, description = "Universe or activity still locked")
    )
)]
/// Apply one progression action.
pub async fn apply_action(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    Json(action): Json<ProgressAction>,
) -> Result<Json<ProgressActionResponse>, AppError> {
    Ok(Json(
        progress_service::apply_action(&state, &device_id, action).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/progress/{device_id}/export",
    tag = "progress",
    params(("device_id" = String, Path, description = "Device identifier")),
    responses((status = 200, description = "QR save payload", body = ExportResponse))
)]
/// Encode the device progress as a QR save payload.
pub async fn export_progress(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
) -> Result<Json<ExportResponse>, AppError> {
    Ok(Json(
        progress_service::export_progress(&state, &device_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/progress/{device_id}/import",
    tag = "progress",
    params(("device_id" = String, Path, description = "Device identifier")),
    request_body = ImportRequest,
    responses(
        (status = 200, description = "Imported progress", body = ProgressActionResponse),
        (status = 400, description = "Unreadable save payload")
    )
)]
/// Replace the device progress with a scanned save.
pub async fn import_progress(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    Valid(Json(payload)): Valid<Json<ImportRequest>>,
) -> Result<Json<ProgressActionResponse>, AppError> {
    Ok(Json(
        progress_service::import_progress(&state, &device_id, payload.payload).await?,
    ))
}
