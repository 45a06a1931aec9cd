use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{
        AbortError, ApplyError, PlanError, game::MatchError, progress::ProgressError,
    },
};

/// Failures surfaced by the service layer, independent of the transport.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A storage call failed.
    #[error("storage unavailable")]
    Unavailable(#[from] StorageError),
    /// No storage backend is connected.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Missing or wrong admin key, or a team token that does not match.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Not allowed in the current match or progress state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Unknown team or resource.
    #[error("not found: {0}")]
    NotFound(String),
    /// A status change did not finish in time.
    #[error("operation timed out")]
    Timeout,
    /// Server-side settings that cannot be used, such as an unparsable avatar base URL.
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl ServiceError {
    fn invalid_state(err: impl std::fmt::Display) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        ServiceError::invalid_state(err)
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        ServiceError::invalid_state(err)
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        ServiceError::invalid_state(err)
    }
}

impl From<MatchError> for ServiceError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::UnknownTeam(_) => ServiceError::NotFound(err.to_string()),
            MatchError::DuplicateTeamName(_) | MatchError::AlreadyCompleted { .. } => {
                ServiceError::invalid_state(err)
            }
            MatchError::EffectOutOfRange(_) => ServiceError::InvalidInput(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<ProgressError> for ServiceError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::UniverseLocked(_) | ProgressError::ActivityLocked(_) => {
                ServiceError::invalid_state(err)
            }
            ProgressError::UnknownUniverse(_)
            | ProgressError::UnknownActivity { .. }
            | ProgressError::InvalidSave(_)
            | ProgressError::PayloadTooLarge { .. } => ServiceError::InvalidInput(err.to_string()),
        }
    }
}

/// HTTP-facing error: a status code plus the `{message}` body.
#[derive(Debug, Error)]
pub enum AppError {
    /// 400
    #[error("bad request: {0}")]
    BadRequest(String),
    /// 401
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// 404
    #[error("not found: {0}")]
    NotFound(String),
    /// 409
    #[error("conflict: {0}")]
    Conflict(String),
    /// 503
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// 500
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status code sent with this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let text = err.to_string();
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                AppError::ServiceUnavailable(text)
            }
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Misconfigured(_) => AppError::Internal(text),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        (status, Json(ErrorBody { message: self.to_string() })).into_response()
    }
}
