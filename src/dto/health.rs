use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Open WebSocket connections.
    pub connected_clients: usize,
}

impl HealthResponse {
    /// Operational backend with `connected_clients` sockets.
    pub fn ok(connected_clients: usize) -> Self {
        Self {
            status: "ok".to_string(),
            connected_clients,
        }
    }

    /// Backend running without storage.
    pub fn degraded(connected_clients: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            connected_clients,
        }
    }
}
