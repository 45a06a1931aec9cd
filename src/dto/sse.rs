use serde::Serialize;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Dispatched payload carried across SSE channels and WebSocket writers.
pub struct ServerEvent {
    /// Event name (e.g. `score:update`).
    pub event: Option<String>,
    /// JSON encoded payload.
    pub data: String,
}

impl ServerEvent {
    /// Event with an already encoded payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// WebSocket text frame: `{"event": <name>, "data": <payload>}`.
    pub fn to_ws_text(&self) -> String {
        let name = serde_json::to_string(self.event.as_deref().unwrap_or("message"))
            .unwrap_or_else(|_| "\"message\"".into());
        format!(r#"{{"event":{name},"data":{}}}"#, self.data)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `admin`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// True while storage is unavailable.
    pub degraded: bool,
}
