use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::scoring::ActivityKind;

/// Client announces who it is.
pub const IDENTIFY: &str = "identify";
/// Player finished an activity.
pub const ACTIVITY_COMPLETE: &str = "activity:complete";
/// Admin console command.
pub const ADMIN_ACTION: &str = "admin:action";
/// Explicit resync request.
pub const STATE_REQUEST: &str = "state:request";

#[derive(Debug, Deserialize)]
/// Raw `{"event", "data"}` frame received from a socket.
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
/// Role declared by a client in `identify`.
pub enum ClientRole {
    /// Mobile input (Nexus).
    Player,
    /// Shared screen.
    Dashboard,
    /// Control panel; requires the admin key.
    Admin,
    /// War Room display.
    Warroom,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Payload of `identify`.
pub struct IdentifyPayload {
    pub role: ClientRole,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub team_token: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub admin_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Raw run measurements the server scores itself.
pub struct ActivityMetrics {
    #[serde(default)]
    pub errors: u32,
    #[serde(default)]
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Payload of `activity:complete`.
pub struct ActivityCompletePayload {
    pub activity_id: String,
    #[serde(default)]
    pub universe_id: Option<String>,
    #[serde(default)]
    pub kind: Option<ActivityKind>,
    /// Points computed on the device.
    #[serde(default)]
    pub points: Option<u32>,
    /// Used when `points` is absent.
    #[serde(default)]
    pub metrics: Option<ActivityMetrics>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Administrative command carried by `admin:action`.
pub enum AdminAction {
    Start,
    Pause,
    Resume,
    End,
    Reset,
    SetPhase {
        phase: String,
    },
    #[serde(rename_all = "camelCase")]
    AdjustScore {
        team_id: Uuid,
        delta: i32,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TriggerScenario {
        effect: String,
        #[serde(default)]
        duration_secs: Option<u64>,
        #[serde(default)]
        message: Option<String>,
    },
    Warroom {
        command: String,
        #[serde(default)]
        #[schema(value_type = Object)]
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    DeleteTeam {
        team_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Payload of `admin:action`.
pub struct AdminActionPayload {
    pub admin_key: String,
    pub action: AdminAction,
}

#[derive(Debug, Clone, PartialEq)]
/// Messages accepted from WebSocket clients.
pub enum ClientMessage {
    Identify(IdentifyPayload),
    ActivityComplete(ActivityCompletePayload),
    AdminAction(AdminActionPayload),
    StateRequest,
    /// Event name nobody handles; ignored.
    Unknown(String),
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let Envelope { event, data } = serde_json::from_str(text)?;
        Ok(match event.as_str() {
            IDENTIFY => Self::Identify(serde_json::from_value(data)?),
            ACTIVITY_COMPLETE => Self::ActivityComplete(serde_json::from_value(data)?),
            ADMIN_ACTION => Self::AdminAction(serde_json::from_value(data)?),
            STATE_REQUEST => Self::StateRequest,
            _ => Self::Unknown(event),
        })
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Identify(_) => IDENTIFY,
            Self::ActivityComplete(_) => ACTIVITY_COMPLETE,
            Self::AdminAction(_) => ADMIN_ACTION,
            Self::StateRequest => STATE_REQUEST,
            Self::Unknown(name) => name,
        }
    }
}
