//! Named events pushed to clients and their payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::game::{StandingSummary, TeamSummary},
    state::state_machine::{EndReason, GameStatus},
};

/// Full match snapshot.
pub const FULL_STATE: &str = "game:fullState";
/// Team list changed.
pub const TEAMS_UPDATE: &str = "teams:update";
/// One team score changed.
pub const SCORE_UPDATE: &str = "score:update";
/// Match status changed.
pub const GAME_STATUS: &str = "game:status";
/// Phase label changed.
pub const GAME_PHASE: &str = "game:phase";
/// Countdown tick.
pub const TIMER_UPDATE: &str = "timer:update";
/// New timeline entry.
pub const HISTORY_NEW: &str = "history:new";
/// Scenario effect triggered.
pub const SCENARIO_EVENT: &str = "scenario:event";
/// Scenario effect expired.
pub const SCENARIO_EFFECT_END: &str = "scenario:effectEnd";
/// Match over, with final ranking.
pub const GAME_ENDED: &str = "game:ended";
/// Match reset to defaults.
pub const GAME_RESET: &str = "game:reset";
/// Cosmetic display command.
pub const WARROOM_COMMAND: &str = "warroom:command";
/// Error sent back to the emitting socket.
pub const ERROR: &str = "error";
/// Storage degraded mode toggled (admin stream only).
pub const SYSTEM_STATUS: &str = "system:status";
/// Team token issued (admin stream only).
pub const TEAM_TOKEN: &str = "admin:teamToken";
/// Player progress of the identified device.
pub const PROGRESS_STATE: &str = "progress:state";

/// Payload of `teams:update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TeamsUpdate {
    pub teams: Vec<TeamSummary>,
}

/// Payload of `score:update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    pub team_id: Uuid,
    pub score: i32,
    pub delta: i32,
}

/// Payload of `game:status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub status: GameStatus,
}

/// Payload of `game:phase`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhaseUpdate {
    pub phase: String,
}

/// Payload of `timer:update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdate {
    pub global_timer: u32,
}

/// Payload of `scenario:event`.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioEvent {
    pub effect: String,
    /// Unix milliseconds.
    pub end_time: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `scenario:effectEnd`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EffectEnd {
    pub effect: String,
}

/// Payload of `game:ended`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GameEnded {
    pub ranking: Vec<StandingSummary>,
    pub reason: EndReason,
}

/// Payload of `game:reset`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GameReset {}

/// Payload of `warroom:command`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WarroomCommand {
    pub command: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Payload of `error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorEvent {
    pub message: String,
}

/// Payload of `admin:teamToken`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamTokenIssued {
    pub team_id: Uuid,
    pub name: String,
    pub team_token: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payloads_use_client_field_names() {
        let score = serde_json::to_value(ScoreUpdate {
            team_id: Uuid::nil(),
            score: 120,
            delta: 20,
        })
        .unwrap();
        assert_eq!(score["teamId"], Uuid::nil().to_string());

        let scenario = serde_json::to_value(ScenarioEvent {
            effect: "blackout".into(),
            end_time: 5,
            message: None,
        })
        .unwrap();
        assert_eq!(scenario, json!({"effect": "blackout", "endTime": 5}));

        let ended = serde_json::to_value(GameEnded {
            ranking: Vec::new(),
            reason: EndReason::TimerElapsed,
        })
        .unwrap();
        assert_eq!(ended["reason"], "timer_elapsed");
        assert_eq!(serde_json::to_string(&GameReset {}).unwrap(), "{}");
    }
}
