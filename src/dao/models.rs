use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{game::HistoryKind, state_machine::GameStatus};

/// Key under which the match snapshot is persisted.
pub const MATCH_STATE_KEY: &str = "match_state";

/// Persisted snapshot of the authoritative match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchStateEntity {
    /// Lifecycle status when the snapshot was taken.
    pub status: GameStatus,
    /// Phase label.
    pub phase: String,
    /// Remaining seconds on the countdown.
    pub global_timer: u32,
    /// Teams in registration order.
    pub teams: Vec<TeamEntity>,
    /// Timeline, most recent first.
    pub history: Vec<HistoryEntity>,
    /// Scenario effects still running.
    #[serde(default)]
    pub active_effects: Vec<EffectEntity>,
    /// Time of the snapshot.
    pub updated_at: SystemTime,
}

/// Representation of a team stored in persistence and shared across layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Display name chosen for the team.
    pub name: String,
    /// Current score for the team.
    pub score: i32,
    /// Avatar picture URL.
    pub avatar_url: Option<String>,
    /// Secret used by the team devices to identify.
    pub token: String,
    /// Activities completed during the match.
    #[serde(default)]
    pub completed_activities: Vec<CompletedActivityEntity>,
    /// Registration time.
    pub created_at: SystemTime,
}

/// Completed activity of a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedActivityEntity {
    pub activity_id: String,
    pub points: i32,
}

/// Timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntity {
    pub id: Uuid,
    pub kind: HistoryKind,
    pub team_id: Option<Uuid>,
    pub message: String,
    pub points: Option<i32>,
    pub at: SystemTime,
}

/// Scenario effect with its end time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectEntity {
    pub effect: String,
    pub end_time: SystemTime,
}

/// Progress document of one device.
///
/// The state is kept as raw JSON so that a document written by an older
/// catalogue can still be read and realigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEntity {
    /// Device identifier chosen by the client.
    pub device_id: String,
    /// Serialized player progress.
    pub state: Value,
    /// Last write time.
    pub updated_at: SystemTime,
}
