use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{format_system_time, unix_millis, validation::validate_team_name},
    state::{
        game::{ActiveEffect, HistoryEntry, HistoryKind, MatchState, Standing, Team},
        state_machine::GameStatus,
    },
};

/// Payload used to register a new team.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    /// Team name, unique case-insensitively, 1 to 32 characters.
    pub name: String,
    /// Avatar style; a random configured style is used when omitted.
    #[serde(default)]
    pub avatar_style: Option<String>,
}

impl Validate for CreateTeamRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_team_name(&self.name) {
            errors.add("name", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Registered team plus the secret its devices use to identify.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamResponse {
    /// Public projection of the new team.
    pub team: TeamSummary,
    /// Secret to send back in `identify`.
    pub team_token: String,
}

/// Request for an avatar URL.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvatarRequest {
    /// Name used as the avatar seed.
    pub team_name: String,
    /// Avatar style; a random configured style is used when omitted.
    #[serde(default)]
    pub style: Option<String>,
}

impl Validate for AvatarRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_team_name(&self.team_name) {
            errors.add("team_name", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Generated avatar.
#[derive(Debug, Serialize, ToSchema)]
pub struct AvatarResponse {
    /// Picture URL.
    pub url: String,
}

/// Activity completed by a team during the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletedActivitySummary {
    pub activity_id: String,
    pub points: i32,
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Public projection of a team exposed to REST/SSE/WebSocket clients.
pub struct TeamSummary {
    pub id: Uuid,
    pub name: String,
    pub score: i32,
    pub connected: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub completed_activities: Vec<CompletedActivitySummary>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl From<(Uuid, Team)> for TeamSummary {
    fn from((id, team): (Uuid, Team)) -> Self {
        Self {
            id,
            name: team.name,
            score: team.score,
            connected: team.connected,
            avatar_url: team.avatar_url,
            completed_activities: team
                .completed_activities
                .into_iter()
                .map(|done| CompletedActivitySummary {
                    activity_id: done.activity_id,
                    points: done.points,
                })
                .collect(),
            created_at: Some(format_system_time(team.created_at)),
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Entry of the match timeline.
pub struct HistoryEntrySummary {
    pub id: Uuid,
    pub kind: HistoryKind,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    pub message: String,
    #[serde(default)]
    pub points: Option<i32>,
    /// Unix milliseconds.
    pub timestamp: u64,
}

impl From<&HistoryEntry> for HistoryEntrySummary {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind,
            team_id: entry.team_id,
            message: entry.message.clone(),
            points: entry.points,
            timestamp: unix_millis(entry.at),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Scenario effect currently applied.
pub struct ActiveEffectSummary {
    pub effect: String,
    /// Unix milliseconds.
    pub end_time: u64,
}

impl From<&ActiveEffect> for ActiveEffectSummary {
    fn from(effect: &ActiveEffect) -> Self {
        Self {
            effect: effect.effect.clone(),
            end_time: unix_millis(effect.end_time),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Position of a team in the ranking.
pub struct StandingSummary {
    pub team_id: Uuid,
    pub name: String,
    pub score: i32,
    pub rank: usize,
}

impl From<Standing> for StandingSummary {
    fn from(standing: Standing) -> Self {
        Self {
            team_id: standing.team_id,
            name: standing.name,
            score: standing.score,
            rank: standing.rank,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Full match state as sent in `game:fullState`.
pub struct GameSnapshot {
    pub teams: Vec<TeamSummary>,
    pub history: Vec<HistoryEntrySummary>,
    pub status: GameStatus,
    pub phase: String,
    pub global_timer: u32,
    pub active_effects: Vec<ActiveEffectSummary>,
    pub ranking: Vec<StandingSummary>,
}

impl GameSnapshot {
    /// Project the match state and status.
    pub fn build(state: &MatchState, status: GameStatus) -> Self {
        Self {
            teams: team_summaries(state),
            history: state.history().map(Into::into).collect(),
            status,
            phase: state.phase.clone(),
            global_timer: state.global_timer,
            active_effects: state.active_effects.iter().map(Into::into).collect(),
            ranking: state.ranking().into_iter().map(Into::into).collect(),
        }
    }
}

/// Snapshot returned to administrators, with team tokens.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminGameSnapshot {
    #[serde(flatten)]
    pub snapshot: GameSnapshot,
    /// Team id to team token.
    #[schema(value_type = Object)]
    pub team_tokens: IndexMap<Uuid, String>,
}

impl AdminGameSnapshot {
    /// Project the match state, tokens included.
    pub fn build(state: &MatchState, status: GameStatus) -> Self {
        Self {
            snapshot: GameSnapshot::build(state, status),
            team_tokens: state
                .teams
                .iter()
                .map(|(id, team)| (*id, team.token.clone()))
                .collect(),
        }
    }
}

/// Teams in registration order.
pub fn team_summaries(state: &MatchState) -> Vec<TeamSummary> {
    state
        .teams
        .iter()
        .map(|(id, team)| TeamSummary::from((*id, team.clone())))
        .collect()
}
