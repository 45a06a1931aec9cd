use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        events::{
            self, EffectEnd, GameEnded, GameReset, PhaseUpdate, ScenarioEvent, ScoreUpdate,
            StatusUpdate, TeamTokenIssued, TeamsUpdate, TimerUpdate, WarroomCommand,
        },
        game::{ActiveEffectSummary, GameSnapshot, HistoryEntrySummary, TeamSummary},
        sse::{ServerEvent, SystemStatus},
    },
    state::{
        AppState,
        game::{ActiveEffect, HistoryEntry, Standing},
        state_machine::{EndReason, GameStatus},
    },
};

/// Broadcast the full match snapshot.
pub fn broadcast_full_state(state: &AppState, snapshot: &GameSnapshot) {
    send_public_event(state, events::FULL_STATE, snapshot);
}

/// Broadcast the whole team list.
pub fn broadcast_teams(state: &AppState, teams: Vec<TeamSummary>) {
    send_public_event(state, events::TEAMS_UPDATE, &TeamsUpdate { teams });
}

/// Broadcast a score change for a specific team.
pub fn broadcast_score(state: &AppState, team_id: Uuid, score: i32, delta: i32) {
    let payload = ScoreUpdate {
        team_id,
        score,
        delta,
    };
    send_public_event(state, events::SCORE_UPDATE, &payload);
}

/// Broadcast a status change.
pub fn broadcast_status(state: &AppState, status: GameStatus) {
    send_public_event(state, events::GAME_STATUS, &StatusUpdate { status });
}

/// Broadcast a phase label change.
pub fn broadcast_phase(state: &AppState, phase: &str) {
    let payload = PhaseUpdate {
        phase: phase.to_string(),
    };
    send_public_event(state, events::GAME_PHASE, &payload);
}

/// Broadcast the countdown.
pub fn broadcast_timer(state: &AppState, global_timer: u32) {
    send_public_event(state, events::TIMER_UPDATE, &TimerUpdate { global_timer });
}

/// Broadcast a new timeline entry.
pub fn broadcast_history(state: &AppState, entry: &HistoryEntry) {
    send_public_event(state, events::HISTORY_NEW, &HistoryEntrySummary::from(entry));
}

/// Broadcast a triggered scenario effect.
pub fn broadcast_scenario(state: &AppState, effect: &ActiveEffect, message: Option<String>) {
    let ActiveEffectSummary { effect, end_time } = effect.into();
    let payload = ScenarioEvent {
        effect,
        end_time,
        message,
    };
    send_public_event(state, events::SCENARIO_EVENT, &payload);
}

/// Broadcast that an effect expired.
pub fn broadcast_effect_end(state: &AppState, effect: &str) {
    let payload = EffectEnd {
        effect: effect.to_string(),
    };
    send_public_event(state, events::SCENARIO_EFFECT_END, &payload);
}

/// Broadcast the final ranking.
pub fn broadcast_game_ended(state: &AppState, ranking: Vec<Standing>, reason: EndReason) {
    let payload = GameEnded {
        ranking: ranking.into_iter().map(Into::into).collect(),
        reason,
    };
    send_public_event(state, events::GAME_ENDED, &payload);
}

/// Broadcast that the match went back to defaults.
pub fn broadcast_game_reset(state: &AppState) {
    send_public_event(state, events::GAME_RESET, &GameReset {});
}

/// Relay a cosmetic command to War Room displays.
pub fn broadcast_warroom(state: &AppState, command: &str, payload: Value) {
    let payload = WarroomCommand {
        command: command.to_string(),
        payload,
    };
    send_public_event(state, events::WARROOM_COMMAND, &payload);
}

/// Tell admins the token of a freshly registered team.
pub fn broadcast_team_token(state: &AppState, team_id: Uuid, name: &str, token: &str) {
    let payload = TeamTokenIssued {
        team_id,
        name: name.to_string(),
        team_token: token.to_string(),
    };
    send_admin_event(state, events::TEAM_TOKEN, &payload);
}

/// Tell admins that storage went away or came back.
pub fn broadcast_system_status(state: &AppState, degraded: bool) {
    send_admin_event(state, events::SYSTEM_STATUS, &SystemStatus { degraded });
}

pub(crate) fn send_public_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public event payload"),
    }
}

pub(crate) fn send_admin_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.admin_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin event payload"),
    }
}
