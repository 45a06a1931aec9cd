//! Client-side mirror of the match state, rebuilt from server events.
//!
//! A [`GameMirror`] is fed every `{event, data}` pair a client receives. The
//! full snapshot replaces everything; narrower events patch the relevant
//! field. Events it does not know are ignored so newer servers stay
//! compatible with older clients.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    dto::{
        events::{
            EffectEnd, FULL_STATE, GAME_ENDED, GAME_PHASE, GAME_RESET, GAME_STATUS, GameEnded,
            HISTORY_NEW, PhaseUpdate, SCENARIO_EFFECT_END, SCENARIO_EVENT, SCORE_UPDATE,
            ScenarioEvent, ScoreUpdate, StatusUpdate, TEAMS_UPDATE, TIMER_UPDATE, TeamsUpdate,
            TimerUpdate,
        },
        game::{ActiveEffectSummary, GameSnapshot, HistoryEntrySummary, StandingSummary, TeamSummary},
        ws::Envelope,
    },
    state::{game::rank_by_score, state_machine::GameStatus},
};

/// Local copy of the authoritative state.
#[derive(Debug, Clone)]
pub struct GameMirror {
    snapshot: GameSnapshot,
    history_limit: usize,
    connected: bool,
    needs_resync: bool,
}

impl GameMirror {
    /// Empty mirror waiting for its first `game:fullState`.
    pub fn new(history_limit: usize) -> Self {
        Self {
            snapshot: empty_snapshot(),
            history_limit,
            connected: false,
            needs_resync: true,
        }
    }

    /// Current view of the match.
    pub fn snapshot(&self) -> &GameSnapshot {
        &self.snapshot
    }

    /// Whether the transport is up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a `state:request` should be sent before trusting the view.
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Transport opened.
    pub fn on_connect(&mut self) {
        self.connected = true;
    }

    /// Transport lost; events may be missed until the next full state.
    pub fn on_disconnect(&mut self) {
        self.connected = false;
        self.needs_resync = true;
    }

    /// Decode and apply a WebSocket text frame.
    pub fn apply_frame(&mut self, text: &str) -> serde_json::Result<bool> {
        let Envelope { event, data } = serde_json::from_str(text)?;
        self.apply(&event, data)
    }

    /// Merge one event; returns false when the event is not a state event.
    pub fn apply(&mut self, event: &str, data: Value) -> serde_json::Result<bool> {
        match event {
            FULL_STATE => {
                self.snapshot = decode(data)?;
                self.snapshot.history.truncate(self.history_limit);
                self.needs_resync = false;
            }
            TEAMS_UPDATE => {
                let TeamsUpdate { teams } = decode(data)?;
                self.snapshot.teams = teams;
                self.rerank();
            }
            SCORE_UPDATE => {
                let ScoreUpdate { team_id, score, .. } = decode(data)?;
                if let Some(team) = self.snapshot.teams.iter_mut().find(|team| team.id == team_id) {
                    team.score = score;
                }
                self.rerank();
            }
            GAME_STATUS => {
                let StatusUpdate { status } = decode(data)?;
                self.snapshot.status = status;
            }
            GAME_PHASE => {
                let PhaseUpdate { phase } = decode(data)?;
                self.snapshot.phase = phase;
            }
            TIMER_UPDATE => {
                let TimerUpdate { global_timer } = decode(data)?;
                self.snapshot.global_timer = global_timer;
            }
            HISTORY_NEW => {
                let entry: HistoryEntrySummary = decode(data)?;
                self.snapshot.history.insert(0, entry);
                self.snapshot.history.truncate(self.history_limit);
            }
            SCENARIO_EVENT => {
                let ScenarioEvent {
                    effect, end_time, ..
                } = decode(data)?;
                self.snapshot
                    .active_effects
                    .retain(|active| active.effect != effect);
                self.snapshot
                    .active_effects
                    .push(ActiveEffectSummary { effect, end_time });
            }
            SCENARIO_EFFECT_END => {
                let EffectEnd { effect } = decode(data)?;
                self.snapshot
                    .active_effects
                    .retain(|active| active.effect != effect);
            }
            GAME_ENDED => {
                let GameEnded { ranking, .. } = decode(data)?;
                self.snapshot.ranking = ranking;
                self.snapshot.status = GameStatus::Ended;
            }
            GAME_RESET => {
                self.snapshot = empty_snapshot();
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn rerank(&mut self) {
        self.snapshot.ranking = rank_teams(&self.snapshot.teams);
    }
}

/// Standings for `teams`: score descending, ties share a rank and keep list order.
pub fn rank_teams(teams: &[TeamSummary]) -> Vec<StandingSummary> {
    rank_by_score(teams.iter().map(|team| (team.id, team.name.as_str(), team.score)))
        .into_iter()
        .map(StandingSummary::from)
        .collect()
}

fn decode<T: DeserializeOwned>(data: Value) -> serde_json::Result<T> {
    serde_json::from_value(data)
}

fn empty_snapshot() -> GameSnapshot {
    GameSnapshot {
        teams: Vec::new(),
        history: Vec::new(),
        status: GameStatus::Lobby,
        phase: String::new(),
        global_timer: 0,
        active_effects: Vec::new(),
        ranking: Vec::new(),
    }
}
