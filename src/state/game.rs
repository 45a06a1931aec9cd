use std::{
    collections::VecDeque,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use rand::{Rng, distr::Alphanumeric, rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        CompletedActivityEntity, EffectEntity, HistoryEntity, MatchStateEntity, TeamEntity,
    },
    state::state_machine::GameStatus,
};

const TEAM_TOKEN_LENGTH: usize = 32;

/// Activity completed by a team during the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedActivity {
    /// Catalogue identifier of the activity.
    pub activity_id: String,
    /// Points awarded for it.
    pub points: i32,
}

/// Team registered for the current match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Display name, unique case-insensitively.
    pub name: String,
    /// Current score, never negative.
    pub score: i32,
    /// Whether at least one player socket of the team is connected.
    pub connected: bool,
    /// Avatar picture URL.
    pub avatar_url: Option<String>,
    /// Secret handed to the registering device, used to identify player sockets.
    pub token: String,
    /// Activities completed so far, in completion order.
    pub completed_activities: Vec<CompletedActivity>,
    /// Registration time.
    pub created_at: SystemTime,
}

/// Category of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// A team registered.
    TeamJoined,
    /// A team was removed.
    TeamRemoved,
    /// A team finished an activity.
    ActivityCompleted,
    /// The game master changed a score.
    ScoreAdjusted,
    /// A scenario effect was triggered.
    Scenario,
    /// The match status changed.
    Status,
}

/// Entry of the match timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// Category.
    pub kind: HistoryKind,
    /// Team concerned, if any.
    pub team_id: Option<Uuid>,
    /// Human readable description.
    pub message: String,
    /// Points involved, if any.
    pub points: Option<i32>,
    /// When it happened.
    pub at: SystemTime,
}

impl HistoryEntry {
    /// Build an entry stamped now.
    pub fn new(
        kind: HistoryKind,
        team_id: Option<Uuid>,
        message: impl Into<String>,
        points: Option<i32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            team_id,
            message: message.into(),
            points,
            at: SystemTime::now(),
        }
    }
}

/// Scenario effect currently applied to the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEffect {
    /// Effect identifier (e.g. `blackout`, `double-points`).
    pub effect: String,
    /// When the effect ends.
    pub end_time: SystemTime,
}

/// Team position in the ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// Team id.
    pub team_id: Uuid,
    /// Team name.
    pub name: String,
    /// Score.
    pub score: i32,
    /// 1-based rank; tied scores share a rank.
    pub rank: usize,
}

/// What happened during one ticker step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// New timer value when it moved.
    pub timer: Option<u32>,
    /// True when the timer just reached zero.
    pub timer_elapsed: bool,
    /// Effects whose end time has passed.
    pub expired_effects: Vec<ActiveEffect>,
}

/// Domain errors raised by match mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Another team already uses the name.
    #[error("team name `{0}` is already taken")]
    DuplicateTeamName(String),
    /// No team with this id.
    #[error("team `{0}` not found")]
    UnknownTeam(Uuid),
    /// The team already completed the activity.
    #[error("activity `{activity_id}` already completed by team `{team_id}`")]
    AlreadyCompleted {
        /// Team id.
        team_id: Uuid,
        /// Activity id.
        activity_id: String,
    },
    /// The effect would end past the representable time range.
    #[error("effect duration of {0:?} is out of range")]
    EffectOutOfRange(Duration),
}

/// Authoritative match data: teams, timeline, timer and effects.
///
/// The lifecycle status lives in the state machine; everything else is here.
#[derive(Debug, Clone)]
pub struct MatchState {
    /// Teams in registration order.
    pub teams: IndexMap<Uuid, Team>,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
    /// Free-form phase label set by the game master.
    pub phase: String,
    /// Countdown in seconds.
    pub global_timer: u32,
    timer_start: u32,
    /// Effects in trigger order.
    pub active_effects: Vec<ActiveEffect>,
}

impl MatchState {
    /// Empty match with a full timer.
    pub fn new(history_limit: usize, timer_start: u32) -> Self {
        Self {
            teams: IndexMap::new(),
            history: VecDeque::with_capacity(history_limit),
            history_limit,
            phase: String::new(),
            global_timer: timer_start,
            timer_start,
            active_effects: Vec::new(),
        }
    }

    /// Back to an empty match, keeping the limits.
    pub fn reset(&mut self) {
        *self = Self::new(self.history_limit, self.timer_start);
    }

    /// Register a team and return its id.
    pub fn add_team(
        &mut self,
        name: &str,
        avatar_url: Option<String>,
    ) -> Result<(Uuid, Team), MatchError> {
        let name = name.trim();
        let folded = name.to_lowercase();
        if self
            .teams
            .values()
            .any(|team| team.name.to_lowercase() == folded)
        {
            return Err(MatchError::DuplicateTeamName(name.to_string()));
        }

        let id = Uuid::new_v4();
        let team = Team {
            name: name.to_string(),
            score: 0,
            connected: false,
            avatar_url,
            token: generate_token(),
            completed_activities: Vec::new(),
            created_at: SystemTime::now(),
        };
        self.teams.insert(id, team.clone());
        Ok((id, team))
    }

    /// Remove a team, keeping the order of the others.
    pub fn remove_team(&mut self, id: Uuid) -> Result<Team, MatchError> {
        self.teams
            .shift_remove(&id)
            .ok_or(MatchError::UnknownTeam(id))
    }

    /// Check a team token.
    pub fn verify_token(&self, id: Uuid, token: &str) -> bool {
        self.teams
            .get(&id)
            .is_some_and(|team| !team.token.is_empty() && team.token == token)
    }

    /// Set the connected flag; returns true when it changed.
    pub fn set_connected(&mut self, id: Uuid, connected: bool) -> bool {
        match self.teams.get_mut(&id) {
            Some(team) if team.connected != connected => {
                team.connected = connected;
                true
            }
            _ => false,
        }
    }

    /// Record a completed activity and return the new score.
    pub fn record_completion(
        &mut self,
        id: Uuid,
        activity_id: &str,
        points: i32,
    ) -> Result<i32, MatchError> {
        let team = self.teams.get_mut(&id).ok_or(MatchError::UnknownTeam(id))?;
        if team
            .completed_activities
            .iter()
            .any(|done| done.activity_id == activity_id)
        {
            return Err(MatchError::AlreadyCompleted {
                team_id: id,
                activity_id: activity_id.to_string(),
            });
        }
        let points = points.max(0);
        team.completed_activities.push(CompletedActivity {
            activity_id: activity_id.to_string(),
            points,
        });
        team.score = team.score.saturating_add(points);
        Ok(team.score)
    }

    /// Apply a score delta, flooring the score at zero. Returns `(score, applied delta)`.
    pub fn adjust_score(&mut self, id: Uuid, delta: i32) -> Result<(i32, i32), MatchError> {
        let team = self.teams.get_mut(&id).ok_or(MatchError::UnknownTeam(id))?;
        let before = team.score;
        team.score = before.saturating_add(delta).max(0);
        Ok((team.score, team.score - before))
    }

    /// Prepend an entry, dropping the oldest ones beyond the limit.
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_front(entry);
        self.history.truncate(self.history_limit);
    }

    /// Timeline, most recent first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Start (or extend) an effect lasting `duration` from `now`.
    pub fn add_effect(
        &mut self,
        effect: &str,
        duration: Duration,
        now: SystemTime,
    ) -> Result<ActiveEffect, MatchError> {
        let end_time = now
            .checked_add(duration)
            .ok_or(MatchError::EffectOutOfRange(duration))?;
        let active = ActiveEffect {
            effect: effect.to_string(),
            end_time,
        };
        self.active_effects.retain(|existing| existing.effect != effect);
        self.active_effects.push(active.clone());
        Ok(active)
    }

    /// Teams ordered by score; ties keep registration order and share a rank.
    pub fn ranking(&self) -> Vec<Standing> {
        rank_by_score(
            self.teams
                .iter()
                .map(|(id, team)| (*id, team.name.as_str(), team.score)),
        )
    }

    /// Advance one second: count the timer down when `running`, and expire effects.
    pub fn tick(&mut self, running: bool, now: SystemTime) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if running && self.global_timer > 0 {
            self.global_timer -= 1;
            outcome.timer = Some(self.global_timer);
            outcome.timer_elapsed = self.global_timer == 0;
        }

        let (expired, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active_effects)
            .into_iter()
            .partition(|effect| effect.end_time <= now);
        self.active_effects = active;
        outcome.expired_effects = expired;

        outcome
    }

    /// Snapshot for persistence, stamped now.
    pub fn to_entity(&self, status: GameStatus) -> MatchStateEntity {
        MatchStateEntity {
            status,
            phase: self.phase.clone(),
            global_timer: self.global_timer,
            teams: self
                .teams
                .iter()
                .map(|(id, team)| TeamEntity::from((*id, team.clone())))
                .collect(),
            history: self.history.iter().cloned().map(Into::into).collect(),
            active_effects: self.active_effects.iter().cloned().map(Into::into).collect(),
            updated_at: SystemTime::now(),
        }
    }

    /// Replace teams, timeline, timer and effects with a persisted snapshot.
    ///
    /// Connection flags are cleared since no socket survives a restart. The
    /// persisted status is returned for the state machine.
    pub fn restore(&mut self, entity: MatchStateEntity) -> GameStatus {
        self.teams = entity
            .teams
            .into_iter()
            .map(|team| {
                let id = team.id;
                (id, Team::from(team))
            })
            .collect();
        self.history = entity
            .history
            .into_iter()
            .take(self.history_limit)
            .map(Into::into)
            .collect();
        self.phase = entity.phase;
        self.global_timer = entity.global_timer.min(self.timer_start);
        self.active_effects = entity.active_effects.into_iter().map(Into::into).collect();
        entity.status
    }
}

/// Standings for `(id, name, score)` rows: score descending, ties share a
/// rank and keep their input order.
pub fn rank_by_score<'a>(teams: impl IntoIterator<Item = (Uuid, &'a str, i32)>) -> Vec<Standing> {
    let mut ordered: Vec<(Uuid, &str, i32)> = teams.into_iter().collect();
    ordered.sort_by(|a, b| b.2.cmp(&a.2));

    let mut standings: Vec<Standing> = Vec::with_capacity(ordered.len());
    for (index, (team_id, name, score)) in ordered.into_iter().enumerate() {
        let rank = match standings.last() {
            Some(previous) if previous.score == score => previous.rank,
            _ => index + 1,
        };
        standings.push(Standing {
            team_id,
            name: name.to_string(),
            score,
            rank,
        });
    }
    standings
}

impl From<(Uuid, Team)> for TeamEntity {
    fn from((id, team): (Uuid, Team)) -> Self {
        Self {
            id,
            name: team.name,
            score: team.score,
            avatar_url: team.avatar_url,
            token: team.token,
            completed_activities: team
                .completed_activities
                .into_iter()
                .map(|done| CompletedActivityEntity {
                    activity_id: done.activity_id,
                    points: done.points,
                })
                .collect(),
            created_at: team.created_at,
        }
    }
}

impl From<TeamEntity> for Team {
    fn from(value: TeamEntity) -> Self {
        Self {
            name: value.name,
            score: value.score.max(0),
            connected: false,
            avatar_url: value.avatar_url,
            token: value.token,
            completed_activities: value
                .completed_activities
                .into_iter()
                .map(|done| CompletedActivity {
                    activity_id: done.activity_id,
                    points: done.points,
                })
                .collect(),
            created_at: value.created_at,
        }
    }
}

impl From<HistoryEntry> for HistoryEntity {
    fn from(value: HistoryEntry) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            team_id: value.team_id,
            message: value.message,
            points: value.points,
            at: value.at,
        }
    }
}

impl From<HistoryEntity> for HistoryEntry {
    fn from(value: HistoryEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            team_id: value.team_id,
            message: value.message,
            points: value.points,
            at: value.at,
        }
    }
}

impl From<ActiveEffect> for EffectEntity {
    fn from(value: ActiveEffect) -> Self {
        Self {
            effect: value.effect,
            end_time: value.end_time,
        }
    }
}

impl From<EffectEntity> for ActiveEffect {
    fn from(value: EffectEntity) -> Self {
        Self {
            effect: value.effect,
            end_time: value.end_time,
        }
    }
}

fn generate_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(TEAM_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_state() -> MatchState {
        MatchState::new(3, 10)
    }

    #[test]
    fn team_names_are_unique_ignoring_case() {
        let mut state = match_state();
        state.add_team("Nebula", None).unwrap();
        assert_eq!(
            state.add_team("  nebula ", None).unwrap_err(),
            MatchError::DuplicateTeamName("nebula".into())
        );
    }

    #[test]
    fn tokens_identify_their_team_only() {
        let mut state = match_state();
        let (a, team_a) = state.add_team("A", None).unwrap();
        let (b, _) = state.add_team("B", None).unwrap();
        assert_eq!(team_a.token.len(), TEAM_TOKEN_LENGTH);
        assert!(state.verify_token(a, &team_a.token));
        assert!(!state.verify_token(b, &team_a.token));
        assert!(!state.verify_token(Uuid::new_v4(), &team_a.token));
    }

    #[test]
    fn history_is_most_recent_first_and_capped() {
        let mut state = match_state();
        for i in 0..5 {
            state.push_history(HistoryEntry::new(
                HistoryKind::Status,
                None,
                format!("event {i}"),
                None,
            ));
        }
        let messages: Vec<&str> = state.history().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, vec!["event 4", "event 3", "event 2"]);
    }

    #[test]
    fn an_activity_counts_once_per_team() {
        let mut state = match_state();
        let (id, _) = state.add_team("A", None).unwrap();
        assert_eq!(state.record_completion(id, "quiz-1", 300).unwrap(), 300);
        assert!(matches!(
            state.record_completion(id, "quiz-1", 300),
            Err(MatchError::AlreadyCompleted { .. })
        ));
        assert_eq!(state.teams[&id].score, 300);
    }

    #[test]
    fn score_adjustments_floor_at_zero() {
        let mut state = match_state();
        let (id, _) = state.add_team("A", None).unwrap();
        state.record_completion(id, "x", 120).unwrap();
        assert_eq!(state.adjust_score(id, -500).unwrap(), (0, -120));
        assert_eq!(state.adjust_score(id, 40).unwrap(), (40, 40));
    }

    #[test]
    fn ranking_shares_ranks_on_ties() {
        let mut state = match_state();
        let (a, _) = state.add_team("A", None).unwrap();
        let (b, _) = state.add_team("B", None).unwrap();
        let (c, _) = state.add_team("C", None).unwrap();
        state.adjust_score(a, 100).unwrap();
        state.adjust_score(b, 300).unwrap();
        state.adjust_score(c, 100).unwrap();

        let ranking = state.ranking();
        let summary: Vec<(&str, usize)> = ranking
            .iter()
            .map(|standing| (standing.name.as_str(), standing.rank))
            .collect();
        assert_eq!(summary, vec![("B", 1), ("A", 2), ("C", 2)]);
    }

    #[test]
    fn tick_counts_down_only_while_running() {
        let mut state = MatchState::new(3, 2);
        let now = SystemTime::now();
        assert_eq!(state.tick(false, now).timer, None);
        assert_eq!(state.tick(true, now).timer, Some(1));
        let last = state.tick(true, now);
        assert_eq!(last.timer, Some(0));
        assert!(last.timer_elapsed);
        assert_eq!(state.tick(true, now), TickOutcome::default());
    }

    #[test]
    fn tick_expires_finished_effects() {
        let mut state = match_state();
        let now = SystemTime::now();
        state.add_effect("blackout", Duration::from_secs(5), now).unwrap();
        state.add_effect("storm", Duration::from_secs(60), now).unwrap();

        let outcome = state.tick(false, now + Duration::from_secs(5));
        assert_eq!(outcome.expired_effects.len(), 1);
        assert_eq!(outcome.expired_effects[0].effect, "blackout");
        assert_eq!(state.active_effects.len(), 1);
    }

    #[test]
    fn retriggering_an_effect_extends_it() {
        let mut state = match_state();
        let now = SystemTime::now();
        state.add_effect("storm", Duration::from_secs(5), now).unwrap();
        let extended = state.add_effect("storm", Duration::from_secs(30), now).unwrap();
        assert_eq!(state.active_effects, vec![extended]);
    }

    #[test]
    fn unrepresentable_effect_end_is_rejected() {
        let mut state = match_state();
        let err = state
            .add_effect("blackout", Duration::from_secs(u64::MAX), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, MatchError::EffectOutOfRange(_)));
        assert!(state.active_effects.is_empty());
    }

    #[test]
    fn snapshot_round_trip_drops_connection_flags() {
        let mut state = match_state();
        let (id, _) = state.add_team("A", Some("https://avatars.test/a".into())).unwrap();
        state.set_connected(id, true);
        state.record_completion(id, "quiz-1", 250).unwrap();
        state.phase = "finale".into();
        state.push_history(HistoryEntry::new(HistoryKind::Status, None, "go", None));

        let entity = state.to_entity(GameStatus::Paused);
        let mut restored = match_state();
        assert_eq!(restored.restore(entity), GameStatus::Paused);

        let team = &restored.teams[&id];
        assert!(!team.connected);
        assert_eq!(team.score, 250);
        assert_eq!(team.completed_activities.len(), 1);
        assert_eq!(restored.phase, "finale");
        assert_eq!(restored.history().count(), 1);
    }

    #[test]
    fn reset_restores_the_timer_and_clears_teams() {
        let mut state = match_state();
        state.add_team("A", None).unwrap();
        state.tick(true, SystemTime::now());
        state.reset();
        assert!(state.teams.is_empty());
        assert_eq!(state.global_timer, 10);
        assert_eq!(state.history().count(), 0);
    }
}
