use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Teams are registering; nothing is scored yet.
    Lobby,
    /// Activities can be completed and the timer runs.
    Playing,
    /// Timer frozen; completions are refused.
    Paused,
    /// Final ranking is displayed until the game master resets.
    Ended,
}

/// Why the match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The game master stopped the match.
    Manual,
    /// The global timer reached zero.
    TimerElapsed,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Leave the lobby and start playing.
    Start,
    /// Freeze the match.
    Pause,
    /// Resume after a pause.
    Resume,
    /// Stop the match and show the ranking.
    End(EndReason),
    /// Return to the lobby from anywhere.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the state machine was in when the invalid event was received.
    pub from: GameStatus,
    /// The event that cannot be applied from this status.
    pub event: GameEvent,
}

/// Why a transition could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Another transition is in flight.
    #[error("a status change is already in progress")]
    AlreadyPending,
    /// Event not allowed from the current status.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Why a planned transition could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Nothing to apply.
    #[error("no status change is pending")]
    NoPending,
    /// A different plan is pending.
    #[error("plan {got} is not the pending plan {expected}")]
    IdMismatch {
        /// Pending plan.
        expected: PlanId,
        /// Plan the caller holds.
        got: PlanId,
    },
    /// Status moved under the plan.
    #[error("status moved from {expected:?} to {actual:?} while the change was pending")]
    StatusMismatch {
        /// Status when planned.
        expected: GameStatus,
        /// Status now.
        actual: GameStatus,
    },
    /// Version moved under the plan.
    #[error("status version moved from {expected} to {actual} while the change was pending")]
    VersionMismatch {
        /// Version when planned.
        expected: usize,
        /// Version now.
        actual: usize,
    },
}

/// Why a planned transition could not be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// Nothing to abort.
    #[error("no status change is pending")]
    NoPending,
    /// A different plan is pending.
    #[error("plan {got} is not the pending plan {expected}")]
    IdMismatch {
        /// Pending plan.
        expected: PlanId,
        /// Plan the caller holds.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Status the state machine is currently in.
    pub from: GameStatus,
    /// Status the state machine will transition to.
    pub to: GameStatus,
    /// Event that triggered this transition.
    pub event: GameEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current status.
    pub status: GameStatus,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending target status, if a transition is planned but not yet applied.
    pub pending: Option<GameStatus>,
}

/// Match lifecycle: lobby, playing, paused, ended.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    status: GameStatus,
    version: usize,
    pending: Option<Plan>,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self {
            status: GameStatus::Lobby,
            version: 0,
            pending: None,
        }
    }
}

impl GameStateMachine {
    /// Create a new state machine in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Put back a persisted status. Refused while a transition is pending.
    pub fn restore(&mut self, status: GameStatus) -> Result<(), PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        self.status = status;
        self.version += 1;
        Ok(())
    }

    /// Plan a transition by validating that the event can be applied from the current status.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: GameEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.status,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, returning the new status.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<GameStatus, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.status != plan.from {
            return Err(ApplyError::StatusMismatch {
                expected: plan.from,
                actual: self.status,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.status = plan.to;
        self.version = plan.version_next;

        Ok(self.status)
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: GameEvent) -> Result<GameStatus, InvalidTransition> {
        let next = match (self.status, event) {
            (GameStatus::Lobby, GameEvent::Start) => GameStatus::Playing,
            (GameStatus::Playing, GameEvent::Pause) => GameStatus::Paused,
            (GameStatus::Paused, GameEvent::Resume) => GameStatus::Playing,
            (GameStatus::Playing | GameStatus::Paused, GameEvent::End(_)) => GameStatus::Ended,
            (_, GameEvent::Reset) => GameStatus::Lobby,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
