//! Per-activity scoring rules and the session that feeds them.
//!
//! A [`ScoringSession`] measures one run of a mini-game (wall-clock duration,
//! attempts, errors) and converts it into points with the rule attached to
//! the activity kind. Every result is clamped at zero.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Bonus granted for a flawless sequence completed quickly.
pub const SEQUENCE_SPEED_BONUS: u32 = 200;
const SEQUENCE_BONUS_WINDOW: Duration = Duration::from_secs(30);
const SEQUENCE_ERROR_PENALTY: u32 = 50;
const DECODE_GRACE: Duration = Duration::from_secs(60);
const DECODE_PENALTY_PER_SECOND: u32 = 5;
const DRAWING_ERROR_PENALTY: u32 = 25;
const QUIZ_ERROR_PENALTY: u32 = 100;

/// Family of mini-game, each with its own scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Memorize and replay a sequence.
    Sequence,
    /// Hacking / decoding puzzle against the clock.
    Decode,
    /// Draw a shape to be recognized.
    Drawing,
    /// Question and answer round.
    Quiz,
}

/// Raw measurements of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreInput {
    /// Points for a flawless run.
    pub max_points: u32,
    /// Number of mistakes made.
    pub errors: u32,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl ActivityKind {
    /// Apply the kind's formula, clamped at zero.
    pub fn score(self, input: ScoreInput) -> u32 {
        let ScoreInput {
            max_points,
            errors,
            duration,
        } = input;
        match self {
            ActivityKind::Sequence => {
                let base = max_points.saturating_sub(errors.saturating_mul(SEQUENCE_ERROR_PENALTY));
                if errors == 0 && duration < SEQUENCE_BONUS_WINDOW {
                    base + SEQUENCE_SPEED_BONUS
                } else {
                    base
                }
            }
            ActivityKind::Decode => {
                let overtime = duration.saturating_sub(DECODE_GRACE).as_secs();
                let penalty = overtime
                    .saturating_mul(u64::from(DECODE_PENALTY_PER_SECOND))
                    .min(u64::from(u32::MAX)) as u32;
                max_points.saturating_sub(penalty)
            }
            ActivityKind::Drawing => {
                max_points.saturating_sub(errors.saturating_mul(DRAWING_ERROR_PENALTY))
            }
            ActivityKind::Quiz => {
                max_points.saturating_sub(errors.saturating_mul(QUIZ_ERROR_PENALTY))
            }
        }
    }

    /// Upper bound a run of this kind can be awarded.
    pub fn max_award(self, max_points: u32) -> u32 {
        match self {
            ActivityKind::Sequence => max_points + SEQUENCE_SPEED_BONUS,
            _ => max_points,
        }
    }
}

/// Result of finalizing a [`ScoringSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Points awarded.
    pub points: u32,
    /// Attempts recorded during the run.
    pub attempts: u32,
    /// Errors recorded during the run.
    pub errors: u32,
    /// Measured duration.
    pub duration: Duration,
}

/// Tracks one run of an activity between `start` and `finalize`.
#[derive(Debug, Clone)]
pub struct ScoringSession {
    kind: ActivityKind,
    max_points: u32,
    started_at: Option<Instant>,
    attempts: u32,
    errors: u32,
}

impl ScoringSession {
    /// Prepare a session for an activity; nothing is measured until [`start`](Self::start).
    pub fn new(kind: ActivityKind, max_points: u32) -> Self {
        Self {
            kind,
            max_points,
            started_at: None,
            attempts: 0,
            errors: 0,
        }
    }

    /// Start the wall-clock timer now.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Start the wall-clock timer at a given instant, clearing previous counters.
    pub fn start_at(&mut self, at: Instant) {
        self.started_at = Some(at);
        self.attempts = 0;
        self.errors = 0;
    }

    /// Whether the timer is running.
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Count one attempt.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Count one error.
    pub fn record_error(&mut self) {
        self.errors = self.errors.saturating_add(1);
    }

    /// Stop the timer now and compute the score.
    pub fn finalize(&mut self) -> Option<ScoreOutcome> {
        self.finalize_at(Instant::now())
    }

    /// Stop the timer at `at` and compute the score.
    ///
    /// Returns `None` when the session was never started. The session is
    /// cleared afterwards so the next run starts from scratch.
    pub fn finalize_at(&mut self, at: Instant) -> Option<ScoreOutcome> {
        let started_at = self.started_at.take()?;
        let duration = at.saturating_duration_since(started_at);
        let duration = Duration::from_secs(duration.as_secs());
        let points = self.kind.score(ScoreInput {
            max_points: self.max_points,
            errors: self.errors,
            duration,
        });
        let outcome = ScoreOutcome {
            points,
            attempts: self.attempts,
            errors: self.errors,
            duration,
        };
        self.attempts = 0;
        self.errors = 0;
        Some(outcome)
    }
}
