//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::state::state_machine::GameStatus;

/// Longest phase label accepted.
pub const PHASE_MAX_LEN: usize = 64;
/// Longest scenario effect duration, in seconds.
pub const SCENARIO_MAX_SECS: u64 = 600;

/// Request to change the free-form phase label.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PhaseRequest {
    pub phase: String,
}

impl Validate for PhaseRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.phase.chars().count() > PHASE_MAX_LEN {
            let mut err = ValidationError::new("phase_length");
            err.message = Some(format!("Phase must be at most {PHASE_MAX_LEN} characters").into());
            errors.add("phase", err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Request to adjust a team's score by a delta.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAdjustmentRequest {
    pub team_id: Uuid,
    pub delta: i32,
    /// Shown in the history entry.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request to trigger a scenario effect on every display.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub effect: String,
    /// Falls back to the configured scenario duration.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Validate for ScenarioRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.effect.trim().is_empty() {
            let mut err = ValidationError::new("effect_empty");
            err.message = Some("Effect name must not be empty".into());
            errors.add("effect", err);
        }
        if let Some(secs) = self.duration_secs
            && (secs == 0 || secs > SCENARIO_MAX_SECS)
        {
            let mut err = ValidationError::new("duration_range");
            err.message =
                Some(format!("Duration must be between 1 and {SCENARIO_MAX_SECS} seconds").into());
            errors.add("duration_secs", err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Cosmetic command relayed to War Room displays.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WarroomRequest {
    pub command: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

impl Validate for WarroomRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.command.trim().is_empty() {
            let mut err = ValidationError::new("command_empty");
            err.message = Some("Command must not be empty".into());
            errors.add("command", err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Generic action acknowledgement used by admin endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    /// Acknowledgement with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of a score adjustment, returning the updated tally.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateResponse {
    pub team_id: Uuid,
    pub score: i32,
    /// Delta actually applied once the score is floored at zero.
    pub delta: i32,
}

/// Current match status after a transition.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: GameStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_duration_is_bounded() {
        let ok = ScenarioRequest {
            effect: "blackout".into(),
            duration_secs: Some(30),
            message: None,
        };
        assert!(ok.validate().is_ok());

        let zero = ScenarioRequest {
            effect: "blackout".into(),
            duration_secs: Some(0),
            message: None,
        };
        assert!(zero.validate().is_err());

        let blank = ScenarioRequest {
            effect: " ".into(),
            duration_secs: None,
            message: None,
        };
        assert!(blank.validate().unwrap_err().field_errors().contains_key("effect"));
    }
}
