//! Player progress requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::state::progress::{MAX_SAVE_PAYLOAD_LEN, PlayerProgress, ProgressEvent};

/// Progress after an action, with what changed.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressActionResponse {
    pub state: PlayerProgress,
    /// Reducer events, tagged by `type`.
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<ProgressEvent>,
}

/// QR save payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExportResponse {
    pub payload: String,
    /// Character count, at most 2000.
    pub length: usize,
}

impl ExportResponse {
    /// Wrap an encoded payload.
    pub fn new(payload: String) -> Self {
        let length = payload.len();
        Self { payload, length }
    }
}

/// Save payload scanned from a QR code.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportRequest {
    pub payload: String,
}

impl Validate for ImportRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.payload.trim().is_empty() || self.payload.len() > MAX_SAVE_PAYLOAD_LEN {
            let mut err = ValidationError::new("payload_length");
            err.message = Some(
                format!("Save payload must be between 1 and {MAX_SAVE_PAYLOAD_LEN} characters")
                    .into(),
            );
            errors.add("payload", err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_request_rejects_oversized_payloads() {
        let request = ImportRequest {
            payload: "x".repeat(MAX_SAVE_PAYLOAD_LEN + 1),
        };
        assert!(request.validate().is_err());
        let request = ImportRequest {
            payload: "{}".into(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let value = serde_json::to_value(ProgressEvent::ActivityCompleted {
            universe_id: "space".into(),
            activity_id: "space-seq".into(),
            best_score: 900,
            gained: 900,
        })
        .unwrap();
        assert_eq!(value["type"], "activity_completed");
        assert_eq!(value["detail"]["bestScore"], 900);

        let value = serde_json::to_value(ProgressEvent::UniverseCompleted("space".into())).unwrap();
        assert_eq!(value["detail"], "space");
    }
}
