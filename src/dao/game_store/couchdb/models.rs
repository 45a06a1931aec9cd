use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{MATCH_STATE_KEY, MatchStateEntity, ProgressEntity},
    state::progress::PROGRESS_STORAGE_KEY,
};

/// Separator between a document kind and its key.
const KEY_SEPARATOR: &str = "::";

/// Match snapshot wrapped with the CouchDB bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub snapshot: MatchStateEntity,
}

impl From<(MatchStateEntity, Option<String>)> for CouchMatchDocument {
    fn from((snapshot, rev): (MatchStateEntity, Option<String>)) -> Self {
        Self {
            id: MATCH_STATE_KEY.to_string(),
            rev,
            snapshot,
        }
    }
}

/// Device progress wrapped with the CouchDB bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchProgressDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub progress: ProgressEntity,
}

impl From<(ProgressEntity, Option<String>)> for CouchProgressDocument {
    fn from((progress, rev): (ProgressEntity, Option<String>)) -> Self {
        Self {
            id: progress_doc_id(&progress.device_id),
            rev,
            progress,
        }
    }
}

/// Document id of a device progress: `multivers_player_state_v2::<device>`.
pub fn progress_doc_id(device_id: &str) -> String {
    format!("{PROGRESS_STORAGE_KEY}{KEY_SEPARATOR}{device_id}")
}
