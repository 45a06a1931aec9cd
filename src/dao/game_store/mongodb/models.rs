use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dao::models::{
        EffectEntity, HistoryEntity, MATCH_STATE_KEY, MatchStateEntity, ProgressEntity,
        TeamEntity,
    },
    state::state_machine::GameStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: String,
    status: GameStatus,
    phase: String,
    global_timer: u32,
    teams: Vec<TeamEntity>,
    history: Vec<HistoryEntity>,
    #[serde(default)]
    active_effects: Vec<EffectEntity>,
    updated_at: DateTime,
}

impl From<MatchStateEntity> for MongoMatchDocument {
    fn from(value: MatchStateEntity) -> Self {
        Self {
            id: MATCH_STATE_KEY.to_string(),
            status: value.status,
            phase: value.phase,
            global_timer: value.global_timer,
            teams: value.teams,
            history: value.history,
            active_effects: value.active_effects,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoMatchDocument> for MatchStateEntity {
    fn from(value: MongoMatchDocument) -> Self {
        Self {
            status: value.status,
            phase: value.phase,
            global_timer: value.global_timer,
            teams: value.teams,
            history: value.history,
            active_effects: value.active_effects,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProgressDocument {
    #[serde(rename = "_id")]
    device_id: String,
    state: Value,
    updated_at: DateTime,
}

impl From<ProgressEntity> for MongoProgressDocument {
    fn from(value: ProgressEntity) -> Self {
        Self {
            device_id: value.device_id,
            state: value.state,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoProgressDocument> for ProgressEntity {
    fn from(value: MongoProgressDocument) -> Self {
        Self {
            device_id: value.device_id,
            state: value.state,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}
