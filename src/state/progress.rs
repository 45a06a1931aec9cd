//! Per-device player progression: which universes and activities are unlocked
//! or completed, plus the save payload exchanged through QR codes.
//!
//! The reducer is pure: [`reduce`] takes the previous state and an action and
//! returns a new state alongside the events it produced. Universe completion
//! counters are always recomputed from the activity map.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::catalogue::{Catalogue, UniverseDef};

/// Storage key (and document prefix) under which progress is persisted.
pub const PROGRESS_STORAGE_KEY: &str = "multivers_player_state_v2";
/// Largest save payload that still fits in a QR code.
pub const MAX_SAVE_PAYLOAD_LEN: usize = 2000;

/// Unlock state shared by universes and activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UnlockStatus {
    /// Not playable yet.
    Locked,
    /// Playable.
    Unlocked,
    /// Finished at least once.
    Completed,
}

/// Progress on a single activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityProgress {
    /// Unlock state.
    pub status: UnlockStatus,
    /// Best score ever obtained; never decreases.
    pub best_score: u32,
    /// Number of completed runs.
    pub attempts: u32,
}

/// Progress on a universe and its activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UniverseProgress {
    /// Unlock state.
    pub status: UnlockStatus,
    /// Number of completed activities, derived from `activities`.
    pub completed_activities: usize,
    /// Activity progress keyed by activity id.
    #[schema(value_type = Object)]
    pub activities: IndexMap<String, ActivityProgress>,
}

/// Whole progression of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    /// Team the device plays for.
    pub team_name: String,
    /// Avatar style chosen by the team.
    #[serde(default)]
    pub avatar_style: Option<String>,
    /// Sum of the best scores of every activity.
    pub points: u32,
    /// Fragments earned, one per completed universe.
    pub fragments: u32,
    /// Universe progress keyed by universe id, in unlock order.
    #[schema(value_type = Object)]
    pub universes: IndexMap<String, UniverseProgress>,
    /// Items granted by completed universes.
    #[serde(default)]
    pub inventory: Vec<String>,
}

/// Actions accepted by [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressAction {
    /// Unlock a universe and all of its activities.
    #[serde(rename_all = "camelCase")]
    UnlockUniverse {
        /// Universe to unlock.
        universe_id: String,
    },
    /// Unlock a single activity (and its universe when still locked).
    #[serde(rename_all = "camelCase")]
    UnlockActivity {
        /// Owning universe.
        universe_id: String,
        /// Activity to unlock.
        activity_id: String,
    },
    /// Record a finished run.
    #[serde(rename_all = "camelCase")]
    CompleteActivity {
        /// Owning universe.
        universe_id: String,
        /// Completed activity.
        activity_id: String,
        /// Score of the run.
        score: u32,
    },
    /// Replace the state with a previously exported save.
    ImportSave {
        /// JSON save payload.
        payload: String,
    },
    /// Set the team identity of the device.
    #[serde(rename_all = "camelCase")]
    SetTeam {
        /// Team name.
        team_name: String,
        /// Avatar style.
        #[serde(default)]
        avatar_style: Option<String>,
    },
    /// Start over from the default state.
    Reset,
}

/// Notable outcomes produced while reducing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A universe became playable.
    UniverseUnlocked(String),
    /// An activity became playable.
    #[serde(rename_all = "camelCase")]
    ActivityUnlocked {
        /// Owning universe.
        universe_id: String,
        /// Unlocked activity.
        activity_id: String,
    },
    /// A run was recorded.
    #[serde(rename_all = "camelCase")]
    ActivityCompleted {
        /// Owning universe.
        universe_id: String,
        /// Completed activity.
        activity_id: String,
        /// Best score after the run.
        best_score: u32,
        /// Points added to the total by this run.
        gained: u32,
    },
    /// Every activity of a universe is now completed.
    UniverseCompleted(String),
    /// A fragment was awarded; carries the new total.
    FragmentAwarded(u32),
    /// An inventory item was granted.
    ItemGranted(String),
    /// A save payload replaced the state.
    SaveImported,
    /// Team identity changed.
    TeamUpdated,
    /// State returned to defaults.
    Reset,
}

/// New state produced by [`reduce`] and what happened on the way.
#[derive(Debug, Clone)]
pub struct Reduction {
    /// State after the action.
    pub state: PlayerProgress,
    /// Events in the order they happened.
    pub events: Vec<ProgressEvent>,
}

/// Errors raised by the reducer and save handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    /// Universe id is not part of the catalogue.
    #[error("unknown universe `{0}`")]
    UnknownUniverse(String),
    /// Activity id is not part of the given universe.
    #[error("unknown activity `{activity_id}` in universe `{universe_id}`")]
    UnknownActivity {
        /// Universe searched.
        universe_id: String,
        /// Missing activity.
        activity_id: String,
    },
    /// Universe is still locked.
    #[error("universe `{0}` is locked")]
    UniverseLocked(String),
    /// Activity is still locked.
    #[error("activity `{0}` is locked")]
    ActivityLocked(String),
    /// Save payload could not be read.
    #[error("invalid save file: {0}")]
    InvalidSave(String),
    /// Exported payload does not fit in a QR code.
    #[error("save payload is {len} characters long, the limit is {max}")]
    PayloadTooLarge {
        /// Payload length.
        len: usize,
        /// Maximum length.
        max: usize,
    },
}

/// Portable save exchanged through QR codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    /// Team name.
    pub team_name: String,
    /// Avatar style.
    #[serde(default)]
    pub avatar_style: Option<String>,
    /// Total points.
    pub points: u32,
    /// Fragments earned.
    pub fragments: u32,
    /// Universe progress.
    pub universes: IndexMap<String, UniverseProgress>,
    /// Inventory items.
    #[serde(default)]
    pub inventory: Vec<String>,
    /// Export time, unix milliseconds.
    pub timestamp: u64,
}

impl PlayerProgress {
    /// Default progression: first universe open, everything else locked.
    pub fn new(catalogue: &Catalogue) -> Self {
        let mut progress = Self {
            team_name: String::new(),
            avatar_style: None,
            points: 0,
            fragments: 0,
            universes: IndexMap::new(),
            inventory: Vec::new(),
        };
        progress.normalize(catalogue);
        progress
    }

    /// Rebuild a state read back from storage, aligning it with the catalogue.
    pub fn from_stored(
        value: serde_json::Value,
        catalogue: &Catalogue,
    ) -> Result<Self, serde_json::Error> {
        let mut progress: Self = serde_json::from_value(value)?;
        progress.normalize(catalogue);
        Ok(progress)
    }

    /// Serialize the state into the QR save payload.
    pub fn export_save(&self, timestamp_ms: u64) -> Result<String, ProgressError> {
        let payload = SavePayload {
            team_name: self.team_name.clone(),
            avatar_style: self.avatar_style.clone(),
            points: self.points,
            fragments: self.fragments,
            universes: self.universes.clone(),
            inventory: self.inventory.clone(),
            timestamp: timestamp_ms,
        };
        let encoded = serde_json::to_string(&payload)
            .map_err(|err| ProgressError::InvalidSave(err.to_string()))?;
        if encoded.len() > MAX_SAVE_PAYLOAD_LEN {
            return Err(ProgressError::PayloadTooLarge {
                len: encoded.len(),
                max: MAX_SAVE_PAYLOAD_LEN,
            });
        }
        Ok(encoded)
    }

    /// Status of a universe, if tracked.
    pub fn universe_status(&self, universe_id: &str) -> Option<UnlockStatus> {
        self.universes.get(universe_id).map(|universe| universe.status)
    }

    /// Progress of an activity, if tracked.
    pub fn activity(&self, universe_id: &str, activity_id: &str) -> Option<&ActivityProgress> {
        self.universes.get(universe_id)?.activities.get(activity_id)
    }

    /// Ensure every catalogue entry is tracked in catalogue order and rebuild
    /// everything derived from the activity map: completion counters, universe
    /// completion, fragments and points. Entries unknown to the catalogue are dropped.
    fn normalize(&mut self, catalogue: &Catalogue) {
        let mut previous = std::mem::take(&mut self.universes);
        for (index, def) in catalogue.universes().iter().enumerate() {
            let default_status = if index == 0 {
                UnlockStatus::Unlocked
            } else {
                UnlockStatus::Locked
            };
            let mut universe = previous
                .shift_remove(&def.id)
                .unwrap_or_else(|| UniverseProgress {
                    status: default_status,
                    completed_activities: 0,
                    activities: IndexMap::new(),
                });
            let activity_default = match universe.status {
                UnlockStatus::Locked => UnlockStatus::Locked,
                _ => UnlockStatus::Unlocked,
            };
            let mut activities = std::mem::take(&mut universe.activities);
            for activity in &def.activities {
                let progress = activities
                    .shift_remove(&activity.id)
                    .unwrap_or(ActivityProgress {
                        status: activity_default,
                        best_score: 0,
                        attempts: 0,
                    });
                universe.activities.insert(activity.id.clone(), progress);
            }
            recount(&mut universe);
            let all_done = !universe.activities.is_empty()
                && universe.completed_activities == universe.activities.len();
            universe.status = match universe.status {
                _ if all_done => UnlockStatus::Completed,
                UnlockStatus::Completed => UnlockStatus::Unlocked,
                status => status,
            };
            self.universes.insert(def.id.clone(), universe);
        }

        self.fragments = self
            .universes
            .values()
            .filter(|universe| universe.status == UnlockStatus::Completed)
            .count() as u32;
        self.points = self
            .universes
            .values()
            .flat_map(|universe| universe.activities.values())
            .fold(0u32, |total, activity| total.saturating_add(activity.best_score));
    }
}

/// Apply `action` to `state`, returning the next state.
///
/// The input is never modified; on error the caller keeps the previous state.
pub fn reduce(
    state: &PlayerProgress,
    catalogue: &Catalogue,
    action: ProgressAction,
) -> Result<Reduction, ProgressError> {
    let mut next = state.clone();
    next.normalize(catalogue);
    let mut events = Vec::new();

    match action {
        ProgressAction::UnlockUniverse { universe_id } => {
            let def = catalogue
                .universe(&universe_id)
                .ok_or_else(|| ProgressError::UnknownUniverse(universe_id.clone()))?;
            unlock_universe(&mut next, def, &mut events);
        }
        ProgressAction::UnlockActivity {
            universe_id,
            activity_id,
        } => {
            ensure_known(catalogue, &universe_id, &activity_id)?;
            let universe = tracked_universe(&mut next, &universe_id)?;
            if universe.status == UnlockStatus::Locked {
                universe.status = UnlockStatus::Unlocked;
                events.push(ProgressEvent::UniverseUnlocked(universe_id.clone()));
            }
            if let Some(activity) = universe.activities.get_mut(&activity_id) {
                if activity.status == UnlockStatus::Locked {
                    activity.status = UnlockStatus::Unlocked;
                    events.push(ProgressEvent::ActivityUnlocked {
                        universe_id,
                        activity_id,
                    });
                }
            }
        }
        ProgressAction::CompleteActivity {
            universe_id,
            activity_id,
            score,
        } => {
            ensure_known(catalogue, &universe_id, &activity_id)?;
            complete_activity(
                &mut next,
                catalogue,
                &universe_id,
                &activity_id,
                score,
                &mut events,
            )?;
        }
        ProgressAction::ImportSave { payload } => {
            next = import_save(&payload, catalogue)?;
            events.push(ProgressEvent::SaveImported);
        }
        ProgressAction::SetTeam {
            team_name,
            avatar_style,
        } => {
            next.team_name = team_name.trim().to_string();
            next.avatar_style = avatar_style;
            events.push(ProgressEvent::TeamUpdated);
        }
        ProgressAction::Reset => {
            next = PlayerProgress::new(catalogue);
            events.push(ProgressEvent::Reset);
        }
    }

    Ok(Reduction {
        state: next,
        events,
    })
}

/// Parse a save payload into a fresh state aligned with the catalogue.
pub fn import_save(payload: &str, catalogue: &Catalogue) -> Result<PlayerProgress, ProgressError> {
    let save: SavePayload = serde_json::from_str(payload.trim())
        .map_err(|err| ProgressError::InvalidSave(err.to_string()))?;

    let mut progress = PlayerProgress {
        team_name: save.team_name,
        avatar_style: save.avatar_style,
        points: save.points,
        fragments: save.fragments,
        universes: save.universes,
        inventory: save.inventory,
    };
    progress.normalize(catalogue);
    Ok(progress)
}

/// Current unix time in milliseconds, used to stamp exported saves.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn ensure_known(
    catalogue: &Catalogue,
    universe_id: &str,
    activity_id: &str,
) -> Result<(), ProgressError> {
    if catalogue.universe(universe_id).is_none() {
        return Err(ProgressError::UnknownUniverse(universe_id.to_string()));
    }
    if catalogue.activity(universe_id, activity_id).is_none() {
        return Err(ProgressError::UnknownActivity {
            universe_id: universe_id.to_string(),
            activity_id: activity_id.to_string(),
        });
    }
    Ok(())
}

fn tracked_universe<'a>(
    progress: &'a mut PlayerProgress,
    universe_id: &str,
) -> Result<&'a mut UniverseProgress, ProgressError> {
    progress
        .universes
        .get_mut(universe_id)
        .ok_or_else(|| ProgressError::UnknownUniverse(universe_id.to_string()))
}

fn unlock_universe(
    progress: &mut PlayerProgress,
    def: &UniverseDef,
    events: &mut Vec<ProgressEvent>,
) {
    let Some(universe) = progress.universes.get_mut(&def.id) else {
        return;
    };
    if universe.status == UnlockStatus::Locked {
        universe.status = UnlockStatus::Unlocked;
        events.push(ProgressEvent::UniverseUnlocked(def.id.clone()));
    }
    for (activity_id, activity) in universe.activities.iter_mut() {
        if activity.status == UnlockStatus::Locked {
            activity.status = UnlockStatus::Unlocked;
            events.push(ProgressEvent::ActivityUnlocked {
                universe_id: def.id.clone(),
                activity_id: activity_id.clone(),
            });
        }
    }
}

fn complete_activity(
    progress: &mut PlayerProgress,
    catalogue: &Catalogue,
    universe_id: &str,
    activity_id: &str,
    score: u32,
    events: &mut Vec<ProgressEvent>,
) -> Result<(), ProgressError> {
    let universe = tracked_universe(progress, universe_id)?;
    if universe.status == UnlockStatus::Locked {
        return Err(ProgressError::UniverseLocked(universe_id.to_string()));
    }
    let activity = universe
        .activities
        .get_mut(activity_id)
        .ok_or_else(|| ProgressError::UnknownActivity {
            universe_id: universe_id.to_string(),
            activity_id: activity_id.to_string(),
        })?;
    if activity.status == UnlockStatus::Locked {
        return Err(ProgressError::ActivityLocked(activity_id.to_string()));
    }

    activity.attempts = activity.attempts.saturating_add(1);
    let gained = if activity.status == UnlockStatus::Completed {
        score.saturating_sub(activity.best_score)
    } else {
        activity.status = UnlockStatus::Completed;
        score
    };
    activity.best_score = activity.best_score.max(score);
    let best_score = activity.best_score;

    recount(universe);
    let finished_now =
        universe.status != UnlockStatus::Completed && universe.completed_activities == universe.activities.len();
    if finished_now {
        universe.status = UnlockStatus::Completed;
    }

    progress.points = progress.points.saturating_add(gained);
    events.push(ProgressEvent::ActivityCompleted {
        universe_id: universe_id.to_string(),
        activity_id: activity_id.to_string(),
        best_score,
        gained,
    });

    if finished_now {
        events.push(ProgressEvent::UniverseCompleted(universe_id.to_string()));
        progress.fragments = progress.fragments.saturating_add(1);
        events.push(ProgressEvent::FragmentAwarded(progress.fragments));

        if let Some(item) = catalogue
            .universe(universe_id)
            .and_then(|def| def.reward.clone())
        {
            if !progress.inventory.contains(&item) {
                progress.inventory.push(item.clone());
                events.push(ProgressEvent::ItemGranted(item));
            }
        }

        if let Some(next) = catalogue.next_after(universe_id) {
            unlock_universe(progress, next, events);
        }
    }

    Ok(())
}

fn recount(universe: &mut UniverseProgress) {
    universe.completed_activities = universe
        .activities
        .values()
        .filter(|activity| activity.status == UnlockStatus::Completed)
        .count();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::catalogue::fixtures::small_catalogue;

    fn complete(state: &PlayerProgress, universe: &str, activity: &str, score: u32) -> Reduction {
        reduce(
            state,
            &small_catalogue(),
            ProgressAction::CompleteActivity {
                universe_id: universe.into(),
                activity_id: activity.into(),
                score,
            },
        )
        .unwrap()
    }

    #[test]
    fn default_state_opens_only_the_first_universe() {
        let progress = PlayerProgress::new(&small_catalogue());
        assert_eq!(progress.universe_status("space"), Some(UnlockStatus::Unlocked));
        assert_eq!(progress.universe_status("cyber"), Some(UnlockStatus::Locked));
        assert_eq!(
            progress.activity("space", "space-seq").unwrap().status,
            UnlockStatus::Unlocked
        );
        assert_eq!(
            progress.activity("cyber", "cyber-quiz").unwrap().status,
            UnlockStatus::Locked
        );
    }

    #[test]
    fn best_score_never_decreases() {
        let start = PlayerProgress::new(&small_catalogue());
        let first = complete(&start, "space", "space-seq", 900).state;
        let worse = complete(&first, "space", "space-seq", 400).state;
        let better = complete(&worse, "space", "space-seq", 1100).state;

        assert_eq!(first.activity("space", "space-seq").unwrap().best_score, 900);
        assert_eq!(worse.activity("space", "space-seq").unwrap().best_score, 900);
        assert_eq!(better.activity("space", "space-seq").unwrap().best_score, 1100);
        assert_eq!(better.activity("space", "space-seq").unwrap().attempts, 3);
        assert_eq!(better.points, 1100);
    }

    #[test]
    fn completing_a_universe_unlocks_exactly_the_next_one_once() {
        let start = PlayerProgress::new(&small_catalogue());
        let half = complete(&start, "space", "space-seq", 100).state;
        assert_eq!(half.universe_status("space"), Some(UnlockStatus::Unlocked));
        assert_eq!(half.universes["space"].completed_activities, 1);

        let done = complete(&half, "space", "space-decode", 200);
        assert!(done.events.contains(&ProgressEvent::UniverseCompleted("space".into())));
        assert!(done.events.contains(&ProgressEvent::UniverseUnlocked("cyber".into())));
        assert!(done.events.contains(&ProgressEvent::ItemGranted("star-map".into())));
        let done = done.state;
        assert_eq!(done.universe_status("space"), Some(UnlockStatus::Completed));
        assert_eq!(done.universe_status("cyber"), Some(UnlockStatus::Unlocked));
        assert_eq!(done.universe_status("ocean"), Some(UnlockStatus::Locked));
        assert_eq!(done.fragments, 1);
        assert_eq!(
            done.activity("cyber", "cyber-draw").unwrap().status,
            UnlockStatus::Unlocked
        );

        let replay = complete(&done, "space", "space-seq", 300);
        assert!(!replay
            .events
            .iter()
            .any(|event| matches!(event, ProgressEvent::UniverseCompleted(_))));
        assert_eq!(replay.state.fragments, 1);
        assert_eq!(replay.state.inventory, vec!["star-map".to_string()]);
        assert_eq!(replay.state.points, 500);
    }

    #[test]
    fn locked_and_unknown_targets_are_rejected() {
        let catalogue = small_catalogue();
        let start = PlayerProgress::new(&catalogue);

        let locked = reduce(
            &start,
            &catalogue,
            ProgressAction::CompleteActivity {
                universe_id: "cyber".into(),
                activity_id: "cyber-draw".into(),
                score: 10,
            },
        );
        assert_eq!(locked.unwrap_err(), ProgressError::UniverseLocked("cyber".into()));

        let unknown = reduce(
            &start,
            &catalogue,
            ProgressAction::UnlockUniverse {
                universe_id: "desert".into(),
            },
        );
        assert_eq!(unknown.unwrap_err(), ProgressError::UnknownUniverse("desert".into()));

        let wrong_activity = reduce(
            &start,
            &catalogue,
            ProgressAction::CompleteActivity {
                universe_id: "space".into(),
                activity_id: "cyber-draw".into(),
                score: 10,
            },
        );
        assert!(matches!(
            wrong_activity.unwrap_err(),
            ProgressError::UnknownActivity { .. }
        ));
    }

    #[test]
    fn unlock_activity_opens_its_universe() {
        let catalogue = small_catalogue();
        let start = PlayerProgress::new(&catalogue);
        let next = reduce(
            &start,
            &catalogue,
            ProgressAction::UnlockActivity {
                universe_id: "ocean".into(),
                activity_id: "ocean-quiz".into(),
            },
        )
        .unwrap()
        .state;
        assert_eq!(next.universe_status("ocean"), Some(UnlockStatus::Unlocked));
        assert_eq!(
            next.activity("ocean", "ocean-quiz").unwrap().status,
            UnlockStatus::Unlocked
        );
        assert_eq!(
            next.activity("ocean", "ocean-seq").unwrap().status,
            UnlockStatus::Locked
        );
    }

    #[test]
    fn export_then_import_restores_progress() {
        let catalogue = small_catalogue();
        let mut state = PlayerProgress::new(&catalogue);
        state = reduce(
            &state,
            &catalogue,
            ProgressAction::SetTeam {
                team_name: "Les Comètes".into(),
                avatar_style: Some("bottts".into()),
            },
        )
        .unwrap()
        .state;
        state = complete(&state, "space", "space-seq", 1200).state;
        state = complete(&state, "space", "space-decode", 650).state;
        state = complete(&state, "cyber", "cyber-quiz", 300).state;

        let payload = state.export_save(1_700_000_000_000).unwrap();
        assert!(payload.len() <= MAX_SAVE_PAYLOAD_LEN);

        let fresh = PlayerProgress::new(&catalogue);
        let restored = reduce(&fresh, &catalogue, ProgressAction::ImportSave { payload })
            .unwrap()
            .state;

        assert_eq!(restored.team_name, "Les Comètes");
        assert_eq!(restored.points, state.points);
        assert_eq!(restored.fragments, state.fragments);
        assert_eq!(restored.universes, state.universes);
        assert_eq!(restored, state);
    }

    #[test]
    fn imported_totals_are_rebuilt_from_activities() {
        let catalogue = small_catalogue();
        let honest = complete(&PlayerProgress::new(&catalogue), "space", "space-seq", 400).state;
        let mut save: serde_json::Value =
            serde_json::from_str(&honest.export_save(0).unwrap()).unwrap();
        save["points"] = 999_999.into();
        save["fragments"] = 7.into();
        save["universes"]["space"]["status"] = "completed".into();
        save["universes"]["space"]["completedActivities"] = 2.into();

        let restored = import_save(&save.to_string(), &catalogue).unwrap();
        assert_eq!(restored.points, 400);
        assert_eq!(restored.fragments, 0);
        assert_eq!(restored.universe_status("space"), Some(UnlockStatus::Unlocked));
        assert_eq!(restored.universes["space"].completed_activities, 1);
        assert_eq!(restored, honest);
    }

    #[test]
    fn import_rejects_garbage_with_readable_error() {
        let catalogue = small_catalogue();
        let start = PlayerProgress::new(&catalogue);
        let err = reduce(
            &start,
            &catalogue,
            ProgressAction::ImportSave {
                payload: "{not json".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidSave(_)));
        assert!(err.to_string().starts_with("invalid save file"));
    }

    #[test]
    fn export_refuses_oversized_payloads() {
        let catalogue = small_catalogue();
        let mut state = PlayerProgress::new(&catalogue);
        state.inventory = (0..200).map(|i| format!("item-{i}")).collect();
        assert!(matches!(
            state.export_save(0),
            Err(ProgressError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn stored_state_is_realigned_with_catalogue() {
        let catalogue = small_catalogue();
        let mut state = PlayerProgress::new(&catalogue);
        state.universes.shift_remove("ocean");
        state.universes.insert(
            "retired".into(),
            UniverseProgress {
                status: UnlockStatus::Unlocked,
                completed_activities: 0,
                activities: IndexMap::new(),
            },
        );
        let value = serde_json::to_value(&state).unwrap();
        let restored = PlayerProgress::from_stored(value, &catalogue).unwrap();
        let order: Vec<&str> = restored.universes.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["space", "cyber", "ocean"]);
    }
}
