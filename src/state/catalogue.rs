//! Universe and activity catalogue shared by the match and progress layers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::scoring::ActivityKind;

/// A single mini-game available inside a universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDef {
    /// Stable identifier used by clients (e.g. `orbit-sequence`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Scoring rule applied when the activity is finalized.
    pub kind: ActivityKind,
    /// Points awarded for a flawless run, before bonuses and deductions.
    pub max_points: u32,
}

/// A themed bundle of activities with its own unlock progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UniverseDef {
    /// Stable identifier (e.g. `odyssee-spatiale`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Inventory item granted when every activity of the universe is completed.
    #[serde(default)]
    pub reward: Option<String>,
    /// Activities in display order.
    pub activities: Vec<ActivityDef>,
}

/// Ordered list of universes; the order is the unlock order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalogue {
    universes: Vec<UniverseDef>,
}

impl Catalogue {
    /// Build a catalogue, keeping the given order as the unlock order.
    pub fn new(universes: Vec<UniverseDef>) -> Self {
        Self { universes }
    }

    /// Universes in unlock order.
    pub fn universes(&self) -> &[UniverseDef] {
        &self.universes
    }

    /// Identifiers in unlock order.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.universes.iter().map(|universe| universe.id.as_str())
    }

    /// Look up a universe by identifier.
    pub fn universe(&self, id: &str) -> Option<&UniverseDef> {
        self.universes.iter().find(|universe| universe.id == id)
    }

    /// The universe unlocked after `id` is completed, if any.
    pub fn next_after(&self, id: &str) -> Option<&UniverseDef> {
        let index = self.universes.iter().position(|universe| universe.id == id)?;
        self.universes.get(index + 1)
    }

    /// Look up an activity inside a given universe.
    pub fn activity(&self, universe_id: &str, activity_id: &str) -> Option<&ActivityDef> {
        self.universe(universe_id)?
            .activities
            .iter()
            .find(|activity| activity.id == activity_id)
    }

    /// Find an activity anywhere in the catalogue, returning its universe too.
    pub fn find_activity(&self, activity_id: &str) -> Option<(&UniverseDef, &ActivityDef)> {
        self.universes.iter().find_map(|universe| {
            universe
                .activities
                .iter()
                .find(|activity| activity.id == activity_id)
                .map(|activity| (universe, activity))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::small_catalogue;

    #[test]
    fn next_after_follows_declared_order() {
        let catalogue = small_catalogue();
        assert_eq!(catalogue.next_after("space").map(|u| u.id.as_str()), Some("cyber"));
        assert_eq!(catalogue.next_after("cyber").map(|u| u.id.as_str()), Some("ocean"));
        assert!(catalogue.next_after("ocean").is_none());
        assert!(catalogue.next_after("missing").is_none());
    }

    #[test]
    fn find_activity_returns_owning_universe() {
        let catalogue = small_catalogue();
        let (universe, activity) = catalogue.find_activity("cyber-quiz").unwrap();
        assert_eq!(universe.id, "cyber");
        assert_eq!(activity.max_points, 500);
        assert!(catalogue.find_activity("nope").is_none());
    }
}
