//! Translation between the agent's enum-keyed state and the flat,
//! string-keyed state the planner consumes.
//!
//! The planner wants a complete start state covering every key any action or
//! goal mentions; the agent works with typed keys and nested records. The
//! adapter builds the planner view (defaults, deep merges, record fix-ups)
//! and merges declared effects back into runtime state.

use std::collections::{BTreeMap, BTreeSet};

use crate::planner::catalog::ActionCatalog;

use super::goal::Goal;
use super::value::StateValue;
use super::world::WorldState;

// ---------------------------------------------------------------------------
// Enum-keyed agent state
// ---------------------------------------------------------------------------

/// The closed set of state keys the agent itself observes and manipulates.
///
/// Actions defined in configuration may reference further string keys; those
/// flow through the planner untyped. This enum covers the keys derived from
/// character observation and learned knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    CharacterLevel,
    CharacterXp,
    HpCurrent,
    HpMax,
    CooldownReady,
    CanFight,
    CharacterStatus,
    CurrentLocation,
    InventoryCapacity,
    SpaceUsed,
    SpaceAvailable,
    AtMonsterLocation,
    AtWorkshopLocation,
    AtTargetLocation,
    MonstersAvailable,
    MonsterPresent,
    MonsterLocationKnown,
    WorkshopLocationKnown,
    RecipeKnown,
    SelectedWeapon,
    HasBetterWeapon,
}

impl StateKey {
    /// All keys, in planner (string) order.
    pub const ALL: &[StateKey] = &[
        Self::AtMonsterLocation,
        Self::AtTargetLocation,
        Self::AtWorkshopLocation,
        Self::CanFight,
        Self::CharacterLevel,
        Self::CharacterStatus,
        Self::CharacterXp,
        Self::CooldownReady,
        Self::CurrentLocation,
        Self::HasBetterWeapon,
        Self::HpCurrent,
        Self::HpMax,
        Self::InventoryCapacity,
        Self::MonsterLocationKnown,
        Self::MonsterPresent,
        Self::MonstersAvailable,
        Self::RecipeKnown,
        Self::SelectedWeapon,
        Self::SpaceAvailable,
        Self::SpaceUsed,
    ];

    /// The flat planner key for this state key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacterLevel => "character_level",
            Self::CharacterXp => "character_xp",
            Self::HpCurrent => "hp_current",
            Self::HpMax => "hp_max",
            Self::CooldownReady => "cooldown_ready",
            Self::CanFight => "can_fight",
            Self::CharacterStatus => "character_status",
            Self::CurrentLocation => "current_location",
            Self::InventoryCapacity => "inventory_capacity",
            Self::SpaceUsed => "space_used",
            Self::SpaceAvailable => "space_available",
            Self::AtMonsterLocation => "at_monster_location",
            Self::AtWorkshopLocation => "at_workshop_location",
            Self::AtTargetLocation => "at_target_location",
            Self::MonstersAvailable => "monsters_available",
            Self::MonsterPresent => "monster_present",
            Self::MonsterLocationKnown => "monster_location_known",
            Self::WorkshopLocationKnown => "workshop_location_known",
            Self::RecipeKnown => "recipe_known",
            Self::SelectedWeapon => "selected_weapon",
            Self::HasBetterWeapon => "has_better_weapon",
        }
    }

    /// Parse a flat planner key back into a typed key.
    pub fn from_str(key: &str) -> Option<StateKey> {
        Self::ALL.iter().copied().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enum-keyed state as the agent sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentState {
    values: BTreeMap<StateKey, StateValue>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: StateKey, value: impl Into<StateValue>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.values.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateKey, &StateValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Flatten into the planner's string-keyed representation.
    pub fn flatten(&self) -> WorldState {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect()
    }

    /// Rebuild from a flat state, keeping only recognized keys.
    pub fn from_flat(state: &WorldState) -> Self {
        let mut agent = Self::new();
        for (key, value) in state.iter() {
            if let Some(typed) = StateKey::from_str(key) {
                agent.values.insert(typed, value.clone());
            }
        }
        agent
    }
}

// ---------------------------------------------------------------------------
// Planner-boundary adapter
// ---------------------------------------------------------------------------

/// Builds planner start states and merges effects back into runtime state.
#[derive(Debug, Clone, Default)]
pub struct WorldStateAdapter {
    /// Declared defaults for every recognized state key, nested records
    /// included.
    defaults: BTreeMap<String, StateValue>,
}

impl WorldStateAdapter {
    pub fn new(defaults: BTreeMap<String, StateValue>) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &BTreeMap<String, StateValue> {
        &self.defaults
    }

    /// Build the complete start state the planner will search over.
    ///
    /// The key set is the union of runtime state, declared defaults, the
    /// goal's keys, and every key referenced by any action's conditions or
    /// reactions. Keys begin unspecified, are post-initialized from declared
    /// defaults (restoring nested records), take `false` where nothing else
    /// is declared, and finally the runtime state is overlaid with deep
    /// merges for record values.
    pub fn build_planner_state(
        &self,
        runtime: &WorldState,
        goal: &Goal,
        catalog: &ActionCatalog,
    ) -> WorldState {
        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.extend(runtime.keys().map(String::from));
        keys.extend(self.defaults.keys().cloned());
        keys.extend(goal.keys().map(String::from));
        for spec in catalog.specs() {
            keys.extend(spec.conditions.keys().cloned());
            keys.extend(spec.reactions.keys().cloned());
        }

        let mut state: WorldState = keys
            .into_iter()
            .map(|key| (key, StateValue::Unspecified))
            .collect();

        state.post_initialize(&self.defaults);

        // Action-referenced keys with no declared default start as false.
        let pending: Vec<String> = state
            .iter()
            .filter(|(_, v)| v.is_unspecified())
            .map(|(k, _)| k.to_string())
            .collect();
        for key in pending {
            state.set(key, StateValue::Bool(false));
        }

        state.merge(runtime);
        state
    }

    /// The goal handed to the planner: only the keys the caller asked for.
    /// Every other key stays unspecified so the planner never checks it.
    pub fn minimal_goal(&self, goal: &Goal) -> Goal {
        goal.clone()
    }

    /// Merge an action's declared effects back into runtime state,
    /// preserving nested structure.
    pub fn apply_effects_back(
        &self,
        runtime: &mut WorldState,
        effects: &BTreeMap<String, StateValue>,
    ) {
        for (key, value) in effects {
            if value.is_unspecified() {
                continue;
            }
            match (runtime.get(key), value) {
                (Some(StateValue::Record(_)), StateValue::Record(_)) => {
                    let mut merged = runtime.get(key).cloned().unwrap_or(StateValue::Null);
                    merged.deep_merge(value);
                    runtime.set(key.clone(), merged);
                }
                _ => runtime.set(key.clone(), value.clone()),
            }
        }
    }
}
