//! Flat, string-keyed world state as consumed by the planner.
//!
//! A `WorldState` is an ordered map from state keys to [`StateValue`]s.
//! Ordering (via `BTreeMap`) keeps iteration, hashing, and therefore planning
//! deterministic.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::goal::Goal;
use super::value::{Requirement, StateValue};

/// Well-known key: whether the character may issue an action right now.
pub const COOLDOWN_READY: &str = "cooldown_ready";

/// Symbolic world state: a mapping from named keys to values.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldState {
    values: BTreeMap<String, StateValue>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert `value` under `key` only when the key is absent.
    pub fn set_default(&mut self, key: impl Into<String>, value: StateValue) {
        self.values.entry(key.into()).or_insert(value);
    }

    /// Replace `Unspecified` entries with their declared defaults.
    ///
    /// The planner's generic initialization assigns `Unspecified` to every
    /// key it tracks; nested record defaults must be re-injected afterwards
    /// or effect application would corrupt nested structure.
    pub fn post_initialize(&mut self, defaults: &BTreeMap<String, StateValue>) {
        for (key, default) in defaults {
            match self.values.get(key) {
                None | Some(StateValue::Unspecified) => {
                    self.values.insert(key.clone(), default.clone());
                }
                Some(_) => {}
            }
        }
    }

    /// Whether every condition is satisfied by this state.
    ///
    /// Absent keys are treated as `Unspecified` (they satisfy only wildcard
    /// requirements via the matching rules).
    pub fn satisfies(&self, conditions: &BTreeMap<String, Requirement>) -> bool {
        conditions.iter().all(|(key, requirement)| {
            let candidate = self.values.get(key).unwrap_or(&StateValue::Unspecified);
            match requirement {
                // A wildcard requirement is always met.
                Requirement::Value(StateValue::Unspecified) => true,
                // An absent key fails anything but a wildcard.
                _ if !self.values.contains_key(key) => false,
                _ => requirement.satisfied_by(candidate),
            }
        })
    }

    /// Overlay action effects onto this state.
    ///
    /// Each effect key is overwritten with the declared value; `Unspecified`
    /// effect values leave the key unchanged. This is the planner-side
    /// overwrite; merging effects back into nested runtime state is the
    /// adapter's job.
    pub fn apply_effects(&mut self, effects: &BTreeMap<String, StateValue>) {
        for (key, value) in effects {
            if value.is_unspecified() {
                continue;
            }
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Deep-merge another state into this one (record values merge per-key).
    pub fn merge(&mut self, other: &WorldState) {
        for (key, value) in &other.values {
            match self.values.get_mut(key) {
                Some(existing) => existing.deep_merge(value),
                None => {
                    self.values.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Order-independent fingerprint of the full state. Used for search-node
    /// identity and the plan cache.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.values.len().hash(&mut hasher);
        for (key, value) in &self.values {
            key.hash(&mut hasher);
            value.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}

impl FromIterator<(String, StateValue)> for WorldState {
    fn from_iter<I: IntoIterator<Item = (String, StateValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Count the goal keys this state does not yet satisfy.
///
/// Wildcard goal entries are skipped. Each disagreement needs at least one
/// action whose effect changes that key, and the catalog enforces a minimum
/// action weight of 1, so the count is an admissible A* heuristic.
pub fn distance(state: &WorldState, goal: &Goal) -> f64 {
    goal.iter()
        .filter(|(_, requirement)| !requirement.is_wildcard())
        .filter(|(key, requirement)| {
            let candidate = state.get(key).unwrap_or(&StateValue::Unspecified);
            !requirement.satisfied_by(candidate)
        })
        .count() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(pairs: &[(&str, Requirement)]) -> BTreeMap<String, Requirement> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn satisfies_literal_conditions() {
        let state = WorldState::from_pairs([
            ("cooldown_ready", StateValue::Bool(true)),
            ("character_level", StateValue::Int(3)),
        ]);
        assert!(state.satisfies(&conditions(&[
            ("cooldown_ready", Requirement::Value(StateValue::Bool(true))),
            ("character_level", Requirement::Value(StateValue::Int(3))),
        ])));
        assert!(!state.satisfies(&conditions(&[(
            "cooldown_ready",
            Requirement::Value(StateValue::Bool(false))
        )])));
    }

    #[test]
    fn absent_key_fails_non_wildcard_conditions() {
        let state = WorldState::new();
        assert!(!state.satisfies(&conditions(&[(
            "can_fight",
            Requirement::Value(StateValue::Bool(true))
        )])));
        assert!(!state.satisfies(&conditions(&[("weapon", Requirement::NotNull)])));
        // Wildcard is met regardless.
        assert!(state.satisfies(&conditions(&[(
            "anything",
            Requirement::Value(StateValue::Unspecified)
        )])));
    }

    #[test]
    fn apply_effects_skips_unspecified() {
        let mut state = WorldState::from_pairs([("hp_current", StateValue::Int(50))]);
        let effects: BTreeMap<String, StateValue> = [
            ("hp_current".to_string(), StateValue::Int(100)),
            ("untouched".to_string(), StateValue::Unspecified),
        ]
        .into();
        state.apply_effects(&effects);
        assert_eq!(state.get("hp_current"), Some(&StateValue::Int(100)));
        assert!(!state.contains("untouched"));
    }

    #[test]
    fn post_initialize_restores_record_defaults() {
        let mut state = WorldState::new();
        state.set("character_status", StateValue::Unspecified);
        let defaults: BTreeMap<String, StateValue> = [(
            "character_status".to_string(),
            StateValue::Record(
                [("safe".to_string(), StateValue::Bool(true))].into(),
            ),
        )]
        .into();
        state.post_initialize(&defaults);
        assert_eq!(
            state.get("character_status"),
            Some(&StateValue::Record(
                [("safe".to_string(), StateValue::Bool(true))].into()
            ))
        );
    }

    #[test]
    fn merge_deep_merges_records() {
        let mut base = WorldState::new();
        base.set(
            "location",
            StateValue::Record(
                [
                    ("x".to_string(), StateValue::Int(0)),
                    ("y".to_string(), StateValue::Int(0)),
                ]
                .into(),
            ),
        );
        let mut overlay = WorldState::new();
        overlay.set(
            "location",
            StateValue::Record([("x".to_string(), StateValue::Int(5))].into()),
        );
        base.merge(&overlay);
        assert_eq!(
            base.get("location"),
            Some(&StateValue::Record(
                [
                    ("x".to_string(), StateValue::Int(5)),
                    ("y".to_string(), StateValue::Int(0)),
                ]
                .into()
            ))
        );
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = WorldState::from_pairs([("level", StateValue::Int(1))]);
        let b = WorldState::from_pairs([("level", StateValue::Int(1))]);
        let c = WorldState::from_pairs([("level", StateValue::Int(2))]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn distance_counts_unsatisfied_goal_keys() {
        let state = WorldState::from_pairs([
            ("level", StateValue::Int(1)),
            ("location", StateValue::Int(0)),
            ("extra", StateValue::Bool(true)),
        ]);
        let goal = Goal::from_pairs([
            ("level", Requirement::Value(StateValue::Int(3))),
            ("location", Requirement::Value(StateValue::Int(0))),
        ]);
        assert_eq!(distance(&state, &goal), 1.0);

        let satisfied = Goal::from_pairs([("level", Requirement::GreaterThan(0.0))]);
        assert_eq!(distance(&state, &satisfied), 0.0);
    }
}
