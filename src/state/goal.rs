//! Goals: partial world states and the satisfaction predicate.
//!
//! A goal names only the keys the caller cares about; achievement is a
//! recursive subset match with threshold operators evaluated against the
//! current value. The same predicate terminates the A* search.

use std::collections::BTreeMap;

use super::value::{Requirement, StateValue};
use super::world::WorldState;

/// A partial target state: keys mapped to requirements.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Goal {
    requirements: BTreeMap<String, Requirement>,
}

impl Goal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/requirement pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Requirement)>,
    {
        Self {
            requirements: pairs.into_iter().map(|(k, r)| (k.into(), r)).collect(),
        }
    }

    /// Build from raw state values, parsing threshold strings into operators.
    pub fn from_values<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, StateValue)>,
    {
        Self {
            requirements: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Requirement::parse(&v)))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, requirement: Requirement) {
        self.requirements.insert(key.into(), requirement);
    }

    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.requirements.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.requirements.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Requirement)> {
        self.requirements.iter().map(|(k, r)| (k.as_str(), r))
    }

    /// Whether the current state satisfies every key-path in this goal.
    ///
    /// A key missing from the current state fails (unless the requirement is
    /// the wildcard); extra keys in the current state are ignored. Nested
    /// records recurse per sub-key.
    pub fn satisfied_by(&self, state: &WorldState) -> bool {
        self.requirements.iter().all(|(key, requirement)| {
            if requirement.is_wildcard() {
                return true;
            }
            match state.get(key) {
                Some(value) => requirement.satisfied_by(value),
                None => false,
            }
        })
    }

    /// Compact single-line summary for logs and status reports.
    pub fn summary(&self) -> String {
        self.requirements
            .iter()
            .map(|(k, r)| format!("{k}={r}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, StateValue)]) -> StateValue {
        StateValue::Record(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn subset_goal_is_satisfied() {
        let state = WorldState::from_pairs([
            ("character_level", StateValue::Int(5)),
            ("hp_current", StateValue::Int(100)),
            ("cooldown_ready", StateValue::Bool(true)),
        ]);
        let goal = Goal::from_values([("character_level", StateValue::Int(5))]);
        assert!(goal.satisfied_by(&state));
    }

    #[test]
    fn extra_goal_key_fails() {
        let state = WorldState::from_pairs([("character_level", StateValue::Int(5))]);
        let goal = Goal::from_values([
            ("character_level", StateValue::Int(5)),
            ("has_weapon", StateValue::Bool(true)),
        ]);
        assert!(!goal.satisfied_by(&state));
    }

    #[test]
    fn threshold_goals_evaluate_numerically() {
        let state = WorldState::from_pairs([("hp_percentage", StateValue::Int(85))]);
        assert!(
            Goal::from_values([("hp_percentage", StateValue::Str(">80".into()))])
                .satisfied_by(&state)
        );
        assert!(
            !Goal::from_values([("hp_percentage", StateValue::Str(">90".into()))])
                .satisfied_by(&state)
        );
        assert!(
            Goal::from_values([("hp_percentage", StateValue::Str("<90".into()))])
                .satisfied_by(&state)
        );
    }

    #[test]
    fn nested_goal_recurses() {
        let mut state = WorldState::new();
        state.set(
            "character_status",
            record(&[
                ("safe", StateValue::Bool(true)),
                ("hp_percentage", StateValue::Int(95)),
            ]),
        );
        let goal = Goal::from_values([(
            "character_status",
            record(&[
                ("safe", StateValue::Bool(true)),
                ("hp_percentage", StateValue::Str(">90".into())),
            ]),
        )]);
        assert!(goal.satisfied_by(&state));

        let unmet = Goal::from_values([(
            "character_status",
            record(&[("rested", StateValue::Bool(true))]),
        )]);
        assert!(!unmet.satisfied_by(&state));
    }

    #[test]
    fn not_null_goal() {
        let mut state = WorldState::new();
        state.set("selected_weapon", StateValue::Null);
        let goal = Goal::from_values([("selected_weapon", StateValue::Str("!null".into()))]);
        assert!(!goal.satisfied_by(&state));

        state.set("selected_weapon", StateValue::Str("iron_sword".into()));
        assert!(goal.satisfied_by(&state));
    }

    #[test]
    fn empty_goal_is_always_satisfied() {
        assert!(Goal::new().satisfied_by(&WorldState::new()));
    }
}
