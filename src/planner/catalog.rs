//! The action catalog: named actions with conditions, reactions, weights,
//! and classification.
//!
//! The catalog is built from declarative configuration (and action factories)
//! before planning begins, then handed to the planner as an immutable
//! snapshot. Ordering is deterministic (`BTreeMap`), which gives the planner
//! its reproducible tie-break by ascending action name.

use std::collections::BTreeMap;

use crate::error::CatalogError;
use crate::state::{Requirement, StateValue};

// ---------------------------------------------------------------------------
// Action metadata
// ---------------------------------------------------------------------------

/// How an action's value is realized.
///
/// `Execution` actions mutate world state and yield no new knowledge;
/// `Discovery` actions may reveal information that invalidates remaining
/// plan steps, so completing one can trigger a replan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClassification {
    #[default]
    Execution,
    Discovery,
}

/// Coarse action family, declared per action in configuration.
///
/// Drives the plan-duration estimator and the post-action cooldown recheck;
/// control flow never pattern-matches on action names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionFamily {
    Movement,
    Combat,
    Gathering,
    Crafting,
    Wait,
    #[default]
    Other,
}

impl ActionFamily {
    /// Whether actions of this family can put the character on a
    /// server-side cooldown.
    pub fn induces_cooldown(&self) -> bool {
        matches!(
            self,
            Self::Movement | Self::Combat | Self::Gathering | Self::Crafting
        )
    }
}

/// A declarative action: what it needs, what it claims to change, and what
/// it costs. Immutable once the catalog is snapshotted for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub conditions: BTreeMap<String, Requirement>,
    pub reactions: BTreeMap<String, StateValue>,
    pub weight: f64,
    pub classification: ActionClassification,
    pub family: ActionFamily,
}

impl Default for ActionSpec {
    fn default() -> Self {
        Self {
            conditions: BTreeMap::new(),
            reactions: BTreeMap::new(),
            weight: 1.0,
            classification: ActionClassification::default(),
            family: ActionFamily::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Registry of all actions available to the planner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionCatalog {
    actions: BTreeMap<String, ActionSpec>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish or extend the precondition map for an action.
    ///
    /// The first mention of a name creates the action with weight 1.
    pub fn add_condition(
        &mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        requirement: Requirement,
    ) -> Result<(), CatalogError> {
        let spec = self.actions.entry(name.into()).or_default();
        spec.conditions.insert(key.into(), requirement);
        Ok(())
    }

    /// Declare an effect for an action. Fails with `OrphanReaction` when no
    /// condition entry exists for the name.
    pub fn add_reaction(
        &mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        value: StateValue,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        let Some(spec) = self.actions.get_mut(&name) else {
            return Err(CatalogError::OrphanReaction { name });
        };
        spec.reactions.insert(key.into(), value);
        Ok(())
    }

    /// Set an action's plan-optimization weight. Weights below 1 are
    /// rejected to preserve heuristic admissibility.
    pub fn set_weight(&mut self, name: &str, weight: f64) -> Result<(), CatalogError> {
        if weight < 1.0 {
            return Err(CatalogError::InvalidWeight {
                name: name.into(),
                weight,
            });
        }
        let Some(spec) = self.actions.get_mut(name) else {
            return Err(CatalogError::UnknownAction { name: name.into() });
        };
        spec.weight = weight;
        Ok(())
    }

    pub fn set_classification(
        &mut self,
        name: &str,
        classification: ActionClassification,
    ) -> Result<(), CatalogError> {
        let Some(spec) = self.actions.get_mut(name) else {
            return Err(CatalogError::UnknownAction { name: name.into() });
        };
        spec.classification = classification;
        Ok(())
    }

    pub fn set_family(&mut self, name: &str, family: ActionFamily) -> Result<(), CatalogError> {
        let Some(spec) = self.actions.get_mut(name) else {
            return Err(CatalogError::UnknownAction { name: name.into() });
        };
        spec.family = family;
        Ok(())
    }

    /// Insert a fully-formed action, replacing any existing entry.
    pub fn insert(&mut self, name: impl Into<String>, spec: ActionSpec) {
        self.actions.insert(name.into(), spec);
    }

    pub fn remove(&mut self, name: &str) -> Option<ActionSpec> {
        self.actions.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions in deterministic (name-ascending) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionSpec)> {
        self.actions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn specs(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    /// A new catalog containing only the actions the predicate keeps.
    pub fn filtered(&self, mut keep: impl FnMut(&str, &ActionSpec) -> bool) -> ActionCatalog {
        ActionCatalog {
            actions: self
                .actions
                .iter()
                .filter(|(name, spec)| keep(name, spec))
                .map(|(name, spec)| (name.clone(), spec.clone()))
                .collect(),
        }
    }

    /// A catalog without discovery-classified actions, for knowledge-based
    /// planning passes that must not hit the server for information.
    pub fn without_discovery(&self) -> ActionCatalog {
        self.filtered(|_, spec| spec.classification == ActionClassification::Execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_condition_creates_action_with_unit_weight() {
        let mut catalog = ActionCatalog::new();
        catalog
            .add_condition(
                "fight",
                "cooldown_ready",
                Requirement::Value(StateValue::Bool(true)),
            )
            .unwrap();
        let spec = catalog.get("fight").unwrap();
        assert_eq!(spec.weight, 1.0);
        assert_eq!(spec.classification, ActionClassification::Execution);
    }

    #[test]
    fn reaction_without_condition_is_orphan() {
        let mut catalog = ActionCatalog::new();
        let err = catalog
            .add_reaction("fight", "character_level", StateValue::Int(2))
            .unwrap_err();
        assert!(matches!(err, CatalogError::OrphanReaction { .. }));
    }

    #[test]
    fn weight_below_one_is_rejected() {
        let mut catalog = ActionCatalog::new();
        catalog
            .add_condition(
                "move",
                "cooldown_ready",
                Requirement::Value(StateValue::Bool(true)),
            )
            .unwrap();
        let err = catalog.set_weight("move", 0.5).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidWeight { .. }));
        catalog.set_weight("move", 2.0).unwrap();
        assert_eq!(catalog.get("move").unwrap().weight, 2.0);
    }

    #[test]
    fn set_weight_on_unknown_action_fails() {
        let mut catalog = ActionCatalog::new();
        let err = catalog.set_weight("missing", 1.0).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownAction { .. }));
    }

    #[test]
    fn without_discovery_drops_discovery_actions() {
        let mut catalog = ActionCatalog::new();
        catalog
            .add_condition(
                "craft",
                "at_workshop_location",
                Requirement::Value(StateValue::Bool(true)),
            )
            .unwrap();
        catalog
            .add_condition(
                "find_workshops",
                "cooldown_ready",
                Requirement::Value(StateValue::Bool(true)),
            )
            .unwrap();
        catalog
            .set_classification("find_workshops", ActionClassification::Discovery)
            .unwrap();

        let filtered = catalog.without_discovery();
        assert!(filtered.contains("craft"));
        assert!(!filtered.contains("find_workshops"));
        // The original is untouched.
        assert!(catalog.contains("find_workshops"));
    }

    #[test]
    fn iteration_order_is_name_ascending() {
        let mut catalog = ActionCatalog::new();
        for name in ["zeta", "alpha", "mid"] {
            catalog
                .add_condition(name, "k", Requirement::Value(StateValue::Bool(true)))
                .unwrap();
        }
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn cooldown_inducing_families() {
        assert!(ActionFamily::Movement.induces_cooldown());
        assert!(ActionFamily::Combat.induces_cooldown());
        assert!(ActionFamily::Gathering.induces_cooldown());
        assert!(ActionFamily::Crafting.induces_cooldown());
        assert!(!ActionFamily::Wait.induces_cooldown());
        assert!(!ActionFamily::Other.induces_cooldown());
    }
}
