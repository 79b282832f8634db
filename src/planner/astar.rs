//! Best-first search over symbolic world states.
//!
//! Classical A* with nodes keyed by (state, producing action). Nodes live in
//! a per-search arena (a growable vector indexed by integer id); the open and
//! closed structures hold ids, never references. The search performs no I/O
//! and holds no locks.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::error::PlannerError;
use crate::state::{Goal, WorldState, distance};

use super::catalog::ActionCatalog;

/// Default expansion-count safety bound. Hitting it means "no plan".
pub const DEFAULT_MAX_EXPANSIONS: usize = 10_000;

const EPSILON: f64 = 1e-9;

/// One element of a computed plan: the action name and its incremental cost
/// contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub name: String,
    pub cost: f64,
}

// ---------------------------------------------------------------------------
// Search arena
// ---------------------------------------------------------------------------

struct Node {
    state: WorldState,
    g: f64,
    h: f64,
    parent: Option<usize>,
    action: Option<String>,
    closed: bool,
}

impl Node {
    fn f(&self) -> f64 {
        self.g + self.h
    }
}

/// Heap entry; ordered so the binary max-heap pops the lowest `f` first,
/// breaking ties by ascending action name for reproducible plans.
struct OpenEntry {
    f: f64,
    name: String,
    id: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.name.cmp(&self.name))
            .then_with(|| other.id.cmp(&self.id))
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Find the cheapest action sequence from `start` to a state satisfying
/// `goal`, with the default expansion bound.
pub fn plan(
    start: &WorldState,
    goal: &Goal,
    catalog: &ActionCatalog,
) -> Result<Vec<PlannedAction>, PlannerError> {
    plan_with_limit(start, goal, catalog, DEFAULT_MAX_EXPANSIONS)
}

/// Find the cheapest action sequence, bounding the number of expansions.
///
/// Goal satisfaction is the subset/threshold predicate, not full-state
/// equality; a start state already at the goal yields an empty plan without
/// searching. Ties between equal-cost frontier nodes break by ascending
/// action name, so plans are reproducible across runs.
pub fn plan_with_limit(
    start: &WorldState,
    goal: &Goal,
    catalog: &ActionCatalog,
    max_expansions: usize,
) -> Result<Vec<PlannedAction>, PlannerError> {
    let mut arena: Vec<Node> = Vec::new();
    // (state fingerprint, producing action) → candidate node ids. The
    // fingerprint narrows; exact state equality decides.
    let mut known: HashMap<(u64, String), Vec<usize>> = HashMap::new();
    let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();

    arena.push(Node {
        state: start.clone(),
        g: 0.0,
        h: distance(start, goal),
        parent: None,
        action: None,
        closed: false,
    });
    open.push(OpenEntry {
        f: arena[0].f(),
        name: String::new(),
        id: 0,
    });

    tracing::debug!(
        actions = catalog.len(),
        goal = %goal,
        "starting plan search"
    );

    let mut expansions = 0usize;

    while let Some(entry) = open.pop() {
        let id = entry.id;
        if arena[id].closed {
            continue;
        }
        // Stale heap entry from a later g-improvement.
        if entry.f > arena[id].f() + EPSILON {
            continue;
        }

        if goal.satisfied_by(&arena[id].state) {
            return Ok(reconstruct(&arena, id));
        }

        arena[id].closed = true;
        expansions += 1;
        if expansions >= max_expansions {
            tracing::error!(
                expansions,
                open = open.len(),
                arena = arena.len(),
                goal = %goal,
                "plan search hit expansion limit"
            );
            return Err(PlannerError::SearchOverflow { expansions });
        }

        for (name, spec) in catalog.iter() {
            if !arena[id].state.satisfies(&spec.conditions) {
                continue;
            }

            let mut successor = arena[id].state.clone();
            successor.apply_effects(&spec.reactions);
            let tentative_g = arena[id].g + spec.weight;

            let key = (successor.fingerprint(), name.to_string());
            let existing = known
                .get(&key)
                .and_then(|ids| ids.iter().copied().find(|&i| arena[i].state == successor));

            match existing {
                Some(existing_id) => {
                    if tentative_g + EPSILON < arena[existing_id].g {
                        // Better path to a known node; reopen if it was
                        // already expanded.
                        arena[existing_id].g = tentative_g;
                        arena[existing_id].parent = Some(id);
                        arena[existing_id].closed = false;
                        open.push(OpenEntry {
                            f: arena[existing_id].f(),
                            name: name.to_string(),
                            id: existing_id,
                        });
                    }
                }
                None => {
                    let h = distance(&successor, goal);
                    let new_id = arena.len();
                    arena.push(Node {
                        state: successor,
                        g: tentative_g,
                        h,
                        parent: Some(id),
                        action: Some(name.to_string()),
                        closed: false,
                    });
                    known.entry(key).or_default().push(new_id);
                    open.push(OpenEntry {
                        f: arena[new_id].f(),
                        name: name.to_string(),
                        id: new_id,
                    });
                }
            }
        }
    }

    Err(PlannerError::NoPlanAvailable)
}

/// Walk the parent chain back to the start node, collecting each action and
/// its incremental cost.
fn reconstruct(arena: &[Node], goal_id: usize) -> Vec<PlannedAction> {
    let mut steps = Vec::new();
    let mut id = goal_id;
    while let Some(parent) = arena[id].parent {
        let name = arena[id]
            .action
            .clone()
            .unwrap_or_default();
        steps.push(PlannedAction {
            name,
            cost: arena[id].g - arena[parent].g,
        });
        id = parent;
    }
    steps.reverse();
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Requirement, StateValue};

    fn catalog_one_fight() -> ActionCatalog {
        let mut catalog = ActionCatalog::new();
        catalog
            .add_condition(
                "fight",
                "cooldown_ready",
                Requirement::Value(StateValue::Bool(true)),
            )
            .unwrap();
        catalog
            .add_condition(
                "fight",
                "can_fight",
                Requirement::Value(StateValue::Bool(true)),
            )
            .unwrap();
        catalog
            .add_reaction("fight", "character_level", StateValue::Int(2))
            .unwrap();
        catalog
            .add_reaction("fight", "cooldown_ready", StateValue::Bool(false))
            .unwrap();
        catalog
    }

    #[test]
    fn already_at_goal_yields_empty_plan() {
        let start = WorldState::from_pairs([
            ("character_level", StateValue::Int(5)),
            ("hp_current", StateValue::Int(100)),
            ("cooldown_ready", StateValue::Bool(true)),
        ]);
        let goal = Goal::from_values([("character_level", StateValue::Int(5))]);
        let plan = plan(&start, &goal, &catalog_one_fight()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn one_hop_level_up() {
        let start = WorldState::from_pairs([
            ("character_level", StateValue::Int(1)),
            ("cooldown_ready", StateValue::Bool(true)),
            ("can_fight", StateValue::Bool(true)),
        ]);
        let goal = Goal::from_values([("character_level", StateValue::Int(2))]);
        let plan = plan(&start, &goal, &catalog_one_fight()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "fight");
        assert_eq!(plan[0].cost, 1.0);
    }

    #[test]
    fn unreachable_goal_is_no_plan() {
        let start = WorldState::from_pairs([
            ("character_level", StateValue::Int(1)),
            ("cooldown_ready", StateValue::Bool(false)),
            ("can_fight", StateValue::Bool(true)),
        ]);
        let goal = Goal::from_values([("character_level", StateValue::Int(2))]);
        let err = plan(&start, &goal, &catalog_one_fight()).unwrap_err();
        assert!(matches!(err, PlannerError::NoPlanAvailable));
    }

    #[test]
    fn expansion_cap_surfaces_as_overflow() {
        // Three independently settable flags give the search more reachable
        // nodes than the tiny expansion budget while the goal stays
        // unreachable.
        let mut catalog = ActionCatalog::new();
        for flag in ["a", "b", "c"] {
            let name = format!("set_{flag}");
            catalog
                .add_condition(&name, "start", Requirement::Value(StateValue::Bool(true)))
                .unwrap();
            catalog
                .add_reaction(&name, flag, StateValue::Bool(true))
                .unwrap();
        }

        let start = WorldState::from_pairs([("start", StateValue::Bool(true))]);
        let goal = Goal::from_values([("unreachable", StateValue::Bool(true))]);
        let err = plan_with_limit(&start, &goal, &catalog, 4).unwrap_err();
        assert!(matches!(err, PlannerError::SearchOverflow { .. }));
    }

    #[test]
    fn chained_plan_with_weights() {
        // Two moves and two level-ups with non-unit weights, total cost 6.
        let mut catalog = ActionCatalog::new();
        catalog
            .add_condition("move_to_1", "location", Requirement::Value(StateValue::Int(0)))
            .unwrap();
        catalog
            .add_reaction("move_to_1", "location", StateValue::Int(1))
            .unwrap();

        catalog
            .add_condition("level_up_1", "level", Requirement::Value(StateValue::Int(1)))
            .unwrap();
        catalog
            .add_condition("level_up_1", "location", Requirement::Value(StateValue::Int(1)))
            .unwrap();
        catalog
            .add_reaction("level_up_1", "level", StateValue::Int(2))
            .unwrap();
        catalog.set_weight("level_up_1", 2.0).unwrap();

        catalog
            .add_condition("move_to_2", "level", Requirement::Value(StateValue::Int(2)))
            .unwrap();
        catalog
            .add_condition("move_to_2", "location", Requirement::Value(StateValue::Int(1)))
            .unwrap();
        catalog
            .add_reaction("move_to_2", "location", StateValue::Int(2))
            .unwrap();

        catalog
            .add_condition("level_up_2", "level", Requirement::Value(StateValue::Int(2)))
            .unwrap();
        catalog
            .add_condition("level_up_2", "location", Requirement::Value(StateValue::Int(2)))
            .unwrap();
        catalog
            .add_reaction("level_up_2", "level", StateValue::Int(3))
            .unwrap();
        catalog.set_weight("level_up_2", 2.0).unwrap();

        let start = WorldState::from_pairs([
            ("level", StateValue::Int(1)),
            ("location", StateValue::Int(0)),
        ]);
        let goal = Goal::from_values([
            ("level", StateValue::Int(3)),
            ("location", StateValue::Int(2)),
        ]);

        let plan = plan(&start, &goal, &catalog).unwrap();
        let names: Vec<&str> = plan.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["move_to_1", "level_up_1", "move_to_2", "level_up_2"]);
        let total: f64 = plan.iter().map(|a| a.cost).sum();
        assert_eq!(total, 6.0);
    }

    #[test]
    fn threshold_goal_reached_through_literal_effect() {
        // The goal uses ">=2"; the action's effect is a literal. The goal
        // checker evaluates the threshold at match time.
        let mut catalog = catalog_one_fight();
        catalog
            .add_reaction("fight", "character_level", StateValue::Int(3))
            .unwrap();
        let start = WorldState::from_pairs([
            ("character_level", StateValue::Int(1)),
            ("cooldown_ready", StateValue::Bool(true)),
            ("can_fight", StateValue::Bool(true)),
        ]);
        let goal = Goal::from_values([("character_level", StateValue::Str(">=2".into()))]);
        let plan = plan(&start, &goal, &catalog).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn deterministic_tie_break_by_name() {
        // Two actions with identical costs and effects toward the goal; the
        // lexicographically smaller name must win every time.
        let mut catalog = ActionCatalog::new();
        for name in ["beta_step", "alpha_step"] {
            catalog
                .add_condition(name, "ready", Requirement::Value(StateValue::Bool(true)))
                .unwrap();
            catalog
                .add_reaction(name, "done", StateValue::Bool(true))
                .unwrap();
        }

        let start = WorldState::from_pairs([
            ("ready", StateValue::Bool(true)),
            ("done", StateValue::Bool(false)),
        ]);
        let goal = Goal::from_values([("done", StateValue::Bool(true))]);
        for _ in 0..5 {
            let plan = plan(&start, &goal, &catalog).unwrap();
            assert_eq!(plan[0].name, "alpha_step");
        }
    }
}
