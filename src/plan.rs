//! Plans: ordered action sequences produced by the planner and driven by the
//! execution manager.
//!
//! Wait steps are first-class plan elements carrying their duration, not a
//! loop-control side effect — plans stay self-describing for logging and
//! replay, and the executor remains a pure sequential driver.

use std::collections::BTreeMap;

use crate::planner::astar::PlannedAction;
use crate::state::StateValue;

/// What kind of step this is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepKind {
    /// A catalog action dispatched to its handler.
    Action,
    /// An inserted pause whose only effect is to advance time.
    Wait { seconds: f64 },
}

/// A single plan element: an action-name reference with optional parameter
/// bindings and its incremental cost contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub name: String,
    pub kind: StepKind,
    pub cost: f64,
    /// Parameter bindings resolved at plan time (target item, coordinates).
    pub parameters: BTreeMap<String, StateValue>,
}

impl PlanStep {
    /// A plain action step.
    pub fn action(name: impl Into<String>, cost: f64) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Action,
            cost,
            parameters: BTreeMap::new(),
        }
    }

    /// A wait step covering `seconds` of cooldown.
    pub fn wait(seconds: f64) -> Self {
        Self {
            name: "wait".into(),
            kind: StepKind::Wait { seconds },
            cost: 0.0,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn is_wait(&self) -> bool {
        matches!(self.kind, StepKind::Wait { .. })
    }
}

/// An ordered, finite sequence of plan steps.
///
/// A plan is immutable once returned by the planner; the execution manager
/// builds new plans (sharing prefixes) through [`Plan::with_wait_at`] and
/// [`Plan::spliced`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Build a plan from planner output.
    pub fn from_actions(actions: Vec<PlannedAction>) -> Self {
        Self {
            steps: actions
                .into_iter()
                .map(|a| PlanStep::action(a.name, a.cost))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost).sum()
    }

    /// A new plan that drops everything before `index` and runs a wait step
    /// first. Used when a cooldown is observed mid-plan: the executed prefix
    /// is discarded so the wait executes at position zero.
    pub fn with_wait_at(&self, index: usize, seconds: f64) -> Plan {
        let mut steps = Vec::with_capacity(self.steps.len() - index.min(self.steps.len()) + 1);
        steps.push(PlanStep::wait(seconds));
        steps.extend(self.steps.iter().skip(index).cloned());
        Plan { steps }
    }

    /// A new plan keeping `self[..at]` and continuing with `suffix`.
    pub fn spliced(&self, at: usize, suffix: Plan) -> Plan {
        let mut steps: Vec<PlanStep> = self.steps.iter().take(at).cloned().collect();
        steps.extend(suffix.steps);
        Plan { steps }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.names().join(" → "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_step_plan() -> Plan {
        Plan::from_actions(vec![
            PlannedAction {
                name: "move".into(),
                cost: 1.0,
            },
            PlannedAction {
                name: "fight".into(),
                cost: 2.0,
            },
            PlannedAction {
                name: "rest".into(),
                cost: 1.0,
            },
        ])
    }

    #[test]
    fn wait_insertion_drops_executed_prefix() {
        let plan = three_step_plan();
        let with_wait = plan.with_wait_at(1, 12.5);

        assert_eq!(with_wait.names(), vec!["wait", "fight", "rest"]);
        assert!(with_wait.get(0).unwrap().is_wait());
        assert_eq!(
            with_wait.get(0).unwrap().kind,
            StepKind::Wait { seconds: 12.5 }
        );
    }

    #[test]
    fn splice_keeps_prefix_and_replaces_suffix() {
        let plan = three_step_plan();
        let suffix = Plan::from_steps(vec![PlanStep::action("craft", 3.0)]);
        let spliced = plan.spliced(2, suffix);
        assert_eq!(spliced.names(), vec!["move", "fight", "craft"]);
    }

    #[test]
    fn total_cost_ignores_waits() {
        let plan = three_step_plan().with_wait_at(0, 5.0);
        assert_eq!(plan.total_cost(), 4.0);
    }

    #[test]
    fn wait_steps_are_identified_by_kind_not_name() {
        // An ordinary action that happens to contain "wait" in its name is
        // not a wait step.
        let step = PlanStep::action("await_delivery", 1.0);
        assert!(!step.is_wait());
        assert!(PlanStep::wait(3.0).is_wait());
    }

    #[test]
    fn parameters_bind_to_steps() {
        let step = PlanStep::action("craft_item", 1.0)
            .with_parameter("item_code", "iron_sword")
            .with_parameter("quantity", 1i64);
        assert_eq!(
            step.parameters.get("item_code"),
            Some(&StateValue::Str("iron_sword".into()))
        );
    }
}
