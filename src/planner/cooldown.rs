//! Cooldown-aware planning: catalog filtering, deferral, and duration
//! estimates.
//!
//! When the character is on cooldown, every action whose preconditions
//! require readiness is dropped from the catalog before planning, so any
//! plan returned is executable starting immediately. The caller may instead
//! consult [`CooldownAwarePlanner::deferred_until`] and sleep until the full
//! catalog is available again.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::character::CooldownRecord;
use crate::error::PlannerError;
use crate::state::{COOLDOWN_READY, Goal, Requirement, StateValue, WorldState};

use super::astar::{self, PlannedAction};
use super::catalog::{ActionCatalog, ActionFamily};

/// Per-action execution estimates, in seconds.
const ESTIMATE_MOVEMENT: f64 = 5.0;
const ESTIMATE_COMBAT: f64 = 10.0;
const ESTIMATE_GATHERING: f64 = 8.0;
const ESTIMATE_DEFAULT: f64 = 3.0;
/// Flat per-action cooldown budget, in seconds.
const ESTIMATE_COOLDOWN: f64 = 1.0;

/// Wraps the A* planner with cooldown timing awareness for one character.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooldownAwarePlanner {
    max_expansions: Option<usize>,
}

impl CooldownAwarePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_expansions(max_expansions: usize) -> Self {
        Self {
            max_expansions: Some(max_expansions),
        }
    }

    /// The catalog as the planner may use it right now: unchanged when the
    /// character is ready, otherwise with every readiness-requiring action
    /// dropped.
    pub fn usable_catalog(
        &self,
        catalog: &ActionCatalog,
        cooldown: &CooldownRecord,
        now: DateTime<Utc>,
    ) -> ActionCatalog {
        if cooldown.is_ready(now) {
            return catalog.clone();
        }
        catalog.filtered(|_, spec| !requires_readiness(spec.conditions.get(COOLDOWN_READY)))
    }

    /// Plan under the current cooldown constraints.
    pub fn plan(
        &self,
        start: &WorldState,
        goal: &Goal,
        catalog: &ActionCatalog,
        cooldown: &CooldownRecord,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlannedAction>, PlannerError> {
        let usable = self.usable_catalog(catalog, cooldown, now);
        match self.max_expansions {
            Some(limit) => astar::plan_with_limit(start, goal, &usable, limit),
            None => astar::plan(start, goal, &usable),
        }
    }

    /// The earliest moment planning can resume with the full catalog, or
    /// `None` when the character is ready now.
    pub fn deferred_until(
        &self,
        cooldown: &CooldownRecord,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if cooldown.is_ready(now) {
            return None;
        }
        match cooldown.expires_at {
            Some(expires) => Some(expires),
            None => {
                let millis = (cooldown.remaining_seconds * 1000.0).round() as i64;
                Some(now + chrono::Duration::milliseconds(millis))
            }
        }
    }
}

fn requires_readiness(requirement: Option<&Requirement>) -> bool {
    matches!(
        requirement,
        Some(Requirement::Value(StateValue::Bool(true)))
    )
}

/// Expected wall-clock duration of a plan: a per-family estimate plus a flat
/// per-action cooldown budget. Scheduling hint only; never affects
/// correctness.
pub fn estimate_duration(plan: &crate::plan::Plan, catalog: &ActionCatalog) -> Duration {
    let mut total = 0.0f64;
    for step in plan.iter() {
        if let crate::plan::StepKind::Wait { seconds } = step.kind {
            total += seconds;
            continue;
        }
        let family = catalog
            .get(&step.name)
            .map(|spec| spec.family)
            .unwrap_or_default();
        total += match family {
            ActionFamily::Movement => ESTIMATE_MOVEMENT,
            ActionFamily::Combat => ESTIMATE_COMBAT,
            ActionFamily::Gathering => ESTIMATE_GATHERING,
            _ => ESTIMATE_DEFAULT,
        };
        total += ESTIMATE_COOLDOWN;
    }
    Duration::from_secs_f64(total)
}
