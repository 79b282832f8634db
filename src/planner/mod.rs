//! Goal-oriented action planning: the catalog, the A* search, and the
//! cooldown-aware wrapper.

pub mod astar;
pub mod catalog;
pub mod cooldown;

pub use astar::{DEFAULT_MAX_EXPANSIONS, PlannedAction, plan, plan_with_limit};
pub use catalog::{ActionCatalog, ActionClassification, ActionFamily, ActionSpec};
pub use cooldown::{CooldownAwarePlanner, estimate_duration};
