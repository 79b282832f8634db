//! # wayfarer
//!
//! An autonomous agent for a cooldown-driven online game. Given a goal
//! expressed as a partial world state, the agent observes server-authoritative
//! character state, synthesizes an action sequence with A* over symbolic
//! state, executes it against the rate-limited game API, and repairs the plan
//! whenever execution reveals it is no longer valid.
//!
//! ## Architecture
//!
//! - **State model** (`state`): tagged-union values with wildcard and subset
//!   matching, threshold requirements, and the planner-boundary adapter
//! - **Planner** (`planner`): arena-based A* over the action catalog, with a
//!   cooldown-aware filter and duration estimator
//! - **Executor** (`executor`): the plan → execute → learn → replan loop with
//!   wait insertion and bounded discovery replans
//! - **Knowledge** (`knowledge`): learned recipes, workshop and monster
//!   locations, explored map tiles
//! - **Client** (`client`): the narrow game-API interface and its `ureq`
//!   implementation
//!
//! ## Library usage
//!
//! ```no_run
//! use wayfarer::planner::ActionCatalog;
//! use wayfarer::state::{Goal, Requirement, StateValue, WorldState};
//!
//! let mut catalog = ActionCatalog::new();
//! catalog
//!     .add_condition("fight", "cooldown_ready", Requirement::Value(StateValue::Bool(true)))
//!     .unwrap();
//! catalog
//!     .add_reaction("fight", "character_level", StateValue::Int(2))
//!     .unwrap();
//!
//! let start = WorldState::from_pairs([
//!     ("character_level", StateValue::Int(1)),
//!     ("cooldown_ready", StateValue::Bool(true)),
//! ]);
//! let goal = Goal::from_values([("character_level", StateValue::Int(2))]);
//! let plan = wayfarer::planner::plan(&start, &goal, &catalog).unwrap();
//! assert_eq!(plan[0].name, "fight");
//! ```

pub mod character;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod knowledge;
pub mod paths;
pub mod plan;
pub mod planner;
pub mod runner;
pub mod state;
