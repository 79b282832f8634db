//! Symbolic world state: values, flat planner state, goals, and the
//! adapter across the planner boundary.

pub mod adapter;
pub mod goal;
pub mod value;
pub mod world;

pub use adapter::{AgentState, StateKey, WorldStateAdapter};
pub use goal::Goal;
pub use value::{Requirement, StateValue};
pub use world::{COOLDOWN_READY, WorldState, distance};
