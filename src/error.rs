//! Rich diagnostic error types for the wayfarer agent.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the wayfarer crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum WayfarerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] crate::client::ClientError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] crate::paths::PathError),
}

// ---------------------------------------------------------------------------
// Planner errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlannerError {
    #[error("no plan reaches the goal from the current state")]
    #[diagnostic(
        code(wayfarer::planner::no_plan),
        help(
            "No sequence of available actions transforms the start state into \
             one satisfying the goal. Check that the catalog's reactions can \
             produce every goal key, and that preconditions are reachable."
        )
    )]
    NoPlanAvailable,

    #[error("search overflowed: {expansions} expansions without reaching the goal")]
    #[diagnostic(
        code(wayfarer::planner::overflow),
        help(
            "The A* search hit its expansion cap. Either the goal is \
             unreachable through a very large state space, or an action pair \
             oscillates. Simplify the goal or raise the expansion limit."
        )
    )]
    SearchOverflow { expansions: usize },
}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("reaction for \"{name}\" has no matching condition")]
    #[diagnostic(
        code(wayfarer::catalog::orphan_reaction),
        help(
            "Declare at least one condition for the action before adding \
             reactions. Every action needs preconditions, even if they are \
             wildcards."
        )
    )]
    OrphanReaction { name: String },

    #[error("invalid weight {weight} for \"{name}\": must be >= 1")]
    #[diagnostic(
        code(wayfarer::catalog::invalid_weight),
        help(
            "Action weights below 1 would break heuristic admissibility: the \
             planner's distance estimate assumes each action costs at least 1."
        )
    )]
    InvalidWeight { name: String, weight: f64 },

    #[error("unknown action: \"{name}\"")]
    #[diagnostic(
        code(wayfarer::catalog::unknown_action),
        help("The action has no condition entry yet. Add a condition first.")
    )]
    UnknownAction { name: String },
}

// ---------------------------------------------------------------------------
// State errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("hp out of range: {hp_current} not in 0..={hp_max}")]
    #[diagnostic(
        code(wayfarer::state::hp_range),
        help("Character snapshots must satisfy 0 <= hp_current <= hp_max with hp_max > 0.")
    )]
    HpOutOfRange { hp_current: i32, hp_max: i32 },

    #[error("level {level} out of range for \"{what}\": must be in 1..=45")]
    #[diagnostic(
        code(wayfarer::state::level_range),
        help("Skill levels and character level lie in [1, 45].")
    )]
    LevelOutOfRange { what: String, level: u32 },

    #[error(
        "inventory counters incoherent: used {space_used} + available {space_available} != capacity {capacity}"
    )]
    #[diagnostic(
        code(wayfarer::state::inventory_incoherent),
        help("space_used + space_available must equal inventory_capacity when both are present.")
    )]
    InventoryIncoherent {
        space_used: u32,
        space_available: u32,
        capacity: u32,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file \"{path}\"")]
    #[diagnostic(
        code(wayfarer::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse \"{path}\": {message}")]
    #[diagnostic(
        code(wayfarer::config::parse),
        help("The file is not valid TOML for this schema. {message}")
    )]
    Parse { path: String, message: String },

    #[error("action \"{name}\" declares no conditions")]
    #[diagnostic(
        code(wayfarer::config::missing_conditions),
        help("Every action needs a [actions.<name>.conditions] table with at least one key.")
    )]
    MissingConditions { name: String },

    #[error("action \"{name}\" declares no reactions")]
    #[diagnostic(
        code(wayfarer::config::missing_reactions),
        help("Every action needs a [actions.<name>.reactions] table with at least one key.")
    )]
    MissingReactions { name: String },

    #[error("goal template not found: \"{name}\"")]
    #[diagnostic(
        code(wayfarer::config::goal_not_found),
        help("List available templates with `wayfarer goals`.")
    )]
    GoalNotFound { name: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PersistError {
    #[error("I/O error writing \"{path}\"")]
    #[diagnostic(
        code(wayfarer::persist::io),
        help(
            "A filesystem operation failed. Check that the state directory \
             exists, has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error for \"{path}\": {message}")]
    #[diagnostic(
        code(wayfarer::persist::serde),
        help(
            "Failed to serialize or deserialize persisted state. The stored \
             format may predate this version — remove the file to start fresh."
        )
    )]
    Serialization { path: String, message: String },
}

/// Convenience alias for functions returning wayfarer results.
pub type WayfarerResult<T> = std::result::Result<T, WayfarerError>;
