//! Execution-manager error types with rich miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the plan/execute loop.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error("authentication failed — aborting execution")]
    #[diagnostic(
        code(wayfarer::executor::auth),
        help(
            "The server rejected the API token mid-run. The loop stops \
             immediately and never retries against an unauthorized endpoint."
        )
    )]
    AuthenticationFailed,

    #[error("iteration cap of {max_iterations} exceeded without achieving the goal")]
    #[diagnostic(
        code(wayfarer::executor::iteration_cap),
        help(
            "The execution loop ran its maximum number of iterations. The \
             goal may be unreachable, or the plan may be thrashing between \
             replans. Inspect the log for repeated actions."
        )
    )]
    IterationCapExceeded { max_iterations: usize },

    #[error("could not develop a plan for goal: {goal}")]
    #[diagnostic(
        code(wayfarer::executor::planning_failed),
        help(
            "Both the knowledge-based and the discovery-biased planning \
             passes failed. Check that the action catalog can produce every \
             goal key and that discovery actions are available."
        )
    )]
    PlanningFailed { goal: String },

    #[error("action \"{action}\" failed and no replan was available: {message}")]
    #[diagnostic(
        code(wayfarer::executor::replan_failed),
        help("The failure was not recoverable by replanning from the current position.")
    )]
    ReplanFailed { action: String, message: String },

    #[error("plan exhausted after {iterations} iterations without reaching the goal")]
    #[diagnostic(
        code(wayfarer::executor::goal_not_achieved),
        help(
            "Every plan step executed but the goal check still fails. The \
             action reactions may overstate their effects."
        )
    )]
    GoalNotAchieved { iterations: usize },

    #[error("execution interrupted by stop request")]
    #[diagnostic(
        code(wayfarer::executor::interrupted),
        help("The stop token was observed at an iteration boundary. This is a clean exit.")
    )]
    Interrupted,

    #[error("{0}")]
    #[diagnostic(
        code(wayfarer::executor::core),
        help("A core-subsystem error occurred during an executor operation.")
    )]
    Core(Box<crate::error::WayfarerError>),
}

impl From<crate::error::WayfarerError> for ExecutorError {
    fn from(e: crate::error::WayfarerError) -> Self {
        Self::Core(Box::new(e))
    }
}

impl From<crate::client::ClientError> for ExecutorError {
    fn from(e: crate::client::ClientError) -> Self {
        Self::Core(Box::new(e.into()))
    }
}

impl From<crate::error::PlannerError> for ExecutorError {
    fn from(e: crate::error::PlannerError) -> Self {
        Self::Core(Box::new(e.into()))
    }
}

impl From<crate::error::ConfigError> for ExecutorError {
    fn from(e: crate::error::ConfigError) -> Self {
        Self::Core(Box::new(e.into()))
    }
}

impl From<crate::error::CatalogError> for ExecutorError {
    fn from(e: crate::error::CatalogError) -> Self {
        Self::Core(Box::new(e.into()))
    }
}

/// Convenience alias for executor operations.
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
