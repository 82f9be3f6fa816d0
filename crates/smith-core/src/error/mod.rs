//! Error taxonomy for the Smith workspace.
//!
//! Planning and execution fail differently: a [`PlannerError`] is fatal for
//! the run before anything executes, while a [`RuntimeError`] describes a
//! failure inside a run. [`SmithError`] is the umbrella used at the engine
//! surface.

mod planner;
mod runtime;

pub use planner::PlannerError;
pub use runtime::RuntimeError;

use thiserror::Error;

/// Top-level error for engine entry points.
#[derive(Debug, Error)]
pub enum SmithError {
    /// Planning failed; nothing was executed.
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// Execution failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
