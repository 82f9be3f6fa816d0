//! Core types for the Smith execution runtime.
//!
//! This crate defines the shared vocabulary of the workspace: the dynamic
//! [`Value`](types::Value) model, the plan graph ([`Dag`](types::Dag)), the
//! execution trace, agent state, runtime configuration, the error taxonomy,
//! and the language-model client contract.

pub mod config;
pub mod error;
pub mod logging;
pub mod placeholder;
pub mod traits;
pub mod types;

pub use config::SmithConfig;
pub use error::{PlannerError, RuntimeError, SmithError};
