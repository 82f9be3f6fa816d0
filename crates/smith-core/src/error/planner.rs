//! Planner errors.
//!
//! Errors raised while compiling an utterance into a validated plan.
//! Validation and parse variants carry the last candidate text so callers
//! can inspect (or log) what the model actually produced.

use thiserror::Error;

/// Errors that occur during planning.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The language-model call itself failed.
    #[error("Planner LLM call failed: {message}")]
    Llm {
        /// Error message from the client.
        message: String,
    },

    /// The candidate could not be parsed as a plan object.
    #[error("Plan parse error: {message}")]
    Parse {
        /// Parser error message.
        message: String,
        /// The raw candidate that failed to parse.
        last_candidate: String,
    },

    /// The candidate parsed but violated a structural rule.
    #[error("Plan validation failed: {reason}")]
    Validation {
        /// The offending rule.
        reason: String,
        /// The candidate that failed validation.
        last_candidate: String,
    },

    /// The model declared the request unfulfillable with the registry.
    #[error("Planner refused: {reason}")]
    Refused {
        /// The model's stated reason.
        reason: String,
    },

    /// All repair attempts were exhausted.
    #[error("Unable to build a valid plan after {attempts} attempts: {reason}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last validation or parse error.
        reason: String,
        /// The final candidate.
        last_candidate: String,
    },
}

impl PlannerError {
    /// The last candidate text, when one exists for this variant.
    pub fn last_candidate(&self) -> Option<&str> {
        match self {
            PlannerError::Parse { last_candidate, .. }
            | PlannerError::Validation { last_candidate, .. }
            | PlannerError::Exhausted { last_candidate, .. } => Some(last_candidate),
            _ => None,
        }
    }
}
