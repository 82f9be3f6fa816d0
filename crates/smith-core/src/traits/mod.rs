//! Contracts for external collaborators.

mod llm;

pub use llm::{LlmClient, LlmError, LlmRequest, LlmResponse};
