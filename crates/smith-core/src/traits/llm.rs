//! Language-model client contract.
//!
//! The planner, the final synthesis step, and the fleet coordinator all
//! talk to a language model through this trait. The runtime itself never
//! consults the model for control decisions; implementations live outside
//! this workspace (or in test code as scripted mocks).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request parameters for a generation call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Main user prompt.
    pub prompt: String,
    /// Optional system prompt for steering behaviour.
    pub system_prompt: Option<String>,
    /// Temperature controls randomness (0-2).
    pub temperature: f64,
    /// Optional maximum tokens to generate.
    pub max_tokens: Option<usize>,
}

impl LlmRequest {
    /// Creates a new request with sane defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        LlmRequest {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.2,
            max_tokens: None,
        }
    }

    /// Adds a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets max tokens.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from a generation call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub text: String,
    /// Model that produced it.
    pub model: String,
}

impl LlmResponse {
    /// Convenience constructor.
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        LlmResponse {
            text: text.into(),
            model: model.into(),
        }
    }
}

/// Errors returned by language-model clients.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LlmError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

/// Contract for all language-model clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Performs a single-shot generation.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Name of the underlying model (for observability).
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockClient {
        model: String,
    }

    #[async_trait]
    impl LlmClient for MockClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::new(
                format!("echo: {}", request.prompt),
                self.model.clone(),
            ))
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    #[test]
    fn test_request_builder() {
        let req = LlmRequest::new("hello")
            .with_system_prompt("sys")
            .with_temperature(0.7)
            .with_max_tokens(128);
        assert_eq!(req.prompt, "hello");
        assert_eq!(req.system_prompt.as_deref(), Some("sys"));
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, Some(128));
    }

    #[tokio::test]
    async fn test_mock_complete() {
        let client = MockClient {
            model: "mock".to_string(),
        };
        let resp = client
            .complete(LlmRequest::new("world"))
            .await
            .expect("complete");
        assert_eq!(resp.text, "echo: world");
        assert_eq!(client.model_name(), "mock");
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn trait_is_send_sync() {
        assert_send_sync::<Box<dyn LlmClient>>();
    }
}
