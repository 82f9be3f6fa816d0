//! The planning loop: generate, parse, validate, repair.
//!
//! The planner is stochastic (the model is a non-deterministic oracle);
//! everything downstream of a validated plan is deterministic. On
//! validation failure the invalid candidate and its error are fed back to
//! the model, bounded by `MAX_PLANNER_ATTEMPTS`. A parse failure triggers
//! one dedicated syntax-only repair call within the same attempt.

use std::sync::Arc;

use smith_core::error::PlannerError;
use smith_core::smith_plan;
use smith_core::traits::{LlmClient, LlmRequest};
use smith_core::types::Dag;
use smith_tools::ToolRegistry;

use crate::parse::{clean_json_output, parse_candidate, Candidate};
use crate::prompts::{planner_prompt, render_registry, repair_prompt, syntax_repair_prompt};
use crate::validate::{expects_narrative, validate_dag};

/// Upper bound on generate-validate-repair rounds.
pub const MAX_PLANNER_ATTEMPTS: u32 = 3;

/// Compiles user utterances into validated plans.
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    max_attempts: u32,
}

impl Planner {
    /// Creates a planner over the given model client.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Planner {
            llm,
            max_attempts: MAX_PLANNER_ATTEMPTS,
        }
    }

    /// Overrides the attempt bound (mostly for tests).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Compiles `utterance` into a validated plan over `registry`.
    pub async fn plan(
        &self,
        utterance: &str,
        registry: &ToolRegistry,
    ) -> Result<Dag, PlannerError> {
        let registry_json = render_registry(registry);
        let narrative = expects_narrative(utterance);

        let mut last_raw = String::new();
        let mut last_error = "Unknown error".to_string();

        for attempt in 1..=self.max_attempts {
            let prompt = if attempt == 1 {
                planner_prompt(&registry_json, utterance)
            } else {
                repair_prompt(&registry_json, utterance, &last_raw, &last_error)
            };

            smith_plan!(
                info,
                attempt = attempt,
                max = self.max_attempts,
                "Planner LLM attempt"
            );

            let raw = match self.generate(&prompt).await {
                Ok(text) => text,
                Err(message) => {
                    last_error = message;
                    continue;
                }
            };

            let cleaned = clean_json_output(&raw);
            last_raw = cleaned.clone();

            let candidate = match parse_candidate(&cleaned) {
                Ok(candidate) => candidate,
                Err(parse_err) => {
                    // Dedicated syntax-only pass before burning the attempt.
                    match self.repair_syntax(&cleaned, &parse_err.to_string()).await {
                        Ok(candidate) => candidate,
                        Err(message) => {
                            smith_plan!(
                                warn,
                                attempt = attempt,
                                error = %message,
                                "Candidate still unparseable after syntax fix"
                            );
                            last_error = message;
                            continue;
                        }
                    }
                }
            };

            let dag = match candidate {
                Candidate::Plan(dag) => dag,
                Candidate::Refusal(reason) => {
                    smith_plan!(info, reason = %reason, "Planner refused the request");
                    return Err(PlannerError::Refused { reason });
                }
            };

            match validate_dag(&dag, registry, narrative) {
                Ok(()) => {
                    smith_plan!(
                        info,
                        nodes = dag.nodes.len(),
                        final_output_node = dag.final_output_node,
                        "Planner produced a valid plan"
                    );
                    return Ok(dag);
                }
                Err(reason) => {
                    smith_plan!(
                        warn,
                        attempt = attempt,
                        reason = %reason,
                        "Plan validation failed"
                    );
                    last_error = reason;
                }
            }
        }

        smith_plan!(
            error,
            attempts = self.max_attempts,
            reason = %last_error,
            "Planner exhausted all attempts"
        );
        Err(PlannerError::Exhausted {
            attempts: self.max_attempts,
            reason: last_error,
            last_candidate: last_raw,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, String> {
        self.llm
            .complete(LlmRequest::new(prompt))
            .await
            .map(|resp| resp.text)
            .map_err(|e| format!("Planner LLM call failed: {e}"))
    }

    /// Second-layer pass whose only job is to fix JSON syntax.
    async fn repair_syntax(
        &self,
        broken: &str,
        parse_error: &str,
    ) -> Result<Candidate, String> {
        smith_plan!(
            warn,
            error = %parse_error,
            "Plan JSON parse error; invoking syntax-fix pass"
        );
        let prompt = syntax_repair_prompt(broken, parse_error);
        let fixed = self.generate(&prompt).await?;
        let cleaned = clean_json_output(&fixed);
        parse_candidate(&cleaned).map_err(|e| format!("JSON parse error after syntax fix: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use smith_core::traits::{LlmError, LlmResponse};
    use smith_tools::ToolDescriptor;

    /// Scripted client: returns canned responses in order.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            ScriptedClient {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.calls.lock().push(request.prompt.clone());
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(LlmError::Unavailable("script exhausted".to_string()));
            }
            responses
                .remove(0)
                .map(|text| LlmResponse::new(text, "scripted"))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::from_descriptors(vec![ToolDescriptor::new("echo", "run_echo")
            .with_param("message", "string", true)])
        .expect("registry")
    }

    const GOOD_PLAN: &str = r#"{"status":"success","nodes":[{"id":0,"tool":"echo","function":"run_echo","inputs":{"message":"hi"},"retry":0,"timeout":5}],"final_output_node":0}"#;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(GOOD_PLAN.to_string())]));
        let planner = Planner::new(client.clone());

        let dag = planner.plan("say hi", &registry()).await.expect("plan");
        assert_eq!(dag.nodes.len(), 1);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_after_validation_failure() {
        // First candidate names an unknown tool; repair fixes it.
        let bad = r#"{"nodes":[{"id":0,"tool":"ghost","function":"f","inputs":{}}],"final_output_node":0}"#;
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(bad.to_string()),
            Ok(GOOD_PLAN.to_string()),
        ]));
        let planner = Planner::new(client.clone());

        let dag = planner.plan("say hi", &registry()).await.expect("plan");
        assert_eq!(dag.nodes[0].tool, "echo");
        assert_eq!(client.call_count(), 2);

        // The repair prompt must carry the validation error.
        let second_prompt = client.calls.lock()[1].clone();
        assert!(second_prompt.contains("not in registry"));
    }

    #[tokio::test]
    async fn test_syntax_fix_pass() {
        let broken = "{\"nodes\": [ oops";
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(broken.to_string()),
            Ok(GOOD_PLAN.to_string()), // syntax-fix response
        ]));
        let planner = Planner::new(client.clone());

        let dag = planner.plan("say hi", &registry()).await.expect("plan");
        assert_eq!(dag.final_output_node, 0);
        // One plan call plus one syntax-fix call, no extra attempt burned.
        assert_eq!(client.call_count(), 2);
        assert!(client.calls.lock()[1].contains("JSON syntax fixer"));
    }

    #[tokio::test]
    async fn test_refusal_surfaces() {
        let refusal = r#"{"status":"error","error":"Missing capability: image processing"}"#;
        let client = Arc::new(ScriptedClient::new(vec![Ok(refusal.to_string())]));
        let planner = Planner::new(client);

        let err = planner.plan("edit my photo", &registry()).await.unwrap_err();
        assert!(matches!(err, PlannerError::Refused { .. }));
    }

    #[tokio::test]
    async fn test_exhaustion_after_bounded_attempts() {
        let bad = r#"{"nodes":[{"id":0,"tool":"ghost","function":"f"}],"final_output_node":0}"#;
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(bad.to_string()),
            Ok(bad.to_string()),
            Ok(bad.to_string()),
        ]));
        let planner = Planner::new(client.clone());

        let err = planner.plan("say hi", &registry()).await.unwrap_err();
        match err {
            PlannerError::Exhausted { attempts, .. } => {
                assert_eq!(attempts, MAX_PLANNER_ATTEMPTS)
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cycle_rejected_without_execution() {
        // Forward edges 0 -> 1 -> 0 are impossible to express without a
        // dependency id >= the dependent id, which the gate rejects.
        let cyclic = r#"{"nodes":[
            {"id":0,"tool":"echo","function":"run_echo","inputs":{"message":"a"},"depends_on":[1]},
            {"id":1,"tool":"echo","function":"run_echo","inputs":{"message":"b"},"depends_on":[0]}
        ],"final_output_node":1}"#;
        let client = Arc::new(ScriptedClient::new(vec![Ok(cyclic.to_string())]));
        let planner = Planner::new(client).with_max_attempts(1);

        let err = planner.plan("say hi", &registry()).await.unwrap_err();
        match err {
            PlannerError::Exhausted { reason, .. } => assert!(reason.contains("avoid cycles")),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
