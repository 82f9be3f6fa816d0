//! Recursive delegation: the reserved `sub_agent` tool.
//!
//! A sub-agent is a full planner + orchestrator run spawned from inside a
//! node. Its registry view excludes `sub_agent` itself, and a process-wide
//! gate serializes sub-agent execution: at most one runs at a time, so a
//! burst of delegations cannot cascade into upstream rate limits.
//! Independent sub-agent nodes in one plan therefore execute in arrival
//! order even when the graph would permit parallelism.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::OnceLock;

use tokio::sync::Semaphore;

use smith_core::smith_agent;
use smith_core::types::{AgentStatus, Value};
use smith_tools::{Tool, ToolDescriptor, ToolError};

use crate::engine::Engine;
use crate::invoker::SUB_AGENT_TOOL;

/// Process-wide serialization gate (capacity 1).
fn gate() -> &'static Semaphore {
    static GATE: OnceLock<Semaphore> = OnceLock::new();
    GATE.get_or_init(|| Semaphore::new(1))
}

/// The callable bound to the reserved `sub_agent` descriptor.
pub struct SubAgentTool {
    engine: Engine,
}

impl SubAgentTool {
    /// Builds the delegation tool for `engine`. The child engine shares
    /// the parent's services but sees a registry without `sub_agent`.
    pub fn new(engine: &Engine) -> Self {
        SubAgentTool {
            engine: engine.sub_agent_clone(),
        }
    }

    /// Registry descriptor for the reserved tool.
    ///
    /// `parent_agent_id` is injected by the invoker from the run context,
    /// never written by the planner.
    pub fn descriptor() -> ToolDescriptor {
        let mut descriptor = ToolDescriptor::new(SUB_AGENT_TOOL, "run_sub_agent")
            .with_description(
                "Delegate a complex sub-task to a child agent with access to every tool except \
                 creating more sub-agents.",
            )
            .with_param("task", "string", true)
            .with_param("parent_agent_id", "string", false);
        descriptor.domain = "system".to_string();
        descriptor.output_type = "synthesis".to_string();
        descriptor
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    async fn call(&self, args: HashMap<String, Value>) -> Result<Value, ToolError> {
        let task = args
            .get("task")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ToolError::permanent("task description is required"))?
            .to_string();
        let parent_id = args
            .get("parent_agent_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let agents = self.engine.agents();
        let depth = parent_id
            .as_deref()
            .and_then(|p| agents.get(p))
            .map(|parent| parent.depth + 1)
            .unwrap_or(0);

        let max_depth = self.engine.config().max_subagent_depth;
        if depth >= max_depth {
            smith_agent!(
                warn,
                depth = depth,
                max = max_depth,
                "Sub-agent spawn refused at depth bound"
            );
            let err = smith_core::error::RuntimeError::DepthExceeded {
                depth,
                max: max_depth,
            };
            return Err(ToolError::permanent(err.to_string()));
        }

        let agent_id = agents.create(task.clone(), parent_id.as_deref());

        // Serialize sub-agent execution to avoid rate-limit cascades.
        let _permit = gate()
            .acquire()
            .await
            .map_err(|_| ToolError::permanent("sub-agent gate closed"))?;

        agents.update(&agent_id, AgentStatus::Running, None, None);
        smith_agent!(info, agent = %agent_id, depth = depth, "Sub-agent started");

        match self.engine.run_for_agent(&agent_id, &task).await {
            Ok(outcome) => {
                let answer = outcome
                    .final_answer
                    .or_else(|| outcome.report.final_output.as_ref().map(Value::render))
                    .unwrap_or_default();
                agents.update(
                    &agent_id,
                    AgentStatus::Completed,
                    Some(Value::from(answer.clone())),
                    None,
                );
                Ok(Value::from(answer))
            }
            Err(err) => {
                agents.update(&agent_id, AgentStatus::Failed, None, Some(err.to_string()));
                Err(ToolError::permanent(format!("sub-agent failed: {err}")))
            }
        }
    }
}
