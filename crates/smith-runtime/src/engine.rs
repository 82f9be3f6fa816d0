//! The engine: utterance in, trace and answer out.
//!
//! Dataflow: utterance → planner → validated plan → orchestrator → trace →
//! final synthesis → answer. The model is consulted exactly twice per run
//! (planning and synthesis); every control decision in between is
//! deterministic given the plan and the tools' outcomes.

use std::sync::Arc;
use std::time::Duration;

use smith_core::error::{PlannerError, RuntimeError, SmithError};
use smith_core::traits::{LlmClient, LlmRequest};
use smith_core::types::{Dag, RunReport, RunStatus, Value};
use smith_core::SmithConfig;
use smith_planner::{validate_dag, Planner};
use smith_tools::ToolRegistry;

use crate::approval::{ApprovalHandler, DenyAll};
use crate::cancel::CancelToken;
use crate::events::{EngineEvent, EventSink};
use crate::invoker::{InvokeCtx, Invoker, SUB_AGENT_TOOL};
use crate::locks::ResourceLockManager;
use crate::orchestrator::Orchestrator;
use crate::rate_limit::RateLimiter;
use crate::agents::AgentStateManager;

/// Result of one engine run.
#[derive(Clone, Debug)]
pub struct EngineOutcome {
    /// The orchestrator's report (trace, status, stats).
    pub report: RunReport,
    /// Synthesized answer, absent when the run halted.
    pub final_answer: Option<String>,
}

/// A configured Smith instance.
///
/// Cheap to clone: all services are shared behind `Arc`s, so sub-agents
/// and fleet peers reuse the same rate-limiter table, lock manager, and
/// agent tree as their parent.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ToolRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    config: SmithConfig,
    approval: Arc<dyn ApprovalHandler>,
    events: EventSink,
    agents: Arc<AgentStateManager>,
    limiter: Arc<RateLimiter>,
    locks: Arc<ResourceLockManager>,
}

impl Engine {
    /// Creates an engine over a registry.
    ///
    /// Dangerous tools are denied by default; attach an
    /// [`ApprovalHandler`] (or disable `require_approval`) to change that.
    pub fn new(registry: Arc<ToolRegistry>, config: SmithConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config, &registry));
        let locks = Arc::new(ResourceLockManager::new(Duration::from_secs_f64(
            config.lock_wait_timeout_secs,
        )));
        Engine {
            registry,
            llm: None,
            config,
            approval: Arc::new(DenyAll),
            events: EventSink::none(),
            agents: Arc::new(AgentStateManager::new()),
            limiter,
            locks,
        }
    }

    /// Attaches the language-model client used for planning and synthesis.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Attaches the approval callback for dangerous tools.
    pub fn with_approval(mut self, approval: Arc<dyn ApprovalHandler>) -> Self {
        self.approval = approval;
        self
    }

    /// Attaches an event sink for the ordered engine event stream.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// The tool registry this engine plans and executes over.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Binds the reserved delegation tool into this engine's registry.
    ///
    /// The registry must already carry the `sub_agent` descriptor (see
    /// [`crate::agents::SubAgentTool::descriptor`]); this attaches the
    /// callable that spawns child agents off this engine. Call it after
    /// the engine is fully configured: children snapshot the engine's
    /// services at bind time.
    pub fn enable_sub_agents(&self) {
        self.registry.bind(
            "run_sub_agent",
            Arc::new(crate::agents::SubAgentTool::new(self)),
        );
    }

    /// The shared agent tree.
    pub fn agents(&self) -> &Arc<AgentStateManager> {
        &self.agents
    }

    /// The engine configuration.
    pub fn config(&self) -> &SmithConfig {
        &self.config
    }

    /// Plans and executes `utterance` as a fresh root agent.
    pub async fn run(&self, utterance: &str) -> Result<EngineOutcome, SmithError> {
        let agent_id = self.agents.create(utterance, None);
        self.agents
            .update(&agent_id, smith_core::types::AgentStatus::Running, None, None);

        let outcome = self.run_for_agent(&agent_id, utterance).await;

        match &outcome {
            Ok(result) => self.agents.update(
                &agent_id,
                smith_core::types::AgentStatus::Completed,
                result.final_answer.clone().map(Value::from),
                None,
            ),
            Err(err) => self.agents.update(
                &agent_id,
                smith_core::types::AgentStatus::Failed,
                None,
                Some(err.to_string()),
            ),
        }
        outcome
    }

    /// Plans and executes `utterance` on behalf of an existing agent.
    ///
    /// Callers (sub-agent tool, fleet coordinator) own the agent-tree
    /// bookkeeping around this call.
    pub async fn run_for_agent(
        &self,
        agent_id: &str,
        utterance: &str,
    ) -> Result<EngineOutcome, SmithError> {
        let Some(llm) = self.llm.clone() else {
            return Err(SmithError::Runtime(RuntimeError::State(
                "no language-model client configured".to_string(),
            )));
        };

        self.events.emit(EngineEvent::Planning);
        let planner = Planner::new(Arc::clone(&llm));
        let dag = match planner.plan(utterance, &self.registry).await {
            Ok(dag) => dag,
            Err(err) => {
                self.events.emit(EngineEvent::Error {
                    message: err.to_string(),
                    details: err.last_candidate().map(str::to_string),
                });
                return Err(SmithError::Planner(err));
            }
        };

        let mut tools: Vec<String> = dag.nodes.iter().map(|n| n.tool.clone()).collect();
        tools.sort();
        tools.dedup();
        self.events.emit(EngineEvent::PlanComplete {
            num_nodes: dag.nodes.len(),
            tools,
        });

        let report = self.execute_validated(&dag, agent_id).await?;

        let final_answer = match report.status {
            RunStatus::Halted => {
                self.events.emit(EngineEvent::Error {
                    message: format!("run halted; trace has {} record(s)", report.trace.len()),
                    details: None,
                });
                None
            }
            // Synthesis still runs over a blocked run's partial trace.
            RunStatus::Completed | RunStatus::Blocked => {
                let answer = self.synthesize(&llm, utterance, &report).await?;
                self.events.emit(EngineEvent::FinalAnswer {
                    response: answer.clone(),
                });
                Some(answer)
            }
        };

        Ok(EngineOutcome {
            report,
            final_answer,
        })
    }

    /// Validates and executes a pre-built plan without consulting a model.
    ///
    /// This is the deterministic entry point used when the plan comes from
    /// a file rather than the planner; no synthesis step runs.
    pub async fn execute(&self, dag: &Dag) -> Result<RunReport, SmithError> {
        validate_dag(dag, &self.registry, false).map_err(|reason| {
            SmithError::Planner(PlannerError::Validation {
                reason,
                last_candidate: String::new(),
            })
        })?;
        let agent_id = self.agents.create("plan file execution", None);
        let report = self.execute_validated(dag, &agent_id).await?;
        Ok(report)
    }

    async fn execute_validated(
        &self,
        dag: &Dag,
        agent_id: &str,
    ) -> Result<RunReport, SmithError> {
        let invoker = Arc::new(Invoker::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.limiter),
            Arc::clone(&self.locks),
            Arc::clone(&self.approval),
            self.config.clone(),
        ));
        let orchestrator = Orchestrator::new(invoker, self.config.clone(), self.events.clone());
        let ctx = InvokeCtx {
            agent_id: agent_id.to_string(),
            cancel: CancelToken::new(),
        };

        let report = orchestrator.execute(dag, &ctx).await?;
        // Sweep any lock leaked by an abandoned in-flight call.
        self.locks.release_agent(agent_id);
        Ok(report)
    }

    async fn synthesize(
        &self,
        llm: &Arc<dyn LlmClient>,
        utterance: &str,
        report: &RunReport,
    ) -> Result<String, SmithError> {
        let context = report.trace.compact_json(self.config.trace_limit_chars);
        let prompt = format!(
            "User Request: {utterance}\n\n\
             Execution Trace (machine readable JSON):\n{context}\n\n\
             INSTRUCTIONS:\n\
             1. Answer ONLY using information present in the trace.\n\
             2. If something is missing or a tool failed, say that explicitly.\n\
             3. Do not invent URLs, numbers, or tools that are not present.\n"
        );

        let response = llm
            .complete(LlmRequest::new(prompt))
            .await
            .map_err(|e| SmithError::Runtime(RuntimeError::State(format!(
                "final synthesis failed: {e}"
            ))))?;
        Ok(response.text)
    }

    /// A silent, autonomous clone for child agents: no event stream, no
    /// interactive approval gate.
    pub(crate) fn autonomous_clone(&self) -> Engine {
        let mut clone = self.clone();
        clone.events = EventSink::none();
        clone.approval = Arc::new(crate::approval::AutoApprove);
        clone.config.require_approval = false;
        clone
    }

    /// The engine a sub-agent runs under: autonomous, with the delegation
    /// tool removed from its registry view so recursion stays bounded by
    /// the agent tree alone.
    pub(crate) fn sub_agent_clone(&self) -> Engine {
        let mut clone = self.autonomous_clone();
        clone.registry = Arc::new(self.registry.without(&[SUB_AGENT_TOOL]));
        clone
    }
}
