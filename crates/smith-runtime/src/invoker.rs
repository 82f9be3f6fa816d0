//! Tool invocation under rate, approval, resource, deadline, and retry
//! discipline.
//!
//! One invocation = one rate-limit grant, one approval check, one resource
//! claim, and up to `1 + retry` attempts under a single whole-node
//! deadline. Retries use capped exponential backoff with jitter and never
//! extend past the deadline. Resources release on every exit path via the
//! claim's drop.

use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use smith_core::error::RuntimeError;
use smith_core::smith_op;
use smith_core::types::{DagNode, ExecutionRecord, NodeOutcome, Value};
use smith_core::SmithConfig;
use smith_tools::{validate_inputs, ToolRegistry};

use crate::approval::ApprovalHandler;
use crate::cancel::CancelToken;
use crate::locks::ResourceLockManager;
use crate::rate_limit::RateLimiter;

/// Reserved tool name for recursive delegation.
pub const SUB_AGENT_TOOL: &str = "sub_agent";

/// Per-run context threaded through every invocation.
#[derive(Clone)]
pub struct InvokeCtx {
    /// Agent on whose behalf the node runs (lock ownership, delegation).
    pub agent_id: String,
    /// Run-wide cancellation signal.
    pub cancel: CancelToken,
}

/// Executes single nodes.
pub struct Invoker {
    registry: Arc<ToolRegistry>,
    limiter: Arc<RateLimiter>,
    locks: Arc<ResourceLockManager>,
    approval: Arc<dyn ApprovalHandler>,
    config: SmithConfig,
}

enum AttemptOutcome {
    Success(Value),
    Error(String),
    Timeout,
}

impl Invoker {
    /// Creates an invoker over shared runtime services.
    pub fn new(
        registry: Arc<ToolRegistry>,
        limiter: Arc<RateLimiter>,
        locks: Arc<ResourceLockManager>,
        approval: Arc<dyn ApprovalHandler>,
        config: SmithConfig,
    ) -> Self {
        Invoker {
            registry,
            limiter,
            locks,
            approval,
            config,
        }
    }

    /// Runs one node to a terminal record.
    ///
    /// Returns `Err(Cancelled)` only when cancellation arrived before the
    /// first attempt started; the scheduler records those nodes as skipped.
    /// Every other path produces exactly one [`ExecutionRecord`].
    pub async fn invoke(
        &self,
        node: &DagNode,
        resolved_inputs: HashMap<String, Value>,
        ctx: &InvokeCtx,
    ) -> Result<ExecutionRecord, RuntimeError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let Some(descriptor) = self.registry.lookup(&node.tool) else {
            return Ok(self.error_record(
                node,
                &resolved_inputs,
                started_at,
                start,
                0,
                RuntimeError::ToolNotFound {
                    tool: node.tool.clone(),
                }
                .to_string(),
            ));
        };

        // Dispatch-time validation over the substituted inputs. Null slots
        // from failed `continue` dependencies are tolerated by the schema.
        let mut args = resolved_inputs;
        if let Err(violation) = validate_inputs(descriptor, &args) {
            return Ok(self.error_record(
                node,
                &args,
                started_at,
                start,
                0,
                violation.to_string(),
            ));
        }

        // Delegation contract: the reserved tool learns its parent from the
        // run context, never from the planner.
        if node.tool == SUB_AGENT_TOOL {
            args.insert(
                "parent_agent_id".to_string(),
                Value::from(ctx.agent_id.clone()),
            );
        }

        // One rate grant per invocation; retries share it.
        self.limiter.acquire(&node.tool, &ctx.cancel).await?;

        if self.config.require_approval && descriptor.dangerous {
            if !self.approval.approve(descriptor, node).await {
                smith_op!(warn, tool = %node.tool, node_id = node.id, "Approval denied");
                return Ok(self.error_record(
                    node,
                    &args,
                    started_at,
                    start,
                    0,
                    RuntimeError::ApprovalDenied {
                        tool: node.tool.clone(),
                    }
                    .to_string(),
                ));
            }
        }

        let tool = match self.registry.resolve(descriptor) {
            Ok(tool) => tool,
            Err(err) => {
                return Ok(self.error_record(node, &args, started_at, start, 0, err.to_string()));
            }
        };

        // Held for the duration of all attempts, released on drop. Locks
        // are owned per invocation, not per run: two concurrent nodes of
        // the same run must still exclude each other on shared resources.
        let lock_owner = format!("{}#{}", ctx.agent_id, node.id);
        let claim = match self
            .locks
            .acquire_all(&lock_owner, &descriptor.resources, &ctx.cancel)
            .await
        {
            Ok(claim) => claim,
            Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
            Err(err) => {
                return Ok(self.error_record(node, &args, started_at, start, 0, err.to_string()));
            }
        };

        let timeout_secs = node.timeout.unwrap_or(self.config.default_timeout);
        let deadline = start + Duration::from_secs_f64(timeout_secs);
        let retry_budget = node.retry.unwrap_or(self.config.max_retries);

        let mut attempts: u32 = 0;
        let outcome = loop {
            attempts += 1;
            smith_op!(
                debug,
                tool = %node.tool,
                node_id = node.id,
                attempt = attempts,
                "Dispatching tool call"
            );

            match tokio::time::timeout_at(deadline, tool.call(args.clone())).await {
                Ok(Ok(value)) => break AttemptOutcome::Success(value),
                Ok(Err(err)) => {
                    smith_op!(
                        debug,
                        tool = %node.tool,
                        node_id = node.id,
                        attempt = attempts,
                        error = %err,
                        "Tool attempt failed"
                    );
                    if !err.retryable || attempts > retry_budget {
                        break AttemptOutcome::Error(err.message);
                    }
                    let backoff = self.backoff_delay(attempts);
                    if Instant::now() + backoff >= deadline {
                        // No room to retry before the deadline.
                        break AttemptOutcome::Error(err.message);
                    }
                    smith_op!(
                        trace,
                        tool = %node.tool,
                        node_id = node.id,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retry backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    if ctx.cancel.is_cancelled() {
                        break AttemptOutcome::Error("execution cancelled".to_string());
                    }
                }
                Err(_) => break AttemptOutcome::Timeout,
            }
        };
        drop(claim);

        let finished_at = Utc::now();
        let duration_ms = start.elapsed().as_millis() as u64;
        let record = match outcome {
            AttemptOutcome::Success(value) => ExecutionRecord {
                node_id: node.id,
                tool: node.tool.clone(),
                function: node.function.clone(),
                inputs_resolved: Value::Object(args),
                output: value,
                status: NodeOutcome::Success,
                attempts,
                started_at,
                finished_at,
                duration_ms,
                error: None,
            },
            AttemptOutcome::Error(message) => ExecutionRecord {
                node_id: node.id,
                tool: node.tool.clone(),
                function: node.function.clone(),
                inputs_resolved: Value::Object(args),
                output: Value::Null,
                status: NodeOutcome::Error,
                attempts,
                started_at,
                finished_at,
                duration_ms,
                error: Some(message),
            },
            AttemptOutcome::Timeout => ExecutionRecord {
                node_id: node.id,
                tool: node.tool.clone(),
                function: node.function.clone(),
                inputs_resolved: Value::Object(args),
                output: Value::Null,
                status: NodeOutcome::Timeout,
                attempts,
                started_at,
                finished_at,
                duration_ms,
                error: Some(format!("Execution timed out ({timeout_secs}s)")),
            },
        };

        smith_op!(
            debug,
            tool = %node.tool,
            node_id = node.id,
            status = ?record.status,
            attempts = record.attempts,
            duration_ms = record.duration_ms,
            "Tool call committed"
        );
        Ok(record)
    }

    /// Exponential backoff with a cap and ±25% jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let pow = (attempt - 1).min(31);
        let base = self
            .config
            .retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(pow))
            .min(self.config.retry_backoff_max_ms);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((base as f64 * jitter) as u64)
    }

    fn error_record(
        &self,
        node: &DagNode,
        args: &HashMap<String, Value>,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
        attempts: u32,
        message: String,
    ) -> ExecutionRecord {
        ExecutionRecord {
            node_id: node.id,
            tool: node.tool.clone(),
            function: node.function.clone(),
            inputs_resolved: Value::Object(args.clone()),
            output: Value::Null,
            status: NodeOutcome::Error,
            attempts,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(message),
        }
    }
}
