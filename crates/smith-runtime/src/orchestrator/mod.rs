//! Topological executor for validated plans.
//!
//! The scheduler loop is single-writer over per-node state: it dispatches
//! ready nodes (smallest id first) onto worker tasks bounded by
//! `max_concurrent_tools`, and applies their terminal outcomes as they
//! arrive on one commit channel. `max_concurrent_tools = 1` is the
//! sequential fallback; terminal statuses and outputs are identical in
//! both modes, only timing and commit order differ.
//!
//! Failure policy: a failed `halt` node cancels the run and skips every
//! non-terminal node; a failed `continue` node publishes a null output
//! slot and lets dependents proceed. If nothing is running or ready while
//! pending nodes remain, the run ends `Blocked` with its partial trace.

mod state;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use smith_core::error::RuntimeError;
use smith_core::placeholder::{deep_get, substitute};
use smith_core::smith_sched;
use smith_core::types::{
    Dag, DagNode, ExecutionRecord, NodeId, NodeOutcome, OnFail, RunReport, RunStats, RunStatus,
    Value,
};
use smith_core::SmithConfig;

use crate::events::{EngineEvent, EventSink};
use crate::invoker::{InvokeCtx, Invoker};
use state::RunState;

type Commit = (NodeId, Result<ExecutionRecord, RuntimeError>);

/// Executes one validated plan to a [`RunReport`].
pub struct Orchestrator {
    invoker: Arc<Invoker>,
    config: SmithConfig,
    events: EventSink,
}

impl Orchestrator {
    /// Creates an orchestrator over the shared invoker.
    pub fn new(invoker: Arc<Invoker>, config: SmithConfig, events: EventSink) -> Self {
        Orchestrator {
            invoker,
            config,
            events,
        }
    }

    /// Runs the plan to completion, halt, or blockage.
    ///
    /// The plan must have passed the planner's validation gate; the
    /// orchestrator never mutates it and never dispatches new tools beyond
    /// its nodes.
    pub async fn execute(&self, dag: &Dag, ctx: &InvokeCtx) -> Result<RunReport, RuntimeError> {
        self.config.validate().map_err(RuntimeError::State)?;

        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let mut run = RunState::new(dag);
        let (tx, mut rx) = mpsc::unbounded_channel::<Commit>();
        let mut halted_by: Option<NodeId> = None;

        smith_sched!(
            info,
            run_id = %run_id,
            nodes = dag.len(),
            workers = self.config.max_concurrent_tools,
            "Starting plan execution"
        );

        let status = loop {
            // Dispatch while capacity remains; smallest ready id first.
            while halted_by.is_none()
                && !ctx.cancel.is_cancelled()
                && run.running < self.config.max_concurrent_tools
                && run.has_ready()
            {
                let Some(id) = run.pop_ready() else { break };
                let Some(node) = dag.node(id) else {
                    return Err(RuntimeError::State(format!(
                        "ready queue produced unknown node {id}"
                    )));
                };
                run.mark_running(id);

                let resolved = resolve_inputs(node, &run);
                self.events.emit(EngineEvent::ToolStart {
                    node_id: id,
                    tool: node.tool.clone(),
                });
                smith_sched!(debug, node_id = id, tool = %node.tool, "Dispatching node");

                let invoker = Arc::clone(&self.invoker);
                let node = node.clone();
                let worker_tx = tx.clone();
                let worker_ctx = ctx.clone();
                tokio::spawn(async move {
                    let result = invoker.invoke(&node, resolved, &worker_ctx).await;
                    let _ = worker_tx.send((node.id, result));
                });
            }

            if run.running == 0 {
                if run.all_terminal() {
                    break RunStatus::Completed;
                }
                if halted_by.is_some() || ctx.cancel.is_cancelled() {
                    // Drained after a halt: everything left is skipped.
                    for id in run.non_terminal_ids() {
                        run.commit_skipped(dag, id, "run halted before execution");
                    }
                    break RunStatus::Halted;
                }
                // Nothing running, nothing ready, pending nodes remain.
                let remaining = run.non_terminal_ids().len();
                smith_sched!(
                    error,
                    run_id = %run_id,
                    remaining = remaining,
                    "No runnable work with pending nodes remaining"
                );
                self.events.emit(EngineEvent::Error {
                    message: RuntimeError::Blocked { remaining }.to_string(),
                    details: None,
                });
                break RunStatus::Blocked;
            }

            // Wait for the next worker commit. `tx` lives in this scope, so
            // recv only yields while workers are outstanding.
            let Some((id, result)) = rx.recv().await else {
                return Err(RuntimeError::State("commit channel closed".to_string()));
            };
            run.running -= 1;

            match result {
                Ok(record) => {
                    let status = record.status;
                    let duration_ms = record.duration_ms;
                    run.commit(dag, record);
                    self.events.emit(EngineEvent::ToolComplete {
                        node_id: id,
                        status,
                        duration_ms,
                    });

                    if !status.is_success() {
                        let policy = dag.node(id).map(|n| n.on_fail).unwrap_or_default();
                        if policy == OnFail::Halt && halted_by.is_none() {
                            smith_sched!(
                                warn,
                                run_id = %run_id,
                                node_id = id,
                                "Halt policy triggered; cancelling run"
                            );
                            halted_by = Some(id);
                            ctx.cancel.cancel();
                        }
                    }
                }
                Err(_) => {
                    // The worker was cancelled before its first attempt.
                    run.commit_skipped(dag, id, "cancelled before execution");
                    self.events.emit(EngineEvent::ToolComplete {
                        node_id: id,
                        status: NodeOutcome::Skipped,
                        duration_ms: 0,
                    });
                }
            }
        };

        let final_output = run
            .trace
            .record_for(dag.final_output_node)
            .filter(|r| r.status.is_success())
            .map(|r| r.output.clone());
        let stats = build_stats(&run, start);

        smith_sched!(
            info,
            run_id = %run_id,
            status = ?status,
            executed = stats.executed,
            failed = stats.failed,
            skipped = stats.skipped,
            duration_ms = stats.duration_ms,
            "Plan execution finished"
        );

        Ok(RunReport {
            run_id,
            status,
            trace: run.trace,
            final_output,
            stats,
        })
    }
}

/// Substitutes step references in string inputs with committed upstream
/// outputs. Missing or failed dependencies resolve to null (rendered as
/// the empty string inside prompt text).
fn resolve_inputs(node: &DagNode, run: &RunState) -> HashMap<String, Value> {
    node.inputs
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, run)))
        .collect()
}

fn resolve_value(value: &Value, run: &RunState) -> Value {
    match value {
        Value::String(text) if text.contains("{{") => Value::String(substitute(text, |step| {
            deep_get(&run.output_of(step.node_id), &step.path)
        })),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, run)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, run)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn build_stats(run: &RunState, start: Instant) -> RunStats {
    let mut stats = RunStats {
        duration_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    };
    for record in run.trace.records() {
        match record.status {
            NodeOutcome::Success => stats.executed += 1,
            NodeOutcome::Error | NodeOutcome::Timeout => stats.failed += 1,
            NodeOutcome::Skipped => stats.skipped += 1,
        }
    }
    stats
}
