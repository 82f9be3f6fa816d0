//! Execution records, the trace, and run reports.
//!
//! A record is created when a node leaves `Pending`, written exactly once
//! when the invoker commits its outcome, and read-only afterwards. The
//! trace is the append-only sequence of records in commit order (parallel
//! nodes appear in completion order, not start order).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NodeId, Value};

/// Terminal status of a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Tool returned a value within its deadline.
    Success,
    /// Tool failed after exhausting its retry budget.
    Error,
    /// Node never ran because the run terminated first.
    Skipped,
    /// Whole-node deadline expired.
    Timeout,
}

impl NodeOutcome {
    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success)
    }
}

/// One committed node execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Node identifier.
    pub node_id: NodeId,
    /// Tool name.
    pub tool: String,
    /// Callable handle that was invoked.
    pub function: String,
    /// Inputs after dependency substitution.
    pub inputs_resolved: Value,
    /// Tool output (null unless `Success`).
    pub output: Value,
    /// Terminal status.
    pub status: NodeOutcome,
    /// Number of attempts made (0 for `Skipped`).
    pub attempts: u32,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// Error message (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Creates a `Skipped` record for a node that never ran.
    pub fn skipped(node_id: NodeId, tool: &str, function: &str, reason: &str) -> Self {
        let now = Utc::now();
        ExecutionRecord {
            node_id,
            tool: tool.to_string(),
            function: function.to_string(),
            inputs_resolved: Value::Null,
            output: Value::Null,
            status: NodeOutcome::Skipped,
            attempts: 0,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            error: Some(reason.to_string()),
        }
    }
}

/// Append-only sequence of execution records in commit order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Trace {
    records: Vec<ExecutionRecord>,
}

impl Trace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Trace::default()
    }

    /// Appends a record. Commit order is insertion order.
    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    /// All records, in commit order.
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no record has been committed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record committed for `node_id`, if any.
    pub fn record_for(&self, node_id: NodeId) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.node_id == node_id)
    }

    /// The committed output for `node_id` (null when absent or failed).
    pub fn output_of(&self, node_id: NodeId) -> Value {
        self.record_for(node_id)
            .map(|r| r.output.clone())
            .unwrap_or(Value::Null)
    }

    /// Serializes a compact view of the trace for the synthesis prompt,
    /// truncated at `limit_chars`.
    pub fn compact_json(&self, limit_chars: usize) -> String {
        let compact: Vec<serde_json::Value> = self
            .records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "node_id": r.node_id,
                    "tool": r.tool,
                    "function": r.function,
                    "status": r.status,
                    "duration_ms": r.duration_ms,
                    "result": r.output.to_json(),
                    "error": r.error,
                })
            })
            .collect();

        let mut text = serde_json::to_string(&compact).unwrap_or_default();
        if text.len() > limit_chars {
            let mut end = limit_chars;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
            text.push_str("...[TRUNCATED]");
        }
        text
    }
}

/// Terminal status of a whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node reached a terminal state and no halt fired.
    Completed,
    /// A node with the halt policy failed; remaining nodes were skipped.
    Halted,
    /// No node was runnable but pending nodes remained.
    Blocked,
}

/// Aggregate counters for a completed run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Nodes that terminated `Success`.
    pub executed: usize,
    /// Nodes that terminated `Error` or `Timeout`.
    pub failed: usize,
    /// Nodes that were skipped.
    pub skipped: usize,
    /// Total run duration in milliseconds.
    pub duration_ms: u64,
}

/// Everything the orchestrator produces for one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,
    /// Terminal run status.
    pub status: RunStatus,
    /// The full trace, in commit order.
    pub trace: Trace,
    /// Output of the plan's final node, when it succeeded.
    pub final_output: Option<Value>,
    /// Aggregate counters.
    pub stats: RunStats,
}
