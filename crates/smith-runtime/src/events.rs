//! Engine event stream.
//!
//! Ordered events emitted while a run progresses, for CLI/API surfaces to
//! render live. Emission is fire-and-forget: a closed or absent receiver
//! never affects execution.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use smith_core::types::{NodeId, NodeOutcome};

/// One event in the engine's ordered stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Planning has started.
    Planning,
    /// A validated plan is ready.
    PlanComplete {
        num_nodes: usize,
        tools: Vec<String>,
    },
    /// A node was dispatched.
    ToolStart { node_id: NodeId, tool: String },
    /// A node committed its terminal status.
    ToolComplete {
        node_id: NodeId,
        status: NodeOutcome,
        duration_ms: u64,
    },
    /// The synthesized answer.
    FinalAnswer { response: String },
    /// Something went wrong; the run may still yield a partial trace.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

/// Cheap, cloneable event emitter.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<EngineEvent>>,
}

impl EventSink {
    /// A sink that forwards events to `tx`.
    pub fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        EventSink { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn none() -> Self {
        EventSink::default()
    }

    /// Emits an event, ignoring a closed receiver.
    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
