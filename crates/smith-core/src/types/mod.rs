//! Shared data model for the Smith runtime.

mod agent;
mod dag;
mod number;
mod record;
mod value;

pub use agent::{AgentInfo, AgentStatus};
pub use dag::{Dag, DagNode, NodeId, NodeMetadata, OnFail};
pub use number::Number;
pub use record::{ExecutionRecord, NodeOutcome, RunReport, RunStats, RunStatus, Trace};
pub use value::Value;
