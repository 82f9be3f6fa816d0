//! Deterministic execution runtime for tool-based workflows.
//!
//! A validated plan goes in; a trace and a final answer come out. The
//! runtime never re-consults a language model for control decisions: the
//! [`Orchestrator`] executes nodes in dependency order under per-node
//! timeouts, retries, and failure policies, with the [`RateLimiter`] and
//! [`ResourceLockManager`] serializing access to shared external state.
//! Higher-level coordination (sub-agents, fleets) builds on the same
//! engine.

pub mod agents;
pub mod approval;
pub mod cancel;
pub mod engine;
pub mod events;
pub mod invoker;
pub mod locks;
pub mod orchestrator;
pub mod rate_limit;

pub use agents::{AgentStateManager, FleetCoordinator, FleetReport, SubAgentTool};
pub use approval::{ApprovalHandler, AutoApprove, DenyAll};
pub use cancel::CancelToken;
pub use engine::{Engine, EngineOutcome};
pub use events::{EngineEvent, EventSink};
pub use invoker::{InvokeCtx, Invoker, SUB_AGENT_TOOL};
pub use locks::{ResourceClaim, ResourceLockManager};
pub use orchestrator::Orchestrator;
pub use rate_limit::RateLimiter;
