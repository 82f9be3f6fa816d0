//! Agent tree, recursive delegation, and fleet coordination.

mod fleet;
mod state;
mod sub_agent;

pub use fleet::{FleetCoordinator, FleetReport, PeerResult};
pub use state::{AgentStateManager, AgentStats, AgentTree};
pub use sub_agent::SubAgentTool;
