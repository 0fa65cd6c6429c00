//! Coordination core for multi-agent software delivery: workflow phase tracking
//! plus a swarm scheduler for workers operating in isolated git worktrees.

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod orchestration;
pub mod swarm;
pub mod telemetry;

pub use config::Config;
pub use error::{Result, SwarmError};
pub use events::{EventBroadcaster, EventPayload, EventType};
pub use orchestration::{Complexity, Coordinator, Phase, WorkflowState, WorkflowType};
pub use swarm::{GitWorktreeManager, SwarmStore, WorkspaceProvisioner};
