//! Swarm scheduling: missions, workers in isolated workspaces, dependency-gated
//! tickets, file reservations, signals and the forge merge queue.

pub mod dependencies;
pub mod dispatch;
pub mod domain;
pub mod reservations;
pub mod store;
pub mod types;
pub mod workspace;

pub use store::{CleanupReport, SwarmStore};
pub use types::{Assignment, ForgeStatus, MissionStatus, TicketStatus, WorkerStatus};
pub use workspace::{GitWorktreeManager, WorkspaceError, WorkspaceProvisioner};
