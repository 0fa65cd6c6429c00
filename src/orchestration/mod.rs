//! Workflow phase state machines and the coordinator that persists them.

pub mod coordinator;
pub mod phases;

pub use coordinator::{Coordinator, Task, TaskStatus, WorkflowState};
pub use phases::{allowed_transitions, validate_transition, Complexity, Phase, WorkflowType};
