use crate::swarm::workspace::WorkspaceError;

#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid transition {from} -> {to} for workflow type {workflow_type}")]
    InvalidTransition {
        workflow_type: String,
        from: String,
        to: String,
    },

    #[error("Unknown phase '{phase}' for workflow type {workflow_type}")]
    UnknownPhase { workflow_type: String, phase: String },

    #[error("Task index {index} out of range (total: {total})")]
    InvalidTaskIndex { index: usize, total: usize },

    #[error("Worker {id} is in terminal state: {status}")]
    TerminalWorker { id: String, status: String },

    #[error("Invalid {kind} status '{value}'")]
    InvalidStatus { kind: &'static str, value: String },

    #[error("Workflow {0} is aborted")]
    WorkflowAborted(String),

    #[error("Unknown dependency '{dependency}' for ticket '{ticket}'")]
    UnknownDependency { ticket: String, dependency: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SwarmError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        SwarmError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for unknown-id failures, which transports map to a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SwarmError::NotFound { .. })
    }

    /// True for requests rejected before any write took place.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            SwarmError::InvalidTransition { .. }
                | SwarmError::UnknownPhase { .. }
                | SwarmError::InvalidTaskIndex { .. }
                | SwarmError::TerminalWorker { .. }
                | SwarmError::InvalidStatus { .. }
                | SwarmError::WorkflowAborted(_)
                | SwarmError::UnknownDependency { .. }
                | SwarmError::DependencyCycle { .. }
                | SwarmError::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = SwarmError::not_found("mission", "m-1");
        assert!(err.is_not_found());
        assert!(!err.is_invalid_state());
        assert_eq!(err.to_string(), "Not found: mission with id m-1");

        let err = SwarmError::TerminalWorker {
            id: "w".to_string(),
            status: "failed".to_string(),
        };
        assert!(err.is_invalid_state());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = SwarmError::DependencyCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }
}
