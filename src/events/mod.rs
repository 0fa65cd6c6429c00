//! Typed change notifications fanned out to connected observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowUpdated,
    WorkflowDeleted,
    MissionStatus,
    WorkerStatus,
    TicketStatus,
    SignalSent,
    ForgeUpdate,
    FilesReserved,
    FilesReleased,
    DispatchCompleted,
    CheckpointSaved,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::WorkflowUpdated => write!(f, "workflow_updated"),
            EventType::WorkflowDeleted => write!(f, "workflow_deleted"),
            EventType::MissionStatus => write!(f, "mission_status"),
            EventType::WorkerStatus => write!(f, "worker_status"),
            EventType::TicketStatus => write!(f, "ticket_status"),
            EventType::SignalSent => write!(f, "signal_sent"),
            EventType::ForgeUpdate => write!(f, "forge_update"),
            EventType::FilesReserved => write!(f, "files_reserved"),
            EventType::FilesReleased => write!(f, "files_released"),
            EventType::DispatchCompleted => write!(f, "dispatch_completed"),
            EventType::CheckpointSaved => write!(f, "checkpoint_saved"),
        }
    }
}

impl EventPayload {
    /// Wrap an updated entity. Serialization failures degrade to a null payload.
    pub fn entity<T: Serialize>(event_type: EventType, entity: &T) -> Self {
        let data = serde_json::to_value(entity).unwrap_or_else(|e| {
            debug!("Failed to serialize {} payload: {}", event_type, e);
            Value::Null
        });
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn deleted(event_type: EventType, id: &str) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data: serde_json::json!({ "id": id, "status": "deleted" }),
        }
    }
}

/// Broadcasts state changes to whatever transport is subscribed
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<EventPayload>>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel::<EventPayload>(CHANNEL_CAPACITY);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn broadcast(&self, event: EventPayload) {
        // No subscribers is the normal state when nothing is connected
        if let Err(e) = self.sender.send(event) {
            debug!("Event broadcast skipped: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventPayload> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_subscribers_receive_entity_events() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        broadcaster.broadcast(EventPayload::entity(
            EventType::TicketStatus,
            &serde_json::json!({ "id": "t1", "status": "assigned" }),
        ));

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("event should arrive")
            .unwrap();
        assert_eq!(event.event_type, EventType::TicketStatus);
        assert_eq!(event.data["status"], "assigned");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast(EventPayload::deleted(EventType::WorkflowDeleted, "wf"));
        assert_eq!(EventType::ForgeUpdate.to_string(), "forge_update");
    }
}
