use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::SwarmError;

/// Recipient marker for signals delivered to every worker in a mission.
pub const BROADCAST: &str = "*";

/// Sender id used for signals emitted by the coordinator itself.
pub const HUB_SENDER: &str = "hub";

// Signal types for inter-agent communication
pub const SIGNAL_TICKET_ASSIGNED: &str = "TICKET_ASSIGNED";
pub const SIGNAL_TICKET_STARTED: &str = "TICKET_STARTED";
pub const SIGNAL_TICKET_DONE: &str = "TICKET_DONE";
pub const SIGNAL_TICKET_FAILED: &str = "TICKET_FAILED";
pub const SIGNAL_MERGE_READY: &str = "MERGE_READY";
pub const SIGNAL_MERGED: &str = "MERGED";
pub const SIGNAL_CONFLICT: &str = "CONFLICT";
pub const SIGNAL_HELP: &str = "HELP";
pub const SIGNAL_ABORT: &str = "ABORT";
pub const SIGNAL_MISSION_DONE: &str = "MISSION_DONE";

/// Mission lifecycle: planning → active → merging → verifying → complete | failed | aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MissionStatus {
    Planning,
    Active,
    Merging,
    Verifying,
    Complete,
    Failed,
    Aborted,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Planning => "planning",
            MissionStatus::Active => "active",
            MissionStatus::Merging => "merging",
            MissionStatus::Verifying => "verifying",
            MissionStatus::Complete => "complete",
            MissionStatus::Failed => "failed",
            MissionStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Complete | MissionStatus::Failed | MissionStatus::Aborted
        )
    }
}

impl FromStr for MissionStatus {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(MissionStatus::Planning),
            "active" => Ok(MissionStatus::Active),
            "merging" => Ok(MissionStatus::Merging),
            "verifying" => Ok(MissionStatus::Verifying),
            "complete" => Ok(MissionStatus::Complete),
            "failed" => Ok(MissionStatus::Failed),
            "aborted" => Ok(MissionStatus::Aborted),
            _ => Err(SwarmError::InvalidStatus {
                kind: "mission",
                value: s.to_string(),
            }),
        }
    }
}

/// Worker lifecycle: pending → active → stale → done | failed | killed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Active,
    Stale,
    Done,
    Failed,
    Killed,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Active => "active",
            WorkerStatus::Stale => "stale",
            WorkerStatus::Done => "done",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Killed => "killed",
        }
    }

    /// Terminal workers can never be resurrected by heartbeats or status writes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Done | WorkerStatus::Failed | WorkerStatus::Killed
        )
    }

    /// Whether the dispatcher may hand this worker new tickets.
    pub fn accepts_work(&self) -> bool {
        matches!(self, WorkerStatus::Pending | WorkerStatus::Active)
    }
}

impl FromStr for WorkerStatus {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkerStatus::Pending),
            "active" => Ok(WorkerStatus::Active),
            "stale" => Ok(WorkerStatus::Stale),
            "done" => Ok(WorkerStatus::Done),
            "failed" => Ok(WorkerStatus::Failed),
            "killed" => Ok(WorkerStatus::Killed),
            _ => Err(SwarmError::InvalidStatus {
                kind: "worker",
                value: s.to_string(),
            }),
        }
    }
}

/// Ticket lifecycle: pending → assigned → in_progress → done | failed | blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Assigned,
    InProgress,
    Done,
    Failed,
    Blocked,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Assigned => "assigned",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Done => "done",
            TicketStatus::Failed => "failed",
            TicketStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "assigned" => Ok(TicketStatus::Assigned),
            "in_progress" => Ok(TicketStatus::InProgress),
            "done" => Ok(TicketStatus::Done),
            "failed" => Ok(TicketStatus::Failed),
            "blocked" => Ok(TicketStatus::Blocked),
            _ => Err(SwarmError::InvalidStatus {
                kind: "ticket",
                value: s.to_string(),
            }),
        }
    }
}

/// Forge entry lifecycle: pending → merging → merged | conflict | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ForgeStatus {
    Pending,
    Merging,
    Merged,
    Conflict,
    Failed,
}

impl ForgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForgeStatus::Pending => "pending",
            ForgeStatus::Merging => "merging",
            ForgeStatus::Merged => "merged",
            ForgeStatus::Conflict => "conflict",
            ForgeStatus::Failed => "failed",
        }
    }
}

impl FromStr for ForgeStatus {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ForgeStatus::Pending),
            "merging" => Ok(ForgeStatus::Merging),
            "merged" => Ok(ForgeStatus::Merged),
            "conflict" => Ok(ForgeStatus::Conflict),
            "failed" => Ok(ForgeStatus::Failed),
            _ => Err(SwarmError::InvalidStatus {
                kind: "forge",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ForgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ticket-to-worker dispatch result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub ticket_id: String,
    pub worker_id: String,
}
