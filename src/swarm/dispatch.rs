use std::collections::HashMap;
use tracing::{error, info, warn};

use super::{
    domain::{agent_type_to_domain, generate_id},
    types::{Assignment, HUB_SENDER, SIGNAL_TICKET_ASSIGNED},
};
use crate::{
    database::{
        signals::{NewSignal, Signal},
        tickets::Ticket,
        workers::Worker,
        DbPool,
    },
    error::Result,
};

/// Workers able to take tickets, grouped by the domain their agent type maps to.
/// `all` keeps every eligible worker in listing order for the fallback.
#[derive(Debug, Default)]
struct Candidates {
    by_domain: HashMap<&'static str, Vec<String>>,
    all: Vec<String>,
}

impl Candidates {
    fn from_workers(workers: &[Worker]) -> Self {
        let mut candidates = Candidates::default();
        for worker in workers.iter().filter(|w| w.status.accepts_work()) {
            candidates
                .by_domain
                .entry(agent_type_to_domain(&worker.agent_type))
                .or_default()
                .push(worker.id.clone());
            candidates.all.push(worker.id.clone());
        }
        candidates
    }

    fn for_domain(&self, domain: &str) -> &[String] {
        match self.by_domain.get(domain) {
            Some(list) if !list.is_empty() => list,
            _ => &self.all,
        }
    }
}

/// Pairs dispatchable tickets with workers. Tickets prefer workers of their own
/// domain, fall back to any eligible worker, and are skipped when none exist.
/// Round-robin cursors are per ticket domain and live only for this call.
pub fn plan_assignments(tickets: &[Ticket], workers: &[Worker]) -> Vec<Assignment> {
    let candidates = Candidates::from_workers(workers);
    let mut cursors: HashMap<&str, usize> = HashMap::new();
    let mut assignments = Vec::new();

    for ticket in tickets {
        let pool = candidates.for_domain(&ticket.domain);
        if pool.is_empty() {
            continue;
        }
        let cursor = cursors.entry(ticket.domain.as_str()).or_insert(0);
        let idx = *cursor % pool.len();
        *cursor = idx + 1;

        assignments.push(Assignment {
            ticket_id: ticket.id.clone(),
            worker_id: pool[idx].clone(),
        });
    }
    assignments
}

/// Assigns every currently dispatchable ticket of the mission and notifies each
/// chosen worker with a `TICKET_ASSIGNED` signal. Each assignment and its signal
/// commit together; tickets claimed concurrently by someone else are skipped.
pub async fn dispatch(pool: &DbPool, mission_id: &str) -> Result<Vec<(Assignment, Signal)>> {
    let tickets = Ticket::get_dispatchable(pool, mission_id).await?;
    if tickets.is_empty() {
        return Ok(Vec::new());
    }
    let workers = Worker::list_by_mission(pool, mission_id).await?;
    let titles: HashMap<&str, &str> = tickets
        .iter()
        .map(|t| (t.id.as_str(), t.title.as_str()))
        .collect();

    let mut made = Vec::new();
    for assignment in plan_assignments(&tickets, &workers) {
        let mut tx = pool.begin().await.inspect_err(|e| {
            error!(
                "Failed to begin transaction for dispatching ticket {}: {}",
                assignment.ticket_id, e
            )
        })?;

        if !Ticket::assign_if_pending(&mut *tx, &assignment.ticket_id, &assignment.worker_id)
            .await?
        {
            warn!(
                "Ticket {} was no longer pending, skipping assignment",
                assignment.ticket_id
            );
            continue;
        }

        let payload = serde_json::json!({
            "ticket_id": assignment.ticket_id,
            "title": titles.get(assignment.ticket_id.as_str()).copied().unwrap_or_default(),
        })
        .to_string();
        let signal = Signal::insert(
            &mut *tx,
            &generate_id(),
            &NewSignal {
                mission_id,
                from_worker: HUB_SENDER,
                to_worker: &assignment.worker_id,
                signal_type: SIGNAL_TICKET_ASSIGNED,
                payload: &payload,
            },
        )
        .await?;

        tx.commit().await.inspect_err(|e| {
            error!(
                "Failed to commit assignment of ticket {}: {}",
                assignment.ticket_id, e
            )
        })?;

        info!(
            "Assigned ticket {} to worker {}",
            assignment.ticket_id, assignment.worker_id
        );
        made.push((assignment, signal));
    }

    Ok(made)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::types::{TicketStatus, WorkerStatus};

    fn ticket(id: &str, domain: &str) -> Ticket {
        Ticket {
            id: id.to_string(),
            mission_id: "m".to_string(),
            title: id.to_string(),
            description: String::new(),
            domain: domain.to_string(),
            priority: 100,
            status: TicketStatus::Pending,
            worker_id: None,
            depends_on: "[]".to_string(),
            result: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn worker(id: &str, agent_type: &str, status: WorkerStatus) -> Worker {
        Worker {
            id: id.to_string(),
            mission_id: "m".to_string(),
            agent_type: agent_type.to_string(),
            worktree_path: String::new(),
            branch_name: String::new(),
            status,
            session_id: None,
            last_heartbeat: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn pairs(assignments: Vec<Assignment>) -> Vec<(String, String)> {
        assignments
            .into_iter()
            .map(|a| (a.ticket_id, a.worker_id))
            .collect()
    }

    #[test]
    fn test_domain_match_round_robins() {
        let tickets = vec![
            ticket("t1", "backend"),
            ticket("t2", "backend"),
            ticket("t3", "backend"),
        ];
        let workers = vec![
            worker("b1", "backend-engineer", WorkerStatus::Active),
            worker("b2", "backend-engineer", WorkerStatus::Pending),
            worker("f1", "frontend-engineer", WorkerStatus::Active),
        ];

        assert_eq!(
            pairs(plan_assignments(&tickets, &workers)),
            vec![
                ("t1".into(), "b1".into()),
                ("t2".into(), "b2".into()),
                ("t3".into(), "b1".into()),
            ]
        );
    }

    #[test]
    fn test_unmatched_domain_falls_back_to_all_workers() {
        let tickets = vec![ticket("t1", "docs"), ticket("t2", "docs")];
        let workers = vec![
            worker("b1", "backend-engineer", WorkerStatus::Active),
            worker("g1", "delivery-implementation-expert", WorkerStatus::Active),
        ];

        assert_eq!(
            pairs(plan_assignments(&tickets, &workers)),
            vec![("t1".into(), "b1".into()), ("t2".into(), "g1".into())]
        );
    }

    #[test]
    fn test_ineligible_workers_are_never_chosen() {
        let tickets = vec![ticket("t1", "backend")];
        let workers = vec![
            worker("b1", "backend-engineer", WorkerStatus::Failed),
            worker("b2", "backend-engineer", WorkerStatus::Killed),
            worker("b3", "backend-engineer", WorkerStatus::Stale),
            worker("b4", "backend-engineer", WorkerStatus::Done),
        ];
        assert!(plan_assignments(&tickets, &workers).is_empty());
    }

    #[test]
    fn test_no_workers_skips_every_ticket() {
        assert!(plan_assignments(&[ticket("t1", "general")], &[]).is_empty());
    }
}
