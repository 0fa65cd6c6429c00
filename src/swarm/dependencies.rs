use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use super::{domain::generate_id, types::TicketStatus};
use crate::{
    database::tickets::{NewTicket, Ticket},
    error::{Result, SwarmError},
};

/// A batch entry with its generated id and dependencies resolved to ticket ids.
#[derive(Debug, Clone)]
pub struct PlannedTicket {
    pub id: String,
    pub input: NewTicket,
    pub depends_on: Vec<String>,
}

/// Keeps pending tickets whose dependencies are all done, preserving input order.
/// A dependency on a ticket that does not exist is never satisfied.
pub fn filter_dispatchable(tickets: Vec<Ticket>) -> Vec<Ticket> {
    let done: HashSet<String> = tickets
        .iter()
        .filter(|t| t.status == TicketStatus::Done)
        .map(|t| t.id.clone())
        .collect();

    tickets
        .into_iter()
        .filter(|t| t.status == TicketStatus::Pending)
        .filter(|t| t.dependencies().iter().all(|dep| done.contains(dep)))
        .collect()
}

/// Rejects dependencies that are not tickets of the same mission.
pub fn validate_dependencies(
    ticket: &str,
    depends_on: &[String],
    existing: &HashSet<String>,
) -> Result<()> {
    match depends_on.iter().find(|dep| !existing.contains(*dep)) {
        Some(missing) => Err(SwarmError::UnknownDependency {
            ticket: ticket.to_string(),
            dependency: missing.clone(),
        }),
        None => Ok(()),
    }
}

/// Resolves a batch whose entries may depend on each other by `key` and on existing
/// tickets by id. Returns the entries in an order where every dependency is written
/// before its dependents, or fails on unknown references and cycles.
pub fn plan_batch(entries: Vec<NewTicket>, existing: &HashSet<String>) -> Result<Vec<PlannedTicket>> {
    let labels: Vec<String> = entries
        .iter()
        .map(|e| e.key.clone().unwrap_or_else(|| e.title.clone()))
        .collect();

    let mut key_index: HashMap<&str, usize> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        if let Some(key) = entry.key.as_deref() {
            if key_index.insert(key, idx).is_some() {
                return Err(SwarmError::InvalidInput(format!(
                    "duplicate ticket key '{key}' in batch"
                )));
            }
        }
    }

    let ids: Vec<String> = entries.iter().map(|_| generate_id()).collect();

    // edges[i] holds the batch entries that entry i depends on
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    let mut resolved: Vec<Vec<String>> = vec![Vec::new(); entries.len()];
    for (idx, entry) in entries.iter().enumerate() {
        for dep in &entry.depends_on {
            if let Some(&target) = key_index.get(dep.as_str()) {
                edges[idx].push(target);
                resolved[idx].push(ids[target].clone());
            } else if existing.contains(dep) {
                resolved[idx].push(dep.clone());
            } else {
                return Err(SwarmError::UnknownDependency {
                    ticket: labels[idx].clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let order = topological_order(&edges).map_err(|cycle| SwarmError::DependencyCycle {
        path: cycle.into_iter().map(|i| labels[i].clone()).collect(),
    })?;
    debug!("Planned ticket batch of {} entries", order.len());

    let mut slots: Vec<Option<NewTicket>> = entries.into_iter().map(Some).collect();
    let planned = order
        .into_iter()
        .filter_map(|idx| {
            slots[idx].take().map(|input| PlannedTicket {
                id: ids[idx].clone(),
                input,
                depends_on: std::mem::take(&mut resolved[idx]),
            })
        })
        .collect();

    Ok(planned)
}

/// Kahn's algorithm, dependencies first, ties broken by input position.
/// On failure returns one cycle as a closed path of node indices.
fn topological_order(edges: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = edges.len();
    let mut remaining: Vec<usize> = edges.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, deps) in edges.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: VecDeque<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &dependent in &dependents[node] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(find_cycle(edges))
    }
}

fn find_cycle(edges: &[Vec<usize>]) -> Vec<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Finished,
    }

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::OnStack;
        stack.push(node);
        for &next in &edges[node] {
            match marks[next] {
                Mark::OnStack => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(next, edges, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Finished => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Finished;
        None
    }

    let mut marks = vec![Mark::Unvisited; edges.len()];
    for start in 0..edges.len() {
        if marks[start] == Mark::Unvisited {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(start, edges, &mut marks, &mut stack) {
                return cycle;
            }
        }
    }
    Vec::new()
}
