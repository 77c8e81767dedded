//! Fault-aware reuse resolver.
//!
//! Given a job under active rescheduling, reuses its previous placement
//! where safe, partially repairs it where not, and hands the remaining
//! unmet virtual pods back to the selector with their ids preserved.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use podgrid_placement::{PlacementError, PlacementResult};
use podgrid_state::{
    FaultJob, FreePool, NodeFacts, RescheduleScope, SuperNode, SuperPodId, VirtualPodId,
};

/// How long a fault job waits for its previous nodes to reappear among
/// offered candidates before placement proceeds without them.
pub const RELEASE_WAIT_WINDOW: Duration = Duration::from_secs(10);

/// What reuse resolved and what is left for the selector.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    /// Groups kept or repaired, already removed from the free pool.
    pub reused: BTreeMap<VirtualPodId, Vec<SuperNode>>,
    /// Group ids that could not be resolved; the selector refills them.
    pub unready: Vec<VirtualPodId>,
}

fn free_count(pool: &FreePool, pod: SuperPodId) -> u32 {
    pool.get(&pod).map(|v| v.len() as u32).unwrap_or(0)
}

fn pool_has(pool: &FreePool, pod: SuperPodId, name: &str) -> bool {
    pool.get(&pod)
        .is_some_and(|nodes| nodes.iter().any(|n| n.name == name))
}

fn remove_named(pool: &mut FreePool, pod: SuperPodId, name: &str) -> Option<NodeFacts> {
    let nodes = pool.get_mut(&pod)?;
    let idx = nodes.iter().position(|n| n.name == name)?;
    Some(nodes.remove(idx))
}

/// Resolve a fault job's previous placement against the current pool.
///
/// On success the reused groups' nodes are gone from `pool`; on error
/// the pool is untouched.
pub fn resolve(
    fault: &FaultJob,
    scope: RescheduleScope,
    sp_block: u32,
    pool: &mut FreePool,
    now: Instant,
) -> PlacementResult<ResolveOutcome> {
    throttle(fault, pool, now)?;
    check_feasibility(fault, pool)?;

    let mut outcome = ResolveOutcome::default();

    // Intact groups first, so repairs never steal a healthy member of
    // a group that could have been kept whole.
    let mut pending: Vec<(&VirtualPodId, &Vec<SuperNode>)> = Vec::new();
    for (id, group) in &fault.previous.groups {
        let intact = group.iter().all(|m| {
            !fault.node_is_faulted(&m.name) && pool_has(pool, m.super_pod_id, &m.name)
        });
        if intact {
            for m in group {
                remove_named(pool, m.super_pod_id, &m.name);
            }
            debug!(job = %fault.job_id, group = %id, "previous group intact, reused");
            outcome.reused.insert(id.clone(), group.clone());
        } else {
            pending.push((id, group));
        }
    }

    for (id, group) in pending {
        let repaired = match scope {
            RescheduleScope::Job => repair_job_level(fault, group, sp_block, pool),
            RescheduleScope::Pod | RescheduleScope::Process => {
                repair_pod_level(fault, group, pool)
            }
        };
        match repaired {
            Some(new_group) => {
                info!(
                    job = %fault.job_id,
                    group = %id,
                    ?scope,
                    "previous group repaired"
                );
                outcome.reused.insert(id.clone(), new_group);
            }
            None => {
                debug!(job = %fault.job_id, group = %id, "group not repairable, left for selector");
                outcome.unready.push(id.clone());
            }
        }
    }

    Ok(outcome)
}

/// Inside the wait window, a previously-used healthy node that has not
/// yet been released blocks the attempt; past the window, placement
/// proceeds without it.
fn throttle(fault: &FaultJob, pool: &FreePool, now: Instant) -> PlacementResult<()> {
    if now.saturating_duration_since(fault.reschedule_started) >= RELEASE_WAIT_WINDOW {
        return Ok(());
    }
    for (id, group) in &fault.previous.groups {
        for member in group {
            if !fault.node_is_faulted(&member.name)
                && !pool_has(pool, member.super_pod_id, &member.name)
            {
                debug!(
                    job = %fault.job_id,
                    group = %id,
                    node = %member.name,
                    "healthy previous node not yet released"
                );
                return Err(PlacementError::WaitForRelease {
                    job_id: fault.job_id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Per super-pod, the replacements the faulted members require must fit
/// in that pod's free capacity, checked before any state is mutated.
fn check_feasibility(fault: &FaultJob, pool: &FreePool) -> PlacementResult<()> {
    let mut needed: BTreeMap<SuperPodId, u32> = BTreeMap::new();
    for group in fault.previous.groups.values() {
        for member in group {
            if fault.node_is_faulted(&member.name) {
                *needed.entry(member.super_pod_id).or_default() += 1;
            }
        }
    }

    for (&pod, &n) in &needed {
        let free = free_count(pool, pod);
        if free < n {
            warn!(
                job = %fault.job_id,
                super_pod = pod,
                needed = n,
                free,
                "fault replacements exceed free capacity"
            );
            return Err(PlacementError::ReschedulingInfeasible {
                job_id: fault.job_id.clone(),
                super_pod_id: pod,
                needed: n,
                free,
            });
        }
    }
    Ok(())
}

/// Preference rank for a replacement candidate under job-level repair.
fn candidate_rank(fault: &FaultJob, group: &[SuperNode], node: &NodeFacts) -> u32 {
    let in_group = group.iter().any(|m| m.name == node.name);
    if in_group && !fault.node_is_faulted(&node.name) {
        return 0; // healthy last round, same group
    }
    if !fault.previously_used(&node.name) {
        return 1; // fresh node
    }
    if fault.node_is_faulted(&node.name) {
        return 2; // previously faulty, last resort before stealing
    }
    3 // healthy member of another unresolved group
}

/// Rebuild the whole group from its super-pod's free nodes.
fn repair_job_level(
    fault: &FaultJob,
    group: &[SuperNode],
    sp_block: u32,
    pool: &mut FreePool,
) -> Option<Vec<SuperNode>> {
    let pod = group.first()?.super_pod_id;
    if free_count(pool, pod) < sp_block {
        return None;
    }

    let mut candidates: Vec<(u32, String)> = pool
        .get(&pod)?
        .iter()
        .map(|n| (candidate_rank(fault, group, n), n.name.clone()))
        .collect();
    candidates.sort();

    let chosen: Vec<String> = candidates
        .into_iter()
        .take(sp_block as usize)
        .map(|(_, name)| name)
        .collect();

    let mut new_group = Vec::with_capacity(chosen.len());
    for name in &chosen {
        let node = remove_named(pool, pod, name)?;
        new_group.push(node.as_super_node());
    }
    Some(new_group)
}

/// Replace only the members hosting currently-faulted tasks, keeping
/// everything else in place.
fn repair_pod_level(
    fault: &FaultJob,
    group: &[SuperNode],
    pool: &mut FreePool,
) -> Option<Vec<SuperNode>> {
    let pod = group.first()?.super_pod_id;

    // Plan the whole repair before touching the pool.
    let mut keep: Vec<String> = Vec::new();
    let mut replace_count = 0usize;
    for member in group {
        if fault.node_is_faulted(&member.name) {
            replace_count += 1;
        } else {
            if !pool_has(pool, pod, &member.name) {
                return None;
            }
            keep.push(member.name.clone());
        }
    }

    let mut replacements: Vec<(u32, String)> = pool
        .get(&pod)?
        .iter()
        .filter(|n| !group.iter().any(|m| m.name == n.name))
        .map(|n| {
            let rank = if !fault.previously_used(&n.name) {
                0
            } else if fault.node_is_faulted(&n.name) {
                1
            } else {
                2
            };
            (rank, n.name.clone())
        })
        .collect();
    replacements.sort();
    if replacements.len() < replace_count {
        return None;
    }

    let mut new_group = Vec::with_capacity(group.len());
    let mut spare = replacements.into_iter().map(|(_, name)| name);
    for member in group {
        let name = if fault.node_is_faulted(&member.name) {
            spare.next()?
        } else {
            member.name.clone()
        };
        let node = remove_named(pool, pod, &name)?;
        new_group.push(node.as_super_node());
    }
    Some(new_group)
}
