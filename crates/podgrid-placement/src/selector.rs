//! The four-phase virtual pod selector.
//!
//! Fills a job's required groups from bucketed super-pod capacity,
//! preferring allocations that strand the fewest fragments cluster-wide
//! (a fragment is a super-pod left with fewer free nodes than one
//! sp-block). Phases run in order until demand reaches zero:
//!
//! 1. smaller-first, reserve-respecting
//! 2. bigger-first, reserve-respecting
//! 3. reserve-tolerant
//! 4. soft-strategy fallback (soft affinity only)
//!
//! Each phase is a pure pass over `(remaining, buckets)`; all carve
//! through the shared free pool, so a super-pod drained by one phase
//! has nothing left for the next.

use tracing::{debug, info};

use podgrid_state::{AffinityMode, FreePool, Placement, SuperNode, SuperPodId};
use podgrid_topology::{CapacityBuckets, ClassifiedCapacity};

use crate::error::{PlacementError, PlacementResult};
use crate::recorder::VirtualPodIdRecorder;

/// Knobs shared by both selectors.
#[derive(Debug, Clone, Copy)]
pub struct SelectorParams {
    /// Nodes per virtual pod group.
    pub sp_block: u32,
    /// Nodes each super-pod should keep for fault recovery.
    pub reserve_pod_size: u32,
    pub affinity: AffinityMode,
}

/// Take the first `n` free nodes of a super-pod as placement records.
///
/// Pool lists are name-sorted, so which nodes fill which local rank is
/// deterministic for a given snapshot.
pub(crate) fn carve_nodes(pool: &mut FreePool, pod: SuperPodId, n: usize) -> Vec<SuperNode> {
    let Some(nodes) = pool.get_mut(&pod) else {
        return Vec::new();
    };
    let take = n.min(nodes.len());
    nodes.drain(..take).map(|n| n.as_super_node()).collect()
}

fn free_count(pool: &FreePool, pod: SuperPodId) -> u32 {
    pool.get(&pod).map(|v| v.len() as u32).unwrap_or(0)
}

/// Whether one more block can be carved while honoring the reserve:
/// the pod must be left with the reserve spare, or with at least one
/// more full block to give.
fn can_carve_reserving(free: u32, sp_block: u32, reserve: u32) -> bool {
    if free < sp_block {
        return false;
    }
    let left = free - sp_block;
    left >= reserve || left >= sp_block
}

fn carve_group(
    pool: &mut FreePool,
    pod: SuperPodId,
    sp_block: u32,
    recorder: &mut VirtualPodIdRecorder,
    placement: &mut Placement,
) {
    let group = carve_nodes(pool, pod, sp_block as usize);
    let id = recorder.next_id();
    debug!(super_pod = pod, group = %id, members = group.len(), "group carved");
    placement.groups.insert(id, group);
}

/// Phase 1 — smaller-first, reserve-respecting: scan remainder rows
/// ascending, columns from 1 up to the remaining demand.
fn phase_smaller_first(
    mut remaining: u32,
    buckets: &CapacityBuckets,
    pool: &mut FreePool,
    params: &SelectorParams,
    recorder: &mut VirtualPodIdRecorder,
    placement: &mut Placement,
) -> u32 {
    for remainder in 0..buckets.rows() {
        for column in 1..=buckets.max_column() {
            if remaining == 0 || column > remaining {
                break;
            }
            for &pod in buckets.cell(remainder, column) {
                while remaining > 0
                    && can_carve_reserving(
                        free_count(pool, pod),
                        params.sp_block,
                        params.reserve_pod_size,
                    )
                {
                    carve_group(pool, pod, params.sp_block, recorder, placement);
                    remaining -= 1;
                }
            }
        }
    }
    remaining
}

/// Phase 2 — bigger-first, reserve-respecting: scan columns descending
/// from the top while they exceed the remaining demand, all remainder
/// rows.
fn phase_bigger_first(
    mut remaining: u32,
    buckets: &CapacityBuckets,
    pool: &mut FreePool,
    params: &SelectorParams,
    recorder: &mut VirtualPodIdRecorder,
    placement: &mut Placement,
) -> u32 {
    let mut column = buckets.max_column();
    while remaining > 0 && column > remaining {
        for remainder in 0..buckets.rows() {
            for &pod in buckets.cell(remainder, column) {
                while remaining > 0
                    && can_carve_reserving(
                        free_count(pool, pod),
                        params.sp_block,
                        params.reserve_pod_size,
                    )
                {
                    carve_group(pool, pod, params.sp_block, recorder, placement);
                    remaining -= 1;
                }
            }
        }
        if column == 0 {
            break;
        }
        column -= 1;
    }
    remaining
}

/// Phase 3 — reserve-tolerant: scan remainder rows descending, every
/// column, carving straight into the reserve.
fn phase_reserve_tolerant(
    mut remaining: u32,
    buckets: &CapacityBuckets,
    pool: &mut FreePool,
    params: &SelectorParams,
    recorder: &mut VirtualPodIdRecorder,
    placement: &mut Placement,
) -> u32 {
    for remainder in (0..buckets.rows()).rev() {
        for column in 0..=buckets.max_column() {
            for &pod in buckets.cell(remainder, column) {
                while remaining > 0 && free_count(pool, pod) >= params.sp_block {
                    carve_group(pool, pod, params.sp_block, recorder, placement);
                    remaining -= 1;
                }
            }
        }
    }
    remaining
}

/// Phase 4 — soft-strategy fallback: super-pods too small to supply a
/// whole block become eligible donors, largest first. A group still
/// comes from a single super-pod; an undersized carve flags the whole
/// placement degraded.
fn phase_soft_fallback(
    mut remaining: u32,
    pool: &mut FreePool,
    params: &SelectorParams,
    recorder: &mut VirtualPodIdRecorder,
    placement: &mut Placement,
) -> u32 {
    let mut donors: Vec<(SuperPodId, u32)> = pool
        .iter()
        .filter(|(_, nodes)| !nodes.is_empty())
        .map(|(&id, nodes)| (id, nodes.len() as u32))
        .collect();
    donors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    for (pod, _) in donors {
        while remaining > 0 && free_count(pool, pod) > 0 {
            let take = free_count(pool, pod).min(params.sp_block);
            if take < params.sp_block {
                info!(
                    super_pod = pod,
                    members = take,
                    want = params.sp_block,
                    "soft fallback carved an undersized group"
                );
                placement.degraded = true;
            }
            let group = carve_nodes(pool, pod, take as usize);
            placement.groups.insert(recorder.next_id(), group);
            remaining -= 1;
        }
        if remaining == 0 {
            break;
        }
    }
    remaining
}

/// Fill `required_groups` virtual pods from classified capacity.
///
/// Hard-affinity jobs fail with a capacity error when demand survives
/// every phase; soft-affinity jobs get back whatever could be placed,
/// flagged degraded.
pub fn select(
    required_groups: u32,
    classified: &ClassifiedCapacity,
    pool: &mut FreePool,
    recorder: &mut VirtualPodIdRecorder,
    params: &SelectorParams,
) -> PlacementResult<Placement> {
    let mut placement = Placement::default();
    let buckets = &classified.buckets;

    let mut remaining = phase_smaller_first(
        required_groups,
        buckets,
        pool,
        params,
        recorder,
        &mut placement,
    );
    remaining = phase_bigger_first(remaining, buckets, pool, params, recorder, &mut placement);
    remaining = phase_reserve_tolerant(remaining, buckets, pool, params, recorder, &mut placement);
    if remaining > 0 && params.affinity == AffinityMode::Soft {
        remaining = phase_soft_fallback(remaining, pool, params, recorder, &mut placement);
    }

    if remaining > 0 {
        if params.affinity == AffinityMode::Hard {
            return Err(PlacementError::Capacity {
                required: required_groups,
                available: classified.count_v_super_pod,
            });
        }
        info!(
            required = required_groups,
            unmet = remaining,
            "soft placement degraded: demand not fully met"
        );
        placement.degraded = true;
    }

    Ok(placement)
}
