//! Heap-based bin-affinity selector.
//!
//! Used for jobs that favor co-location over fragmentation control,
//! such as chained inference replicas. Super-pods become bins ordered
//! by a three-level comparator; groups are carved from the best bin
//! until demand is met.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use podgrid_state::{FitPolicy, FreePool, JobSpec, NodeFacts, Placement, SuperPodId};

use crate::error::{PlacementError, PlacementResult};
use crate::recorder::VirtualPodIdRecorder;
use crate::selector::{SelectorParams, carve_nodes};

/// One candidate bin in the queue.
#[derive(Debug, Clone)]
struct BinEntry {
    pod_id: SuperPodId,
    /// Free nodes remaining in this bin.
    free: u32,
    /// Count of free nodes hosting tasks that share the requesting
    /// job's affinity group.
    affinity: u32,
    /// Whether the bin can still supply a full block after keeping the
    /// reserve spare.
    holds_reserve: bool,
    fit_policy: FitPolicy,
}

impl BinEntry {
    fn refresh(&mut self, sp_block: u32, reserve: u32) {
        self.holds_reserve = self.free >= sp_block + reserve;
    }
}

impl Ord for BinEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.holds_reserve
            .cmp(&other.holds_reserve)
            .then_with(|| self.affinity.cmp(&other.affinity))
            .then_with(|| match self.fit_policy {
                FitPolicy::Idlest => self.free.cmp(&other.free),
                FitPolicy::Busiest => other.free.cmp(&self.free),
            })
            // Lower pod id wins remaining ties, for determinism.
            .then_with(|| other.pod_id.cmp(&self.pod_id))
    }
}

impl PartialOrd for BinEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for BinEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BinEntry {}

/// Free nodes in a bin that already host tasks of other jobs sharing
/// the requesting job's affinity group.
fn affinity_score(nodes: &[NodeFacts], job: &JobSpec) -> u32 {
    let Some(group) = &job.affinity_group else {
        return 0;
    };
    nodes
        .iter()
        .filter(|n| {
            n.tasks
                .iter()
                .any(|t| t.job_id != job.job_id && t.affinity_group.as_deref() == Some(group))
        })
        .count() as u32
}

/// Fill `required_groups` virtual pods by popping the best bin,
/// carving one block, and pushing the bin back while it can still
/// supply another.
///
/// Bins below one sp-block are discarded up front; if the surviving
/// bins cannot meet demand the attempt fails before any carve.
pub fn select_with_affinity(
    required_groups: u32,
    pool: &mut FreePool,
    job: &JobSpec,
    params: &SelectorParams,
    recorder: &mut VirtualPodIdRecorder,
) -> PlacementResult<Placement> {
    let mut heap = BinaryHeap::new();
    let mut total_vpods = 0u32;

    for (&pod_id, nodes) in pool.iter() {
        let free = nodes.len() as u32;
        if free < params.sp_block {
            debug!(super_pod = pod_id, free, "bin below one sp-block, discarded");
            continue;
        }
        total_vpods += free / params.sp_block;
        let mut bin = BinEntry {
            pod_id,
            free,
            affinity: affinity_score(nodes, job),
            holds_reserve: false,
            fit_policy: job.fit_policy,
        };
        bin.refresh(params.sp_block, params.reserve_pod_size);
        heap.push(bin);
    }

    if total_vpods < required_groups {
        return Err(PlacementError::Capacity {
            required: required_groups,
            available: total_vpods,
        });
    }

    let mut placement = Placement::default();
    let mut remaining = required_groups;

    while remaining > 0 {
        let Some(mut bin) = heap.pop() else {
            return Err(PlacementError::Capacity {
                required: required_groups,
                available: required_groups - remaining,
            });
        };

        let group = carve_nodes(pool, bin.pod_id, params.sp_block as usize);
        let id = recorder.next_id();
        debug!(
            super_pod = bin.pod_id,
            group = %id,
            affinity = bin.affinity,
            "group carved from bin"
        );
        placement.groups.insert(id, group);
        remaining -= 1;

        bin.free -= params.sp_block;
        if bin.free >= params.sp_block {
            // The bin will host more of this job's tasks: co-locating
            // with them counts toward its affinity credit.
            if job.affinity_group.is_some() {
                bin.affinity += params.sp_block;
            }
            bin.refresh(params.sp_block, params.reserve_pod_size);
            heap.push(bin);
        }
    }

    Ok(placement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use podgrid_state::{AffinityMode, SelectorKind, TaskOccupancy};

    fn node(name: &str, pod: SuperPodId) -> NodeFacts {
        NodeFacts::new(name, pod)
    }

    fn node_with_peer(name: &str, pod: SuperPodId, peer_job: &str, group: &str) -> NodeFacts {
        let mut n = NodeFacts::new(name, pod);
        n.tasks.push(TaskOccupancy {
            job_id: peer_job.into(),
            affinity_group: Some(group.into()),
        });
        n
    }

    fn pool_of(nodes: Vec<NodeFacts>) -> FreePool {
        let mut pool = FreePool::new();
        for n in nodes {
            pool.entry(n.super_pod_id).or_default().push(n);
        }
        for nodes in pool.values_mut() {
            nodes.sort_by(|a, b| a.name.cmp(&b.name));
        }
        pool
    }

    fn serving_job(fit_policy: FitPolicy, group: Option<&str>) -> JobSpec {
        JobSpec {
            job_id: "serve-1".into(),
            npu_task_num: 2,
            req_npu_num: 16,
            sp_block_npu_num: 16,
            scheduling_task_num: 2,
            affinity: AffinityMode::Hard,
            fit_policy,
            reschedule_scope: Default::default(),
            selector: SelectorKind::AffinityQueue,
            affinity_group: group.map(String::from),
        }
    }

    fn params(sp_block: u32, reserve: u32) -> SelectorParams {
        SelectorParams {
            sp_block,
            reserve_pod_size: reserve,
            affinity: AffinityMode::Hard,
        }
    }

    #[test]
    fn affinity_peers_attract_placement() {
        // Pod 1 hosts a peer of the same affinity group; pod 0 is
        // otherwise identical.
        let mut pool = pool_of(vec![
            node("a0", 0),
            node("a1", 0),
            node("b0", 1),
            node_with_peer("b1", 1, "serve-0", "chain-a"),
        ]);
        let job = serving_job(FitPolicy::Idlest, Some("chain-a"));
        let mut recorder = VirtualPodIdRecorder::new();

        let placement =
            select_with_affinity(1, &mut pool, &job, &params(2, 0), &mut recorder).unwrap();

        assert_eq!(placement.super_pod_ids(), vec![1]);
    }

    #[test]
    fn own_tasks_do_not_count_as_affinity_peers() {
        let mut pool = pool_of(vec![
            node("a0", 0),
            node("a1", 0),
            node("b0", 1),
            node_with_peer("b1", 1, "serve-1", "chain-a"),
        ]);
        let job = serving_job(FitPolicy::Busiest, Some("chain-a"));
        let mut recorder = VirtualPodIdRecorder::new();

        let placement =
            select_with_affinity(1, &mut pool, &job, &params(2, 0), &mut recorder).unwrap();

        // No peer advantage: busiest policy ties break on pod id.
        assert_eq!(placement.super_pod_ids(), vec![0]);
    }

    #[test]
    fn reserve_holding_bins_sort_first() {
        // Pod 0 has 2 free (cannot keep the reserve after a carve);
        // pod 1 has 4 free and can.
        let mut pool = pool_of(vec![
            node("a0", 0),
            node("a1", 0),
            node("b0", 1),
            node("b1", 1),
            node("b2", 1),
            node("b3", 1),
        ]);
        let job = serving_job(FitPolicy::Busiest, None);
        let mut recorder = VirtualPodIdRecorder::new();

        let placement =
            select_with_affinity(1, &mut pool, &job, &params(2, 2), &mut recorder).unwrap();

        assert_eq!(placement.super_pod_ids(), vec![1]);
    }

    #[test]
    fn idlest_prefers_larger_bin_busiest_smaller() {
        let nodes = || {
            vec![
                node("a0", 0),
                node("a1", 0),
                node("b0", 1),
                node("b1", 1),
                node("b2", 1),
                node("b3", 1),
            ]
        };

        let mut pool = pool_of(nodes());
        let mut recorder = VirtualPodIdRecorder::new();
        let idle = select_with_affinity(
            1,
            &mut pool,
            &serving_job(FitPolicy::Idlest, None),
            &params(2, 0),
            &mut recorder,
        )
        .unwrap();
        assert_eq!(idle.super_pod_ids(), vec![1]);

        let mut pool = pool_of(nodes());
        let mut recorder = VirtualPodIdRecorder::new();
        let busy = select_with_affinity(
            1,
            &mut pool,
            &serving_job(FitPolicy::Busiest, None),
            &params(2, 0),
            &mut recorder,
        )
        .unwrap();
        assert_eq!(busy.super_pod_ids(), vec![0]);
    }

    #[test]
    fn sub_block_bins_are_discarded_and_capacity_checked() {
        let mut pool = pool_of(vec![node("a0", 0), node("b0", 1)]);
        let job = serving_job(FitPolicy::Idlest, None);
        let mut recorder = VirtualPodIdRecorder::new();

        let err =
            select_with_affinity(1, &mut pool, &job, &params(2, 0), &mut recorder).unwrap_err();

        assert_eq!(
            err,
            PlacementError::Capacity {
                required: 1,
                available: 0
            }
        );
    }

    #[test]
    fn bin_is_reused_while_blocks_remain() {
        let mut pool = pool_of(vec![
            node("a0", 0),
            node("a1", 0),
            node("a2", 0),
            node("a3", 0),
        ]);
        let job = serving_job(FitPolicy::Idlest, Some("chain-a"));
        let mut recorder = VirtualPodIdRecorder::new();

        let placement =
            select_with_affinity(2, &mut pool, &job, &params(2, 0), &mut recorder).unwrap();

        assert_eq!(placement.groups.len(), 2);
        assert_eq!(placement.super_pod_ids(), vec![0]);
        assert_eq!(placement.total_nodes(), 4);
    }

    #[test]
    fn demand_beyond_total_blocks_fails_early() {
        let mut pool = pool_of(vec![node("a0", 0), node("a1", 0)]);
        let job = serving_job(FitPolicy::Idlest, None);
        let mut recorder = VirtualPodIdRecorder::new();

        let err =
            select_with_affinity(3, &mut pool, &job, &params(2, 0), &mut recorder).unwrap_err();

        assert_eq!(
            err,
            PlacementError::Capacity {
                required: 3,
                available: 1
            }
        );
    }
}
