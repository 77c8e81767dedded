//! Topology index — groups candidate nodes by physical super-pod.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use podgrid_state::{FreePool, NodeFacts, SuperPodId, SuperPodView};

/// Group currently-offered candidate nodes by their super-pod id.
///
/// Nodes with a negative super-pod id carry no topology information and
/// are skipped with a warning; nodes whose sub-health flags make them
/// unschedulable are filtered out. The result is rebuilt from scratch
/// every scheduling attempt.
pub fn index_by_super_pod(
    candidates: impl IntoIterator<Item = NodeFacts>,
) -> BTreeMap<SuperPodId, SuperPodView> {
    let mut pods: BTreeMap<SuperPodId, SuperPodView> = BTreeMap::new();

    for node in candidates {
        if node.super_pod_id < 0 {
            warn!(node = %node.name, id = node.super_pod_id, "node has no super-pod, skipped");
            continue;
        }
        if !node.health.is_schedulable() {
            debug!(node = %node.name, "node sub-healthy, skipped");
            continue;
        }
        pods.entry(node.super_pod_id)
            .or_default()
            .insert(node.name.clone(), node);
    }

    pods
}

/// Flatten indexed views into the free pool the selectors carve from.
///
/// Node lists inherit the views' lexicographic order, which is what
/// makes in-pod selection deterministic.
pub fn free_pool(pods: &BTreeMap<SuperPodId, SuperPodView>) -> FreePool {
    pods.iter()
        .map(|(&id, view)| (id, view.values().cloned().collect()))
        .collect()
}
