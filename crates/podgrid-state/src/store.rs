//! Cluster info caches and the per-attempt snapshot.
//!
//! Node, device, and switch info arrive from asynchronous cluster-event
//! listeners and outlive any single scheduling session. Each cache is
//! guarded by its own `RwLock`; the placement engine never reads them
//! directly — it takes a [`ClusterSnapshot`] once per attempt and works
//! on that copy alone.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::types::{NodeFacts, NodeName, SuperPodId};

/// Device-level fault state for one node, as reported by the device
/// fault listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Number of NPU cards currently flagged faulty on the node.
    pub faulty_cards: u32,
}

/// Switch-level fault state for one super-pod, as reported by the
/// network fault listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchInfo {
    /// The interconnect serving this super-pod is degraded.
    pub sub_healthy: bool,
}

/// An immutable copy of the cluster state, taken once per scheduling
/// attempt. Device and switch faults are already folded into each
/// node's health flags.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pub nodes: BTreeMap<NodeName, NodeFacts>,
}

impl ClusterSnapshot {
    /// Facts for the named node, if present.
    pub fn node(&self, name: &str) -> Option<&NodeFacts> {
        self.nodes.get(name)
    }

    /// Build a snapshot directly from node facts (tests, CLI fixtures).
    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeFacts>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.name.clone(), n)).collect(),
        }
    }
}

/// Process-wide store of cluster info, updated by listeners and read
/// only through [`ClusterCache::snapshot`].
#[derive(Debug, Default)]
pub struct ClusterCache {
    nodes: RwLock<HashMap<NodeName, NodeFacts>>,
    devices: RwLock<HashMap<NodeName, DeviceInfo>>,
    switches: RwLock<HashMap<SuperPodId, SwitchInfo>>,
}

impl ClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a node's base facts.
    pub fn upsert_node(&self, facts: NodeFacts) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        debug!(node = %facts.name, super_pod = facts.super_pod_id, "node cache updated");
        nodes.insert(facts.name.clone(), facts);
    }

    /// Remove a node that left the cluster. Returns true if it existed.
    pub fn remove_node(&self, name: &str) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.remove(name).is_some()
    }

    /// Record device fault state for a node.
    pub fn update_device(&self, name: impl Into<NodeName>, info: DeviceInfo) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.insert(name.into(), info);
    }

    /// Record switch fault state for a super-pod.
    pub fn update_switch(&self, super_pod_id: SuperPodId, info: SwitchInfo) {
        let mut switches = self.switches.write().unwrap_or_else(PoisonError::into_inner);
        switches.insert(super_pod_id, info);
    }

    /// Number of nodes currently cached.
    pub fn node_count(&self) -> usize {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.len()
    }

    /// Take an immutable snapshot of the cluster, folding device and
    /// switch faults into each node's health flags.
    pub fn snapshot(&self) -> ClusterSnapshot {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let switches = self.switches.read().unwrap_or_else(PoisonError::into_inner);

        let mut out = BTreeMap::new();
        for (name, facts) in nodes.iter() {
            let mut facts = facts.clone();
            if let Some(dev) = devices.get(name) {
                facts.health.card_sub_healthy |= dev.faulty_cards > 0;
            }
            if let Some(sw) = switches.get(&facts.super_pod_id) {
                facts.health.switch_sub_healthy |= sw.sub_healthy;
            }
            out.insert(name.clone(), facts);
        }

        debug!(nodes = out.len(), "cluster snapshot taken");
        ClusterSnapshot { nodes: out }
    }
}
