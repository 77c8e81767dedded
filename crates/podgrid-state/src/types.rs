//! Domain types for the PodGrid placement engine.
//!
//! These types describe nodes and their super-pod topology, job
//! requirements, committed placements, and fault-rescheduling state.
//! Types that cross the fixture/CLI boundary are serializable to JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Name of a physical node.
pub type NodeName = String;

/// Unique identifier for a job.
pub type JobId = String;

/// Name of a single task (process) within a job.
pub type TaskName = String;

/// Physical super-pod identifier. Negative values mean "not in a
/// super-pod" and are rejected at indexing time.
pub type SuperPodId = i64;

/// Identifier of one virtual pod group within a job — a small integer
/// rendered as a string, mapped to a contiguous rank range.
pub type VirtualPodId = String;

/// A live super-pod: currently-offerable nodes keyed by name.
///
/// Recomputed from the candidate set every scheduling attempt; never
/// persisted. `BTreeMap` keeps node iteration in lexicographic order so
/// selection within a pod is deterministic.
pub type SuperPodView = BTreeMap<NodeName, NodeFacts>;

/// Free capacity per super-pod during one placement run. Node lists
/// stay sorted by name; carving removes from the front.
pub type FreePool = BTreeMap<SuperPodId, Vec<NodeFacts>>;

// ── Nodes ─────────────────────────────────────────────────────────

/// Snapshot facts about one candidate node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeFacts {
    pub name: NodeName,
    pub super_pod_id: SuperPodId,
    #[serde(default)]
    pub health: NodeHealth,
    /// Tasks currently occupying this node.
    #[serde(default)]
    pub tasks: Vec<TaskOccupancy>,
}

impl NodeFacts {
    /// A healthy, idle node in the given super-pod.
    pub fn new(name: impl Into<NodeName>, super_pod_id: SuperPodId) -> Self {
        Self {
            name: name.into(),
            super_pod_id,
            health: NodeHealth::default(),
            tasks: Vec::new(),
        }
    }

    /// Record of this node as a placement member.
    pub fn as_super_node(&self) -> SuperNode {
        SuperNode {
            name: self.name.clone(),
            super_pod_id: self.super_pod_id,
        }
    }
}

/// Sub-health flags for a node, reported by device and switch fault
/// listeners.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeHealth {
    /// An NPU card on this node is degraded.
    #[serde(default)]
    pub card_sub_healthy: bool,
    /// The interconnect switch serving this node is degraded.
    #[serde(default)]
    pub switch_sub_healthy: bool,
}

impl NodeHealth {
    /// Whether the node may receive new placements.
    pub fn is_schedulable(&self) -> bool {
        !self.card_sub_healthy && !self.switch_sub_healthy
    }
}

/// A task observed running on a node, used for affinity scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOccupancy {
    pub job_id: JobId,
    /// Declared co-location group, if the owning job has one.
    #[serde(default)]
    pub affinity_group: Option<String>,
}

/// A placement record: one member of a committed virtual pod group.
///
/// Unlike [`NodeFacts`] this is not a live object — it names a node and
/// the super-pod it belonged to at commit time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuperNode {
    pub name: NodeName,
    pub super_pod_id: SuperPodId,
}

// ── Jobs ──────────────────────────────────────────────────────────

/// Super-pod affinity requested by a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityMode {
    /// Every group must come from a single intact super-pod.
    #[default]
    Hard,
    /// Degraded placement is acceptable when strict placement is
    /// infeasible.
    Soft,
}

/// Tie-break policy for the affinity bin queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Prefer the bin with more remaining free nodes.
    #[default]
    Idlest,
    /// Prefer the bin with fewer remaining free nodes.
    Busiest,
}

/// Granularity of fault-driven rescheduling for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleScope {
    /// The whole job restarts; groups may be rebuilt freely.
    #[default]
    Job,
    /// Only faulted pods restart; intact members stay in place.
    Pod,
    /// Only faulted processes restart; intact members stay in place.
    Process,
}

/// Which selector fills unmet virtual pods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// The four-phase fragmentation-minimizing selector.
    #[default]
    Phased,
    /// The heap-based bin-affinity selector (inference serving).
    AffinityQueue,
}

/// Scheduling requirements of one job, with mode selectors already
/// parsed from its labels and annotations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub job_id: JobId,
    /// Number of processes to place.
    pub npu_task_num: u32,
    /// Total accelerator units requested.
    pub req_npu_num: u32,
    /// Accelerator units per topology allocation unit.
    pub sp_block_npu_num: u32,
    /// Tasks still pending placement this attempt.
    pub scheduling_task_num: u32,
    #[serde(default)]
    pub affinity: AffinityMode,
    #[serde(default)]
    pub fit_policy: FitPolicy,
    #[serde(default)]
    pub reschedule_scope: RescheduleScope,
    #[serde(default)]
    pub selector: SelectorKind,
    /// Declared co-location group for affinity scoring.
    #[serde(default)]
    pub affinity_group: Option<String>,
}

/// Readiness of a job's placement. Held once per job in the
/// [`crate::JobRegistry`] so every task of the job observes the same
/// state within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobReady {
    /// No placement attempt recorded yet.
    #[default]
    Unknown,
    /// A required group is unmet; retried next attempt.
    NotReady,
    /// All required groups are committed.
    Ready,
}

// ── Placements ────────────────────────────────────────────────────

/// A committed placement: virtual pod id → group members.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    pub groups: BTreeMap<VirtualPodId, Vec<SuperNode>>,
    /// Set when a soft-affinity job accepted fewer or smaller groups
    /// than requested.
    #[serde(default)]
    pub degraded: bool,
}

impl Placement {
    /// Total number of placed nodes across all groups.
    pub fn total_nodes(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether the given node appears in any group.
    pub fn contains_node(&self, name: &str) -> bool {
        self.groups
            .values()
            .any(|g| g.iter().any(|n| n.name == name))
    }

    /// Super-pod ids used by this placement, deduplicated.
    pub fn super_pod_ids(&self) -> Vec<SuperPodId> {
        let mut ids: Vec<SuperPodId> = self
            .groups
            .values()
            .flat_map(|g| g.iter().map(|n| n.super_pod_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// ── Fault jobs ────────────────────────────────────────────────────

/// Fault flag for one task of a job under rescheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultTask {
    pub task_name: TaskName,
    /// Node the task last ran on.
    pub node_name: NodeName,
    pub faulted: bool,
}

/// A job undergoing placement repair after one or more task failures.
///
/// Created by the fault-detection subsystem, consumed by the reuse
/// resolver, and discarded once the job's task count returns to its
/// full target.
#[derive(Debug, Clone)]
pub struct FaultJob {
    pub job_id: JobId,
    pub fault_tasks: Vec<FaultTask>,
    /// The placement committed before the fault.
    pub previous: Placement,
    /// When rescheduling for this job began.
    pub reschedule_started: Instant,
}

impl FaultJob {
    /// Whether the named node hosts a currently-faulted task.
    pub fn node_is_faulted(&self, name: &str) -> bool {
        self.fault_tasks
            .iter()
            .any(|t| t.faulted && t.node_name == name)
    }

    /// Whether the named node was used by the previous placement.
    pub fn previously_used(&self, name: &str) -> bool {
        self.previous.contains_node(name)
    }
}
