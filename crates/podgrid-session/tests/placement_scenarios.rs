//! End-to-end placement scenarios through the session facade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use podgrid_placement::{PlacementError, VirtualPodIdRecorder, select};
use podgrid_session::{SchedulerConfig, SchedulingSession, TaskRef, validate_job};
use podgrid_state::{
    AffinityMode, ClusterSnapshot, FaultJob, FaultTask, JobReady, JobRegistry, JobSpec, NodeFacts,
    Placement, SelectorKind, SuperNode, SuperPodId, TaskOccupancy,
};
use podgrid_topology::{ClassifierParams, HardwareProfile, classify, free_pool, index_by_super_pod};

fn nodes(sizes: &[(SuperPodId, usize)]) -> Vec<NodeFacts> {
    let mut out = Vec::new();
    for &(pod, size) in sizes {
        for i in 0..size {
            out.push(NodeFacts::new(format!("sp{pod}-node-{i:02}"), pod));
        }
    }
    out
}

fn names(nodes: &[NodeFacts]) -> Vec<String> {
    nodes.iter().map(|n| n.name.clone()).collect()
}

fn config() -> SchedulerConfig {
    SchedulerConfig::from_knobs(HardwareProfile::standard_eight_card(), Some(48), Some(2))
}

fn training_job(tasks: u32) -> JobSpec {
    JobSpec {
        job_id: "train-1".into(),
        npu_task_num: tasks,
        req_npu_num: tasks * 8,
        sp_block_npu_num: 16, // two 8-card nodes per block
        scheduling_task_num: tasks,
        affinity: AffinityMode::Hard,
        fit_policy: Default::default(),
        reschedule_scope: Default::default(),
        selector: Default::default(),
        affinity_group: None,
    }
}

fn session(candidates: &[NodeFacts]) -> (SchedulingSession, Arc<JobRegistry>) {
    let registry = Arc::new(JobRegistry::new());
    let snapshot = ClusterSnapshot::from_nodes(candidates.to_vec());
    (
        SchedulingSession::new(config(), snapshot, registry.clone()),
        registry,
    )
}

// Scenario A: 30 nodes across 3 super-pods of 10, sp-block of 2 nodes,
// reserve 2, job needs 2 groups.
#[test]
fn scenario_a_two_groups_from_thirty_nodes() {
    let cluster = nodes(&[(0, 10), (1, 10), (2, 10)]);
    let candidates = names(&cluster);
    let (session, registry) = session(&cluster);
    let job = training_job(4);

    assert!(validate_job(&config(), &job).pass);

    let scores = session.score_nodes(&TaskRef::new("task-0", 0), &job, &candidates, None);
    assert_eq!(scores.len(), 30);

    let placement = registry.placement("train-1").expect("placement committed");
    assert_eq!(registry.ready("train-1"), JobReady::Ready);
    assert_eq!(placement.groups.len(), 2);
    assert!(!placement.degraded);
    for group in placement.groups.values() {
        assert_eq!(group.len(), 2);
        let pod = group[0].super_pod_id;
        assert!(group.iter().all(|n| n.super_pod_id == pod));
    }
}

// Scenario A, offered-subset variant: pod 1 alone can satisfy the
// demand while keeping its reserve, then the bigger pod 2 covers the
// rest. Pod 0 is left untouched.
#[test]
fn scenario_a_subset_prefers_low_fragmentation_pods() {
    let cluster = nodes(&[(0, 6), (1, 4), (2, 10)]);
    let candidates = names(&cluster);
    let (session, registry) = session(&cluster);
    let job = training_job(4);

    session.score_nodes(&TaskRef::new("task-0", 0), &job, &candidates, None);

    let placement = registry.placement("train-1").expect("placement committed");
    assert_eq!(placement.super_pod_ids(), vec![1, 2]);
}

// Scenario B: requesting 2 groups when a single super-pod of 2 nodes
// is offered fails with the required/total counts, and the session
// degrades to neutral scores.
#[test]
fn scenario_b_insufficient_capacity_reports_counts() {
    let cluster = nodes(&[(0, 2)]);
    let pods = index_by_super_pod(cluster.clone());
    let classified = classify(
        &pods,
        &ClassifierParams {
            sp_block: 2,
            reserve_pod_size: 0,
            super_pod_size: 48,
            affinity: AffinityMode::Hard,
        },
    )
    .unwrap();
    let mut pool = free_pool(&pods);
    let mut recorder = VirtualPodIdRecorder::new();
    let err = select(
        2,
        &classified,
        &mut pool,
        &mut recorder,
        &podgrid_placement::SelectorParams {
            sp_block: 2,
            reserve_pod_size: 0,
            affinity: AffinityMode::Hard,
        },
    )
    .unwrap_err();

    assert_eq!(
        err,
        PlacementError::Capacity {
            required: 2,
            available: 1
        }
    );
    assert!(err.to_string().contains("required 2, total 1"));

    // Through the session: neutral map, job not ready.
    let candidates = names(&cluster);
    let (session, registry) = session(&cluster);
    let scores =
        session.score_nodes(&TaskRef::new("task-0", 0), &training_job(4), &candidates, None);
    assert!(scores.values().all(|&s| s == 0.0));
    assert_eq!(registry.ready("train-1"), JobReady::NotReady);
}

// Scenario C: a fault job with one intact previous group keeps it
// verbatim; the faulted group is repaired from the same super-pod.
#[test]
fn scenario_c_intact_group_reused_fault_group_repaired() {
    // Offered: pod 0 intact members, pod 1 replacements only.
    let mut cluster = nodes(&[(1, 2)]); // sp1-node-00, sp1-node-01
    cluster.push(NodeFacts::new("sp0-node-00", 0));
    cluster.push(NodeFacts::new("sp0-node-01", 0));
    let candidates = names(&cluster);

    let previous = Placement {
        groups: [
            (
                "0".to_string(),
                vec![
                    SuperNode {
                        name: "sp0-node-00".into(),
                        super_pod_id: 0,
                    },
                    SuperNode {
                        name: "sp0-node-01".into(),
                        super_pod_id: 0,
                    },
                ],
            ),
            (
                "1".to_string(),
                vec![
                    SuperNode {
                        name: "sp1-gone-00".into(),
                        super_pod_id: 1,
                    },
                    SuperNode {
                        name: "sp1-gone-01".into(),
                        super_pod_id: 1,
                    },
                ],
            ),
        ]
        .into(),
        degraded: false,
    };
    let fault = FaultJob {
        job_id: "train-1".into(),
        fault_tasks: vec![
            FaultTask {
                task_name: "task-0".into(),
                node_name: "sp0-node-00".into(),
                faulted: false,
            },
            FaultTask {
                task_name: "task-1".into(),
                node_name: "sp0-node-01".into(),
                faulted: false,
            },
            FaultTask {
                task_name: "task-2".into(),
                node_name: "sp1-gone-00".into(),
                faulted: true,
            },
            FaultTask {
                task_name: "task-3".into(),
                node_name: "sp1-gone-01".into(),
                faulted: true,
            },
        ],
        previous,
        reschedule_started: Instant::now() - Duration::from_secs(60),
    };

    let (session, registry) = session(&cluster);
    let job = training_job(4);

    session.score_nodes(&TaskRef::new("task-0", 0), &job, &candidates, Some(&fault));

    let placement = registry.placement("train-1").expect("placement committed");
    let g0: Vec<_> = placement.groups["0"].iter().map(|n| n.name.as_str()).collect();
    assert_eq!(g0, vec!["sp0-node-00", "sp0-node-01"], "intact group kept verbatim");

    let g1: Vec<_> = placement.groups["1"].iter().map(|n| n.name.as_str()).collect();
    assert_eq!(g1, vec!["sp1-node-00", "sp1-node-01"], "faulted group rebuilt in its pod");
    assert_eq!(registry.ready("train-1"), JobReady::Ready);
}

// Score round-trip: rank = group * sp_block + local recovers the
// placed node for every task of the job.
#[test]
fn score_round_trip_recovers_placed_nodes() {
    let cluster = nodes(&[(0, 10), (1, 10), (2, 10)]);
    let candidates = names(&cluster);
    let (session, registry) = session(&cluster);
    let job = training_job(4);

    let mut pinned = Vec::new();
    for rank in 0..4u32 {
        let task = TaskRef::new(format!("task-{rank}"), rank);
        let scores = session.score_nodes(&task, &job, &candidates, None);
        let top: Vec<_> = scores
            .iter()
            .filter(|&(_, &s)| s > 0.0)
            .map(|(n, _)| n.clone())
            .collect();
        assert_eq!(top.len(), 1, "rank {rank} pins exactly one node");
        pinned.push(top[0].clone());
    }

    let placement = registry.placement("train-1").unwrap();
    for (rank, name) in pinned.iter().enumerate() {
        let group = &placement.groups[&(rank as u32 / 2).to_string()];
        assert_eq!(&group[rank % 2].name, name);
    }

    // All four pins are distinct nodes.
    let mut unique = pinned.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 4);
}

// Soft affinity accepts a degraded result: the available group scores,
// the missing group stays neutral, the job stays not ready.
#[test]
fn soft_job_accepts_degraded_placement() {
    let cluster = nodes(&[(0, 2)]);
    let candidates = names(&cluster);
    let (session, registry) = session(&cluster);
    let mut job = training_job(4);
    job.affinity = AffinityMode::Soft;

    let scores = session.score_nodes(&TaskRef::new("task-0", 0), &job, &candidates, None);
    assert_eq!(scores.values().filter(|&&s| s > 0.0).count(), 1);

    let placement = registry.placement("train-1").expect("degraded placement stored");
    assert!(placement.degraded);
    assert_eq!(placement.groups.len(), 1);
    assert_eq!(registry.ready("train-1"), JobReady::NotReady);

    // A task whose rank falls in the missing group scores neutral.
    let scores = session.score_nodes(&TaskRef::new("task-2", 2), &job, &candidates, None);
    assert!(scores.values().all(|&s| s == 0.0));
}

// The affinity-queue selector co-locates with peers of the same group.
#[test]
fn affinity_queue_job_follows_peers() {
    let mut cluster = nodes(&[(0, 4), (1, 4)]);
    // A peer replica of the same serving chain already runs in pod 1.
    cluster[4].tasks.push(TaskOccupancy {
        job_id: "serve-0".into(),
        affinity_group: Some("chain-a".into()),
    });
    let candidates = names(&cluster);
    let (session, registry) = session(&cluster);

    let mut job = training_job(2);
    job.job_id = "serve-1".into();
    job.selector = SelectorKind::AffinityQueue;
    job.affinity_group = Some("chain-a".into());

    session.score_nodes(&TaskRef::new("task-0", 0), &job, &candidates, None);

    let placement = registry.placement("serve-1").expect("placement committed");
    assert_eq!(placement.super_pod_ids(), vec![1]);
}

// A ready job keeps its committed placement across sessions.
#[test]
fn ready_job_is_not_replaced_on_next_attempt() {
    let cluster = nodes(&[(0, 10)]);
    let candidates = names(&cluster);
    let registry = Arc::new(JobRegistry::new());
    let job = training_job(2);

    let first = SchedulingSession::new(
        config(),
        ClusterSnapshot::from_nodes(cluster.clone()),
        registry.clone(),
    );
    first.score_nodes(&TaskRef::new("task-0", 0), &job, &candidates, None);
    let committed = registry.placement("train-1").unwrap();
    first.close();

    let second = SchedulingSession::new(
        config(),
        ClusterSnapshot::from_nodes(cluster.clone()),
        registry.clone(),
    );
    second.score_nodes(&TaskRef::new("task-1", 1), &job, &candidates, None);

    assert_eq!(registry.placement("train-1").unwrap(), committed);
}
