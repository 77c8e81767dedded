//! The per-attempt scheduling session.
//!
//! Built once per scheduling attempt from a cluster snapshot. Placement
//! runs at most once per job per session; every task of the job scores
//! against the same committed result via the shared registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use podgrid_placement::{
    PlacementError, PlacementResult, SelectorParams, VirtualPodIdRecorder, emit_scores, select,
    select_with_affinity,
};
use podgrid_reschedule::resolve;
use podgrid_state::{
    ClusterSnapshot, FaultJob, JobId, JobReady, JobRegistry, JobSpec, NodeName, Placement,
    SelectorKind, VirtualPodId,
};
use podgrid_topology::{ClassifierParams, classify, free_pool, index_by_super_pod};

use crate::config::SchedulerConfig;
use crate::convert::TaskRef;

/// Outcome of job validation at admission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub pass: bool,
    pub reason: String,
    pub message: String,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            pass: true,
            reason: String::new(),
            message: String::new(),
        }
    }

    fn fail(reason: &str, message: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a job's topology requirements before any node is touched.
///
/// Rejects a non-positive or non-divisor sp-block, an sp-block wider
/// than the super-pod, and distributed jobs whose per-task requirement
/// is not an exact node-capacity multiple.
pub fn validate_job(config: &SchedulerConfig, job: &JobSpec) -> ValidationResult {
    if job.npu_task_num == 0 {
        return ValidationResult::fail("InvalidTaskCount", "job has no tasks to place");
    }

    if let Err(err) = config
        .profile
        .derive_sp_block(job.sp_block_npu_num, config.super_pod_size)
    {
        return ValidationResult::fail("InvalidSpBlock", err.to_string());
    }

    if job.npu_task_num > 1 {
        if job.req_npu_num % job.npu_task_num != 0 {
            return ValidationResult::fail(
                "InvalidTaskRequest",
                format!(
                    "{} NPUs do not divide evenly across {} tasks",
                    job.req_npu_num, job.npu_task_num
                ),
            );
        }
        let per_task = job.req_npu_num / job.npu_task_num;
        if per_task % config.profile.node_capacity != 0 {
            return ValidationResult::fail(
                "InvalidTaskRequest",
                format!(
                    "per-task requirement of {per_task} NPUs is not a multiple of node capacity {}",
                    config.profile.node_capacity
                ),
            );
        }
    }

    ValidationResult::ok()
}

/// One scheduling attempt's view of the world.
pub struct SchedulingSession {
    config: SchedulerConfig,
    snapshot: ClusterSnapshot,
    registry: Arc<JobRegistry>,
    /// Placements already resolved this session, shared across tasks.
    resolved: Mutex<HashMap<JobId, Placement>>,
    /// Optional hard stop for scoring work.
    deadline: Option<Instant>,
}

impl SchedulingSession {
    pub fn new(
        config: SchedulerConfig,
        snapshot: ClusterSnapshot,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            config,
            snapshot,
            registry,
            resolved: Mutex::new(HashMap::new()),
            deadline: None,
        }
    }

    /// Abort scoring for tasks reached after `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate_job(&self, job: &JobSpec) -> ValidationResult {
        validate_job(&self.config, job)
    }

    /// Score the offered nodes for one task.
    ///
    /// The first task of a job triggers the placement pipeline; later
    /// tasks reuse the committed result. Any internal failure yields
    /// the neutral (all-zero) map so other plugins' scores stand.
    pub fn score_nodes(
        &self,
        task: &TaskRef,
        job: &JobSpec,
        candidates: &[NodeName],
        fault: Option<&FaultJob>,
    ) -> HashMap<NodeName, f64> {
        let neutral = || -> HashMap<NodeName, f64> {
            candidates.iter().map(|n| (n.clone(), 0.0)).collect()
        };

        let sp_block = match self
            .config
            .profile
            .derive_sp_block(job.sp_block_npu_num, self.config.super_pod_size)
        {
            Ok(block) => block,
            Err(err) => {
                warn!(job = %job.job_id, %err, "invalid sp-block at scoring time");
                self.registry.mark_not_ready(&job.job_id);
                return neutral();
            }
        };

        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            warn!(job = %job.job_id, task = %task.task_name, "session deadline hit, scoring skipped");
            if self.session_placement(&job.job_id).is_none() {
                // Nothing was committed for this job: leave it not
                // ready so the next attempt restarts from scratch.
                self.registry.mark_not_ready(&job.job_id);
            }
            return neutral();
        }

        match self.ensure_placement(job, candidates, fault, sp_block) {
            Ok(placement) => emit_scores(&placement, task.rank(), sp_block, candidates.iter()),
            Err(err) => {
                self.log_failure(&job.job_id, &err);
                self.registry.mark_not_ready(&job.job_id);
                neutral()
            }
        }
    }

    /// Drop the session. The snapshot dies with it; the registry and
    /// its ready tags live on for the next attempt.
    pub fn close(self) {
        debug!(nodes = self.snapshot.nodes.len(), "session closed, snapshot discarded");
    }

    fn session_placement(&self, job_id: &str) -> Option<Placement> {
        let resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        resolved.get(job_id).cloned()
    }

    /// Resolve the job's placement once per session.
    fn ensure_placement(
        &self,
        job: &JobSpec,
        candidates: &[NodeName],
        fault: Option<&FaultJob>,
        sp_block: u32,
    ) -> PlacementResult<Placement> {
        if let Some(placement) = self.session_placement(&job.job_id) {
            return Ok(placement);
        }

        // A job already ready from a previous attempt keeps its
        // committed placement; re-running placement would shuffle
        // ranks under running tasks.
        if self.registry.ready(&job.job_id) == JobReady::Ready
            && let Some(placement) = self.registry.placement(&job.job_id)
        {
            self.remember(&job.job_id, &placement);
            return Ok(placement);
        }

        let placement = self.compute_placement(job, candidates, fault, sp_block)?;
        self.registry.commit(&job.job_id, placement.clone());
        self.remember(&job.job_id, &placement);
        info!(
            job = %job.job_id,
            groups = placement.groups.len(),
            degraded = placement.degraded,
            "placement resolved"
        );
        Ok(placement)
    }

    fn remember(&self, job_id: &str, placement: &Placement) {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        resolved.insert(job_id.to_string(), placement.clone());
    }

    /// The full pipeline: index → classify → fault resolve → select.
    fn compute_placement(
        &self,
        job: &JobSpec,
        candidates: &[NodeName],
        fault: Option<&FaultJob>,
        sp_block: u32,
    ) -> PlacementResult<Placement> {
        let offered = candidates
            .iter()
            .filter_map(|name| self.snapshot.node(name).cloned());
        let pods = index_by_super_pod(offered);

        let classified = classify(
            &pods,
            &ClassifierParams {
                sp_block,
                reserve_pod_size: self.config.reserve_pod_size,
                super_pod_size: self.config.super_pod_size,
                affinity: job.affinity,
            },
        )?;
        let mut pool = free_pool(&pods);

        let required = job.npu_task_num.div_ceil(sp_block);
        let mut placement = Placement::default();
        let mut recorder = match fault {
            Some(fault) => {
                let outcome = resolve(
                    fault,
                    job.reschedule_scope,
                    sp_block,
                    &mut pool,
                    Instant::now(),
                )?;
                let used: Vec<&VirtualPodId> = fault.previous.groups.keys().collect();
                let recorder = VirtualPodIdRecorder::resuming(outcome.unready, used);
                placement.groups.extend(outcome.reused);
                recorder
            }
            None => VirtualPodIdRecorder::new(),
        };

        let unmet = required.saturating_sub(placement.groups.len() as u32);
        if unmet > 0 {
            let params = SelectorParams {
                sp_block,
                reserve_pod_size: self.config.reserve_pod_size,
                affinity: job.affinity,
            };
            let filled = match job.selector {
                SelectorKind::Phased => {
                    select(unmet, &classified, &mut pool, &mut recorder, &params)?
                }
                SelectorKind::AffinityQueue => {
                    select_with_affinity(unmet, &mut pool, job, &params, &mut recorder)?
                }
            };
            placement.degraded |= filled.degraded;
            placement.groups.extend(filled.groups);
        }

        Ok(placement)
    }

    /// Log by error class: waits are routine, capacity shortfalls are
    /// expected to self-heal, the rest deserve attention.
    fn log_failure(&self, job_id: &str, err: &PlacementError) {
        match err {
            PlacementError::WaitForRelease { .. } => {
                debug!(%job_id, %err, "placement deferred");
            }
            PlacementError::Capacity { .. } => {
                info!(%job_id, %err, "placement failed, will retry next attempt");
            }
            _ => {
                warn!(%job_id, %err, "placement failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podgrid_state::{AffinityMode, NodeFacts};
    use podgrid_topology::HardwareProfile;

    fn config(super_pod_size: i64, reserve: i64) -> SchedulerConfig {
        SchedulerConfig::from_knobs(
            HardwareProfile::standard_eight_card(),
            Some(super_pod_size),
            Some(reserve),
        )
    }

    fn job(sp_block_npus: u32, tasks: u32) -> JobSpec {
        JobSpec {
            job_id: "job-1".into(),
            npu_task_num: tasks,
            req_npu_num: tasks * 8,
            sp_block_npu_num: sp_block_npus,
            scheduling_task_num: tasks,
            affinity: AffinityMode::Hard,
            fit_policy: Default::default(),
            reschedule_scope: Default::default(),
            selector: Default::default(),
            affinity_group: None,
        }
    }

    #[test]
    fn validation_accepts_well_formed_job() {
        let result = validate_job(&config(48, 2), &job(16, 4));
        assert!(result.pass, "{}", result.message);
    }

    #[test]
    fn validation_rejects_zero_sp_block() {
        let result = validate_job(&config(48, 2), &job(0, 4));
        assert!(!result.pass);
        assert_eq!(result.reason, "InvalidSpBlock");
    }

    #[test]
    fn validation_rejects_non_divisor_sp_block() {
        let result = validate_job(&config(48, 2), &job(12, 4));
        assert!(!result.pass);
        assert_eq!(result.reason, "InvalidSpBlock");
    }

    #[test]
    fn validation_rejects_sp_block_wider_than_super_pod() {
        let result = validate_job(&config(4, 2), &job(8 * 5, 5));
        assert!(!result.pass);
        assert_eq!(result.reason, "InvalidSpBlock");
    }

    #[test]
    fn validation_rejects_fractional_per_task_request() {
        let mut bad = job(16, 4);
        bad.req_npu_num = 30; // 7.5 NPUs per task
        let result = validate_job(&config(48, 2), &bad);
        assert!(!result.pass);
        assert_eq!(result.reason, "InvalidTaskRequest");

        let mut bad = job(16, 4);
        bad.req_npu_num = 12; // 3 per task: divides, but not node-aligned
        let result = validate_job(&config(48, 2), &bad);
        assert!(!result.pass);
        assert_eq!(result.reason, "InvalidTaskRequest");
    }

    #[test]
    fn validation_rejects_empty_job() {
        let result = validate_job(&config(48, 2), &job(16, 0));
        assert!(!result.pass);
        assert_eq!(result.reason, "InvalidTaskCount");
    }

    #[test]
    fn deadline_in_the_past_yields_neutral_scores() {
        let snapshot = ClusterSnapshot::from_nodes(vec![
            NodeFacts::new("a", 0),
            NodeFacts::new("b", 0),
        ]);
        let registry = Arc::new(JobRegistry::new());
        let session = SchedulingSession::new(config(48, 2), snapshot, registry.clone())
            .with_deadline(Instant::now() - std::time::Duration::from_secs(1));

        let candidates = vec!["a".to_string(), "b".to_string()];
        let scores =
            session.score_nodes(&TaskRef::new("task-0", 0), &job(16, 2), &candidates, None);

        assert!(scores.values().all(|&s| s == 0.0));
        assert_eq!(registry.ready("job-1"), JobReady::NotReady);
    }
}
