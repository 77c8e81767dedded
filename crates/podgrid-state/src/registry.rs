//! Job registry — single owner of per-job readiness and placements.
//!
//! Multiple tasks of one job are scored within the same session and
//! must observe a consistent readiness state without re-running
//! placement per task. The registry owns that state; tasks hold only
//! the job id as a lookup key.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::types::{JobId, JobReady, Placement};

#[derive(Debug, Default)]
struct JobEntry {
    ready: JobReady,
    placement: Option<Placement>,
}

/// Registry of per-job scheduling state, keyed by job id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current readiness of a job. `Unknown` for jobs never seen.
    pub fn ready(&self, job_id: &str) -> JobReady {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(job_id).map(|e| e.ready).unwrap_or_default()
    }

    /// The committed placement for a job, if any.
    pub fn placement(&self, job_id: &str) -> Option<Placement> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(job_id).and_then(|e| e.placement.clone())
    }

    /// Commit a fully-resolved placement and mark the job ready.
    ///
    /// Degraded placements are stored but leave the job `NotReady`, so
    /// the next attempt retries while the current scores still reflect
    /// the accepted partial result.
    pub fn commit(&self, job_id: &str, placement: Placement) {
        let ready = if placement.degraded {
            JobReady::NotReady
        } else {
            JobReady::Ready
        };
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        debug!(%job_id, groups = placement.groups.len(), ?ready, "placement committed");
        jobs.insert(
            job_id.to_string(),
            JobEntry {
                ready,
                placement: Some(placement),
            },
        );
    }

    /// Record a failed attempt: readiness drops to `NotReady` and any
    /// stale placement is discarded (all-or-nothing per attempt).
    pub fn mark_not_ready(&self, job_id: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let entry = jobs.entry(job_id.to_string()).or_default();
        entry.ready = JobReady::NotReady;
        entry.placement = None;
    }

    /// Forget a job entirely (completed or removed).
    pub fn forget(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(job_id).is_some()
    }

    /// Job ids currently tracked.
    pub fn job_ids(&self) -> Vec<JobId> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<JobId> = jobs.keys().cloned().collect();
        ids.sort();
        ids
    }
}
