//! Placement error taxonomy.
//!
//! Config errors are terminal for the job until re-submitted; capacity
//! and rescheduling errors are transient and expected to self-heal as
//! cluster state changes; rank mismatches are local to one task and
//! never abort a scoring pass.

use podgrid_state::{JobId, SuperPodId};
use podgrid_topology::TopologyError;
use thiserror::Error;

/// Errors that can occur while resolving a placement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("invalid placement configuration: {0}")]
    Config(#[from] TopologyError),

    #[error("not enough virtual pod capacity: required {required}, total {available}")]
    Capacity { required: u32, available: u32 },

    #[error("job {job_id} waiting for previous nodes to be released")]
    WaitForRelease { job_id: JobId },

    #[error(
        "rescheduling infeasible for job {job_id}: super-pod {super_pod_id} \
         needs {needed} replacement nodes, {free} free"
    )]
    ReschedulingInfeasible {
        job_id: JobId,
        super_pod_id: SuperPodId,
        needed: u32,
        free: u32,
    },

    #[error("rank {rank} does not map into group {group} of size {size}")]
    RankMismatch {
        rank: u32,
        group: String,
        size: usize,
    },
}

pub type PlacementResult<T> = Result<T, PlacementError>;
