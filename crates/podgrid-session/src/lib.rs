//! podgrid-session — the facade the orchestration layer talks to.
//!
//! One [`SchedulingSession`] is built per scheduling attempt from an
//! immutable cluster snapshot. It validates jobs, runs the full
//! placement pipeline (index → classify → fault resolve → select →
//! commit → emit) once per job, and answers per-task score queries from
//! the committed result. Placement failures never propagate to the
//! scoring caller: the session returns the neutral score map and leaves
//! the job's ready tag down for the next attempt.
//!
//! ```text
//! SchedulingSession
//!   ├── ClusterSnapshot (immutable for the attempt)
//!   ├── JobRegistry (shared readiness + committed placements)
//!   └── per-job pipeline
//!       ├── index_by_super_pod / classify     (podgrid-topology)
//!       ├── resolve                           (podgrid-reschedule)
//!       ├── select / select_with_affinity     (podgrid-placement)
//!       └── emit_scores                       (podgrid-placement)
//! ```

pub mod config;
pub mod convert;
pub mod session;

pub use config::{ConfigFile, DEFAULT_RESERVE_POD_SIZE, SchedulerConfig};
pub use convert::{ExternalJob, TaskRef, job_spec_from_external};
pub use session::{SchedulingSession, ValidationResult, validate_job};
