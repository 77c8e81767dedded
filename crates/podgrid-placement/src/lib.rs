//! podgrid-placement — the topology-aware placement core.
//!
//! Fills a job's virtual pod groups from classified super-pod capacity:
//!
//! - [`selector`] — the four-phase fragmentation-minimizing selector
//! - [`affinity`] — the heap-based bin-affinity selector for
//!   co-location-sensitive jobs
//! - [`recorder`] — virtual-pod id allocation with rank continuity
//!   across rescheduling
//! - [`emitter`] — converts a resolved placement into the external
//!   binder's per-node score map
//!
//! The two selectors are mutually exclusive per job; both consume the
//! same [`podgrid_state::FreePool`] and commit through the same
//! recorder.

pub mod affinity;
pub mod emitter;
pub mod error;
pub mod recorder;
pub mod selector;

pub use affinity::select_with_affinity;
pub use emitter::{PINNED_NODE_SCORE, emit_scores};
pub use error::{PlacementError, PlacementResult};
pub use recorder::VirtualPodIdRecorder;
pub use selector::{SelectorParams, select};
