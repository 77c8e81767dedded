//! podgrid-state — domain types and shared state for the PodGrid engine.
//!
//! Holds the data model the placement engine operates on, the
//! process-wide cluster info caches fed by asynchronous listeners, and
//! the job registry that owns per-job readiness flags and committed
//! placements.
//!
//! The placement engine itself never touches the live caches: it works
//! on an immutable [`ClusterSnapshot`] taken once per scheduling
//! attempt, so no locking is needed inside the algorithm.

pub mod registry;
pub mod store;
pub mod types;

pub use registry::JobRegistry;
pub use store::{ClusterCache, ClusterSnapshot, DeviceInfo, SwitchInfo};
pub use types::*;
