//! podgrid-topology — super-pod topology for the placement engine.
//!
//! Builds the per-attempt topology view: candidate nodes grouped by
//! physical super-pod, super-pods classified into capacity buckets by
//! their leftover-after-reserve shape, and per-hardware-generation
//! parameters (node capacity, sp-block derivation).

pub mod classifier;
pub mod error;
pub mod index;
pub mod profile;

pub use classifier::{CapacityBuckets, ClassifiedCapacity, ClassifierParams, classify};
pub use error::{TopologyError, TopologyResult};
pub use index::{free_pool, index_by_super_pod};
pub use profile::HardwareProfile;
