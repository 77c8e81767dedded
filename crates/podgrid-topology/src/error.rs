//! Topology error types.

use podgrid_state::SuperPodId;
use thiserror::Error;

/// Errors raised while deriving or validating topology parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("sp-block NPU count must be positive")]
    ZeroBlock,

    #[error("sp-block of {npus} NPUs is not a multiple of node capacity {capacity}")]
    BlockNotDivisible { npus: u32, capacity: u32 },

    #[error("sp-block of {block} nodes exceeds super-pod size {size}")]
    BlockExceedsSuperPod { block: u32, size: u32 },

    #[error("super-pod {id} has {count} nodes, above the configured maximum {max}")]
    SuperPodOversized {
        id: SuperPodId,
        count: usize,
        max: u32,
    },
}

pub type TopologyResult<T> = Result<T, TopologyError>;
