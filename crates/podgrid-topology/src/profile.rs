//! Hardware profiles — per-generation topology parameters.
//!
//! The engine is one parametrized implementation; the differences
//! between accelerator generations (cards per node, default super-pod
//! size) live here.

use crate::error::{TopologyError, TopologyResult};

/// Topology parameters of one accelerator hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareProfile {
    pub name: &'static str,
    /// Schedulable accelerator units per node.
    pub node_capacity: u32,
    /// Super-pod node count assumed when no explicit size is configured.
    pub default_super_pod_size: u32,
}

impl HardwareProfile {
    /// Standard 8-card training node.
    pub const fn standard_eight_card() -> Self {
        Self {
            name: "standard-8",
            node_capacity: 8,
            default_super_pod_size: 48,
        }
    }

    /// High-density 16-card super-pod node.
    pub const fn dense_sixteen_card() -> Self {
        Self {
            name: "dense-16",
            node_capacity: 16,
            default_super_pod_size: 64,
        }
    }

    /// Look up a profile by its configured name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "standard-8" => Some(Self::standard_eight_card()),
            "dense-16" => Some(Self::dense_sixteen_card()),
            _ => None,
        }
    }

    /// Derive the sp-block node count from a job's per-block NPU
    /// requirement.
    ///
    /// A block smaller than one node's capacity collapses to a single
    /// node. Larger blocks must be an exact node multiple and must fit
    /// within one super-pod.
    pub fn derive_sp_block(&self, sp_block_npus: u32, super_pod_size: u32) -> TopologyResult<u32> {
        if sp_block_npus == 0 {
            return Err(TopologyError::ZeroBlock);
        }
        if sp_block_npus < self.node_capacity {
            return Ok(1);
        }
        if sp_block_npus % self.node_capacity != 0 {
            return Err(TopologyError::BlockNotDivisible {
                npus: sp_block_npus,
                capacity: self.node_capacity,
            });
        }
        let block = sp_block_npus / self.node_capacity;
        if block > super_pod_size {
            return Err(TopologyError::BlockExceedsSuperPod {
                block,
                size: super_pod_size,
            });
        }
        Ok(block)
    }
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self::standard_eight_card()
    }
}
