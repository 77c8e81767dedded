//! Capacity classification — buckets super-pods by leftover shape.
//!
//! Each super-pod is classified by what remains after deducting the
//! reserve: `remainder` (how far the leftover is from a whole number of
//! sp-blocks) and `column` (how many whole sp-blocks the leftover still
//! holds). The selector walks these buckets in phase order to pick
//! donors that strand the fewest fragments.

use std::collections::BTreeMap;

use tracing::debug;

use podgrid_state::{AffinityMode, SuperPodId, SuperPodView};

use crate::error::{TopologyError, TopologyResult};

/// Inputs to [`classify`].
#[derive(Debug, Clone, Copy)]
pub struct ClassifierParams {
    /// Nodes per virtual pod group.
    pub sp_block: u32,
    /// Nodes each super-pod should keep for fault recovery.
    pub reserve_pod_size: u32,
    /// Configured maximum super-pod node count.
    pub super_pod_size: u32,
    pub affinity: AffinityMode,
}

/// 2-D bucket array indexed `[remainder][column]`, each cell listing
/// the super-pods with that leftover-after-reserve classification.
#[derive(Debug, Clone)]
pub struct CapacityBuckets {
    sp_block: u32,
    max_column: u32,
    cells: Vec<Vec<Vec<SuperPodId>>>,
}

impl CapacityBuckets {
    fn new(sp_block: u32, max_column: u32) -> Self {
        let cells = (0..sp_block)
            .map(|_| vec![Vec::new(); max_column as usize + 1])
            .collect();
        Self {
            sp_block,
            max_column,
            cells,
        }
    }

    fn file(&mut self, remainder: u32, column: u32, pod: SuperPodId) {
        self.cells[remainder as usize][column as usize].push(pod);
    }

    /// Super-pods filed under `(remainder, column)`.
    pub fn cell(&self, remainder: u32, column: u32) -> &[SuperPodId] {
        &self.cells[remainder as usize][column as usize]
    }

    /// Number of remainder rows (equals the sp-block).
    pub fn rows(&self) -> u32 {
        self.sp_block
    }

    /// Highest column index.
    pub fn max_column(&self) -> u32 {
        self.max_column
    }

    /// Total super-pods filed across all cells.
    pub fn len(&self) -> usize {
        self.cells.iter().flatten().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one classification pass.
#[derive(Debug, Clone)]
pub struct ClassifiedCapacity {
    pub buckets: CapacityBuckets,
    /// Total virtual pods selectable cluster-wide.
    pub count_v_super_pod: u32,
}

/// Bucket every super-pod by its leftover-after-reserve shape.
///
/// Pure and deterministic for a given input. In hard-affinity mode,
/// super-pods too small to supply even one block are skipped; any
/// super-pod above the configured maximum size fails the whole pass —
/// that is a misconfiguration, not a capacity condition.
pub fn classify(
    pods: &BTreeMap<SuperPodId, SuperPodView>,
    params: &ClassifierParams,
) -> TopologyResult<ClassifiedCapacity> {
    let mut buckets =
        CapacityBuckets::new(params.sp_block, params.super_pod_size / params.sp_block);
    let mut count_v_super_pod = 0u32;

    for (&id, view) in pods {
        let count = view.len();
        if count > params.super_pod_size as usize {
            return Err(TopologyError::SuperPodOversized {
                id,
                count,
                max: params.super_pod_size,
            });
        }
        if params.affinity == AffinityMode::Hard && (count as u32) < params.sp_block {
            debug!(super_pod = id, count, "below one sp-block, skipped");
            continue;
        }

        count_v_super_pod += count as u32 / params.sp_block;

        let effective = (count as u32).saturating_sub(params.reserve_pod_size);
        let remainder = effective % params.sp_block;
        let column = effective / params.sp_block;
        buckets.file(remainder, column, id);
    }

    debug!(
        pods = buckets.len(),
        virtual_pods = count_v_super_pod,
        "capacity classified"
    );
    Ok(ClassifiedCapacity {
        buckets,
        count_v_super_pod,
    })
}
