//! Score emission — turns a resolved placement into the external
//! binder's per-node score map.
//!
//! The binder accepts only scores, not assignments: the node holding a
//! task's rank gets a large fixed bonus, every other offered node stays
//! neutral, and the binder treats the bonus as an effective pin.

use std::collections::HashMap;

use tracing::warn;

use podgrid_state::{NodeName, Placement, SuperNode};

use crate::error::{PlacementError, PlacementResult};

/// Bonus given to the node a rank resolves to.
pub const PINNED_NODE_SCORE: f64 = 100.0;

/// Resolve a global rank to its placed node.
///
/// `group = rank / sp_block`, `local = rank % sp_block`. A local rank
/// outside the group means the placement and the rank disagree.
fn pin_for_rank(placement: &Placement, rank: u32, sp_block: u32) -> PlacementResult<&SuperNode> {
    let group_id = (rank / sp_block).to_string();
    let local = (rank % sp_block) as usize;

    let group = placement
        .groups
        .get(&group_id)
        .ok_or(PlacementError::RankMismatch {
            rank,
            group: group_id.clone(),
            size: 0,
        })?;
    group.get(local).ok_or(PlacementError::RankMismatch {
        rank,
        group: group_id,
        size: group.len(),
    })
}

/// Build the score map for one task.
///
/// Every offered node starts neutral; the pinned node gets
/// [`PINNED_NODE_SCORE`]. A rank/placement mismatch is logged and the
/// map stays neutral — scoring of other tasks must continue.
pub fn emit_scores<'a>(
    placement: &Placement,
    rank: u32,
    sp_block: u32,
    offered: impl IntoIterator<Item = &'a NodeName>,
) -> HashMap<NodeName, f64> {
    let mut scores: HashMap<NodeName, f64> =
        offered.into_iter().map(|n| (n.clone(), 0.0)).collect();

    match pin_for_rank(placement, rank, sp_block) {
        Ok(node) => {
            scores.insert(node.name.clone(), PINNED_NODE_SCORE);
        }
        Err(err) => {
            warn!(rank, %err, "rank does not resolve to a placed node, no score emitted");
        }
    }

    scores
}
