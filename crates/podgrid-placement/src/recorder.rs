//! Virtual-pod id allocation.
//!
//! Ids map to contiguous rank ranges, so a job mid-rescheduling must
//! see its unmet group ids refilled before any new id is minted — that
//! keeps surviving groups on their original ranks.

use std::collections::VecDeque;

use podgrid_state::VirtualPodId;

/// Allocates virtual-pod ids, draining previously-unready ids before
/// minting new sequential ones.
#[derive(Debug, Default)]
pub struct VirtualPodIdRecorder {
    unready: VecDeque<VirtualPodId>,
    next: u32,
}

impl VirtualPodIdRecorder {
    /// Recorder for a fresh job: ids mint from zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder for a job resuming after fault repair.
    ///
    /// `unready` are the group ids left unmet by reuse; `used` are the
    /// ids the previous placement held. New ids mint past the highest
    /// id ever seen.
    pub fn resuming<'a>(
        mut unready: Vec<VirtualPodId>,
        used: impl IntoIterator<Item = &'a VirtualPodId>,
    ) -> Self {
        unready.sort_by_key(|id| id.parse::<u32>().unwrap_or(u32::MAX));
        let next = unready
            .iter()
            .filter_map(|id| id.parse::<u32>().ok())
            .chain(used.into_iter().filter_map(|id| id.parse::<u32>().ok()))
            .map(|n| n + 1)
            .max()
            .unwrap_or(0);
        Self {
            unready: unready.into(),
            next,
        }
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> VirtualPodId {
        if let Some(id) = self.unready.pop_front() {
            return id;
        }
        let id = self.next.to_string();
        self.next += 1;
        id
    }
}
