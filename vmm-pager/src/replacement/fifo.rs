//! First-in, first-out replacement.

use super::{RecencyList, ReplacementPolicy};
use vmm::{VmError, addressing::FrameNumber, task::{AccessKind, PageKey}};

/// Evicts the frame whose page was loaded first.
///
/// Accesses do not change the order. A page that stays hot is evicted as
/// soon as it becomes the oldest resident page.
#[derive(Default)]
pub struct FifoPolicy {
    loads: RecencyList,
}

impl FifoPolicy {
    /// Creates a policy that has seen no load.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn on_load(&mut self, frame: FrameNumber, _page: PageKey) {
        self.loads.touch(frame);
    }

    fn on_access(&mut self, _frame: FrameNumber, _access: AccessKind) {}

    fn on_evict(&mut self, frame: FrameNumber) {
        self.loads.remove(frame);
    }

    fn select_victim(&mut self, candidates: &[FrameNumber]) -> Result<FrameNumber, VmError> {
        self.loads
            .oldest_among(candidates)
            .ok_or(VmError::NoCandidates)
    }
}
