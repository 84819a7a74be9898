//! Least recently used replacement.

use super::{RecencyList, ReplacementPolicy};
use vmm::{VmError, addressing::FrameNumber, task::{AccessKind, PageKey}};

/// Evicts the frame whose page was accessed least recently.
///
/// Loading a page counts as its first access.
#[derive(Default)]
pub struct LruPolicy {
    accesses: RecencyList,
}

impl LruPolicy {
    /// Creates a policy that has seen no access.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplacementPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn on_load(&mut self, frame: FrameNumber, _page: PageKey) {
        self.accesses.touch(frame);
    }

    fn on_access(&mut self, frame: FrameNumber, _access: AccessKind) {
        self.accesses.refresh(frame);
    }

    fn on_evict(&mut self, frame: FrameNumber) {
        self.accesses.remove(frame);
    }

    fn select_victim(&mut self, candidates: &[FrameNumber]) -> Result<FrameNumber, VmError> {
        self.accesses
            .oldest_among(candidates)
            .ok_or(VmError::NoCandidates)
    }
}
