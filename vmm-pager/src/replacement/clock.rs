//! Clock (second chance) replacement.

use super::ReplacementPolicy;
use std::collections::BTreeMap;
use vmm::{VmError, addressing::FrameNumber, task::{AccessKind, PageKey}};

/// Approximates LRU with one reference bit per frame and a circular hand.
///
/// The candidates are arranged in a circle in frame order. Starting at the
/// hand, the policy inspects each candidate: a frame with its reference bit
/// set gets a second chance, its bit is cleared and the hand moves on; the
/// first frame with a clear bit is the victim, and the hand stops right after
/// it.
///
/// ```text
///            hand
///             v
///     f0(1)  f1(1)  f2(0)  f3(1)      f1: clear, f2: victim
///                      ^
///                  next hand
/// ```
///
/// If every candidate is referenced, the first lap clears every bit and the
/// frame under the hand is taken on the next check. A selection therefore
/// inspects at most `N + 1` frames for `N` candidates.
#[derive(Default)]
pub struct ClockPolicy {
    referenced: BTreeMap<FrameNumber, bool>,
    hand: usize,
    last_checks: usize,
}

impl ClockPolicy {
    /// Creates a policy with the hand at frame zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of reference bits inspected by the last
    /// [`ReplacementPolicy::select_victim`].
    pub fn last_scan_checks(&self) -> usize {
        self.last_checks
    }

    /// Returns the reference bit of `frame`.
    pub fn is_referenced(&self, frame: FrameNumber) -> bool {
        self.referenced.get(&frame).copied().unwrap_or(false)
    }
}

impl ReplacementPolicy for ClockPolicy {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn on_load(&mut self, frame: FrameNumber, _page: PageKey) {
        self.referenced.insert(frame, true);
    }

    fn on_access(&mut self, frame: FrameNumber, _access: AccessKind) {
        if let Some(bit) = self.referenced.get_mut(&frame) {
            *bit = true;
        }
    }

    fn on_evict(&mut self, frame: FrameNumber) {
        self.referenced.remove(&frame);
    }

    fn select_victim(&mut self, candidates: &[FrameNumber]) -> Result<FrameNumber, VmError> {
        if candidates.is_empty() {
            return Err(VmError::NoCandidates);
        }
        let mut circle = candidates.to_vec();
        circle.sort_unstable();
        circle.dedup();

        let n = circle.len();
        let start = circle
            .iter()
            .position(|frame| frame.0 >= self.hand)
            .unwrap_or(0);
        self.last_checks = 0;
        for i in 0..n {
            let frame = circle[(start + i) % n];
            self.last_checks += 1;
            match self.referenced.get_mut(&frame) {
                Some(bit) if *bit => *bit = false,
                _ => {
                    self.hand = frame.0 + 1;
                    return Ok(frame);
                }
            }
        }
        // Every bit was set and is now clear.
        let frame = circle[start];
        self.last_checks += 1;
        self.hand = frame.0 + 1;
        Ok(frame)
    }
}
