//! Belady's optimal replacement.

use super::ReplacementPolicy;
use std::collections::BTreeMap;
use vmm::{
    VmError,
    addressing::{FrameNumber, Vpn},
    task::{AccessKind, PageKey, Pid},
};

/// Evicts the frame whose page is used furthest in the future.
///
/// The policy needs the complete future reference trace, so it only serves
/// as a lower bound in simulations. The trace cursor moves forward by one on
/// every [`ReplacementPolicy::on_access`]; the driver must therefore report
/// exactly one access per trace entry, in order.
///
/// A page that is never referenced again is always preferred. Ties are
/// broken by the lowest frame number.
pub struct OptimalPolicy {
    trace: Vec<PageKey>,
    cursor: usize,
    resident: BTreeMap<FrameNumber, PageKey>,
}

impl OptimalPolicy {
    /// Creates a policy that will observe `trace`.
    pub fn new(trace: Vec<PageKey>) -> Self {
        Self {
            trace,
            cursor: 0,
            resident: BTreeMap::new(),
        }
    }

    /// Creates a policy for a trace of pages of a single process.
    pub fn for_process(pid: Pid, vpns: impl IntoIterator<Item = usize>) -> Self {
        Self::new(
            vpns.into_iter()
                .map(|vpn| PageKey::new(pid, Vpn(vpn)))
                .collect(),
        )
    }

    /// The number of trace entries consumed so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    // Position of the next use of `key` at or after the cursor.
    fn next_use(&self, key: PageKey) -> Option<usize> {
        self.trace
            .get(self.cursor..)?
            .iter()
            .position(|k| *k == key)
    }
}

impl ReplacementPolicy for OptimalPolicy {
    fn name(&self) -> &'static str {
        "optimal"
    }

    fn on_load(&mut self, frame: FrameNumber, page: PageKey) {
        self.resident.insert(frame, page);
    }

    fn on_access(&mut self, _frame: FrameNumber, _access: AccessKind) {
        self.cursor += 1;
    }

    fn on_evict(&mut self, frame: FrameNumber) {
        self.resident.remove(&frame);
    }

    fn select_victim(&mut self, candidates: &[FrameNumber]) -> Result<FrameNumber, VmError> {
        let mut best: Option<(FrameNumber, usize)> = None;
        for frame in candidates.iter().copied() {
            let distance = self
                .resident
                .get(&frame)
                .and_then(|key| self.next_use(*key))
                .unwrap_or(usize::MAX);
            best = match best {
                Some((f, d)) if d > distance || (d == distance && f < frame) => Some((f, d)),
                _ => Some((frame, distance)),
            };
        }
        best.map(|(frame, _)| frame).ok_or(VmError::NoCandidates)
    }
}
