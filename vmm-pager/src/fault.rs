//! # Page Fault
//!
//! A page fault is raised when a process touches a virtual page that has no
//! present mapping. The fault delivery collaborator reports it with a
//! [`PageFaultReason`], and the manager resolves it through a small state
//! machine:
//!
//! ```text
//!                +------------+     +-----------+     +-----------+     +----------+
//!   fault  ----> | Validating | --> | Resolving | --> |  Loading  | --> |  Mapped  |
//!                +------------+     +-----------+     +-----------+     +----------+
//!                      |             obtain frame      load or zero      map, wake
//!                      v             (evict victim)
//!                +------------+
//!                |  Rejected  |   out of bounds, not permitted, no process
//!                +------------+
//! ```
//!
//! `Mapped` and `Rejected` are terminal. A rejected fault is fatal for the
//! process and is never retried. A resolved fault tells the collaborator to
//! retry the faulting access, which now finds a present mapping.
//!
//! Errors after validation, such as a missing backing store copy of a
//! file-backed page, also terminate the fault. They release everything the
//! fault acquired and are reported as [`FaultSignal::Fatal`].

use vmm::{
    VmError,
    addressing::{FrameNumber, Pa, Va},
    task::{AccessKind, Pid},
};

/// The state of a page fault in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultState {
    /// Checking the address and the access kind.
    Validating,
    /// Obtaining a frame, by allocation or by eviction.
    Resolving,
    /// Filling the frame with the contents of the page.
    Loading,
    /// The page is mapped. Terminal.
    Mapped,
    /// The fault is invalid. Terminal.
    Rejected,
}

impl FaultState {
    /// Returns `true` if a fault may move from `self` to `next`.
    pub fn can_advance_to(self, next: FaultState) -> bool {
        matches!(
            (self, next),
            (FaultState::Validating, FaultState::Resolving)
                | (FaultState::Validating, FaultState::Rejected)
                | (FaultState::Resolving, FaultState::Loading)
                | (FaultState::Loading, FaultState::Mapped)
        )
    }
}

/// The reason of a page fault, as reported by the fault delivery
/// collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageFaultReason {
    /// The faulting process.
    pub pid: Pid,
    /// The address that caused the fault.
    pub fault_addr: Va,
    /// The kind of the faulting access.
    pub access: AccessKind,
}

impl PageFaultReason {
    /// Creates a fault reason.
    pub fn new(pid: Pid, fault_addr: Va, access: AccessKind) -> Self {
        Self {
            pid,
            fault_addr,
            access,
        }
    }
}

/// The outcome of a resolved page fault.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resolution {
    /// The frame holding the page.
    pub frame: FrameNumber,
    /// The physical address of the faulting byte.
    pub pa: Pa,
    /// `true` if this fault filled the frame; `false` if the page was
    /// already present, for example because a concurrent fault resolved it.
    pub loaded: bool,
}

/// The answer handed back to the fault delivery collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultSignal {
    /// Retry the faulting access.
    Resume(Resolution),
    /// Terminate the faulting process.
    Fatal(VmError),
}

impl From<Result<Resolution, VmError>> for FaultSignal {
    fn from(r: Result<Resolution, VmError>) -> Self {
        match r {
            Ok(resolution) => FaultSignal::Resume(resolution),
            Err(e) => FaultSignal::Fatal(e),
        }
    }
}

// Progress of a single fault, logging every transition.
pub(crate) struct FaultProgress<'a> {
    reason: &'a PageFaultReason,
    state: FaultState,
}

impl<'a> FaultProgress<'a> {
    pub(crate) fn new(reason: &'a PageFaultReason) -> Self {
        log::debug!(
            "fault {} {} ({:?}): {:?}",
            reason.pid,
            reason.fault_addr,
            reason.access,
            FaultState::Validating
        );
        Self {
            reason,
            state: FaultState::Validating,
        }
    }

    pub(crate) fn advance(&mut self, next: FaultState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal fault transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!(
            "fault {} {}: {:?} -> {:?}",
            self.reason.pid,
            self.reason.fault_addr,
            self.state,
            next
        );
        self.state = next;
    }

    pub(crate) fn reject(&mut self, e: VmError) -> VmError {
        self.advance(FaultState::Rejected);
        log::warn!(
            "fault {} {} ({:?}) rejected: {}",
            self.reason.pid,
            self.reason.fault_addr,
            self.reason.access,
            e
        );
        e
    }

    pub(crate) fn fail(&self, e: VmError) -> VmError {
        log::warn!(
            "fault {} {} failed while {:?}: {}",
            self.reason.pid,
            self.reason.fault_addr,
            self.state,
            e
        );
        e
    }
}
