//! # Page Replacement
//!
//! When a page fault finds no free frame, some resident page must leave
//! physical memory to make room. The [`ReplacementPolicy`] decides which
//! one. The choice matters: evicting a page that is about to be used again
//! causes another fault right away, and a system that keeps evicting its
//! working set spends its time moving pages instead of running processes
//! (thrashing).
//!
//! The manager informs the policy of every event that changes the
//! residency or the recency of a frame, and asks it for a victim among the
//! frames that are currently mapped:
//!
//! ```text
//!   fault resolved ------> on_load(frame, page)
//!   access to a page ----> on_access(frame, kind)
//!   frame leaves --------> on_evict(frame)
//!   no free frame -------> select_victim(candidates) -> frame
//! ```
//!
//! Candidates are always frames the policy was told about through
//! [`ReplacementPolicy::on_load`], but a policy must still answer with one of
//! the given candidates even if it knows nothing about them. Frames that are
//! being loaded or evicted are never offered as candidates.
//!
//! ## Policies
//!
//! | Policy            | Victim                                   | State            |
//! |-------------------|------------------------------------------|------------------|
//! | [`FifoPolicy`]    | page loaded first                        | load order       |
//! | [`LruPolicy`]     | page accessed least recently             | access order     |
//! | [`ClockPolicy`]   | first unreferenced page after the hand   | reference bits   |
//! | [`OptimalPolicy`] | page used furthest in the future         | reference trace  |
//!
//! All policies break ties by the lowest frame number, which keeps every
//! simulation deterministic.

mod clock;
mod fifo;
mod lru;
mod optimal;
mod recency;

pub use clock::ClockPolicy;
pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use optimal::OptimalPolicy;
pub use recency::RecencyList;

use vmm::{
    VmError,
    addressing::FrameNumber,
    config::PolicyKind,
    task::{AccessKind, PageKey},
};

/// A strategy selecting the frame to evict.
pub trait ReplacementPolicy
where
    Self: Send,
{
    /// The name of the policy, as accepted on the command line.
    fn name(&self) -> &'static str;

    /// Called when `page` has been loaded into `frame` and mapped.
    fn on_load(&mut self, frame: FrameNumber, page: PageKey);

    /// Called when the page in `frame` is accessed.
    fn on_access(&mut self, frame: FrameNumber, access: AccessKind);

    /// Called when `frame` stops holding its page, by eviction or by the
    /// destruction of the owning address space.
    fn on_evict(&mut self, frame: FrameNumber);

    /// Selects the victim among `candidates`.
    ///
    /// # Parameters
    /// - `candidates`: The frames that may be evicted. The order carries no
    ///   meaning.
    ///
    /// # Returns
    /// - `Ok(FrameNumber)`, one of the candidates.
    /// - `Err(VmError::NoCandidates)` if `candidates` is empty.
    fn select_victim(&mut self, candidates: &[FrameNumber]) -> Result<FrameNumber, VmError>;
}

/// Builds the policy selected by `kind`.
///
/// # Returns
/// - `Ok(policy)` for FIFO, LRU and Clock.
/// - `Err(VmError::InvalidArgument)` for Optimal, which needs the reference
///   trace; build it with [`OptimalPolicy::new`] instead.
pub fn build(kind: PolicyKind) -> Result<Box<dyn ReplacementPolicy>, VmError> {
    match kind {
        PolicyKind::Fifo => Ok(Box::new(FifoPolicy::new())),
        PolicyKind::Lru => Ok(Box::new(LruPolicy::new())),
        PolicyKind::Clock => Ok(Box::new(ClockPolicy::new())),
        PolicyKind::Optimal => {
            log::warn!("replacement: optimal policy requires a reference trace");
            Err(VmError::InvalidArgument)
        }
    }
}
