//! Reverse index from physical frames to the pages they hold.
//!
//! The replacement policy chooses a victim by frame, but eviction must
//! update the page table entry of the page in that frame. The [`FrameTable`]
//! records the owner of every frame so that the victim's page is found
//! without walking every page table.
//!
//! ```text
//!   frame   state
//!     0     Mapped(pid 1, vpn 4)
//!     1     Reserved { owner: (pid 2, vpn 0), victim: Some((pid 1, vpn 2)) }
//!     2     Free
//! ```
//!
//! A `Reserved` frame belongs to exactly one fault in flight. It is never
//! offered to the replacement policy and never freed by anyone else, so the
//! write back of its victim cannot be interrupted.

use vmm::{addressing::FrameNumber, sync::WaitQueue, task::PageKey};

/// The state of a physical frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameState {
    /// The frame is in the allocator's free set.
    Free,
    /// The frame is held by the fault resolving `owner`. If the frame was
    /// taken by eviction, `victim` is the page it held before.
    Reserved {
        /// The page being loaded into the frame.
        owner: PageKey,
        /// The page evicted from the frame, if any.
        victim: Option<PageKey>,
    },
    /// The frame holds the page, which is present in its owner's page table.
    Mapped(PageKey),
}

pub(crate) struct FrameTable {
    pub(crate) states: Vec<FrameState>,
    // Faults waiting for a frame to become mapped or free.
    pub(crate) waiters: WaitQueue,
}

impl FrameTable {
    pub(crate) fn new(frame_count: usize) -> Self {
        Self {
            states: vec![FrameState::Free; frame_count],
            waiters: WaitQueue::new(),
        }
    }

    pub(crate) fn state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.states.get(frame.0).copied()
    }

    pub(crate) fn set(&mut self, frame: FrameNumber, state: FrameState) {
        if let Some(slot) = self.states.get_mut(frame.0) {
            *slot = state;
        }
    }

    /// Frames that may be evicted.
    pub(crate) fn candidates(&self) -> Vec<FrameNumber> {
        self.mapped().map(|(frame, _)| frame).collect()
    }

    pub(crate) fn mapped(&self) -> impl Iterator<Item = (FrameNumber, PageKey)> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(frame, state)| match state {
                FrameState::Mapped(key) => Some((FrameNumber(frame), *key)),
                _ => None,
            })
    }
}
