//! Queue of sleeping threads.
//!
//! A [`WaitQueue`] holds the [`ParkHandle`]s of the threads sleeping on an
//! event, in arrival order. It does not protect itself: it is always stored
//! inside the state it waits on, behind the [`SpinLock`] that guards that
//! state. A waiter registers while holding that lock, releases the lock, and
//! then parks:
//!
//! ```text
//! let mut guard = state.lock();
//! let parker = guard.waiters.register();
//! guard.unlock();
//! parker.park();
//! ```
//!
//! A waker removes handles under the same lock. A wake-up delivered between
//! `unlock` and `park` is not lost, because a [`Parker`] remembers a pending
//! unpark token.
//!
//! [`SpinLock`]: super::SpinLock

use std::collections::VecDeque;

use crossbeam_utils::sync::{Parker, Unparker};

/// A handle to wake up a parked thread.
pub struct ParkHandle {
    unparker: Unparker,
}

impl ParkHandle {
    /// Wakes up the thread that owns this handle.
    pub fn unpark(self) {
        self.unparker.unpark();
    }
}

/// FIFO queue of sleeping threads.
#[derive(Default)]
pub struct WaitQueue {
    handles: VecDeque<ParkHandle>,
}

impl WaitQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            handles: VecDeque::new(),
        }
    }

    /// Registers the current thread as a waiter.
    ///
    /// # Returns
    /// The [`Parker`] the caller must park on after releasing the lock that
    /// protects this queue.
    pub fn register(&mut self) -> Parker {
        let parker = Parker::new();
        self.handles.push_back(ParkHandle {
            unparker: parker.unparker().clone(),
        });
        parker
    }

    /// Wakes up the oldest waiter.
    ///
    /// # Returns
    /// `true` if a waiter was woken.
    pub fn wake_one(&mut self) -> bool {
        match self.handles.pop_front() {
            Some(handle) => {
                handle.unpark();
                true
            }
            None => false,
        }
    }

    /// Wakes up every waiter.
    ///
    /// # Returns
    /// The number of woken waiters.
    pub fn wake_all(&mut self) -> usize {
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            handle.unpark();
        }
        count
    }

    /// The number of sleeping threads.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no thread is sleeping.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl core::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitQueue")
            .field("waiters", &self.handles.len())
            .finish()
    }
}
