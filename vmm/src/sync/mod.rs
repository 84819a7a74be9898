//! Synchronization primitives.
//!
//! - [`SpinLock`]: short critical sections over shared state. Guards are
//!   released explicitly with [`SpinLockGuard::unlock`].
//! - [`WaitQueue`]: threads that sleep until an event, such as a page load
//!   finishing or a frame becoming free.

pub mod spinlock;
pub mod wait_queue;

pub use spinlock::{SpinLock, SpinLockGuard, WouldBlock};
pub use wait_queue::{ParkHandle, WaitQueue};
