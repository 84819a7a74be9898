//! Identity of processes and their pages.

use crate::addressing::Vpn;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A process identifier.
///
/// A [`Pid`] names one address space. Identifiers are handed out by the
/// manager when an address space is created and are never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Pid(pub usize);

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// A virtual page of a specific process.
///
/// This is the key of the backing store and of the frame reverse index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct PageKey {
    /// The owning process.
    pub pid: Pid,
    /// The page inside the owner's address space.
    pub vpn: Vpn,
}

impl PageKey {
    /// Creates a key for page `vpn` of process `pid`.
    #[inline]
    pub const fn new(pid: Pid, vpn: Vpn) -> Self {
        Self { pid, vpn }
    }
}

/// The kind of memory access that touched a page.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum AccessKind {
    /// The access reads the page.
    Read = 0,
    /// The access writes the page.
    Write = 1,
}

impl AccessKind {
    /// Returns `true` for a write access.
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, AccessKind::Write)
    }
}
