//! # VMM: the vocabulary of a demand-paging virtual memory manager
//!
//! This crate provides the building blocks shared by every part of the
//! virtual memory manager implemented in the `vmm-pager` crate. It does not
//! make any paging decision by itself. Instead, it defines what an address
//! is, what a page is, who owns a page, how the components synchronize, and
//! how a failure is reported.
//!
//! ## Crate Structure
//!
//! - [`addressing`]: Virtual and physical addresses ([`Va`], [`Pa`]), the
//!   page and frame numbers they decompose into ([`Vpn`], [`FrameNumber`]),
//!   and the page geometry ([`PageSize`]).
//! - [`mm`]: The contents of a single page ([`Page`]) and the memory
//!   permissions of a virtual page ([`Permission`]).
//! - [`task`]: Identity of a process ([`Pid`]), of one of its pages
//!   ([`PageKey`]), and the kind of a memory access ([`AccessKind`]).
//! - [`config`]: The system-wide configuration ([`VmConfig`]) and the
//!   replacement policy selector ([`PolicyKind`]).
//! - [`sync`]: The [`SpinLock`] protecting shared state, and the
//!   [`WaitQueue`] that sleeping faults are parked on.
//!
//! ## Error Handling
//!
//! Every fallible operation of the manager returns a [`VmError`]. An
//! ordinary page fault is never an error: it is resolved inside the fault
//! handler by loading the page and, if required, evicting another one. A
//! [`VmError`] therefore always means that the operation cannot be
//! completed for the requesting process, and is delivered to the
//! collaborator that issued it as a terminal signal for that process. The
//! manager itself never brings the whole system down.
//!
//! [`Va`]: addressing::Va
//! [`Pa`]: addressing::Pa
//! [`Vpn`]: addressing::Vpn
//! [`FrameNumber`]: addressing::FrameNumber
//! [`PageSize`]: addressing::PageSize
//! [`Page`]: mm::Page
//! [`Permission`]: mm::Permission
//! [`Pid`]: task::Pid
//! [`PageKey`]: task::PageKey
//! [`AccessKind`]: task::AccessKind
//! [`VmConfig`]: config::VmConfig
//! [`PolicyKind`]: config::PolicyKind
//! [`SpinLock`]: sync::SpinLock
//! [`WaitQueue`]: sync::WaitQueue

#![deny(rustdoc::broken_intra_doc_links)]

pub mod addressing;
pub mod config;
pub mod mm;
pub mod sync;
pub mod task;

/// Enum representing errors that can occur during a virtual memory
/// operation.
///
/// Each variant corresponds to a specific failure that the virtual memory
/// manager reports to its caller. Like the error numbers of a kernel, every
/// variant has a stable negative code (see [`VmError::into_usize`]) so that
/// the fault-delivery collaborator can hand it to the faulting process.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VmError {
    /// The virtual page lies outside the declared size of the address
    /// space. (EFAULT)
    InvalidPage,
    /// The access kind is not permitted on the page. The fault is fatal to
    /// the faulting process and never retried. (EACCES)
    SegmentationFault,
    /// No free frame is available, or the system is configured with zero
    /// frames. (ENOMEM)
    OutOfFrames,
    /// A victim was requested from an empty candidate set. (EAGAIN)
    NoCandidates,
    /// The backing store holds no copy of a page that is not eligible for
    /// zero-fill. (ENOENT)
    NotFound,
    /// A frame was freed while it was already free. (EALREADY)
    DoubleFree,
    /// A page table entry was mapped while it was already present. (EEXIST)
    AlreadyMapped,
    /// No address space exists for the process. (ESRCH)
    NoSuchAddressSpace,
    /// Invalid argument, such as a malformed configuration or an out of
    /// range frame number. (EINVAL)
    InvalidArgument,
}

impl VmError {
    /// Converts the [`VmError`] enum into a corresponding `usize` error
    /// code. The result is cast to `usize` for use as a return value
    /// delivered to the faulting process.
    pub fn into_usize(self) -> usize {
        (match self {
            VmError::NotFound => -2isize,
            VmError::NoSuchAddressSpace => -3,
            VmError::NoCandidates => -11,
            VmError::OutOfFrames => -12,
            VmError::SegmentationFault => -13,
            VmError::InvalidPage => -14,
            VmError::AlreadyMapped => -17,
            VmError::InvalidArgument => -22,
            VmError::DoubleFree => -114,
        }) as usize
    }
}

/// The given `isize` does not indicate an [`VmError`].
#[derive(Debug, Eq, PartialEq)]
pub struct TryFromError {
    e: isize,
}

impl TryFrom<isize> for VmError {
    type Error = TryFromError;

    fn try_from(value: isize) -> Result<Self, Self::Error> {
        match value {
            -2 => Ok(Self::NotFound),
            -3 => Ok(Self::NoSuchAddressSpace),
            -11 => Ok(Self::NoCandidates),
            -12 => Ok(Self::OutOfFrames),
            -13 => Ok(Self::SegmentationFault),
            -14 => Ok(Self::InvalidPage),
            -17 => Ok(Self::AlreadyMapped),
            -22 => Ok(Self::InvalidArgument),
            -114 => Ok(Self::DoubleFree),
            e => Err(TryFromError { e }),
        }
    }
}

impl core::fmt::Display for VmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            VmError::InvalidPage => "virtual page out of address space bounds",
            VmError::SegmentationFault => "access not permitted",
            VmError::OutOfFrames => "out of physical frames",
            VmError::NoCandidates => "no eviction candidates",
            VmError::NotFound => "page not found on backing store",
            VmError::DoubleFree => "frame is already free",
            VmError::AlreadyMapped => "page is already mapped",
            VmError::NoSuchAddressSpace => "no such address space",
            VmError::InvalidArgument => "invalid argument",
        })
    }
}

impl std::error::Error for VmError {}
