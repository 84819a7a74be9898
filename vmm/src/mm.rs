//! Page contents and page permissions.
//!
//! A [`Page`] is an owned buffer holding the contents of exactly one page.
//! It is the unit of transfer between physical memory and the backing store:
//! the backing store returns a [`Page`] when a page is loaded, and receives
//! a reference to one when a dirty page is written back.
//!
//! A [`Permission`] describes which kinds of access a virtual page accepts.
//! Permissions are fixed when the address space is created and survive
//! eviction, so a page that is read-only before it is evicted is read-only
//! after it is loaded again.

use crate::{addressing::PageSize, task::AccessKind};

/// The contents of a single page.
///
/// The buffer length always equals the page size it was created with.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    inner: Box<[u8]>,
}

impl Page {
    /// Allocates a zero-filled page.
    pub fn new(size: PageSize) -> Self {
        Self {
            inner: vec![0; size.bytes()].into_boxed_slice(),
        }
    }

    /// Creates a page holding `bytes`.
    ///
    /// Shorter inputs are padded with zeros and longer inputs are truncated
    /// to the page size.
    pub fn from_bytes(size: PageSize, bytes: &[u8]) -> Self {
        let mut page = Self::new(size);
        let len = bytes.len().min(size.bytes());
        page.inner[..len].copy_from_slice(&bytes[..len]);
        page
    }

    /// The number of bytes in the page.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the page holds no byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the contents of the page.
    #[inline]
    pub fn inner(&self) -> &[u8] {
        &self.inner
    }

    /// Returns the mutable contents of the page.
    #[inline]
    pub fn inner_mut(&mut self) -> &mut [u8] {
        &mut self.inner
    }

    /// Overwrites the whole page with zeros.
    pub fn zero(&mut self) {
        self.inner.fill(0);
    }
}

impl core::fmt::Debug for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let head = &self.inner[..self.inner.len().min(8)];
        f.debug_struct("Page")
            .field("len", &self.inner.len())
            .field("head", &head)
            .finish()
    }
}

bitflags::bitflags! {
    /// Memory permission of a virtual page.
    ///
    /// Every page that is part of an address space is readable. A page
    /// without [`Permission::WRITE`] rejects write accesses with
    /// [`VmError::SegmentationFault`].
    ///
    /// [`VmError::SegmentationFault`]: crate::VmError::SegmentationFault
    pub struct Permission: usize {
        /// Page is readable.
        const READ = 1 << 0;
        /// Page is writable.
        const WRITE = 1 << 1;
    }
}

impl Permission {
    /// Returns `true` if an access of kind `access` is permitted.
    #[inline]
    pub fn allows(&self, access: AccessKind) -> bool {
        match access {
            AccessKind::Read => self.contains(Permission::READ),
            AccessKind::Write => self.contains(Permission::WRITE),
        }
    }
}
