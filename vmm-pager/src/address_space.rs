//! # Address Space
//!
//! An [`AddressSpace`] is the view of memory of one process: a page table
//! with one entry per virtual page, and the set of pages whose resolution is
//! in flight.
//!
//! ## Layout
//!
//! A process declares the size of its address space in pages when it is
//! created. By default every page is anonymous and readable and writable.
//! An [`AddressSpaceLayout`] refines this, much like the memory areas of a
//! process in a conventional kernel: each region is a range of pages sharing
//! one [`Permission`] and one [`Backing`].
//!
//! ```text
//!  vpn 0        4            8                16
//!      +--------+------------+-----------------+
//!      | code   | data       | heap / stack    |
//!      | R, F   | R W, F     | R W, anonymous  |
//!      +--------+------------+-----------------+
//! ```
//!
//! A file-backed page is loaded from the backing store on its first touch,
//! while an anonymous page is zero-filled until it is written back once.
//!
//! ## Pending Resolution
//!
//! While a page is being loaded, or while the dirty contents of an evicted
//! page are being written back, the page carries a pending marker. A fault
//! on a page with a marker does not start another resolution; it sleeps on
//! the marker's [`WaitQueue`] and looks at the page table again once it is
//! woken up.

use std::{collections::BTreeMap, ops::Range};
use vmm::{
    VmError,
    addressing::Vpn,
    mm::Permission,
    sync::{SpinLock, WaitQueue},
    task::Pid,
};

use crate::page_table::{PageTable, Pte};

/// Where the contents of a page come from before it is first written back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backing {
    /// Zero-filled on the first touch.
    Anonymous,
    /// Loaded from the backing store on every fault, including the first
    /// one.
    File,
}

/// A range of pages sharing the same permission and backing.
#[derive(Clone, Debug)]
pub struct Region {
    /// The pages covered by the region.
    pub pages: Range<usize>,
    /// The permission of the pages.
    pub permission: Permission,
    /// The source of the pages.
    pub backing: Backing,
}

/// The declared shape of an address space.
#[derive(Clone, Debug)]
pub struct AddressSpaceLayout {
    page_count: usize,
    regions: Vec<Region>,
}

impl AddressSpaceLayout {
    /// Declares an address space of `page_count` anonymous read-write pages.
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            regions: Vec::new(),
        }
    }

    /// Declares a region. Later regions override earlier ones.
    pub fn region(mut self, pages: Range<usize>, permission: Permission, backing: Backing) -> Self {
        self.regions.push(Region {
            pages,
            permission,
            backing,
        });
        self
    }

    /// The number of pages of the address space.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Builds the initial page table entries.
    ///
    /// # Returns
    /// - `Ok(entries)`, one absent entry per page.
    /// - `Err(VmError::InvalidArgument)` if the address space is empty, or a
    ///   region is empty, out of bounds, or not readable.
    pub fn entries(&self) -> Result<Vec<Pte>, VmError> {
        if self.page_count == 0 {
            return Err(VmError::InvalidArgument);
        }
        let mut entries = vec![
            Pte::new(Permission::READ | Permission::WRITE, false);
            self.page_count
        ];
        for region in self.regions.iter() {
            if region.pages.is_empty()
                || region.pages.end > self.page_count
                || !region.permission.contains(Permission::READ)
            {
                log::warn!("layout: rejecting region {:?}", region);
                return Err(VmError::InvalidArgument);
            }
            let pte = Pte::new(region.permission, region.backing == Backing::File);
            entries[region.pages.clone()].fill(pte);
        }
        Ok(entries)
    }
}

pub(crate) struct AddressSpaceInner {
    pub(crate) page_table: PageTable,
    pub(crate) pending: BTreeMap<Vpn, WaitQueue>,
    pub(crate) alive: bool,
}

/// The address space of a single process.
pub struct AddressSpace {
    pid: Pid,
    page_count: usize,
    pub(crate) inner: SpinLock<AddressSpaceInner>,
}

impl AddressSpace {
    pub(crate) fn new(pid: Pid, entries: Vec<Pte>) -> Self {
        Self {
            pid,
            page_count: entries.len(),
            inner: SpinLock::new(AddressSpaceInner {
                page_table: PageTable::from_entries(entries),
                pending: BTreeMap::new(),
                alive: true,
            }),
        }
    }

    /// The process owning this address space.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The declared number of pages.
    pub fn page_count(&self) -> usize {
        self.page_count
    }
}
