//! # Page Table
//!
//! A [`PageTable`] translates the virtual pages of one address space into
//! physical frames. It is a single flat array with one [`Pte`] per virtual
//! page of the address space, indexed by [`Vpn`]:
//!
//! ```text
//!   vpn        Pte
//!  +-----+----------------------------------+
//!  |  0  | frame 2 | P A     R RW           |  present, referenced
//!  |  1  |    -    |         R RW   S       |  evicted, copy on store
//!  |  2  | frame 0 | P A D   R RW           |  present, dirty
//!  |  3  |    -    |         R        F     |  file-backed, never loaded
//!  +-----+----------------------------------+
//! ```
//!
//! Every address space owns its table, so one process can never observe the
//! entries of another one.
//!
//! ## Page Table Entry
//!
//! A [`Pte`] packs the frame number and the state of the page into a single
//! word, so that copying an entry always yields a consistent
//! `(present, frame)` pair:
//!
//! ```text
//! 63                          12 11  10  9  8  7  6  5  4  3  2  1  0
//! +------------------------------+---+---+---+--------+--+--+-----+--+--+--+
//! |        Frame Number          |   | S | F |        | D| A|     | R|RW| P|
//! +------------------------------+---+---+---+--------+--+--+-----+--+--+--+
//! ```
//!
//! The frame number is meaningful only while `P` is set. The permission bits
//! (`R`, `RW`) and the file-backed bit (`F`) are decided when the address
//! space is created. `S` is set once the contents of the page have been
//! written to the backing store, and from then on the page is loaded from the
//! store instead of being zero-filled. All three survive eviction.
//!
//! ## Lifecycle
//!
//! An entry is created absent. The fault handler makes it present with
//! [`PageTable::map`], and eviction makes it absent again with
//! [`PageTable::unmap`]. Accesses set `A` and, for writes, `D` through
//! [`PageTable::mark_referenced`] and [`PageTable::mark_dirty`].

use vmm::{
    VmError,
    addressing::{FrameNumber, Pa, PageSize, Vpn},
    mm::Permission,
    task::AccessKind,
};

bitflags::bitflags! {
    /// Flags of a page table entry.
    pub struct PteFlags: usize {
        /// Present; the page is mapped to the frame stored in the entry.
        const P = 1 << 0;
        /// Read/write; if 0, writes are not allowed to the page.
        const RW = 1 << 1;
        /// Readable; set for every page that belongs to the address space.
        const R = 1 << 2;
        /// Accessed; the page has been referenced since it was mapped.
        const A = 1 << 5;
        /// Dirty; the page has been written since it was mapped.
        const D = 1 << 6;
        /// File-backed; the contents come from the backing store even on the
        /// first touch.
        const F = 1 << 9;
        /// Stored; the backing store holds a copy of the page.
        const S = 1 << 10;
    }
}

/// Flags that survive an unmap.
const STICKY: PteFlags = PteFlags::from_bits_truncate(
    PteFlags::R.bits() | PteFlags::RW.bits() | PteFlags::F.bits() | PteFlags::S.bits(),
);

const FRAME_SHIFT: usize = 12;

/// A page table entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Pte(usize);

impl Pte {
    /// An absent entry with the given permission.
    ///
    /// A permission without [`Permission::READ`] yields an entry that
    /// rejects every access.
    pub const fn new(permission: Permission, file_backed: bool) -> Self {
        let mut bits = 0;
        if permission.contains(Permission::READ) {
            bits |= PteFlags::R.bits();
            if permission.contains(Permission::WRITE) {
                bits |= PteFlags::RW.bits();
            }
        }
        if file_backed {
            bits |= PteFlags::F.bits();
        }
        Self(bits)
    }

    /// Get the flags of this entry.
    #[inline]
    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Returns `true` if the page is mapped to a frame.
    #[inline]
    pub const fn present(&self) -> bool {
        self.flags().contains(PteFlags::P)
    }

    /// Get the frame this entry maps to.
    ///
    /// # Returns
    /// - `Some(FrameNumber)` if the entry is present.
    /// - `None` otherwise.
    #[inline]
    pub const fn frame(&self) -> Option<FrameNumber> {
        if self.present() {
            Some(FrameNumber(self.0 >> FRAME_SHIFT))
        } else {
            None
        }
    }

    /// Returns `true` if the page has been written since it was mapped.
    #[inline]
    pub const fn dirty(&self) -> bool {
        self.flags().contains(PteFlags::D)
    }

    /// Returns `true` if the page has been referenced since it was mapped.
    #[inline]
    pub const fn referenced(&self) -> bool {
        self.flags().contains(PteFlags::A)
    }

    /// Returns `true` if the backing store holds a copy of the page.
    #[inline]
    pub const fn on_backing_store(&self) -> bool {
        self.flags().contains(PteFlags::S)
    }

    /// Returns `true` if the page is backed by a file mapping.
    #[inline]
    pub const fn file_backed(&self) -> bool {
        self.flags().contains(PteFlags::F)
    }

    /// Returns `true` if the first touch of the page must load it from the
    /// backing store instead of zero-filling it.
    #[inline]
    pub const fn needs_load(&self) -> bool {
        self.on_backing_store() || self.file_backed()
    }

    /// The memory permission of the page.
    pub fn permission(&self) -> Permission {
        let mut permission = Permission::empty();
        if self.flags().contains(PteFlags::R) {
            permission |= Permission::READ;
        }
        if self.flags().contains(PteFlags::RW) {
            permission |= Permission::WRITE;
        }
        permission
    }

    /// Checks whether an access of kind `access` is permitted.
    ///
    /// # Returns
    /// - `Ok(())` if the access is permitted.
    /// - `Err(VmError::SegmentationFault)` otherwise.
    pub fn check(&self, access: AccessKind) -> Result<(), VmError> {
        if self.permission().allows(access) {
            Ok(())
        } else {
            Err(VmError::SegmentationFault)
        }
    }

    /// Composes the physical address of the byte at `offset` in this page.
    ///
    /// # Returns
    /// - `Some(Pa)` if the entry is present.
    /// - `None` otherwise.
    pub fn pa(&self, offset: usize, page_size: PageSize) -> Option<Pa> {
        self.frame().map(|frame| page_size.pa(frame, offset))
    }

    fn set_flags(&mut self, flags: PteFlags) {
        self.0 |= flags.bits();
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.frame() {
            Some(frame) => write!(f, "Pte({:?}, {:?})", frame, self.flags()),
            None => write!(f, "Pte(-, {:?})", self.flags()),
        }
    }
}

/// A flat page table.
#[derive(Clone, Debug)]
pub struct PageTable {
    entries: Vec<Pte>,
}

impl PageTable {
    /// Creates a table of `page_count` absent, anonymous, read-write entries.
    pub fn new(page_count: usize) -> Self {
        Self {
            entries: vec![Pte::new(Permission::READ | Permission::WRITE, false); page_count],
        }
    }

    /// Creates a table from prepared entries.
    ///
    /// Present bits in `entries` are dropped.
    pub fn from_entries(entries: Vec<Pte>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|pte| Pte(pte.0 & STICKY.bits()))
                .collect(),
        }
    }

    /// The number of virtual pages covered by the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table covers no page.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_mut(&mut self, vpn: Vpn) -> Result<&mut Pte, VmError> {
        self.entries.get_mut(vpn.0).ok_or(VmError::InvalidPage)
    }

    /// Looks up the entry of `vpn`.
    ///
    /// # Returns
    /// - `Ok(Pte)`, a copy of the entry, which may be absent.
    /// - `Err(VmError::InvalidPage)` if `vpn` is beyond the table.
    pub fn translate(&self, vpn: Vpn) -> Result<Pte, VmError> {
        self.entries.get(vpn.0).copied().ok_or(VmError::InvalidPage)
    }

    /// Maps `vpn` to `frame`.
    ///
    /// The entry becomes present with the dirty and referenced bits cleared.
    ///
    /// # Returns
    /// - `Ok(())` on success.
    /// - `Err(VmError::InvalidPage)` if `vpn` is beyond the table.
    /// - `Err(VmError::AlreadyMapped)` if the entry is already present.
    pub fn map(&mut self, vpn: Vpn, frame: FrameNumber) -> Result<(), VmError> {
        let pte = self.get_mut(vpn)?;
        if pte.present() {
            return Err(VmError::AlreadyMapped);
        }
        *pte = Pte((frame.0 << FRAME_SHIFT) | (pte.0 & STICKY.bits()) | PteFlags::P.bits());
        Ok(())
    }

    /// Unmaps `vpn`.
    ///
    /// The entry becomes absent; its permission, file-backed and stored bits
    /// are kept.
    ///
    /// # Returns
    /// - `Ok(Pte)` holding the previous entry. It is absent if the page was
    ///   not mapped.
    /// - `Err(VmError::InvalidPage)` if `vpn` is beyond the table.
    pub fn unmap(&mut self, vpn: Vpn) -> Result<Pte, VmError> {
        let pte = self.get_mut(vpn)?;
        let prev = *pte;
        *pte = Pte(prev.0 & STICKY.bits());
        Ok(prev)
    }

    fn mark_present(&mut self, vpn: Vpn, flags: PteFlags) -> Result<(), VmError> {
        let pte = self.get_mut(vpn)?;
        if !pte.present() {
            return Err(VmError::InvalidArgument);
        }
        pte.set_flags(flags);
        Ok(())
    }

    /// Sets the dirty (and referenced) bit of a present entry.
    ///
    /// # Returns
    /// - `Err(VmError::InvalidPage)` if `vpn` is beyond the table.
    /// - `Err(VmError::InvalidArgument)` if the entry is absent.
    pub fn mark_dirty(&mut self, vpn: Vpn) -> Result<(), VmError> {
        self.mark_present(vpn, PteFlags::D | PteFlags::A)
    }

    /// Sets the referenced bit of a present entry.
    ///
    /// # Returns
    /// - `Err(VmError::InvalidPage)` if `vpn` is beyond the table.
    /// - `Err(VmError::InvalidArgument)` if the entry is absent.
    pub fn mark_referenced(&mut self, vpn: Vpn) -> Result<(), VmError> {
        self.mark_present(vpn, PteFlags::A)
    }

    /// Records that the backing store holds a copy of `vpn`.
    pub fn mark_on_backing_store(&mut self, vpn: Vpn) -> Result<(), VmError> {
        self.get_mut(vpn)?.set_flags(PteFlags::S);
        Ok(())
    }

    /// Unmaps every present entry.
    ///
    /// # Returns
    /// The pages that were mapped, with the frames they were mapped to.
    pub fn clear(&mut self) -> Vec<(Vpn, FrameNumber)> {
        let mut mapped = Vec::new();
        for (vpn, pte) in self.entries.iter_mut().enumerate() {
            if let Some(frame) = pte.frame() {
                mapped.push((Vpn(vpn), frame));
            }
            *pte = Pte(pte.0 & STICKY.bits());
        }
        mapped
    }

    /// Iterates over the present entries.
    pub fn present(&self) -> impl Iterator<Item = (Vpn, Pte)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, pte)| pte.present())
            .map(|(vpn, pte)| (Vpn(vpn), *pte))
    }
}
