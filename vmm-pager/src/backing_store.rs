//! # Backing Store Adapter
//!
//! Physical memory holds only a subset of the pages of all processes. The
//! rest lives on a **backing store**, the swap area or the file a region is
//! mapped from. The virtual memory manager does not know how the store is
//! laid out; it only reads and writes whole pages through the
//! [`BackingStore`] trait, keyed by the owning process and the virtual page
//! number ([`PageKey`]).
//!
//! The manager talks to the store at exactly two points:
//! - When a page is faulted in, it is loaded from the store if the store
//!   holds a copy, or if the page is backed by a file. A page that has never
//!   been written out and is not file-backed is zero-filled instead, without
//!   touching the store.
//! - When a dirty page is evicted, its current contents are written to the
//!   store before the frame is reused. A clean page is dropped without a
//!   write, because the store (or the zero-fill rule) already reproduces it.
//!
//! [`MemoryBackingStore`] keeps the pages in memory. It stands in for a disk
//! in simulations and tests, and lets the collaborator that sets up file
//! mappings supply their contents with [`MemoryBackingStore::populate`].

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};
use vmm::{
    VmError,
    addressing::{PageSize, Vpn},
    mm::Page,
    sync::SpinLock,
    task::{PageKey, Pid},
};

/// Page-granular storage for pages that are not resident.
pub trait BackingStore
where
    Self: Send + Sync,
{
    /// Reads the stored copy of a page.
    ///
    /// # Parameters
    /// - `key`: The page to read.
    ///
    /// # Returns
    /// - `Ok(Page)` holding the stored contents.
    /// - `Err(VmError::NotFound)` if the store holds no copy of the page.
    fn load(&self, key: PageKey) -> Result<Page, VmError>;

    /// Writes the contents of a page.
    ///
    /// Storing the same page twice overwrites the previous copy.
    ///
    /// # Parameters
    /// - `key`: The page to write.
    /// - `page`: The contents of the page.
    fn store(&self, key: PageKey, page: &Page);

    /// Discards every page of a destroyed process.
    fn release(&self, _pid: Pid) {}
}

/// A [`BackingStore`] that keeps the pages in memory.
pub struct MemoryBackingStore {
    page_size: PageSize,
    slots: SpinLock<BTreeMap<PageKey, Page>>,
    loads: AtomicUsize,
    stores: AtomicUsize,
}

impl MemoryBackingStore {
    /// Creates an empty store holding pages of `page_size`.
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            slots: SpinLock::new(BTreeMap::new()),
            loads: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        }
    }

    /// Supplies the contents of a page, such as a page of a mapped file.
    ///
    /// `bytes` is padded with zeros or truncated to the page size. This is
    /// not counted as a store.
    pub fn populate(&self, key: PageKey, bytes: &[u8]) {
        let page = Page::from_bytes(self.page_size, bytes);
        let mut slots = self.slots.lock();
        slots.insert(key, page);
        slots.unlock();
    }

    /// Returns a copy of the stored contents of a page, without counting a
    /// load.
    pub fn contents(&self, key: PageKey) -> Option<Page> {
        let slots = self.slots.lock();
        let page = slots.get(&key).cloned();
        slots.unlock();
        page
    }

    /// Returns `true` if the store holds a copy of the page.
    pub fn contains(&self, key: PageKey) -> bool {
        let slots = self.slots.lock();
        let found = slots.contains_key(&key);
        slots.unlock();
        found
    }

    /// The number of pages held for `pid`.
    pub fn pages_of(&self, pid: Pid) -> usize {
        let slots = self.slots.lock();
        let count = slots
            .range(PageKey::new(pid, Vpn(0))..=PageKey::new(pid, Vpn(usize::MAX)))
            .count();
        slots.unlock();
        count
    }

    /// The number of successful [`BackingStore::load`] calls.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// The number of [`BackingStore::store`] calls.
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl BackingStore for MemoryBackingStore {
    fn load(&self, key: PageKey) -> Result<Page, VmError> {
        let slots = self.slots.lock();
        let page = slots.get(&key).cloned();
        slots.unlock();
        match page {
            Some(page) => {
                self.loads.fetch_add(1, Ordering::SeqCst);
                Ok(page)
            }
            None => Err(VmError::NotFound),
        }
    }

    fn store(&self, key: PageKey, page: &Page) {
        let mut slots = self.slots.lock();
        slots.insert(key, page.clone());
        slots.unlock();
        self.stores.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, pid: Pid) {
        let mut slots = self.slots.lock();
        slots.retain(|key, _| key.pid != pid);
        slots.unlock();
    }
}
