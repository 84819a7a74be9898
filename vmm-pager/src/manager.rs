//! # Virtual Memory Manager
//!
//! The [`VmManager`] ties the components together. It owns the physical
//! frames, the address space of every process, and the replacement policy,
//! and it talks to the backing store on their behalf. Processes never see a
//! frame directly: every access goes through [`VmManager::access`] (or its
//! byte-level forms [`VmManager::read`] and [`VmManager::write`]), which
//! translates the address and resolves a page fault when the page is not
//! present.
//!
//! ## Resolving a Page Fault
//!
//! [`VmManager::handle_page_fault`] drives a fault through the states of
//! [`FaultState`]:
//!
//! 1. **Validating**: The process must exist, the page must lie within the
//!    declared size of its address space ([`VmError::InvalidPage`]), and the
//!    access must be permitted ([`VmError::SegmentationFault`]). If the page
//!    is already present, the fault was spurious and is resolved at once. If
//!    another fault is resolving the same page, this fault sleeps until that
//!    one completes and starts over.
//! 2. **Resolving**: A frame is taken from the allocator. If none is free,
//!    the replacement policy selects a victim among the mapped frames of all
//!    processes. The victim is unmapped from its owner's page table and, if
//!    dirty, written to the backing store.
//! 3. **Loading**: The frame is filled from the backing store if the store
//!    holds a copy of the page or the page is file-backed, and with zeros
//!    otherwise.
//! 4. **Mapped**: The page is mapped with its referenced bit set, the policy
//!    is notified, and the sleeping faults on this page are woken up.
//!
//! ## Locking
//!
//! Shared state is protected by [`SpinLock`]s, always taken in this order:
//!
//! ```text
//!   frames (allocator, reverse index, frame waiters)
//!     -> address space (page table, pending markers)
//!       -> policy
//! ```
//!
//! The lock of a single physical frame is innermost and is never held
//! together with the policy. The registry of address spaces is never held
//! together with any other lock. No lock is held while a thread sleeps or
//! while the backing store is accessed.
//!
//! A frame selected as a victim is marked `Reserved` in the same critical
//! section that selects it, so no other fault can select, free or map it.
//! Once reserved, the eviction always runs to completion, and the page being
//! written back carries a pending marker so that its owner waits for the
//! write back before faulting the page in again.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use vmm::{
    VmError,
    addressing::{FrameNumber, Pa, PageSize, Va, Vpn},
    config::VmConfig,
    sync::{SpinLock, WaitQueue},
    task::{AccessKind, PageKey, Pid},
};

use crate::{
    address_space::{AddressSpace, AddressSpaceLayout},
    backing_store::BackingStore,
    fault::{FaultProgress, FaultSignal, FaultState, PageFaultReason, Resolution},
    frame_allocator::FrameAllocator,
    frame_table::{FrameState, FrameTable},
    memory::PhysicalMemory,
    page_table::Pte,
    replacement::{self, ReplacementPolicy},
    stats::{Counters, VmStats},
};

/// A demand-paging virtual memory manager.
pub struct VmManager {
    config: VmConfig,
    allocator: FrameAllocator,
    memory: PhysicalMemory,
    frames: SpinLock<FrameTable>,
    policy: SpinLock<Box<dyn ReplacementPolicy>>,
    spaces: SpinLock<BTreeMap<Pid, Arc<AddressSpace>>>,
    store: Arc<dyn BackingStore>,
    next_pid: AtomicUsize,
    counters: Counters,
}

impl VmManager {
    /// Creates a manager with the policy selected by `config`.
    ///
    /// # Returns
    /// - `Ok(VmManager)` on success.
    /// - `Err(VmError::InvalidArgument)` if `config` selects the optimal
    ///   policy, which must be supplied through [`VmManager::with_policy`].
    pub fn new(config: VmConfig, store: Arc<dyn BackingStore>) -> Result<Self, VmError> {
        let policy = replacement::build(config.policy())?;
        Self::with_policy(config, store, policy)
    }

    /// Creates a manager with an explicit replacement policy.
    ///
    /// The policy of `config` is ignored.
    pub fn with_policy(
        config: VmConfig,
        store: Arc<dyn BackingStore>,
        policy: Box<dyn ReplacementPolicy>,
    ) -> Result<Self, VmError> {
        let allocator = FrameAllocator::new(config.frame_count())?;
        log::info!(
            "vmm: {} frames of {:#x} bytes, {} replacement",
            config.frame_count(),
            config.page_size().bytes(),
            policy.name()
        );
        Ok(Self {
            memory: PhysicalMemory::new(config.page_size(), config.frame_count()),
            frames: SpinLock::new(FrameTable::new(config.frame_count())),
            policy: SpinLock::new(policy),
            spaces: SpinLock::new(BTreeMap::new()),
            store,
            next_pid: AtomicUsize::new(1),
            counters: Counters::default(),
            allocator,
            config,
        })
    }

    /// The configuration of the manager.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[inline]
    fn page_size(&self) -> PageSize {
        self.config.page_size()
    }

    /// Creates an address space of `page_count` anonymous read-write pages.
    ///
    /// Process identifiers are handed out in ascending order, starting at 1.
    ///
    /// # Returns
    /// - `Ok(Pid)` of the new address space.
    /// - `Err(VmError::InvalidArgument)` if `page_count` is zero.
    pub fn create_address_space(&self, page_count: usize) -> Result<Pid, VmError> {
        self.create_address_space_with(AddressSpaceLayout::new(page_count))
    }

    /// Creates an address space shaped by `layout`.
    ///
    /// # Returns
    /// - `Ok(Pid)` of the new address space.
    /// - `Err(VmError::InvalidArgument)` if the layout is malformed.
    pub fn create_address_space_with(&self, layout: AddressSpaceLayout) -> Result<Pid, VmError> {
        let entries = layout.entries()?;
        let pid = Pid(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let space = Arc::new(AddressSpace::new(pid, entries));
        let mut spaces = self.spaces.lock();
        spaces.insert(pid, space);
        spaces.unlock();
        log::info!("vmm: created {} with {} pages", pid, layout.page_count());
        Ok(pid)
    }

    /// Destroys the address space of `pid`.
    ///
    /// Every frame mapped into it returns to the allocator, faults sleeping
    /// on it are woken up and fail, and the backing store discards its
    /// pages.
    ///
    /// # Returns
    /// - `Ok(())` on success.
    /// - `Err(VmError::NoSuchAddressSpace)` if `pid` does not exist.
    pub fn destroy_address_space(&self, pid: Pid) -> Result<(), VmError> {
        let space = self.space(pid)?;

        let mut frames = self.frames.lock();
        let mut inner = space.inner.lock();
        if !inner.alive {
            // Lost the race against a concurrent destroy.
            inner.unlock();
            frames.unlock();
            return Err(VmError::NoSuchAddressSpace);
        }
        inner.alive = false;
        let mut released = 0;
        let mut result = Ok(());
        let mut policy = self.policy.lock();
        for (vpn, frame) in inner.page_table.clear() {
            // A frame reserved by an eviction now belongs to that fault.
            if frames.state(frame) != Some(FrameState::Mapped(PageKey::new(pid, vpn))) {
                continue;
            }
            policy.on_evict(frame);
            frames.set(frame, FrameState::Free);
            if let Err(e) = self.allocator.free(frame) {
                result = Err(e);
            }
            released += 1;
        }
        policy.unlock();
        for waiters in inner.pending.values_mut() {
            waiters.wake_all();
        }
        inner.pending.clear();
        inner.unlock();
        frames.waiters.wake_all();
        frames.unlock();

        // Unregistered only once its page table is empty: a failed lookup
        // never leaves a mapping behind.
        let mut spaces = self.spaces.lock();
        spaces.remove(&pid);
        spaces.unlock();

        self.store.release(pid);
        log::info!(
            "vmm: destroyed {} ({} pages), released {} frames",
            space.pid(),
            space.page_count(),
            released
        );
        result
    }

    fn space(&self, pid: Pid) -> Result<Arc<AddressSpace>, VmError> {
        let spaces = self.spaces.lock();
        let space = spaces.get(&pid).cloned();
        spaces.unlock();
        space.ok_or(VmError::NoSuchAddressSpace)
    }

    /// Translates `va` of `pid` without faulting.
    ///
    /// # Returns
    /// - `Ok(Some(Pa))` if the page is present.
    /// - `Ok(None)` if the page is not present.
    /// - `Err(VmError::InvalidPage)` if `va` is beyond the address space.
    /// - `Err(VmError::NoSuchAddressSpace)` if `pid` does not exist.
    pub fn translate(&self, pid: Pid, va: Va) -> Result<Option<Pa>, VmError> {
        let (vpn, offset) = self.page_size().split(va);
        let pte = self.entry(pid, vpn)?;
        Ok(pte.pa(offset, self.page_size()))
    }

    /// Returns a copy of the page table entry of `vpn` in `pid`.
    ///
    /// # Returns
    /// - `Ok(Pte)` on success.
    /// - `Err(VmError::InvalidPage)` if `vpn` is beyond the address space.
    /// - `Err(VmError::NoSuchAddressSpace)` if `pid` does not exist.
    pub fn entry(&self, pid: Pid, vpn: Vpn) -> Result<Pte, VmError> {
        let space = self.space(pid)?;
        let inner = space.inner.lock();
        let pte = inner.page_table.translate(vpn);
        inner.unlock();
        pte
    }

    /// The declared number of pages of `pid`.
    pub fn page_count(&self, pid: Pid) -> Result<usize, VmError> {
        self.space(pid).map(|space| space.page_count())
    }

    /// The pages of `pid` that are present, with their frames.
    pub fn resident(&self, pid: Pid) -> Result<Vec<(Vpn, FrameNumber)>, VmError> {
        let space = self.space(pid)?;
        let inner = space.inner.lock();
        let resident = inner
            .page_table
            .present()
            .filter_map(|(vpn, pte)| pte.frame().map(|frame| (vpn, frame)))
            .collect();
        inner.unlock();
        Ok(resident)
    }

    /// Resolves a page fault.
    ///
    /// # Parameters
    /// - `reason`: The faulting process, address and access kind.
    ///
    /// # Returns
    /// - `Ok(Resolution)` once the page is present. The faulting access may
    ///   be retried.
    /// - `Err(VmError::NoSuchAddressSpace)` if the process does not exist or
    ///   is destroyed while the fault is in flight.
    /// - `Err(VmError::InvalidPage)` if the address is beyond the address
    ///   space.
    /// - `Err(VmError::SegmentationFault)` if the access is not permitted.
    /// - `Err(VmError::NotFound)` if a page that must be loaded has no copy
    ///   on the backing store.
    pub fn handle_page_fault(&self, reason: &PageFaultReason) -> Result<Resolution, VmError> {
        let mut progress = FaultProgress::new(reason);
        let space = self.space(reason.pid).map_err(|e| progress.reject(e))?;
        let (vpn, offset) = self.page_size().split(reason.fault_addr);

        // Validating
        let pte = loop {
            let mut inner = space.inner.lock();
            if !inner.alive {
                inner.unlock();
                return Err(progress.reject(VmError::NoSuchAddressSpace));
            }
            let pte = match inner
                .page_table
                .translate(vpn)
                .and_then(|pte| pte.check(reason.access).map(|_| pte))
            {
                Ok(pte) => pte,
                Err(e) => {
                    inner.unlock();
                    return Err(progress.reject(e));
                }
            };
            if let Some(frame) = pte.frame() {
                inner.unlock();
                log::debug!("fault {} {}: already present", reason.pid, reason.fault_addr);
                return Ok(Resolution {
                    frame,
                    pa: self.page_size().pa(frame, offset),
                    loaded: false,
                });
            }
            if let Some(waiters) = inner.pending.get_mut(&vpn) {
                let parker = waiters.register();
                inner.unlock();
                parker.park();
                continue;
            }
            inner.pending.insert(vpn, WaitQueue::new());
            inner.unlock();
            break pte;
        };

        // Resolving
        progress.advance(FaultState::Resolving);
        let key = PageKey::new(reason.pid, vpn);
        let frame = match self.obtain_frame(key) {
            Ok(frame) => frame,
            Err(e) => {
                self.abandon(&space, vpn);
                return Err(progress.fail(e));
            }
        };

        // Loading
        progress.advance(FaultState::Loading);
        if let Err(e) = self.fill(frame, key, pte) {
            self.release_reserved(frame);
            self.abandon(&space, vpn);
            return Err(progress.fail(e));
        }

        // Mapped
        self.install(&space, key, frame).map_err(|e| progress.fail(e))?;
        progress.advance(FaultState::Mapped);
        Counters::bump(&self.counters.faults);
        Ok(Resolution {
            frame,
            pa: self.page_size().pa(frame, offset),
            loaded: true,
        })
    }

    /// Resolves a page fault on behalf of the fault delivery collaborator.
    ///
    /// # Returns
    /// - [`FaultSignal::Resume`] if the faulting access may be retried.
    /// - [`FaultSignal::Fatal`] if the process must be terminated.
    pub fn page_fault(&self, reason: &PageFaultReason) -> FaultSignal {
        self.handle_page_fault(reason).into()
    }

    // Obtain a frame for `key`, evicting a victim if no frame is free. The
    // returned frame is `Reserved` for `key`.
    fn obtain_frame(&self, key: PageKey) -> Result<FrameNumber, VmError> {
        loop {
            let mut frames = self.frames.lock();
            if let Ok(frame) = self.allocator.allocate() {
                frames.set(
                    frame,
                    FrameState::Reserved {
                        owner: key,
                        victim: None,
                    },
                );
                frames.unlock();
                return Ok(frame);
            }
            let candidates = frames.candidates();
            if candidates.is_empty() {
                // Every frame is in flight.
                let parker = frames.waiters.register();
                frames.unlock();
                parker.park();
                continue;
            }
            let mut policy = self.policy.lock();
            let selected = policy.select_victim(&candidates);
            if let Ok(frame) = selected {
                policy.on_evict(frame);
            }
            policy.unlock();
            let (frame, victim) = match selected.map(|frame| (frame, frames.state(frame))) {
                Ok((frame, Some(FrameState::Mapped(victim)))) => (frame, victim),
                Ok(_) => {
                    frames.unlock();
                    return Err(VmError::InvalidArgument);
                }
                Err(e) => {
                    frames.unlock();
                    return Err(e);
                }
            };
            frames.set(
                frame,
                FrameState::Reserved {
                    owner: key,
                    victim: Some(victim),
                },
            );
            frames.unlock();
            self.evict(frame, victim);
            return Ok(frame);
        }
    }

    // Remove `victim` from `frame`, writing it back if dirty.
    fn evict(&self, frame: FrameNumber, victim: PageKey) {
        log::debug!(
            "evict: frame {} held {} vpn {}",
            frame.0,
            victim.pid,
            victim.vpn.0
        );
        // A destroyed owner has already dropped the mapping.
        let Ok(space) = self.space(victim.pid) else {
            return;
        };
        let mut inner = space.inner.lock();
        let current = inner.page_table.translate(victim.vpn).map(|pte| pte.frame());
        if !inner.alive || current != Ok(Some(frame)) {
            inner.unlock();
            return;
        }
        let dirty = inner
            .page_table
            .unmap(victim.vpn)
            .is_ok_and(|pte| pte.dirty());
        Counters::bump(&self.counters.evictions);
        if !dirty {
            inner.unlock();
            return;
        }
        inner.pending.insert(victim.vpn, WaitQueue::new());
        inner.unlock();

        if let Ok(page) = self.memory.snapshot(frame) {
            self.store.store(victim, &page);
            Counters::bump(&self.counters.writebacks);
            log::debug!(
                "evict: wrote back {} vpn {} from frame {}",
                victim.pid,
                victim.vpn.0,
                frame.0
            );
        }

        let mut inner = space.inner.lock();
        let alive = inner.alive;
        // Cannot fail; the vpn was unmapped above.
        let _ = inner.page_table.mark_on_backing_store(victim.vpn);
        if let Some(mut waiters) = inner.pending.remove(&victim.vpn) {
            waiters.wake_all();
        }
        inner.unlock();
        if !alive {
            self.store.release(victim.pid);
        }
    }

    // Fill `frame` with the contents of `key`.
    fn fill(&self, frame: FrameNumber, key: PageKey, pte: Pte) -> Result<(), VmError> {
        if pte.needs_load() {
            let page = self.store.load(key)?;
            self.memory.fill(frame, &page)?;
            Counters::bump(&self.counters.loads);
            log::debug!("load: {} vpn {} into frame {}", key.pid, key.vpn.0, frame.0);
        } else {
            self.memory.zero(frame)?;
            Counters::bump(&self.counters.zero_fills);
            log::debug!("zero-fill: {} vpn {} into frame {}", key.pid, key.vpn.0, frame.0);
        }
        Ok(())
    }

    // Map the filled `frame` for `key` and wake up the waiters.
    fn install(
        &self,
        space: &AddressSpace,
        key: PageKey,
        frame: FrameNumber,
    ) -> Result<(), VmError> {
        let mut frames = self.frames.lock();
        let mut inner = space.inner.lock();
        let mapped = if inner.alive {
            inner.page_table.map(key.vpn, frame)
        } else {
            Err(VmError::NoSuchAddressSpace)
        };
        if let Err(e) = mapped {
            if let Some(mut waiters) = inner.pending.remove(&key.vpn) {
                waiters.wake_all();
            }
            inner.unlock();
            frames.set(frame, FrameState::Free);
            let freed = self.allocator.free(frame);
            frames.waiters.wake_all();
            frames.unlock();
            freed?;
            return Err(e);
        }
        // Cannot fail; the entry was just mapped.
        let _ = inner.page_table.mark_referenced(key.vpn);
        frames.set(frame, FrameState::Mapped(key));
        let mut policy = self.policy.lock();
        policy.on_load(frame, key);
        policy.unlock();
        if let Some(mut waiters) = inner.pending.remove(&key.vpn) {
            waiters.wake_all();
        }
        inner.unlock();
        frames.waiters.wake_all();
        frames.unlock();
        Ok(())
    }

    // Drop the pending marker of a failed fault.
    fn abandon(&self, space: &AddressSpace, vpn: Vpn) {
        let mut inner = space.inner.lock();
        if let Some(mut waiters) = inner.pending.remove(&vpn) {
            waiters.wake_all();
        }
        inner.unlock();
    }

    // Return a reserved frame to the allocator.
    fn release_reserved(&self, frame: FrameNumber) {
        let mut frames = self.frames.lock();
        frames.set(frame, FrameState::Free);
        // A reserved frame is always allocated.
        let _ = self.allocator.free(frame);
        frames.waiters.wake_all();
        frames.unlock();
    }

    // Run `f` on the bytes of the page at `va`, faulting it in if needed.
    fn touch<R>(
        &self,
        pid: Pid,
        va: Va,
        access: AccessKind,
        f: impl FnOnce(&mut [u8], usize) -> R,
    ) -> Result<(Pa, R), VmError> {
        let space = self.space(pid)?;
        let (vpn, offset) = self.page_size().split(va);
        let mut f = Some(f);
        loop {
            let mut inner = space.inner.lock();
            if !inner.alive {
                inner.unlock();
                return Err(VmError::NoSuchAddressSpace);
            }
            let pte = match inner
                .page_table
                .translate(vpn)
                .and_then(|pte| pte.check(access).map(|_| pte))
            {
                Ok(pte) => pte,
                Err(e) => {
                    inner.unlock();
                    return Err(e);
                }
            };
            if let Some(frame) = pte.frame() {
                // Cannot fail; the entry is present.
                let _ = if access.is_write() {
                    inner.page_table.mark_dirty(vpn)
                } else {
                    inner.page_table.mark_referenced(vpn)
                };
                let r = match f.take() {
                    Some(f) => self.memory.with_frame(frame, |bytes| f(bytes, offset)),
                    None => Err(VmError::InvalidArgument),
                };
                let mut policy = self.policy.lock();
                policy.on_access(frame, access);
                policy.unlock();
                inner.unlock();
                return r.map(|r| (self.page_size().pa(frame, offset), r));
            }
            inner.unlock();
            self.handle_page_fault(&PageFaultReason::new(pid, va, access))?;
        }
    }

    /// Performs an access of kind `access` at `va` of `pid`.
    ///
    /// The page is faulted in if it is not present. The referenced bit, and
    /// for writes the dirty bit, are set and the policy is notified.
    ///
    /// # Returns
    /// - `Ok(Pa)`, the physical address the access reached.
    /// - `Err(VmError)` if the page fault could not be resolved.
    pub fn access(&self, pid: Pid, va: Va, access: AccessKind) -> Result<Pa, VmError> {
        self.touch(pid, va, access, |_, _| ()).map(|(pa, _)| pa)
    }

    /// Reads `buf.len()` bytes starting at `va` of `pid`.
    ///
    /// The range may span several pages; every page is faulted in as needed.
    pub fn read(&self, pid: Pid, va: Va, buf: &mut [u8]) -> Result<(), VmError> {
        let page_size = self.page_size().bytes();
        let mut done = 0;
        while done < buf.len() {
            let addr = va + done;
            let offset = addr.into_usize() & self.page_size().mask();
            let len = (page_size - offset).min(buf.len() - done);
            let chunk = &mut buf[done..done + len];
            self.touch(pid, addr, AccessKind::Read, |bytes, offset| {
                chunk.copy_from_slice(&bytes[offset..offset + len])
            })?;
            done += len;
        }
        Ok(())
    }

    /// Writes `data` starting at `va` of `pid`.
    ///
    /// The range may span several pages; every page is faulted in as needed
    /// and marked dirty.
    pub fn write(&self, pid: Pid, va: Va, data: &[u8]) -> Result<(), VmError> {
        let page_size = self.page_size().bytes();
        let mut done = 0;
        while done < data.len() {
            let addr = va + done;
            let offset = addr.into_usize() & self.page_size().mask();
            let len = (page_size - offset).min(data.len() - done);
            let chunk = &data[done..done + len];
            self.touch(pid, addr, AccessKind::Write, |bytes, offset| {
                bytes[offset..offset + len].copy_from_slice(chunk)
            })?;
            done += len;
        }
        Ok(())
    }

    /// The state of `frame` in the reverse index.
    pub fn frame_state(&self, frame: FrameNumber) -> Option<FrameState> {
        let frames = self.frames.lock();
        let state = frames.state(frame);
        frames.unlock();
        state
    }

    /// The page mapped in `frame`, if any.
    pub fn frame_owner(&self, frame: FrameNumber) -> Option<PageKey> {
        match self.frame_state(frame) {
            Some(FrameState::Mapped(key)) => Some(key),
            _ => None,
        }
    }

    /// Every mapped frame with the page it holds, in frame order.
    pub fn mappings(&self) -> Vec<(FrameNumber, PageKey)> {
        let frames = self.frames.lock();
        let mappings = frames.mapped().collect();
        frames.unlock();
        mappings
    }

    /// The number of free frames.
    pub fn free_frames(&self) -> usize {
        self.allocator.free_count()
    }

    /// A snapshot of the paging statistics.
    pub fn stats(&self) -> VmStats {
        self.counters.snapshot()
    }
}
