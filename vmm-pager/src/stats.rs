//! Paging statistics.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A snapshot of the paging activity of a manager.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VmStats {
    /// Faults that filled a frame. Faults that found the page already
    /// present or that failed are not counted.
    pub faults: usize,
    /// Frames filled with zeros.
    pub zero_fills: usize,
    /// Frames filled from the backing store.
    pub loads: usize,
    /// Dirty pages written to the backing store on eviction.
    pub writebacks: usize,
    /// Pages evicted from their frame.
    pub evictions: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) faults: CachePadded<AtomicUsize>,
    pub(crate) zero_fills: CachePadded<AtomicUsize>,
    pub(crate) loads: CachePadded<AtomicUsize>,
    pub(crate) writebacks: CachePadded<AtomicUsize>,
    pub(crate) evictions: CachePadded<AtomicUsize>,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> VmStats {
        VmStats {
            faults: self.faults.load(Ordering::Relaxed),
            zero_fills: self.zero_fills.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            writebacks: self.writebacks.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
