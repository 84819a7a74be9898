//! # Physical Frame Allocator
//!
//! The [`FrameAllocator`] tracks which physical frames are free. The number
//! of frames is fixed when the allocator is created and frames are named by
//! the dense numbers `0..total`.
//!
//! The allocator is the bottom of the paging stack: it never evicts
//! anything by itself. When it runs dry, [`FrameAllocator::allocate`]
//! reports [`VmError::OutOfFrames`] and the fault handler falls back to the
//! replacement policy.
//!
//! ## Free List
//!
//! Free frames live in a bounded lock-free queue. Frames are handed out in
//! ascending order at first, and reclaimed frames are handed out again in
//! the order they were freed:
//!
//! ```text
//!  allocate()                                            free(f)
//!      <-  [ f3 | f4 | ... | f(n-1) | f1 | f0 ]  <-
//!           oldest free                newest free
//! ```
//!
//! Next to the queue, an in-use bitmap records the state of each frame, so
//! that freeing a frame twice is detected and reported instead of inserting
//! the frame into the free list a second time.

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use vmm::{VmError, addressing::FrameNumber};

/// Allocator of physical frames.
pub struct FrameAllocator {
    free: ArrayQueue<FrameNumber>,
    in_use: Box<[AtomicBool]>,
}

impl FrameAllocator {
    /// Creates an allocator managing `total` frames, all of them free.
    ///
    /// # Returns
    /// - `Ok(FrameAllocator)` on success.
    /// - `Err(VmError::OutOfFrames)` if `total` is zero.
    pub fn new(total: usize) -> Result<Self, VmError> {
        if total == 0 {
            return Err(VmError::OutOfFrames);
        }
        let free = ArrayQueue::new(total);
        for frame in 0..total {
            free.push(FrameNumber(frame))
                .map_err(|_| VmError::InvalidArgument)?;
        }
        Ok(Self {
            free,
            in_use: (0..total).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    /// Hands out a free frame.
    ///
    /// # Returns
    /// - `Ok(FrameNumber)` of a frame that is now in use.
    /// - `Err(VmError::OutOfFrames)` if every frame is in use.
    pub fn allocate(&self) -> Result<FrameNumber, VmError> {
        let frame = self.free.pop().ok_or(VmError::OutOfFrames)?;
        self.in_use[frame.0].store(true, Ordering::Release);
        Ok(frame)
    }

    /// Returns `frame` to the free set.
    ///
    /// # Returns
    /// - `Ok(())` on success.
    /// - `Err(VmError::DoubleFree)` if the frame is already free.
    /// - `Err(VmError::InvalidArgument)` if the frame does not exist.
    pub fn free(&self, frame: FrameNumber) -> Result<(), VmError> {
        let Some(in_use) = self.in_use.get(frame.0) else {
            log::warn!("allocator: free of nonexistent frame {}", frame.0);
            return Err(VmError::InvalidArgument);
        };
        if in_use
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("allocator: double free of frame {}", frame.0);
            return Err(VmError::DoubleFree);
        }
        self.free.push(frame).map_err(|_| VmError::DoubleFree)
    }

    /// Returns `true` if `frame` is currently handed out.
    pub fn is_allocated(&self, frame: FrameNumber) -> bool {
        self.in_use
            .get(frame.0)
            .is_some_and(|b| b.load(Ordering::Acquire))
    }

    /// The number of frames managed by this allocator.
    #[inline]
    pub fn total(&self) -> usize {
        self.in_use.len()
    }

    /// The number of frames that are currently free.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
