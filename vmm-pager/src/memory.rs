//! Simulated physical memory.
//!
//! [`PhysicalMemory`] holds the contents of every frame. Each frame has its
//! own lock, so that copying one page in or out never blocks accesses to the
//! other frames. Frame locks are the innermost locks of the manager.

use vmm::{
    VmError,
    addressing::{FrameNumber, PageSize},
    mm::Page,
    sync::SpinLock,
};

/// The contents of all physical frames.
pub struct PhysicalMemory {
    frames: Box<[SpinLock<Page>]>,
}

impl PhysicalMemory {
    /// Creates `frame_count` zero-filled frames of `page_size`.
    pub fn new(page_size: PageSize, frame_count: usize) -> Self {
        Self {
            frames: (0..frame_count)
                .map(|_| SpinLock::new(Page::new(page_size)))
                .collect(),
        }
    }

    fn frame(&self, frame: FrameNumber) -> Result<&SpinLock<Page>, VmError> {
        self.frames.get(frame.0).ok_or(VmError::InvalidArgument)
    }

    /// Returns a copy of the contents of `frame`.
    pub fn snapshot(&self, frame: FrameNumber) -> Result<Page, VmError> {
        let guard = self.frame(frame)?.lock();
        let page = guard.clone();
        guard.unlock();
        Ok(page)
    }

    /// Overwrites the contents of `frame` with `page`.
    pub fn fill(&self, frame: FrameNumber, page: &Page) -> Result<(), VmError> {
        let mut guard = self.frame(frame)?.lock();
        let len = guard.len().min(page.len());
        guard.inner_mut()[..len].copy_from_slice(&page.inner()[..len]);
        guard.inner_mut()[len..].fill(0);
        guard.unlock();
        Ok(())
    }

    /// Zero-fills `frame`.
    pub fn zero(&self, frame: FrameNumber) -> Result<(), VmError> {
        let mut guard = self.frame(frame)?.lock();
        guard.zero();
        guard.unlock();
        Ok(())
    }

    /// Runs `f` on the contents of `frame` while holding its lock.
    pub fn with_frame<R>(
        &self,
        frame: FrameNumber,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, VmError> {
        let mut guard = self.frame(frame)?.lock();
        let r = f(guard.inner_mut());
        guard.unlock();
        Ok(r)
    }
}
