//! An ordered list of frames, from the oldest to the most recent.
//!
//! [`RecencyList`] is a doubly linked list whose links are stored in an
//! ordered map keyed by the frame number, so moving a frame to the tail and
//! removing a frame do not require a scan:
//!
//! ```text
//!  head                                            tail
//!   f2  <->  f0  <->  f5  <->  f1  <->  f3
//!  oldest                                       newest
//! ```
//!
//! FIFO refreshes a frame only when a page is loaded into it, and LRU on
//! every access as well. Both then evict from the head.

use std::collections::{BTreeMap, BTreeSet};
use vmm::addressing::FrameNumber;

struct Node {
    prev: Option<FrameNumber>,
    next: Option<FrameNumber>,
}

/// Frames ordered by the time they were last refreshed.
#[derive(Default)]
pub struct RecencyList {
    inner: BTreeMap<FrameNumber, Node>,
    head: Option<FrameNumber>,
    tail: Option<FrameNumber>,
}

impl RecencyList {
    /// Makes a new, empty list.
    pub const fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
            head: None,
            tail: None,
        }
    }

    // Link `k`, which must already be in `inner`, after the current tail.
    fn attach(&mut self, k: FrameNumber) {
        let prev = self.tail.replace(k);
        match prev {
            Some(tail) => {
                if let Some(last) = self.inner.get_mut(&tail) {
                    last.next = Some(k);
                }
            }
            None => self.head = Some(k),
        }
        if let Some(node) = self.inner.get_mut(&k) {
            node.prev = prev;
            node.next = None;
        }
    }

    // Unlink the node whose neighbors are `prev` and `next`.
    fn detach(&mut self, prev: Option<FrameNumber>, next: Option<FrameNumber>) {
        match next {
            Some(next) => {
                if let Some(node) = self.inner.get_mut(&next) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        match prev {
            Some(prev) => {
                if let Some(node) = self.inner.get_mut(&prev) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
    }

    /// Moves `k` to the tail, inserting it if it is not in the list.
    pub fn touch(&mut self, k: FrameNumber) {
        if let Some(node) = self.inner.get_mut(&k) {
            let (prev, next) = (node.prev.take(), node.next.take());
            self.detach(prev, next);
        } else {
            self.inner.insert(
                k,
                Node {
                    prev: None,
                    next: None,
                },
            );
        }
        self.attach(k);
    }

    /// Moves `k` to the tail if it is in the list.
    ///
    /// # Returns
    /// `true` if `k` was in the list.
    pub fn refresh(&mut self, k: FrameNumber) -> bool {
        if self.inner.contains_key(&k) {
            self.touch(k);
            true
        } else {
            false
        }
    }

    /// Removes `k` from the list.
    ///
    /// # Returns
    /// `true` if `k` was in the list.
    pub fn remove(&mut self, k: FrameNumber) -> bool {
        match self.inner.remove(&k) {
            Some(node) => {
                self.detach(node.prev, node.next);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `k` is in the list.
    pub fn contains(&self, k: FrameNumber) -> bool {
        self.inner.contains_key(&k)
    }

    /// The number of frames in the list.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates from the oldest frame to the most recent one.
    pub fn iter(&self) -> impl Iterator<Item = FrameNumber> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let k = cursor?;
            cursor = self.inner.get(&k).and_then(|node| node.next);
            Some(k)
        })
    }

    /// Selects the oldest frame among `candidates`.
    ///
    /// A candidate that is not in the list counts as older than every listed
    /// frame; among those, the lowest frame number wins.
    ///
    /// # Returns
    /// `None` if `candidates` is empty.
    pub fn oldest_among(&self, candidates: &[FrameNumber]) -> Option<FrameNumber> {
        let unknown = candidates
            .iter()
            .copied()
            .filter(|frame| !self.contains(*frame))
            .min();
        if unknown.is_some() {
            return unknown;
        }
        let wanted = candidates.iter().copied().collect::<BTreeSet<_>>();
        self.iter().find(|frame| wanted.contains(frame))
    }
}
