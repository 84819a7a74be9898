//! # Demand Paging
//!
//! This crate implements a virtual memory manager with **demand paging**
//! and **page replacement** on top of the vocabulary of the [`vmm`] crate.
//!
//! Every process owns a flat virtual address space, divided into pages. No
//! page occupies physical memory until it is touched: the first access to a
//! page raises a **page fault**, and the fault handler obtains a physical
//! frame, fills it with the contents of the page, and maps it. Physical
//! memory is a fixed pool of frames shared by all processes. When the pool
//! is exhausted, the replacement policy selects a resident page to evict;
//! if that page was modified, it is written to the backing store first, so
//! that it can be loaded again on its next fault.
//!
//! ```text
//!   access(pid, va)
//!        |
//!        v
//!   page table ---- present ----> physical address
//!        |
//!     absent
//!        v
//!   fault handler -- free frame? --> frame allocator
//!        |                  no
//!        |                   +----> replacement policy -> victim
//!        |                                  |
//!        |                     dirty? write back to backing store
//!        v
//!   load or zero-fill -> map -> retry the access
//! ```
//!
//! ## Crate Structure
//!
//! - [`frame_allocator`]: The free set of physical frames.
//! - [`page_table`]: Per-process translation from pages to frames.
//! - [`backing_store`]: Storage of non-resident pages.
//! - [`replacement`]: Pluggable victim selection: FIFO, LRU, Clock and
//!   Optimal.
//! - [`address_space`]: The page table of a process and its layout.
//! - [`fault`]: The page fault state machine and its outcome.
//! - [`frame_table`]: Reverse index from frames to the pages they hold.
//! - [`manager`]: The [`VmManager`] that ties everything together.
//!
//! ## Example
//!
//! ```text
//! let config = VmConfig::from_cmdline("frames=3 policy=fifo")?;
//! let store = Arc::new(MemoryBackingStore::new(config.page_size()));
//! let vm = VmManager::new(config, store)?;
//!
//! let pid = vm.create_address_space(16)?;
//! vm.write(pid, Va::new(0x1000), b"hello")?;   // faults vpn 1 in
//! let mut buf = [0; 5];
//! vm.read(pid, Va::new(0x1000), &mut buf)?;     // already present
//! vm.destroy_address_space(pid)?;
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod address_space;
pub mod backing_store;
pub mod fault;
pub mod frame_allocator;
pub mod frame_table;
pub mod manager;
pub mod memory;
pub mod page_table;
pub mod replacement;
pub mod stats;

pub use address_space::{AddressSpaceLayout, Backing};
pub use backing_store::{BackingStore, MemoryBackingStore};
pub use fault::{FaultSignal, FaultState, PageFaultReason, Resolution};
pub use frame_table::FrameState;
pub use manager::VmManager;
pub use stats::VmStats;
