use std::sync::Arc;
use vmm::{
    VmError,
    addressing::{FrameNumber, PAGE_SIZE, Pa, Va, Vpn},
    config::{PolicyKind, VmConfig},
    mm::Permission,
    task::{AccessKind, PageKey, Pid},
};
use vmm_pager::{
    AddressSpaceLayout, Backing, FaultSignal, FrameState, MemoryBackingStore, PageFaultReason,
    VmManager,
    replacement::{OptimalPolicy, ReplacementPolicy},
};

const CLASSIC: [usize; 20] = [7, 0, 1, 2, 0, 3, 0, 4, 2, 3, 0, 3, 2, 1, 2, 0, 1, 7, 0, 1];

fn config(frames: usize, policy: PolicyKind) -> VmConfig {
    VmConfig::builder()
        .frame_count(frames)
        .policy(policy)
        .build()
        .unwrap()
}

fn manager(frames: usize, policy: PolicyKind) -> (VmManager, Arc<MemoryBackingStore>) {
    let config = config(frames, policy);
    let store = Arc::new(MemoryBackingStore::new(config.page_size()));
    let vm = VmManager::new(config, store.clone()).unwrap();
    (vm, store)
}

fn va(vpn: usize) -> Va {
    Va::new(vpn * PAGE_SIZE)
}

/// Fault `vpn` of `pid` in and verify that it was filled into `expected`.
///
/// It ensures that:
/// - The collaborator is told to resume.
/// - The fault filled a frame instead of finding the page present.
/// - The page table maps `vpn` to `expected` and the reverse index agrees.
fn check_fault_into(vm: &VmManager, pid: Pid, vpn: usize, expected: usize) {
    let reason = PageFaultReason::new(pid, va(vpn) + 0x10, AccessKind::Read);
    match vm.page_fault(&reason) {
        FaultSignal::Resume(resolution) => {
            assert_eq!(resolution.frame, FrameNumber(expected), "vpn {vpn}");
            assert_eq!(resolution.pa, Pa::new(expected * PAGE_SIZE + 0x10));
            assert!(resolution.loaded);
        }
        FaultSignal::Fatal(e) => panic!("fault on vpn {vpn} failed: {e}"),
    }
    let pte = vm.entry(pid, Vpn(vpn)).unwrap();
    assert_eq!(pte.frame(), Some(FrameNumber(expected)));
    assert!(pte.referenced());
    assert!(!pte.dirty());
    assert_eq!(
        vm.frame_owner(FrameNumber(expected)),
        Some(PageKey::new(pid, Vpn(vpn)))
    );
}

/// Run `trace` as reads of one process and return the number of faults.
fn run_trace(vm: &VmManager, pid: Pid, trace: &[usize]) -> usize {
    for vpn in trace {
        vm.access(pid, va(*vpn), AccessKind::Read)
            .expect("access failed");
    }
    vm.stats().faults
}

#[test]
fn end_to_end_fifo() {
    let (vm, store) = manager(3, PolicyKind::Fifo);
    let pid = vm.create_address_space(8).unwrap();

    check_fault_into(&vm, pid, 1, 0);
    check_fault_into(&vm, pid, 2, 1);
    check_fault_into(&vm, pid, 3, 2);
    assert_eq!(vm.free_frames(), 0);

    // vpn 1 is the oldest.
    check_fault_into(&vm, pid, 4, 0);
    assert!(!vm.entry(pid, Vpn(1)).unwrap().present());

    // vpn 1 misses again and evicts vpn 2.
    check_fault_into(&vm, pid, 1, 1);
    assert!(!vm.entry(pid, Vpn(2)).unwrap().present());

    let stats = vm.stats();
    assert_eq!(stats.faults, 5);
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.zero_fills, 5);
    // Clean pages are never written back.
    assert_eq!(stats.writebacks, 0);
    assert_eq!(store.stores(), 0);
    assert_eq!(
        vm.mappings(),
        vec![
            (FrameNumber(0), PageKey::new(pid, Vpn(4))),
            (FrameNumber(1), PageKey::new(pid, Vpn(1))),
            (FrameNumber(2), PageKey::new(pid, Vpn(3))),
        ]
    );
}

#[test]
fn classic_reference_string() {
    let (vm, _) = manager(3, PolicyKind::Fifo);
    let pid = vm.create_address_space(8).unwrap();
    assert_eq!(run_trace(&vm, pid, &CLASSIC), 15);

    let (vm, _) = manager(3, PolicyKind::Lru);
    let pid = vm.create_address_space(8).unwrap();
    assert_eq!(run_trace(&vm, pid, &CLASSIC), 12);

    let config = config(3, PolicyKind::Optimal);
    let store = Arc::new(MemoryBackingStore::new(config.page_size()));
    // The first address space is pid 1.
    let policy: Box<dyn ReplacementPolicy> =
        Box::new(OptimalPolicy::for_process(Pid(1), CLASSIC));
    let vm = VmManager::with_policy(config, store, policy).unwrap();
    let pid = vm.create_address_space(8).unwrap();
    assert_eq!(pid, Pid(1));
    assert_eq!(run_trace(&vm, pid, &CLASSIC), 9);
}

#[test]
fn lru_through_manager() {
    // Access order A, B, A, C with three frames; D evicts B.
    let (a, b, c, d) = (2, 3, 4, 5);
    let (vm, _) = manager(3, PolicyKind::Lru);
    let pid = vm.create_address_space(8).unwrap();
    for vpn in [a, b, a, c, d] {
        vm.access(pid, va(vpn), AccessKind::Read).unwrap();
    }
    assert!(vm.entry(pid, Vpn(a)).unwrap().present());
    assert!(!vm.entry(pid, Vpn(b)).unwrap().present());
    assert!(vm.entry(pid, Vpn(c)).unwrap().present());
    assert!(vm.entry(pid, Vpn(d)).unwrap().present());
}

#[test]
fn optimal_requires_a_trace() {
    let config = config(3, PolicyKind::Optimal);
    let store = Arc::new(MemoryBackingStore::new(config.page_size()));
    assert!(matches!(
        VmManager::new(config, store),
        Err(VmError::InvalidArgument)
    ));
}

#[test]
fn dirty_writeback_and_clean_drop() {
    let (vm, store) = manager(1, PolicyKind::Fifo);
    let pid = vm.create_address_space(4).unwrap();

    vm.write(pid, va(0), b"dirty page").unwrap();
    let pte = vm.entry(pid, Vpn(0)).unwrap();
    assert!(pte.dirty());

    // Evicting the dirty page stores its current contents.
    vm.access(pid, va(1), AccessKind::Read).unwrap();
    assert_eq!(store.stores(), 1);
    let stored = store.contents(PageKey::new(pid, Vpn(0))).unwrap();
    assert_eq!(&stored.inner()[..10], b"dirty page");
    let pte = vm.entry(pid, Vpn(0)).unwrap();
    assert!(!pte.present());
    assert!(pte.on_backing_store());

    // Evicting the clean page never stores.
    vm.access(pid, va(2), AccessKind::Read).unwrap();
    assert_eq!(store.stores(), 1);
    assert!(!store.contains(PageKey::new(pid, Vpn(1))));

    // The written page comes back from the store.
    let mut buf = [0u8; 10];
    vm.read(pid, va(0), &mut buf).unwrap();
    assert_eq!(&buf, b"dirty page");
    assert_eq!(store.loads(), 1);

    let stats = vm.stats();
    assert_eq!(stats.writebacks, 1);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.zero_fills, 3);
    assert_eq!(stats.evictions, 3);
}

#[test]
fn data_survives_eviction() {
    const PAGES: usize = 6;
    let (vm, _) = manager(2, PolicyKind::Clock);
    let pid = vm.create_address_space(PAGES + 1).unwrap();

    for vpn in 0..PAGES {
        let data = vec![vpn as u8 + 1; PAGE_SIZE];
        vm.write(pid, va(vpn), &data).unwrap();
    }
    // Straddles the boundary of the last two pages.
    vm.write(pid, va(PAGES) - 3, b"across").unwrap();

    for vpn in (0..PAGES - 1).rev() {
        let mut buf = vec![0u8; PAGE_SIZE];
        vm.read(pid, va(vpn), &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == vpn as u8 + 1), "vpn {vpn}");
    }
    let mut buf = [0u8; 6];
    vm.read(pid, va(PAGES) - 3, &mut buf).unwrap();
    assert_eq!(&buf, b"across");

    // Untouched bytes of a touched page read as zero.
    let mut buf = [0xffu8; 4];
    vm.read(pid, va(PAGES) + 8, &mut buf).unwrap();
    assert_eq!(buf, [0; 4]);
}

#[test]
fn bounds_rejection() {
    let (vm, _) = manager(3, PolicyKind::Fifo);
    let pid = vm.create_address_space(4).unwrap();

    assert_eq!(vm.translate(pid, va(4)), Err(VmError::InvalidPage));
    assert_eq!(vm.entry(pid, Vpn(100)).err(), Some(VmError::InvalidPage));
    assert_eq!(
        vm.page_fault(&PageFaultReason::new(pid, va(4), AccessKind::Read)),
        FaultSignal::Fatal(VmError::InvalidPage)
    );
    assert_eq!(
        vm.access(pid, va(9) + 1, AccessKind::Write),
        Err(VmError::InvalidPage)
    );
    // Nothing was allocated.
    assert_eq!(vm.free_frames(), 3);
    assert_eq!(vm.stats().faults, 0);
    assert!(vm.mappings().is_empty());

    // The last valid page is fine.
    assert!(vm.access(pid, va(3) + (PAGE_SIZE - 1), AccessKind::Read).is_ok());
}

#[test]
fn unknown_process() {
    let (vm, _) = manager(3, PolicyKind::Fifo);
    assert_eq!(vm.translate(Pid(42), va(0)), Err(VmError::NoSuchAddressSpace));
    assert_eq!(
        vm.page_fault(&PageFaultReason::new(Pid(42), va(0), AccessKind::Read)),
        FaultSignal::Fatal(VmError::NoSuchAddressSpace)
    );
    assert_eq!(
        vm.destroy_address_space(Pid(42)),
        Err(VmError::NoSuchAddressSpace)
    );
}

#[test]
fn translation_after_fault() {
    let (vm, _) = manager(4, PolicyKind::Lru);
    let pid = vm.create_address_space(4).unwrap();
    assert_eq!(vm.translate(pid, va(2) + 5), Ok(None));

    let pa = vm.access(pid, va(2) + 5, AccessKind::Read).unwrap();
    let frame = vm.entry(pid, Vpn(2)).unwrap().frame().unwrap();
    assert_eq!(pa, Pa::new(frame.0 * PAGE_SIZE + 5));
    for offset in [0, 1, 0x800, PAGE_SIZE - 1] {
        assert_eq!(
            vm.translate(pid, va(2) + offset),
            Ok(Some(Pa::new(frame.0 * PAGE_SIZE + offset)))
        );
    }

    // A fault on a present page resolves without filling a frame.
    match vm.page_fault(&PageFaultReason::new(pid, va(2), AccessKind::Write)) {
        FaultSignal::Resume(resolution) => {
            assert_eq!(resolution.frame, frame);
            assert!(!resolution.loaded);
        }
        FaultSignal::Fatal(e) => panic!("unexpected {e}"),
    }
    assert_eq!(vm.stats().faults, 1);
}

#[test]
fn write_to_read_only_page() {
    let (vm, _) = manager(3, PolicyKind::Fifo);
    let layout = AddressSpaceLayout::new(4).region(0..2, Permission::READ, Backing::Anonymous);
    let pid = vm.create_address_space_with(layout).unwrap();

    assert_eq!(
        vm.write(pid, va(0), b"x"),
        Err(VmError::SegmentationFault)
    );
    assert_eq!(
        vm.page_fault(&PageFaultReason::new(pid, va(1), AccessKind::Write)),
        FaultSignal::Fatal(VmError::SegmentationFault)
    );
    assert_eq!(vm.free_frames(), 3);

    // Reads are fine, and so are writes outside the region.
    let mut buf = [1u8; 1];
    vm.read(pid, va(0), &mut buf).unwrap();
    assert_eq!(buf, [0]);
    vm.write(pid, va(2), b"x").unwrap();
    assert_eq!(
        vm.entry(pid, Vpn(0)).unwrap().permission(),
        Permission::READ
    );
}

#[test]
fn file_backed_pages() {
    let (vm, store) = manager(2, PolicyKind::Fifo);
    let layout = AddressSpaceLayout::new(4).region(0..2, Permission::READ, Backing::File);
    let pid = vm.create_address_space_with(layout).unwrap();
    store.populate(PageKey::new(pid, Vpn(0)), b"\x7fELF");

    let mut buf = [0u8; 4];
    vm.read(pid, va(0), &mut buf).unwrap();
    assert_eq!(&buf, b"\x7fELF");
    assert_eq!(vm.stats().loads, 1);
    assert!(vm.entry(pid, Vpn(0)).unwrap().file_backed());

    // A file-backed page without contents is never zero-filled.
    assert_eq!(
        vm.access(pid, va(1), AccessKind::Read),
        Err(VmError::NotFound)
    );
    assert!(!vm.entry(pid, Vpn(1)).unwrap().present());
    // The frame obtained for the failed fault went back to the allocator.
    assert_eq!(vm.free_frames(), 1);
    assert_eq!(vm.stats().faults, 1);

    // Anonymous pages next to the mapping are still zero-filled.
    vm.access(pid, va(3), AccessKind::Write).unwrap();
    assert_eq!(vm.stats().zero_fills, 1);
}

#[test]
fn invalid_layouts() {
    let (vm, _) = manager(2, PolicyKind::Fifo);
    assert_eq!(vm.create_address_space(0), Err(VmError::InvalidArgument));
    let out_of_bounds =
        AddressSpaceLayout::new(4).region(2..5, Permission::READ, Backing::Anonymous);
    assert_eq!(
        vm.create_address_space_with(out_of_bounds),
        Err(VmError::InvalidArgument)
    );
    let unreadable = AddressSpaceLayout::new(4).region(0..1, Permission::WRITE, Backing::File);
    assert_eq!(
        vm.create_address_space_with(unreadable),
        Err(VmError::InvalidArgument)
    );
    let empty = AddressSpaceLayout::new(4).region(1..1, Permission::READ, Backing::File);
    assert_eq!(
        vm.create_address_space_with(empty),
        Err(VmError::InvalidArgument)
    );
}

#[test]
fn destroy_releases_frames() {
    let (vm, store) = manager(4, PolicyKind::Clock);
    let first = vm.create_address_space(8).unwrap();
    let second = vm.create_address_space(8).unwrap();
    assert_ne!(first, second);
    assert_eq!(vm.page_count(first), Ok(8));

    for vpn in 0..3 {
        vm.write(first, va(vpn), b"first").unwrap();
    }
    vm.write(second, va(0), b"second").unwrap();
    // Force one page of `first` out to the store.
    vm.write(second, va(1), b"second").unwrap();
    assert_eq!(vm.free_frames(), 0);
    assert_eq!(store.pages_of(first), 1);

    vm.destroy_address_space(first).unwrap();
    assert_eq!(vm.free_frames(), 2);
    assert!(vm.mappings().iter().all(|(_, key)| key.pid == second));
    assert_eq!(store.pages_of(first), 0);
    assert_eq!(
        vm.translate(first, va(0)),
        Err(VmError::NoSuchAddressSpace)
    );
    assert_eq!(
        vm.destroy_address_space(first),
        Err(VmError::NoSuchAddressSpace)
    );
    for frame in 0..4 {
        let state = vm.frame_state(FrameNumber(frame)).unwrap();
        assert!(matches!(state, FrameState::Free | FrameState::Mapped(_)));
    }

    // The survivor still has its data.
    let mut buf = [0u8; 6];
    vm.read(second, va(0), &mut buf).unwrap();
    assert_eq!(&buf, b"second");

    vm.destroy_address_space(second).unwrap();
    assert_eq!(vm.free_frames(), 4);
    assert!(vm.mappings().is_empty());
}
