use vmm::{
    VmError,
    addressing::{FrameNumber, Vpn},
    config::PolicyKind,
    task::{AccessKind, PageKey, Pid},
};
use vmm_pager::replacement::{
    self, ClockPolicy, FifoPolicy, LruPolicy, OptimalPolicy, RecencyList, ReplacementPolicy,
};

fn key(vpn: usize) -> PageKey {
    PageKey::new(Pid(1), Vpn(vpn))
}

fn frames(ids: &[usize]) -> Vec<FrameNumber> {
    ids.iter().map(|id| FrameNumber(*id)).collect()
}

/// Load `pages[i]` into frame `i` for every `i`.
fn load_all(policy: &mut dyn ReplacementPolicy, pages: &[usize]) {
    for (frame, vpn) in pages.iter().enumerate() {
        policy.on_load(FrameNumber(frame), key(*vpn));
    }
}

/// Evict the victim among `candidates` the way the manager does, and verify
/// that it is `expected`.
fn check_victim(policy: &mut dyn ReplacementPolicy, candidates: &[usize], expected: usize) {
    let victim = policy
        .select_victim(&frames(candidates))
        .expect("select_victim failed");
    assert_eq!(
        victim,
        FrameNumber(expected),
        "{} selected the wrong victim",
        policy.name()
    );
    policy.on_evict(victim);
}

#[test]
fn empty_candidates() {
    let mut policies: Vec<Box<dyn ReplacementPolicy>> = vec![
        Box::new(FifoPolicy::new()),
        Box::new(LruPolicy::new()),
        Box::new(ClockPolicy::new()),
        Box::new(OptimalPolicy::new(Vec::new())),
    ];
    for policy in policies.iter_mut() {
        assert_eq!(policy.select_victim(&[]), Err(VmError::NoCandidates));
    }
}

#[test]
fn fifo_evicts_first_loaded() {
    let mut policy = FifoPolicy::new();
    // A, B, C in frames 0, 1, 2.
    load_all(&mut policy, &[10, 11, 12]);
    // Accessing A does not save it.
    policy.on_access(FrameNumber(0), AccessKind::Read);
    check_victim(&mut policy, &[0, 1, 2], 0);

    // D reuses frame 0 and becomes the newest.
    policy.on_load(FrameNumber(0), key(13));
    check_victim(&mut policy, &[0, 1, 2], 1);
    policy.on_load(FrameNumber(1), key(14));
    check_victim(&mut policy, &[0, 1, 2], 2);
}

#[test]
fn fifo_unknown_frames_are_oldest() {
    let mut policy = FifoPolicy::new();
    load_all(&mut policy, &[1, 2]);
    check_victim(&mut policy, &[0, 1, 5, 3], 3);
    // Only listed frames are considered.
    check_victim(&mut policy, &[1], 1);
}

#[test]
fn lru_evicts_least_recently_used() {
    let mut policy = LruPolicy::new();
    // Access order A, B, A, C.
    policy.on_load(FrameNumber(0), key(0xa));
    policy.on_load(FrameNumber(1), key(0xb));
    policy.on_access(FrameNumber(0), AccessKind::Read);
    policy.on_load(FrameNumber(2), key(0xc));
    check_victim(&mut policy, &[0, 1, 2], 1);

    policy.on_load(FrameNumber(1), key(0xd));
    policy.on_access(FrameNumber(0), AccessKind::Write);
    check_victim(&mut policy, &[0, 1, 2], 2);
}

#[test]
fn clock_second_chance() {
    let mut policy = ClockPolicy::new();
    load_all(&mut policy, &[0, 1, 2, 3]);

    // Every frame is referenced: one lap clears all bits, the hand's frame
    // goes on the next check.
    check_victim(&mut policy, &[0, 1, 2, 3], 0);
    assert_eq!(policy.last_scan_checks(), 5);
    assert!(!policy.is_referenced(FrameNumber(1)));

    policy.on_load(FrameNumber(0), key(4));
    // The hand is at frame 1, whose bit was cleared in the first lap.
    check_victim(&mut policy, &[0, 1, 2, 3], 1);
    assert_eq!(policy.last_scan_checks(), 1);

    policy.on_load(FrameNumber(1), key(5));
    policy.on_access(FrameNumber(2), AccessKind::Read);
    // Frame 2 gets a second chance, frame 3 is taken.
    check_victim(&mut policy, &[0, 1, 2, 3], 3);
    assert_eq!(policy.last_scan_checks(), 2);
    assert!(!policy.is_referenced(FrameNumber(2)));
}

#[test]
fn clock_termination_bound() {
    const N: usize = 16;
    let mut policy = ClockPolicy::new();
    let candidates = (0..N).collect::<Vec<_>>();
    load_all(&mut policy, &candidates);
    for round in 0..4 * N {
        for frame in 0..N {
            if (frame + round) % 3 != 0 {
                policy.on_access(FrameNumber(frame), AccessKind::Read);
            }
        }
        let victim = policy.select_victim(&frames(&candidates)).unwrap();
        assert!(victim.0 < N);
        assert!(policy.last_scan_checks() <= N + 1);
        assert!(policy.last_scan_checks() <= 2 * N);
        policy.on_evict(victim);
        policy.on_load(victim, key(N + round));
    }
}

#[test]
fn optimal_prefers_never_used() {
    // Residents 1, 2, 3; the future holds 2 and 1 but never 3.
    let mut policy = OptimalPolicy::for_process(Pid(1), [1, 2, 3, 4, 2, 1]);
    load_all(&mut policy, &[1, 2, 3]);
    for frame in 0..3 {
        policy.on_access(FrameNumber(frame), AccessKind::Read);
    }
    assert_eq!(policy.cursor(), 3);
    check_victim(&mut policy, &[0, 1, 2], 2);
}

#[test]
fn optimal_furthest_next_use() {
    let mut policy = OptimalPolicy::for_process(Pid(1), [1, 2, 3, 4, 3, 1, 2]);
    load_all(&mut policy, &[1, 2, 3]);
    for frame in 0..3 {
        policy.on_access(FrameNumber(frame), AccessKind::Read);
    }
    // Next uses: 3 at +1, 1 at +2, 2 at +3.
    check_victim(&mut policy, &[0, 1, 2], 1);
}

#[test]
fn optimal_ties_lowest_frame() {
    let mut policy = OptimalPolicy::for_process(Pid(1), [1, 2, 3, 4]);
    load_all(&mut policy, &[1, 2, 3]);
    for frame in 0..3 {
        policy.on_access(FrameNumber(frame), AccessKind::Read);
    }
    check_victim(&mut policy, &[2, 1, 0], 0);
}

#[test]
fn build_from_kind() {
    assert_eq!(replacement::build(PolicyKind::Fifo).unwrap().name(), "fifo");
    assert_eq!(replacement::build(PolicyKind::Lru).unwrap().name(), "lru");
    assert_eq!(replacement::build(PolicyKind::Clock).unwrap().name(), "clock");
    assert!(matches!(
        replacement::build(PolicyKind::Optimal),
        Err(VmError::InvalidArgument)
    ));
}

#[test]
fn recency_list_order() {
    let mut list = RecencyList::new();
    assert!(list.is_empty());
    for frame in [3, 1, 2] {
        list.touch(FrameNumber(frame));
    }
    assert_eq!(list.iter().collect::<Vec<_>>(), frames(&[3, 1, 2]));

    list.touch(FrameNumber(3));
    assert_eq!(list.iter().collect::<Vec<_>>(), frames(&[1, 2, 3]));

    assert!(list.remove(FrameNumber(2)));
    assert!(!list.remove(FrameNumber(2)));
    assert_eq!(list.iter().collect::<Vec<_>>(), frames(&[1, 3]));

    assert!(!list.refresh(FrameNumber(9)));
    assert!(list.refresh(FrameNumber(1)));
    assert_eq!(list.iter().collect::<Vec<_>>(), frames(&[3, 1]));
    assert_eq!(list.len(), 2);

    assert_eq!(list.oldest_among(&frames(&[1, 3])), Some(FrameNumber(3)));
    assert_eq!(list.oldest_among(&frames(&[1])), Some(FrameNumber(1)));
    assert_eq!(list.oldest_among(&frames(&[1, 8, 6])), Some(FrameNumber(6)));
    assert_eq!(list.oldest_among(&[]), None);

    assert!(list.remove(FrameNumber(3)));
    assert!(list.remove(FrameNumber(1)));
    assert!(list.is_empty());
    assert_eq!(list.iter().count(), 0);
}
