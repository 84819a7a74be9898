use vmm::{
    VmError,
    config::{PolicyKind, VmConfig, VmConfigBuilder},
};

#[test]
fn defaults() {
    let config = VmConfig::builder().build().unwrap();
    assert_eq!(config.page_size().bytes(), 4096);
    assert_eq!(config.frame_count(), VmConfigBuilder::DEFAULT_FRAME_COUNT);
    assert_eq!(config.policy(), PolicyKind::Clock);
    assert_eq!(config, VmConfig::default());
}

#[test]
fn builder() {
    let config = VmConfig::builder()
        .page_size(8192)
        .frame_count(3)
        .policy(PolicyKind::Lru)
        .build()
        .unwrap();
    assert_eq!(config.page_size().bytes(), 8192);
    assert_eq!(config.frame_count(), 3);
    assert_eq!(config.policy(), PolicyKind::Lru);
}

#[test]
fn zero_frames_rejected_at_startup() {
    assert_eq!(
        VmConfig::builder().frame_count(0).build(),
        Err(VmError::OutOfFrames)
    );
}

#[test]
fn bad_page_size_rejected() {
    assert_eq!(
        VmConfig::builder().page_size(1000).build(),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        VmConfig::builder().page_size(0).build(),
        Err(VmError::InvalidArgument)
    );
}

#[test]
fn command_line() {
    let config = VmConfig::from_cmdline("frames=3 page_size=4096 policy=fifo").unwrap();
    assert_eq!(config.frame_count(), 3);
    assert_eq!(config.page_size().bytes(), 4096);
    assert_eq!(config.policy(), PolicyKind::Fifo);

    let config = VmConfig::from_cmdline("  policy=LRU\tframes=8 ").unwrap();
    assert_eq!(config.policy(), PolicyKind::Lru);
    assert_eq!(config.frame_count(), 8);
    assert_eq!(config.page_size().bytes(), 4096);

    assert_eq!(VmConfig::from_cmdline(""), Ok(VmConfig::default()));
}

#[test]
fn command_line_errors() {
    assert_eq!(
        VmConfig::from_cmdline("frames=0"),
        Err(VmError::OutOfFrames)
    );
    assert_eq!(
        VmConfig::from_cmdline("frames=three"),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        VmConfig::from_cmdline("frames"),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        VmConfig::from_cmdline("swap=1"),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        VmConfig::from_cmdline("policy=random"),
        Err(VmError::InvalidArgument)
    );
    assert_eq!(
        VmConfig::from_cmdline("page_size=3"),
        Err(VmError::InvalidArgument)
    );
}

#[test]
fn policy_kind_conversions() {
    for kind in [
        PolicyKind::Fifo,
        PolicyKind::Lru,
        PolicyKind::Clock,
        PolicyKind::Optimal,
    ] {
        assert_eq!(kind.to_string().parse::<PolicyKind>(), Ok(kind));
        assert_eq!(PolicyKind::try_from(u8::from(kind)), Ok(kind));
    }
    assert_eq!("opt".parse::<PolicyKind>(), Ok(PolicyKind::Optimal));
    assert!(PolicyKind::try_from(4u8).is_err());
}
