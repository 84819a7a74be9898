//! System-wide configuration of the virtual memory manager.
//!
//! The manager is configured once, before it starts serving faults, with a
//! [`VmConfig`]. A configuration is built either programmatically through
//! [`VmConfigBuilder`], or from a command line of whitespace separated
//! `key=value` pairs through [`VmConfig::from_cmdline`]:
//!
//! ```text
//! frames=3 page_size=4096 policy=fifo
//! ```
//!
//! | Key         | Meaning                                 | Default |
//! |-------------|-----------------------------------------|---------|
//! | `frames`    | Number of physical frames               | 64      |
//! | `page_size` | Bytes per page, a power of two          | 4096    |
//! | `policy`    | `fifo`, `lru`, `clock` or `optimal`     | `clock` |
//!
//! A configuration that cannot run is rejected at startup: zero frames is
//! reported as [`VmError::OutOfFrames`] and a page size that is not a power
//! of two as [`VmError::InvalidArgument`].

use crate::{VmError, addressing::PageSize};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The replacement policy used to select an eviction victim.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum PolicyKind {
    /// Evict the page that was loaded first.
    Fifo = 0,
    /// Evict the page that was accessed least recently.
    Lru = 1,
    /// Second-chance approximation of LRU with a circular hand.
    Clock = 2,
    /// Evict the page used furthest in the future. Requires the complete
    /// reference trace, so it is only usable in simulation.
    Optimal = 3,
}

impl PolicyKind {
    /// The lowercase name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Fifo => "fifo",
            PolicyKind::Lru => "lru",
            PolicyKind::Clock => "clock",
            PolicyKind::Optimal => "optimal",
        }
    }
}

impl core::str::FromStr for PolicyKind {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(PolicyKind::Fifo),
            "lru" => Ok(PolicyKind::Lru),
            "clock" => Ok(PolicyKind::Clock),
            "optimal" | "opt" => Ok(PolicyKind::Optimal),
            _ => Err(VmError::InvalidArgument),
        }
    }
}

impl core::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated configuration of the virtual memory manager.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VmConfig {
    page_size: PageSize,
    frame_count: usize,
    policy: PolicyKind,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::DEFAULT,
            frame_count: VmConfigBuilder::DEFAULT_FRAME_COUNT,
            policy: PolicyKind::Clock,
        }
    }
}

impl VmConfig {
    /// Starts building a configuration from the defaults.
    pub fn builder() -> VmConfigBuilder {
        VmConfigBuilder::new()
    }

    /// Parses a command line of whitespace separated `key=value` pairs.
    ///
    /// Keys that are not given keep their default value.
    ///
    /// # Returns
    /// - `Ok(VmConfig)` on success.
    /// - `Err(VmError::InvalidArgument)` on an unknown key, a malformed pair
    ///   or value, or a page size that is not a power of two.
    /// - `Err(VmError::OutOfFrames)` if `frames=0`.
    pub fn from_cmdline(cmdline: &str) -> Result<Self, VmError> {
        let mut builder = Self::builder();
        for arg in cmdline.split_whitespace() {
            let (key, value) = arg.split_once('=').ok_or(VmError::InvalidArgument)?;
            builder = match key {
                "frames" => builder.frame_count(parse_usize(value)?),
                "page_size" => builder.page_size(parse_usize(value)?),
                "policy" => builder.policy(value.parse()?),
                _ => {
                    log::warn!("config: unknown key `{key}`");
                    return Err(VmError::InvalidArgument);
                }
            };
        }
        builder.build()
    }

    /// The page geometry.
    #[inline]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// The number of physical frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// The replacement policy.
    #[inline]
    pub fn policy(&self) -> PolicyKind {
        self.policy
    }
}

fn parse_usize(value: &str) -> Result<usize, VmError> {
    value.parse().map_err(|_| VmError::InvalidArgument)
}

/// A builder for [`VmConfig`].
///
/// The [`VmConfigBuilder`] collects the settings of the manager and
/// validates them all at once in [`VmConfigBuilder::build`], so that a
/// malformed configuration is surfaced at startup instead of at the first
/// page fault.
#[derive(Clone, Copy, Debug)]
pub struct VmConfigBuilder {
    page_size: usize,
    frame_count: usize,
    policy: PolicyKind,
}

impl Default for VmConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VmConfigBuilder {
    /// The number of frames used when none is configured.
    pub const DEFAULT_FRAME_COUNT: usize = 64;

    /// Creates a builder holding the default settings.
    pub fn new() -> Self {
        Self {
            page_size: PageSize::DEFAULT.bytes(),
            frame_count: Self::DEFAULT_FRAME_COUNT,
            policy: PolicyKind::Clock,
        }
    }

    /// Sets the number of bytes per page.
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    /// Sets the number of physical frames.
    pub fn frame_count(mut self, frames: usize) -> Self {
        self.frame_count = frames;
        self
    }

    /// Sets the replacement policy.
    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Validates the settings.
    ///
    /// # Returns
    /// - `Ok(VmConfig)` if the settings are usable.
    /// - `Err(VmError::OutOfFrames)` if the frame count is zero.
    /// - `Err(VmError::InvalidArgument)` if the page size is not a power of
    ///   two.
    pub fn build(self) -> Result<VmConfig, VmError> {
        if self.frame_count == 0 {
            log::warn!("config: zero physical frames");
            return Err(VmError::OutOfFrames);
        }
        let page_size = PageSize::new(self.page_size).inspect_err(|_| {
            log::warn!("config: page size {:#x} is not a power of two", self.page_size)
        })?;
        Ok(VmConfig {
            page_size,
            frame_count: self.frame_count,
            policy: self.policy,
        })
    }
}
