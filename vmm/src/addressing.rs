//! Virtual and Physical Memory Addressing Schemes.
//!
//! This module provides abstractions for virtual addresses and physical
//! addresses. Every process sees a flat virtual address space that starts at
//! zero and is divided into fixed-size **pages**. Physical memory is divided
//! into **frames** of the same size. The manager maps a virtual page to a
//! physical frame on demand, so an address is always interpreted as a pair
//! of a page (or frame) number and an offset inside that page.
//!
//! The module defines the following types:
//! - [`Va`]: a virtual address.
//! - [`Pa`]: a physical address.
//! - [`Vpn`]: a virtual page number, the index of a page table entry.
//! - [`FrameNumber`]: a physical frame number.
//! - [`PageSize`]: the power-of-two page geometry that converts between them.
//!
//! ## Address Decomposition
//!
//! With a page size of `2^s` bytes, the low `s` bits of an address are the
//! offset and the remaining upper bits are the page (or frame) number:
//! ```text
//! 63                                s s-1            0
//! +----------------------------------+---------------+
//! |     Virtual Page Number (vpn)    |    Offset     |
//! +----------------------------------+---------------+
//!                  |                         |
//!            page table                      | (unchanged)
//!                  v                         v
//! +----------------------------------+---------------+
//! |        Frame Number (frame)      |    Offset     |
//! +----------------------------------+---------------+
//! ```
//!
//! A translation never changes the offset: for a page mapped to frame `f`,
//! the byte at offset `d` lives at the physical address
//! `f * page_size + d`.
//!
//! ## Arithmetic Operations
//!
//! Both [`Va`] and [`Pa`] implement addition, subtraction and bitwise
//! operations with `usize`, which allow straightforward address arithmetic.
//!
//! ```text
//! let va = Va::new(0x1234);
//! let next = va + PAGE_SIZE; // Move to the next page
//! ```

use crate::VmError;

/// The default size of a single page in memory, in bytes.
///
/// This constant represents the size of a memory page, which is 4 KiB. It is
/// the page size used by [`PageSize::DEFAULT`].
pub const PAGE_SIZE: usize = 0x1000;

/// The shift amount to get the page index from a given address with the
/// default page size.
pub const PAGE_SHIFT: usize = 12; // 12 bits (log2 of 4 KB)

/// A mask for extracting the offset within a default-sized page from a given
/// address.
pub const PAGE_MASK: usize = 0xfff;

/// The geometry of a page.
///
/// A page size is always a power of two, so that an address can be split
/// into a page number and an offset with a shift and a mask. [`PageSize`]
/// stores the shift and provides the conversions between [`Va`], [`Pa`],
/// [`Vpn`] and [`FrameNumber`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PageSize {
    shift: u32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl PageSize {
    /// The default page size, [`PAGE_SIZE`] bytes.
    pub const DEFAULT: Self = Self {
        shift: PAGE_SHIFT as u32,
    };

    /// Creates a page geometry of `bytes` bytes.
    ///
    /// # Returns
    /// - `Ok(PageSize)` if `bytes` is a power of two.
    /// - `Err(VmError::InvalidArgument)` otherwise, including zero.
    pub const fn new(bytes: usize) -> Result<Self, VmError> {
        if bytes.is_power_of_two() {
            Ok(Self {
                shift: bytes.trailing_zeros(),
            })
        } else {
            Err(VmError::InvalidArgument)
        }
    }

    /// The number of bytes in a page.
    #[inline]
    pub const fn bytes(self) -> usize {
        1 << self.shift
    }

    /// The number of bits of an address used as the page offset.
    #[inline]
    pub const fn shift(self) -> u32 {
        self.shift
    }

    /// A mask extracting the page offset from an address.
    #[inline]
    pub const fn mask(self) -> usize {
        self.bytes() - 1
    }

    /// Decomposes a virtual address into its page number and offset.
    ///
    /// ## Example:
    /// ```text
    /// let (vpn, offset) = PageSize::DEFAULT.split(Va::new(0x1234));
    /// assert_eq!(vpn, Vpn(1));
    /// assert_eq!(offset, 0x234);
    /// ```
    #[inline]
    pub const fn split(self, va: Va) -> (Vpn, usize) {
        (Vpn(va.0 >> self.shift), va.0 & self.mask())
    }

    /// Composes the virtual address at `offset` of the page `vpn`.
    ///
    /// The offset is truncated to the page.
    #[inline]
    pub const fn va(self, vpn: Vpn, offset: usize) -> Va {
        Va((vpn.0 << self.shift) | (offset & self.mask()))
    }

    /// Composes the physical address at `offset` of the frame `frame`.
    ///
    /// The offset is truncated to the page.
    #[inline]
    pub const fn pa(self, frame: FrameNumber, offset: usize) -> Pa {
        Pa((frame.0 << self.shift) | (offset & self.mask()))
    }
}

/// Represents a virtual address.
///
/// The `Va` (Virtual Address) struct is a wrapper around the `usize` type,
/// which represents an address in the flat virtual address space of a
/// single process. It is meaningful only together with the process that
/// issued it.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Va(usize);

impl Va {
    /// Creates a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Cast the virtual address into a raw `usize`.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

/// Represents a physical address.
///
/// The `Pa` (Physical Address) struct is a wrapper around the `usize` type,
/// which represents a location in the physical memory managed by the
/// virtual memory manager. A physical address is produced by translating a
/// [`Va`] through a page table.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Pa(usize);

impl Pa {
    /// Creates a new physical address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Cast the physical address into a raw `usize`.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

/// A virtual page number.
///
/// The index of a page inside an address space, and therefore the index of
/// its page table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Vpn(pub usize);

/// A physical frame number.
///
/// The index of a frame in physical memory. Frame numbers are dense: a
/// system with `n` frames uses the numbers `0..n`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(pub usize);

impl Vpn {
    /// Cast the page number into a raw `usize`.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

impl FrameNumber {
    /// Cast the frame number into a raw `usize`.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

macro_rules! impl_arith {
    ($t: ty) => {
        impl core::ops::Add<usize> for $t {
            type Output = Self;

            fn add(self, other: usize) -> Self::Output {
                Self(self.0 + other)
            }
        }
        impl core::ops::AddAssign<usize> for $t {
            fn add_assign(&mut self, other: usize) {
                self.0 += other
            }
        }
        impl core::ops::Sub<usize> for $t {
            type Output = Self;

            fn sub(self, other: usize) -> Self::Output {
                Self(self.0 - other)
            }
        }
        impl core::ops::Sub<Self> for $t {
            type Output = usize;

            fn sub(self, other: Self) -> Self::Output {
                self.0 - other.0
            }
        }
        impl core::ops::BitOr<usize> for $t {
            type Output = Self;

            fn bitor(self, other: usize) -> Self {
                Self(self.0 | other)
            }
        }
        impl core::ops::BitAnd<usize> for $t {
            type Output = Self;

            fn bitand(self, other: usize) -> Self {
                Self(self.0 & other)
            }
        }
    };
}

impl_arith!(Va);
impl_arith!(Pa);

impl core::fmt::Debug for Va {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Va(0x{:x})", self.0)
    }
}
impl core::fmt::Display for Va {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Va(0x{:x})", self.0)
    }
}
impl core::fmt::Debug for Pa {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pa(0x{:x})", self.0)
    }
}
impl core::fmt::Display for Pa {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pa(0x{:x})", self.0)
    }
}
