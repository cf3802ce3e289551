//! # Memory Profile
//!
//! The architecture-independent description of memory handed from discovery
//! to every later subsystem:
//!
//! - where the kernel image lives, virtually and physically;
//! - how much memory the machine has ([`MemoryLayout::mem_kb`]);
//! - which boot modules were loaded and where;
//! - which virtual ranges are already in use ([`Map`]s);
//! - which physical ranges must never be handed out.
//!
//! A [`MemProfile`] pairs the read-only [`MemoryLayout`] with the owned
//! [`BootstrapAllocator`]. The two are separate fields so a stage can borrow
//! the layout shared and the allocator exclusive at the same time:
//!
//! ```ignore
//! let MemProfile { layout, fixed_allocator } = &mut profile;
//! let pmm = Pmm::init(layout, fixed_allocator)?;
//! ```

mod discovery;

pub use discovery::{KernelImage, MemoryDiscoveryError, discover};

use crate::bootstrap::BootstrapAllocator;
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, TranslationOffset, VirtualAddress};

/// Highest exclusive end a [`Range`] can describe.
///
/// Ranges are stored in 32 bits; the topmost 4 KiB page of the address space
/// is never described and never handed out.
pub const ADDRESS_LIMIT: u32 = 0xFFFF_F000;

/// An address type a [`Range`] can be built from.
pub trait RangeBound: Copy + Ord + fmt::Debug + fmt::Display {
    fn to_raw(self) -> u32;
    fn from_raw(raw: u32) -> Self;
}

impl RangeBound for PhysicalAddress {
    #[inline]
    fn to_raw(self) -> u32 {
        self.as_u32()
    }

    #[inline]
    fn from_raw(raw: u32) -> Self {
        Self::new(raw)
    }
}

impl RangeBound for VirtualAddress {
    #[inline]
    fn to_raw(self) -> u32 {
        self.as_u32()
    }

    #[inline]
    fn from_raw(raw: u32) -> Self {
        Self::new(raw)
    }
}

/// A half-open address range `[start, end)` with `start <= end`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Range<A> {
    start: A,
    end: A,
}

impl<A: RangeBound> Range<A> {
    /// Returns `None` if `start > end`.
    #[inline]
    #[must_use]
    pub fn try_new(start: A, end: A) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// The range `[start, start + len)`, or `None` if it would pass
    /// [`ADDRESS_LIMIT`].
    #[must_use]
    pub fn from_start_len(start: A, len: u32) -> Option<Self> {
        let end = start.to_raw().checked_add(len)?;
        (end <= ADDRESS_LIMIT).then(|| Self {
            start,
            end: A::from_raw(end),
        })
    }

    /// An empty range at address zero.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        let zero = A::from_raw(0);
        Self {
            start: zero,
            end: zero,
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> A {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> A {
        self.end
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end.to_raw() - self.start.to_raw()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: A) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Whether the two ranges share at least one address.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The common part of both ranges, if any.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Self { start, end })
    }

    /// Cuts the range off at `limit`; `None` if nothing is left.
    #[must_use]
    pub fn clamp_end(&self, limit: A) -> Option<Self> {
        let end = self.end.min(limit);
        (self.start < end).then_some(Self {
            start: self.start,
            end,
        })
    }
}

impl<A: RangeBound> fmt::Debug for Range<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl<A: RangeBound> fmt::Display for Range<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A boot module loaded by the bootloader.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Module<'a> {
    pub region: Range<PhysicalAddress>,
    pub name: &'a str,
}

/// A virtual range in use, optionally backed by a fixed physical range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Map {
    pub virt: Range<VirtualAddress>,
    pub phys: Option<Range<PhysicalAddress>>,
}

/// Everything discovery learned about memory.
#[derive(Debug, Copy, Clone)]
pub struct MemoryLayout<'a> {
    pub vaddr_start: VirtualAddress,
    pub vaddr_end: VirtualAddress,
    pub physaddr_start: PhysicalAddress,
    pub physaddr_end: PhysicalAddress,
    /// Total memory in KiB.
    pub mem_kb: u32,
    pub modules: &'a [Module<'a>],
    /// Virtual ranges in use; the kernel image comes first.
    pub virtual_reserved: &'a [Map],
    /// Physical ranges that must never be allocated.
    pub physical_reserved: &'a [Range<PhysicalAddress>],
    /// `vaddr_start - physaddr_start`.
    pub offset: TranslationOffset,
}

impl MemoryLayout<'_> {
    /// The kernel image in physical memory.
    #[must_use]
    pub const fn kernel_physical(&self) -> Range<PhysicalAddress> {
        Range {
            start: self.physaddr_start,
            end: self.physaddr_end,
        }
    }

    /// The kernel image in virtual memory.
    #[must_use]
    pub const fn kernel_virtual(&self) -> Range<VirtualAddress> {
        Range {
            start: self.vaddr_start,
            end: self.vaddr_end,
        }
    }

    /// Bytes of memory, as reported by the bootloader.
    #[must_use]
    pub const fn mem_bytes(&self) -> u64 {
        self.mem_kb as u64 * 1024
    }

    /// End of the memory ranges can describe: [`mem_bytes`](Self::mem_bytes)
    /// limited to [`ADDRESS_LIMIT`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn usable_end(&self) -> PhysicalAddress {
        let bytes = self.mem_bytes();
        if bytes < ADDRESS_LIMIT as u64 {
            PhysicalAddress::new(bytes as u32)
        } else {
            PhysicalAddress::new(ADDRESS_LIMIT)
        }
    }

    /// Whether `addr` falls in any physically reserved range.
    #[must_use]
    pub fn is_physically_reserved(&self, addr: PhysicalAddress) -> bool {
        self.physical_reserved.iter().any(|r| r.contains(addr))
    }
}

/// The discovery result: memory layout plus the bootstrap allocator that now
/// owns the remaining bootstrap heap.
#[derive(Debug)]
pub struct MemProfile<'a> {
    pub layout: MemoryLayout<'a>,
    pub fixed_allocator: BootstrapAllocator<'a>,
}

impl<'a> MemProfile<'a> {
    /// Borrows the layout and the allocator at the same time.
    pub const fn split(&mut self) -> (&MemoryLayout<'a>, &mut BootstrapAllocator<'a>) {
        (&self.layout, &mut self.fixed_allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr(start: u32, end: u32) -> Range<PhysicalAddress> {
        Range::try_new(PhysicalAddress::new(start), PhysicalAddress::new(end)).unwrap()
    }

    #[test]
    fn construction() {
        assert!(Range::try_new(PhysicalAddress::new(2), PhysicalAddress::new(1)).is_none());
        assert!(pr(5, 5).is_empty());
        assert_eq!(pr(0x1000, 0x3000).len(), 0x2000);
        assert_eq!(
            Range::from_start_len(VirtualAddress::new(0xC000_0000), 0x10).map(|r| r.end()),
            Some(VirtualAddress::new(0xC000_0010))
        );
        assert!(Range::from_start_len(PhysicalAddress::new(0xFFFF_0000), 0x10_0000).is_none());
        assert!(Range::<PhysicalAddress>::empty().is_empty());
    }

    #[test]
    fn containment_and_overlap() {
        let r = pr(0x1000, 0x2000);
        assert!(r.contains(PhysicalAddress::new(0x1000)));
        assert!(r.contains(PhysicalAddress::new(0x1FFF)));
        assert!(!r.contains(PhysicalAddress::new(0x2000)));

        assert!(r.overlaps(&pr(0x1FFF, 0x3000)));
        assert!(!r.overlaps(&pr(0x2000, 0x3000)));
        assert!(!r.overlaps(&pr(0x0, 0x1000)));
        assert!(!pr(0x1800, 0x1800).overlaps(&r));
    }

    #[test]
    fn intersect_and_clamp() {
        let r = pr(0x1000, 0x4000);
        assert_eq!(r.intersect(&pr(0x3000, 0x8000)), Some(pr(0x3000, 0x4000)));
        assert_eq!(r.intersect(&pr(0x4000, 0x8000)), None);
        assert_eq!(r.clamp_end(PhysicalAddress::new(0x2000)), Some(pr(0x1000, 0x2000)));
        assert_eq!(r.clamp_end(PhysicalAddress::new(0x1000)), None);
        assert_eq!(r.clamp_end(PhysicalAddress::new(0x9000)), Some(r));
    }

    #[test]
    fn range_formatting() {
        assert_eq!(format!("{}", pr(0x1000, 0x2000)), "[0x00001000, 0x00002000)");
    }

    #[test]
    fn layout_helpers() {
        let reserved = [pr(0, 0x10_0000)];
        let layout = MemoryLayout {
            vaddr_start: VirtualAddress::new(0xC010_0000),
            vaddr_end: VirtualAddress::new(0xC020_0000),
            physaddr_start: PhysicalAddress::new(0x10_0000),
            physaddr_end: PhysicalAddress::new(0x20_0000),
            mem_kb: 4 * 1024 * 1024 + 1024,
            modules: &[],
            virtual_reserved: &[],
            physical_reserved: &reserved,
            offset: TranslationOffset::new(0xC000_0000),
        };
        assert_eq!(layout.kernel_physical(), pr(0x10_0000, 0x20_0000));
        assert_eq!(layout.kernel_virtual().len(), 0x10_0000);
        assert_eq!(layout.usable_end(), PhysicalAddress::new(ADDRESS_LIMIT));
        assert!(layout.is_physically_reserved(PhysicalAddress::new(0xB8000)));
        assert!(!layout.is_physically_reserved(PhysicalAddress::new(0x10_0000)));
    }
}
