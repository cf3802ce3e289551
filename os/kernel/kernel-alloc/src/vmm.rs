//! Minimal Virtual Memory Manager (VMM) for the kernel half.
//!
//! The VMM tracks the kernel's share of the address space,
//! `[KERNEL_ADDR_OFFSET, ADDRESS_LIMIT)`, with one bit per 4 KiB page. At
//! [`init`](Vmm::init) it reserves the kernel image and every
//! `virtual_reserved` range of the memory profile; ranges with physical
//! backing are installed through the [`Mapper`] as 4 MiB pages.
//!
//! A mapping that contradicts one already present (the same 4 MiB virtual page
//! backed by a different frame) is refused.
//!
//! # Example
//! ```ignore
//! use kernel_alloc::vmm::Vmm;
//! let MemProfile { layout, fixed_allocator } = &mut profile;
//! let mut vmm = Vmm::init(layout, fixed_allocator, active_directory)?;
//! let scratch = vmm.allocate(4)?;
//! ```

use crate::bootstrap::{BootstrapAllocError, BootstrapAllocator};
use crate::profile::{ADDRESS_LIMIT, Map, MemoryLayout, Range};
use kernel_info::memory::{KERNEL_ADDR_OFFSET, LARGE_PAGE_SIZE};
use kernel_memory_addresses::{
    PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress, VirtualPage,
};
use kernel_vmem::{Mapper, MapperError, PageDirectoryEntry};
use log::{debug, info};

const PAGE_SIZE: u32 = 4096;
const BITS: usize = u32::BITS as usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmError {
    #[error("range [{start}, {end}) is outside kernel space")]
    OutsideKernelSpace {
        start: VirtualAddress,
        end: VirtualAddress,
    },
    #[error("virtual range of {virt_len:#x} bytes has {phys_len:#x} bytes of backing")]
    MismatchedBacking { virt_len: u32, phys_len: u32 },
    #[error("{virt} and {phys} differ by a non-multiple of 4 MiB")]
    Misaligned {
        virt: VirtualAddress,
        phys: PhysicalAddress,
    },
    #[error("no {pages} contiguous free pages")]
    OutOfVirtualMemory { pages: usize },
    #[error("allocation of zero pages")]
    InvalidLength,
    #[error("{addr} is not 4 KiB aligned")]
    Unaligned { addr: VirtualAddress },
    #[error("{addr} is not allocated")]
    NotReserved { addr: VirtualAddress },
    #[error("{addr} belongs to a fixed reservation")]
    Fixed { addr: VirtualAddress },
    #[error(transparent)]
    Mapping(#[from] MapperError),
    #[error(transparent)]
    Allocation(#[from] BootstrapAllocError),
}

/// Kernel-half virtual address allocator backed by a [`Mapper`].
pub struct Vmm<'a, M: Mapper> {
    bitmap: &'a mut [u32],
    fixed: &'a [Map],
    kernel: Range<VirtualAddress>,
    pages: usize,
    free: usize,
    mapper: M,
}

impl<'a, M: Mapper> Vmm<'a, M> {
    /// Reserves the kernel image and all `virtual_reserved` ranges of `layout`
    /// and maps the backed ones.
    ///
    /// # Errors
    /// - [`VmmError::OutsideKernelSpace`] for a reserved range below the kernel half.
    /// - [`VmmError::MismatchedBacking`] / [`VmmError::Misaligned`] for backing that
    ///   cannot be expressed with 4 MiB pages.
    /// - [`VmmError::Mapping`] if a backed range conflicts with an existing mapping.
    /// - [`VmmError::Allocation`] if the bitmap does not fit the bootstrap heap.
    pub fn init(
        layout: &MemoryLayout<'a>,
        allocator: &mut BootstrapAllocator<'a>,
        mapper: M,
    ) -> Result<Self, VmmError> {
        let pages = ((ADDRESS_LIMIT - KERNEL_ADDR_OFFSET) / PAGE_SIZE) as usize;
        let bitmap = allocator.allocate_slice(pages.div_ceil(BITS), 0u32)?;
        let tail = pages % BITS;
        if tail != 0
            && let Some(last) = bitmap.last_mut()
        {
            *last = !0 << tail;
        }

        let mut vmm = Self {
            bitmap,
            fixed: layout.virtual_reserved,
            kernel: layout.kernel_virtual(),
            pages,
            free: pages,
            mapper,
        };

        vmm.reserve(&Map {
            virt: layout.kernel_virtual(),
            phys: Some(layout.kernel_physical()),
        })?;
        for map in layout.virtual_reserved {
            vmm.reserve(map)?;
        }

        info!("VMM: {} of {} kernel pages free", vmm.free, vmm.pages);
        Ok(vmm)
    }

    #[must_use]
    pub const fn free_pages(&self) -> usize {
        self.free
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    pub const fn mapper_mut(&mut self) -> &mut M {
        &mut self.mapper
    }

    /// Whether the page containing `va` is reserved or allocated.
    ///
    /// Addresses below the kernel half are not managed and report `false`.
    #[must_use]
    pub fn is_reserved(&self, va: VirtualAddress) -> bool {
        self.index_of(va).is_some_and(|index| self.test(index))
    }

    /// Resolves `va` through the mapper.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.mapper.translate(va)
    }

    /// Reserves `count` contiguous 4 KiB pages and returns the first address.
    ///
    /// The pages are not backed; the caller maps them.
    ///
    /// # Errors
    /// - [`VmmError::InvalidLength`] if `count == 0`.
    /// - [`VmmError::OutOfVirtualMemory`] if no free run is long enough.
    pub fn allocate(&mut self, count: usize) -> Result<VirtualAddress, VmmError> {
        if count == 0 {
            return Err(VmmError::InvalidLength);
        }

        let mut run = 0;
        let mut index = 0;
        while index < self.pages {
            if self.bitmap[index / BITS] == u32::MAX && index % BITS == 0 {
                run = 0;
                index += BITS;
                continue;
            }

            if self.test(index) {
                run = 0;
            } else {
                run += 1;
                if run == count {
                    let first = index + 1 - count;
                    self.mark(first, count);
                    let addr = Self::address_of(first);
                    debug!("VMM: allocated {count} pages at {addr}");
                    return Ok(addr);
                }
            }
            index += 1;
        }

        Err(VmmError::OutOfVirtualMemory { pages: count })
    }

    /// Returns `count` pages starting at `addr`.
    ///
    /// # Errors
    /// - [`VmmError::Unaligned`] if `addr` is not page aligned.
    /// - [`VmmError::OutsideKernelSpace`] if the range leaves the kernel half.
    /// - [`VmmError::Fixed`] if the range touches the kernel or a reserved range.
    /// - [`VmmError::NotReserved`] if any page is not allocated; nothing is released.
    pub fn release(&mut self, addr: VirtualAddress, count: usize) -> Result<(), VmmError> {
        if !addr.is_aligned::<Size4K>() {
            return Err(VmmError::Unaligned { addr });
        }
        let range = u32::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(PAGE_SIZE))
            .and_then(|len| Range::from_start_len(addr, len))
            .ok_or(VmmError::OutsideKernelSpace {
                start: addr,
                end: VirtualAddress::new(ADDRESS_LIMIT),
            })?;
        let Some((first, count)) = self.span(range)? else {
            return Err(VmmError::InvalidLength);
        };

        if self.kernel.overlaps(&range) || self.fixed.iter().any(|m| m.virt.overlaps(&range)) {
            return Err(VmmError::Fixed { addr });
        }
        if let Some(index) = (first..first + count).find(|&index| !self.test(index)) {
            return Err(VmmError::NotReserved {
                addr: Self::address_of(index),
            });
        }

        for index in first..first + count {
            self.clear(index);
        }
        self.free += count;
        Ok(())
    }

    fn reserve(&mut self, map: &Map) -> Result<(), VmmError> {
        let Some((first, count)) = self.span(map.virt)? else {
            return Ok(());
        };
        debug!("VMM: reserving {}", map.virt);
        self.mark(first, count);

        if let Some(phys) = map.phys {
            self.map_backing(map.virt, phys)?;
        }
        Ok(())
    }

    fn map_backing(
        &mut self,
        virt: Range<VirtualAddress>,
        phys: Range<PhysicalAddress>,
    ) -> Result<(), VmmError> {
        if virt.len() != phys.len() {
            return Err(VmmError::MismatchedBacking {
                virt_len: virt.len(),
                phys_len: phys.len(),
            });
        }

        let delta = virt.start().as_u32().wrapping_sub(phys.start().as_u32());
        if !delta.is_multiple_of(LARGE_PAGE_SIZE) {
            return Err(VmmError::Misaligned {
                virt: virt.start(),
                phys: phys.start(),
            });
        }

        let flags = PageDirectoryEntry::new().with_writable(true);
        let first = virt.start().page::<Size4M>().number();
        let last = (virt.end().as_u32() - 1) / LARGE_PAGE_SIZE;
        let shift = delta / LARGE_PAGE_SIZE;
        for number in first..=last {
            let page = VirtualPage::<Size4M>::from_number(number);
            let frame = PhysicalPage::<Size4M>::from_number(number.wrapping_sub(shift));
            self.mapper.map_large(page, frame, flags)?;
        }
        Ok(())
    }

    /// First page index and page count of `range`; `None` when empty.
    fn span(&self, range: Range<VirtualAddress>) -> Result<Option<(usize, usize)>, VmmError> {
        if range.is_empty() {
            return Ok(None);
        }
        let outside = VmmError::OutsideKernelSpace {
            start: range.start(),
            end: range.end(),
        };
        let first = self.index_of(range.start()).ok_or(outside)?;
        let last = self
            .index_of(VirtualAddress::new(range.end().as_u32() - 1))
            .ok_or(outside)?;
        Ok(Some((first, last - first + 1)))
    }

    fn index_of(&self, va: VirtualAddress) -> Option<usize> {
        let offset = va.as_u32().checked_sub(KERNEL_ADDR_OFFSET)?;
        let index = (offset / PAGE_SIZE) as usize;
        (index < self.pages).then_some(index)
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn address_of(index: usize) -> VirtualAddress {
        VirtualAddress::new(KERNEL_ADDR_OFFSET + index as u32 * PAGE_SIZE)
    }

    fn mark(&mut self, first: usize, count: usize) {
        for index in first..first + count {
            if !self.test(index) {
                self.set(index);
                self.free -= 1;
            }
        }
    }

    fn test(&self, index: usize) -> bool {
        self.bitmap[index / BITS] & (1 << (index % BITS)) != 0
    }

    fn set(&mut self, index: usize) {
        self.bitmap[index / BITS] |= 1 << (index % BITS);
    }

    fn clear(&mut self, index: usize) {
        self.bitmap[index / BITS] &= !(1 << (index % BITS));
    }
}

impl<M: Mapper> core::fmt::Debug for Vmm<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vmm")
            .field("pages", &self.pages)
            .field("free", &self.free)
            .field("kernel", &self.kernel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::TranslationOffset;
    use kernel_vmem::{KERNEL_BOOT_MAPPING, PageDirectory, PdIndex};

    fn va(v: u32) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn pa(p: u32) -> PhysicalAddress {
        PhysicalAddress::new(p)
    }

    fn backed(virt: u32, phys: u32, len: u32) -> Map {
        Map {
            virt: Range::from_start_len(va(virt), len).unwrap(),
            phys: Some(Range::from_start_len(pa(phys), len).unwrap()),
        }
    }

    fn layout(virtual_reserved: &[Map]) -> MemoryLayout<'_> {
        MemoryLayout {
            vaddr_start: va(0xC010_0000),
            vaddr_end: va(0xC018_0000),
            physaddr_start: pa(0x10_0000),
            physaddr_end: pa(0x18_0000),
            mem_kb: 64 * 1024,
            modules: &[],
            virtual_reserved,
            physical_reserved: &[],
            offset: TranslationOffset::new(0xC000_0000),
        }
    }

    fn boot_directory() -> PageDirectory {
        PageDirectory::boot(KERNEL_BOOT_MAPPING).unwrap()
    }

    #[test]
    fn reserves_and_maps_profile_ranges() {
        let reserved = [
            backed(0xC010_0000, 0x10_0000, 0x8_0000),
            backed(0xC0C0_0000, 0xC0_0000, 0x2000),
            Map {
                virt: Range::from_start_len(va(0xD000_0000), 0x1000).unwrap(),
                phys: None,
            },
        ];
        let layout = layout(&reserved);
        let mut heap = vec![0u8; 64 * 1024];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        let vmm = Vmm::init(&layout, &mut alloc, boot_directory()).unwrap();

        assert!(vmm.is_reserved(va(0xC010_0000)));
        assert!(vmm.is_reserved(va(0xC017_FFFF)));
        assert!(!vmm.is_reserved(va(0xC018_0000)));
        assert!(vmm.is_reserved(va(0xC0C0_1FFF)));
        assert!(vmm.is_reserved(va(0xD000_0FFF)));
        assert!(!vmm.is_reserved(va(0xD000_1000)));
        assert!(!vmm.is_reserved(va(0x0010_0000)));

        assert_eq!(vmm.translate(va(0xC0C0_1234)), Some(pa(0x00C0_1234)));
        assert_eq!(vmm.translate(va(0xD000_0000)), None);
        assert!(vmm.mapper().get(PdIndex::new(771)).is_large_leaf());

        let total = ((ADDRESS_LIMIT - KERNEL_ADDR_OFFSET) / PAGE_SIZE) as usize;
        assert_eq!(vmm.free_pages(), total - 0x80 - 2 - 1);
    }

    #[test]
    fn refuses_conflicting_backing() {
        let reserved = [backed(0xC000_0000, 0x40_0000, 0x1000)];
        let layout = layout(&reserved);
        let mut heap = vec![0u8; 64 * 1024];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        assert!(matches!(
            Vmm::init(&layout, &mut alloc, boot_directory()),
            Err(VmmError::Mapping(MapperError::AlreadyMapped { .. }))
        ));
    }

    #[test]
    fn refuses_unexpressible_ranges() {
        let mut heap = vec![0u8; 128 * 1024];
        let mut alloc = BootstrapAllocator::new(&mut heap);

        let below = [backed(0x0040_0000, 0x40_0000, 0x1000)];
        assert!(matches!(
            Vmm::init(&layout(&below), &mut alloc, boot_directory()),
            Err(VmmError::OutsideKernelSpace { .. })
        ));

        let skewed = [backed(0xC100_0000, 0x40_1000, 0x1000)];
        assert!(matches!(
            Vmm::init(&layout(&skewed), &mut alloc, boot_directory()),
            Err(VmmError::Misaligned { .. })
        ));
    }

    #[test]
    fn allocate_and_release() {
        let reserved = [];
        let layout = layout(&reserved);
        let mut heap = vec![0u8; 64 * 1024];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        let mut vmm = Vmm::init(&layout, &mut alloc, PageDirectory::zeroed()).unwrap();
        let free = vmm.free_pages();

        let a = vmm.allocate(4).unwrap();
        assert_eq!(a, va(0xC000_0000));
        let b = vmm.allocate(0x100).unwrap();
        assert_eq!(b, va(0xC018_0000));
        let c = vmm.allocate(1).unwrap();
        assert_eq!(c, va(0xC000_4000));
        assert!(vmm.is_reserved(b));
        assert_eq!(vmm.free_pages(), free - 4 - 0x100 - 1);

        assert_eq!(vmm.release(a, 4), Ok(()));
        assert_eq!(vmm.release(a, 1), Err(VmmError::NotReserved { addr: a }));
        assert_eq!(vmm.release(va(0xC000_4001), 1), Err(VmmError::Unaligned { addr: va(0xC000_4001) }));
        assert_eq!(vmm.release(va(0xC010_0000), 1), Err(VmmError::Fixed { addr: va(0xC010_0000) }));
        assert_eq!(vmm.allocate(2), Ok(a));

        assert_eq!(vmm.allocate(0), Err(VmmError::InvalidLength));
        assert_eq!(
            vmm.allocate(free),
            Err(VmmError::OutOfVirtualMemory { pages: free })
        );
    }
}
