//! # Memory Discovery
//!
//! Builds a [`MemProfile`] from the multiboot information structure and the
//! kernel image bounds provided by the linker.
//!
//! ```text
//! physical_reserved:  [0, 1 MiB)  kernel image  non-available map entries…  modules…
//! virtual_reserved:   kernel image (backed)     modules… (backed, at phys_to_virt)
//! ```
//!
//! Memory-map entries above the end of memory are dropped: BIOS ROM shadows
//! and MMIO windows above RAM are normal and nothing will ever allocate there.
//! Boot modules are not treated that way: one that ends past memory or lies
//! on top of the kernel image is malformed.

use super::{ADDRESS_LIMIT, Map, MemProfile, MemoryLayout, Module, Range};
use crate::bootstrap::{BootstrapAllocError, BootstrapAllocator};
use kernel_info::memory::{KERNEL_OFFSET, LOW_MEMORY_END};
use kernel_info::multiboot::{MemoryRegion, Multiboot, MultibootError, PhysicalMemory};
use kernel_memory_addresses::{PhysicalAddress, TranslationOffset, VirtualAddress};
use log::{debug, info};

/// Kernel image bounds, usually taken from linker symbols.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernelImage {
    pub vaddr_start: VirtualAddress,
    pub vaddr_end: VirtualAddress,
    pub physaddr_start: PhysicalAddress,
    pub physaddr_end: PhysicalAddress,
}

impl KernelImage {
    /// Checks the image is consistent and relocated by `expected`.
    fn offset(&self, expected: TranslationOffset) -> Option<TranslationOffset> {
        let virt = Range::try_new(self.vaddr_start, self.vaddr_end)?;
        let phys = Range::try_new(self.physaddr_start, self.physaddr_end)?;
        if self.vaddr_start.as_u32() < self.physaddr_start.as_u32() || virt.len() != phys.len() {
            return None;
        }

        let offset = (self.vaddr_start.as_u32() - self.physaddr_start.as_u32()) as usize;
        (offset == expected.get()).then_some(TranslationOffset::new(offset))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryDiscoveryError {
    #[error("bootloader did not provide memory bounds")]
    MissingMemoryInfo,
    #[error("bootloader did not provide a memory map")]
    MissingMemoryMap,
    #[error("malformed memory map entry at offset {offset:#x}")]
    MalformedMemoryMap { offset: usize },
    /// Reversed bounds, an invalid name, or a region past memory or over the
    /// kernel image.
    #[error("malformed module entry {index}")]
    MalformedModule { index: usize },
    #[error("reserved memory {base:#x}+{length:#x} overlaps the kernel image")]
    KernelOverlapsReservedMemory { base: u64, length: u64 },
    #[error("kernel needs memory up to {required:#x} but only {available:#x} bytes exist")]
    InsufficientMemory { required: u64, available: u64 },
    #[error("kernel image bounds are inconsistent")]
    InvalidKernelImage,
    #[error("boot information is unreadable: {0}")]
    Multiboot(MultibootError),
    #[error(transparent)]
    Allocation(#[from] BootstrapAllocError),
}

impl From<MultibootError> for MemoryDiscoveryError {
    fn from(e: MultibootError) -> Self {
        match e {
            MultibootError::MalformedMemoryMap { offset } => Self::MalformedMemoryMap { offset },
            MultibootError::MalformedModule { index } => Self::MalformedModule { index },
            other => Self::Multiboot(other),
        }
    }
}

/// Builds the memory profile.
///
/// `heap` becomes the bootstrap allocator; the profile's sequences are its
/// first allocations.
///
/// # Errors
/// See [`MemoryDiscoveryError`].
pub fn discover<'a, M: PhysicalMemory + ?Sized>(
    payload: &Multiboot<'a, M>,
    image: KernelImage,
    heap: &'a mut [u8],
) -> Result<MemProfile<'a>, MemoryDiscoveryError> {
    let offset = image
        .offset(KERNEL_OFFSET)
        .ok_or(MemoryDiscoveryError::InvalidKernelImage)?;

    let (mem_lower, mem_upper) = payload
        .memory_bounds()
        .ok_or(MemoryDiscoveryError::MissingMemoryInfo)?;
    let mem_kb = mem_lower.saturating_add(mem_upper).saturating_add(1024);
    let mem_bytes = u64::from(mem_kb) * 1024;
    debug!("Memory: lower {mem_lower} KiB, upper {mem_upper} KiB, total {mem_kb} KiB");

    if u64::from(image.physaddr_end.as_u32()) > mem_bytes {
        return Err(MemoryDiscoveryError::InsufficientMemory {
            required: u64::from(image.physaddr_end.as_u32()),
            available: mem_bytes,
        });
    }

    let memory_map = payload
        .memory_map()?
        .ok_or(MemoryDiscoveryError::MissingMemoryMap)?;
    let kernel = image_physical(&image);
    let limit = mem_bytes.min(u64::from(ADDRESS_LIMIT));

    let mut reserved_regions = 0;
    for region in memory_map.clone() {
        let region = region?;
        if region.is_available() {
            continue;
        }
        if overlaps_kernel(&region, &kernel) {
            return Err(MemoryDiscoveryError::KernelOverlapsReservedMemory {
                base: region.base,
                length: region.length,
            });
        }
        reserved_regions += 1;
    }

    let mut allocator = BootstrapAllocator::new(heap);

    let modules: &'a [Module<'a>] = match payload.modules()? {
        None => &[],
        Some(entries) => {
            let slots = allocator.allocate_slice(
                entries.len(),
                Module {
                    region: Range::empty(),
                    name: "",
                },
            )?;
            for (index, (slot, entry)) in slots.iter_mut().zip(entries).enumerate() {
                let entry = entry?;
                let end = u64::from(entry.end.as_u32());
                let region = Range {
                    start: entry.start,
                    end: entry.end,
                };
                if end > limit
                    || end + offset.get() as u64 > u64::from(ADDRESS_LIMIT)
                    || region.overlaps(&kernel)
                {
                    return Err(MemoryDiscoveryError::MalformedModule { index });
                }
                *slot = Module {
                    region,
                    name: entry.name,
                };
                debug!("Module {index}: {} {:?}", slot.region, slot.name);
            }
            slots
        }
    };

    let physical_reserved = allocator.allocate_slice(
        2 + reserved_regions + modules.len(),
        Range::<PhysicalAddress>::empty(),
    )?;
    physical_reserved[0] = Range {
        start: PhysicalAddress::zero(),
        end: PhysicalAddress::new(LOW_MEMORY_END),
    };
    physical_reserved[1] = kernel;
    let mut used = 2;
    for region in memory_map {
        let region = region?;
        if region.is_available() {
            continue;
        }
        if let Some(clipped) = clip(&region, limit) {
            physical_reserved[used] = clipped;
            used += 1;
        }
    }
    for module in modules {
        physical_reserved[used] = module.region;
        used += 1;
    }
    let physical_reserved = &physical_reserved[..used];

    let virtual_reserved = allocator.allocate_slice(
        1 + modules.len(),
        Map {
            virt: image_virtual(&image),
            phys: Some(kernel),
        },
    )?;
    for (slot, module) in virtual_reserved[1..].iter_mut().zip(modules) {
        *slot = Map {
            virt: to_virtual(offset, module.region),
            phys: Some(module.region),
        };
    }

    info!(
        "Memory: {mem_kb} KiB, kernel {kernel}, {} reserved, {} modules",
        physical_reserved.len(),
        modules.len()
    );

    Ok(MemProfile {
        layout: MemoryLayout {
            vaddr_start: image.vaddr_start,
            vaddr_end: image.vaddr_end,
            physaddr_start: image.physaddr_start,
            physaddr_end: image.physaddr_end,
            mem_kb,
            modules,
            virtual_reserved,
            physical_reserved,
            offset,
        },
        fixed_allocator: allocator,
    })
}

const fn image_physical(image: &KernelImage) -> Range<PhysicalAddress> {
    Range {
        start: image.physaddr_start,
        end: image.physaddr_end,
    }
}

const fn image_virtual(image: &KernelImage) -> Range<VirtualAddress> {
    Range {
        start: image.vaddr_start,
        end: image.vaddr_end,
    }
}

const fn to_virtual(offset: TranslationOffset, range: Range<PhysicalAddress>) -> Range<VirtualAddress> {
    Range {
        start: offset.to_virtual(range.start),
        end: offset.to_virtual(range.end),
    }
}

fn overlaps_kernel(region: &MemoryRegion, kernel: &Range<PhysicalAddress>) -> bool {
    let start = u64::from(kernel.start().as_u32());
    let end = u64::from(kernel.end().as_u32());
    region.base < end && start < region.end()
}

/// The part of `region` below `limit`, as a 32-bit range.
#[allow(clippy::cast_possible_truncation)]
fn clip(region: &MemoryRegion, limit: u64) -> Option<Range<PhysicalAddress>> {
    let end = region.end().min(limit);
    if region.base >= end {
        return None;
    }
    Range::try_new(
        PhysicalAddress::new(region.base as u32),
        PhysicalAddress::new(end as u32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ffi::CStr;
    use kernel_info::multiboot::MEMORY_MAP_ENTRY_MIN_SIZE;

    const INFO: u32 = 0x1000;
    const MMAP: u32 = 0x2000;
    const MODS: u32 = 0x3000;
    const NAMES: u32 = 0x3800;

    struct Ram(Vec<u8>);

    impl PhysicalMemory for Ram {
        fn bytes(&self, addr: PhysicalAddress, len: usize) -> Option<&[u8]> {
            self.0.get(addr.as_usize()..addr.as_usize().checked_add(len)?)
        }

        fn c_str(&self, addr: PhysicalAddress) -> Option<&CStr> {
            CStr::from_bytes_until_nul(self.0.get(addr.as_usize()..)?).ok()
        }
    }

    /// Builds a multiboot information structure in a byte buffer.
    struct Boot {
        ram: Vec<u8>,
        flags: u32,
        mmap_len: u32,
        mods: u32,
        names: u32,
    }

    impl Boot {
        fn new(mem_lower: u32, mem_upper: u32) -> Self {
            let mut boot = Self {
                ram: vec![0; 0x4000],
                flags: 1,
                mmap_len: 0,
                mods: 0,
                names: NAMES,
            };
            boot.put(INFO + 4, mem_lower);
            boot.put(INFO + 8, mem_upper);
            boot
        }

        fn put(&mut self, addr: u32, value: u32) {
            let a = addr as usize;
            self.ram[a..a + 4].copy_from_slice(&value.to_le_bytes());
        }

        fn region(mut self, base: u64, length: u64, kind: u32) -> Self {
            self.flags |= 1 << 6;
            let at = MMAP + self.mmap_len;
            self.put(at, MEMORY_MAP_ENTRY_MIN_SIZE as u32);
            self.ram[(at + 4) as usize..(at + 12) as usize].copy_from_slice(&base.to_le_bytes());
            self.ram[(at + 12) as usize..(at + 20) as usize].copy_from_slice(&length.to_le_bytes());
            self.put(at + 20, kind);
            self.mmap_len += 24;
            self
        }

        fn no_regions(mut self) -> Self {
            self.flags |= 1 << 6;
            self
        }

        fn module(mut self, start: u32, end: u32, name: &str) -> Self {
            self.flags |= 1 << 3;
            let at = MODS + self.mods * 16;
            self.put(at, start);
            self.put(at + 4, end);
            self.put(at + 8, self.names);
            let n = self.names as usize;
            self.ram[n..n + name.len()].copy_from_slice(name.as_bytes());
            self.ram[n + name.len()] = 0;
            self.names += name.len() as u32 + 1;
            self.mods += 1;
            self
        }

        fn finish(mut self) -> Ram {
            self.put(INFO, self.flags);
            self.put(INFO + 20, self.mods);
            self.put(INFO + 24, MODS);
            self.put(INFO + 44, self.mmap_len);
            self.put(INFO + 48, MMAP);
            Ram(self.ram)
        }
    }

    fn image(phys_start: u32, phys_end: u32) -> KernelImage {
        KernelImage {
            vaddr_start: VirtualAddress::new(phys_start + 0xC000_0000),
            vaddr_end: VirtualAddress::new(phys_end + 0xC000_0000),
            physaddr_start: PhysicalAddress::new(phys_start),
            physaddr_end: PhysicalAddress::new(phys_end),
        }
    }

    fn pr(start: u32, end: u32) -> Range<PhysicalAddress> {
        Range::try_new(PhysicalAddress::new(start), PhysicalAddress::new(end)).unwrap()
    }

    type Outcome = (u32, Vec<Range<PhysicalAddress>>, Vec<Map>);

    fn run(ram: &Ram, image: KernelImage) -> Result<Outcome, MemoryDiscoveryError> {
        let mut heap = vec![0u8; 4096];
        let payload = Multiboot::from_physical(ram, PhysicalAddress::new(INFO)).unwrap();
        let profile = discover(&payload, image, &mut heap)?;
        Ok((
            profile.layout.mem_kb,
            profile.layout.physical_reserved.to_vec(),
            profile.layout.virtual_reserved.to_vec(),
        ))
    }

    #[test]
    fn typical_machine() {
        let ram = Boot::new(639, 15 * 1024)
            .region(0, 0x9_FC00, 1)
            .region(0x9_FC00, 0x400, 2)
            .region(0xF_0000, 0x1_0000, 2)
            .region(0x10_0000, 0xF0_0000, 1)
            .region(0xFFFC_0000, 0x4_0000, 2)
            .module(0x40_0000, 0x40_2000, "initrd")
            .finish();

        let mut heap = vec![0u8; 4096];
        let payload = Multiboot::from_physical(&ram, PhysicalAddress::new(INFO)).unwrap();
        let mut profile = discover(&payload, image(0x10_0000, 0x18_0000), &mut heap).unwrap();
        let layout = profile.layout;

        assert_eq!(layout.mem_kb, 639 + 15 * 1024 + 1024);
        assert_eq!(layout.offset.get(), 0xC000_0000);
        assert_eq!(
            layout.physical_reserved,
            &[
                pr(0, 0x10_0000),
                pr(0x10_0000, 0x18_0000),
                pr(0x9_FC00, 0xA_0000),
                pr(0xF_0000, 0x10_0000),
                pr(0x40_0000, 0x40_2000),
            ]
        );

        assert_eq!(layout.modules.len(), 1);
        assert_eq!(layout.modules[0].name, "initrd");
        assert_eq!(layout.modules[0].region, pr(0x40_0000, 0x40_2000));

        assert_eq!(layout.virtual_reserved.len(), 2);
        assert_eq!(layout.virtual_reserved[0].virt, layout.kernel_virtual());
        assert_eq!(layout.virtual_reserved[0].phys, Some(layout.kernel_physical()));
        assert_eq!(
            layout.virtual_reserved[1].virt,
            Range::try_new(VirtualAddress::new(0xC040_0000), VirtualAddress::new(0xC040_2000)).unwrap()
        );

        for range in layout.physical_reserved {
            assert!(u64::from(range.end().as_u32()) <= layout.mem_bytes());
        }

        let (_, allocator) = profile.split();
        assert!(allocator.used() > 0);
        assert!(allocator.allocate(16, 16).is_ok());
    }

    #[test]
    fn reserved_entries_are_clipped_to_memory() {
        let ram = Boot::new(0, 3 * 1024)
            .region(0x30_0000, 0x20_0000, 2)
            .finish();
        let (mem_kb, reserved, _) = run(&ram, image(0x10_0000, 0x18_0000)).unwrap();
        assert_eq!(mem_kb, 4 * 1024);
        assert_eq!(reserved[2], pr(0x30_0000, 0x40_0000));
        assert_eq!(reserved.len(), 3);
    }

    #[test]
    fn low_memory_and_kernel_always_reserved() {
        let ram = Boot::new(640, 7 * 1024).no_regions().finish();
        let (_, reserved, virt) = run(&ram, image(0x10_0000, 0x20_0000)).unwrap();
        assert_eq!(reserved, vec![pr(0, 0x10_0000), pr(0x10_0000, 0x20_0000)]);
        assert_eq!(virt.len(), 1);
    }

    #[test]
    fn missing_information() {
        let mut ram = Boot::new(640, 1024).no_regions().finish();
        ram.0[INFO as usize] &= !1;
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::MissingMemoryInfo
        );

        let ram = Boot::new(640, 1024).finish();
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::MissingMemoryMap
        );
    }

    #[test]
    fn reserved_region_over_kernel() {
        let ram = Boot::new(640, 15 * 1024)
            .region(0x14_0000, 0x1000, 2)
            .finish();
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::KernelOverlapsReservedMemory {
                base: 0x14_0000,
                length: 0x1000
            }
        );
    }

    #[test]
    fn kernel_beyond_memory() {
        let ram = Boot::new(0, 256).no_regions().finish();
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::InsufficientMemory {
                required: 0x18_0000,
                available: 0x14_0000
            }
        );
    }

    #[test]
    fn inconsistent_kernel_image() {
        let ram = Boot::new(640, 15 * 1024).no_regions().finish();

        let mut shifted = image(0x10_0000, 0x18_0000);
        shifted.vaddr_end = VirtualAddress::new(0xC020_0000);
        assert_eq!(
            run(&ram, shifted).unwrap_err(),
            MemoryDiscoveryError::InvalidKernelImage
        );

        let other_offset = KernelImage {
            vaddr_start: VirtualAddress::new(0x8010_0000),
            vaddr_end: VirtualAddress::new(0x8018_0000),
            ..image(0x10_0000, 0x18_0000)
        };
        assert_eq!(
            run(&ram, other_offset).unwrap_err(),
            MemoryDiscoveryError::InvalidKernelImage
        );
    }

    #[test]
    fn malformed_entries() {
        let mut ram = Boot::new(640, 15 * 1024)
            .region(0x9_FC00, 0x400, 2)
            .finish();
        ram.0[MMAP as usize] = 4;
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::MalformedMemoryMap { offset: 0 }
        );

        let ram = Boot::new(640, 15 * 1024)
            .no_regions()
            .module(0x40_2000, 0x40_0000, "backwards")
            .finish();
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::MalformedModule { index: 0 }
        );
    }

    #[test]
    fn module_outside_memory() {
        let ram = Boot::new(640, 15 * 1024)
            .no_regions()
            .module(0x40_0000, 0x40_1000, "ok")
            .module(0x2000_0000, 0x2000_1000, "far")
            .finish();
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::MalformedModule { index: 1 }
        );
    }

    #[test]
    fn module_over_kernel_image() {
        let ram = Boot::new(640, 15 * 1024)
            .no_regions()
            .module(0x17_F000, 0x18_1000, "overlapping")
            .finish();
        assert_eq!(
            run(&ram, image(0x10_0000, 0x18_0000)).unwrap_err(),
            MemoryDiscoveryError::MalformedModule { index: 0 }
        );

        let ram = Boot::new(640, 15 * 1024)
            .no_regions()
            .module(0x18_0000, 0x18_1000, "adjacent")
            .finish();
        assert!(run(&ram, image(0x10_0000, 0x18_0000)).is_ok());
    }

    #[test]
    fn bootstrap_heap_too_small() {
        let ram = Boot::new(640, 15 * 1024).no_regions().finish();
        let payload = Multiboot::from_physical(&ram, PhysicalAddress::new(INFO)).unwrap();
        let mut heap = [0u8; 8];
        assert!(matches!(
            discover(&payload, image(0x10_0000, 0x18_0000), &mut heap),
            Err(MemoryDiscoveryError::Allocation(
                BootstrapAllocError::OutOfBootstrapMemory { .. }
            ))
        ));
    }
}
