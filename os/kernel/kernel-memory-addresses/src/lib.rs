//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for 32-bit IA-32 addresses and page bases, plus the
//! address translator used to move between the kernel's higher-half virtual
//! addresses and the physical addresses backing them.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u32` values.
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`PageOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! These are then wrapped to distinguish between virtual and physical spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Refer to physical memory or MMIO regions. |
//!
//! ## Page Sizes
//!
//! Two IA-32 page sizes are supported via marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages (base granularity)
//! - [`Size4M`]: 4 MiB large pages (`CR4.PSE`)
//!
//! ## Address Translation
//!
//! The kernel image is linked at a fixed offset above its physical load
//! address. [`virt_to_phys`] and [`phys_to_virt`] apply that
//! [`TranslationOffset`] to anything implementing [`Address`] (raw integers and
//! raw pointers); [`TranslationOffset::to_physical`] and
//! [`TranslationOffset::to_virtual`] do the same for the typed wrappers.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let offset = TranslationOffset::new(0xC000_0000);
//! assert_eq!(phys_to_virt(0x1000_usize, offset), 0xC000_1000);
//! assert_eq!(virt_to_phys(0xC000_1000_usize, offset), 0x1000);
//!
//! let va = offset.to_virtual(PhysicalAddress::new(0x0010_0000));
//! assert_eq!(va, VirtualAddress::new(0xC010_0000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod memory_page;
mod page_offset;
mod page_size;
mod physical_address;
mod physical_page;
mod translate;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::memory_page::MemoryPage;
pub use crate::page_offset::PageOffset;
pub use crate::page_size::{PageSize, Size4K, Size4M};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::translate::{Address, TranslationOffset, phys_to_virt, virt_to_phys};
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = MemoryAddress::new(0x1234_5678);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u32() & 0xFFF, 0);
        assert_eq!(o.as_u32(), 0x678);
        assert_eq!(p.join(o).as_u32(), a.as_u32());
    }

    #[test]
    fn split_and_join_4m() {
        let a = MemoryAddress::new(0xC012_3456);
        let (p, o) = a.split::<Size4M>();
        assert_eq!(p.base().as_u32(), 0xC000_0000);
        assert_eq!(o.as_u32(), 0x0012_3456);
        assert_eq!(p.join(o).as_u32(), a.as_u32());
    }

    #[test]
    fn virtual_vs_physical_wrappers() {
        let va = VirtualAddress::new(0xC000_1234);
        let (vp, vo) = va.split::<Size4K>();
        assert_eq!(vp.base().as_u32(), 0xC000_1000);
        assert_eq!(vo.as_u32(), 0x234);
        assert_eq!(vp.join(vo), va);

        let pa = PhysicalAddress::new(0x2000_0042);
        let (pp, po) = pa.split::<Size4K>();
        assert_eq!(pp.base().as_u32() & 0xFFF, 0);
        assert_eq!(po.as_u32(), 0x42);
        assert_eq!(pp.join(po), pa);
    }

    #[test]
    fn alignment_helpers() {
        let a = MemoryAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u32(), 0x12000);
        assert_eq!(a.align_up::<Size4K>(), Some(MemoryAddress::new(0x13000)));
        assert_eq!(
            MemoryAddress::new(0x13000).align_up::<Size4K>(),
            Some(MemoryAddress::new(0x13000))
        );
        assert_eq!(MemoryAddress::new(0xFFFF_F001).align_up::<Size4K>(), None);
        assert_eq!(a.page::<Size4K>().base().as_u32(), 0x12000);
        assert_eq!(a.offset::<Size4K>().as_u32(), 0x345);
    }

    #[test]
    fn page_numbers() {
        let pa = PhysicalAddress::new(0x0040_1000);
        assert_eq!(pa.page::<Size4K>().number(), 0x401);
        assert_eq!(pa.page::<Size4M>().number(), 1);
        assert_eq!(PhysicalPage::<Size4M>::from_number(3).base().as_u32(), 0x00C0_0000);
        assert_eq!(VirtualPage::<Size4M>::from_number(768).base().as_u32(), 0xC000_0000);
    }
}
