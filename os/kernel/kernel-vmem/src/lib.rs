//! # Virtual Memory Support
//!
//! IA-32 paging helpers for a higher-half kernel using 4 MiB pages.
//!
//! ## What you get
//! - A 4 KiB-aligned [`PageDirectory`] of 1024 [`PageDirectoryEntry`] values.
//! - The compile-time [boot directory](PageDirectory::boot) that makes the
//!   higher-half jump possible, validated by [`BootMapping::validate`].
//! - A [`Mapper`] for installing further 4 MiB mappings at runtime.
//!
//! ## IA-32 Virtual Address → Physical Address Walk (PSE)
//!
//! With `CR4.PSE = 1`, each 32-bit virtual address mapped by a large page is
//! split into two fields:
//!
//! ```text
//! | 31‒22 | 21‒0          |
//! |  PD   | Offset (4 MiB)|
//! ```
//!
//! `CR3` holds the physical base of the page directory. The top ten bits index
//! one of its 1024 entries; an entry with `PS=1` directly supplies physical
//! address bits 31‒22 and the remaining 22 bits are the byte offset.
//!
//! ```text
//!  CR3 → PD[VA >> 22] ──PS=1──► 4 MiB physical page + (VA & 0x3F_FFFF)
//! ```
//!
//! A page directory therefore covers the full 4 GiB with 4 MiB granularity,
//! which is all the early kernel needs.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod boot;
mod mapper;
mod page_directory;

pub use crate::boot::{BootMapping, BootMappingError};
pub use crate::mapper::{ActivePageDirectory, Mapper, MapperError, invalidate_page};
pub use crate::page_directory::{ENTRIES, PageDirectory, PageDirectoryEntry, PdIndex};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// The boot mapping described by the kernel's layout constants.
pub const KERNEL_BOOT_MAPPING: BootMapping = BootMapping {
    offset: info::KERNEL_ADDR_OFFSET,
    kernel_pages: info::BOOT_MAPPED_PAGES,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_boot_mapping_is_valid() {
        assert_eq!(KERNEL_BOOT_MAPPING.validate(), Ok(()));
        assert_eq!(
            KERNEL_BOOT_MAPPING.first_index(),
            info::KERNEL_PAGE_DIRECTORY_INDEX
        );
    }
}
