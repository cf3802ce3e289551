//! # IA-32 Page Directory (4 MiB pages)
//!
//! With `CR4.PSE = 1` and `CR4.PAE = 0`, a page-directory entry whose `PS` bit
//! is set maps a 4 MiB page directly; no page table is involved. This module
//! models exactly that form:
//!
//! - [`PdIndex`]: index type for virtual-address bits `[31:22]`.
//! - [`PageDirectoryEntry`]: a 4 MiB leaf PDE.
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 entries.
//!
//! ## Invariants & Notes
//!
//! - [`PageDirectory`] is 4 KiB-aligned and contains exactly 1024 entries.
//! - [`PageDirectoryEntry::large_page`] forces `PS=1`.
//! - TLB maintenance is the caller's responsibility after mutating active mappings.

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4M, VirtualAddress, VirtualPage};

/// Number of entries in a page directory.
pub const ENTRIES: usize = 1024;

/// **PDE (4 MiB leaf)**: maps a single 4 MiB page (`PS = 1`).
///
/// | Bits  | Name          | Meaning |
/// |-------|---------------|---------|
/// | 0     | `P`           | Present |
/// | 1     | `RW`          | Writable |
/// | 2     | `US`          | User-mode accessible |
/// | 3     | `PWT`         | Write-through caching |
/// | 4     | `PCD`         | Cache disable |
/// | 5     | `A`           | Accessed |
/// | 6     | `D`           | Dirty |
/// | 7     | `PS`          | Page size, 1 for 4 MiB |
/// | 8     | `G`           | Global |
/// | 9–11  | OS available  | Ignored by hardware |
/// | 12    | `PAT`         | Page attribute table selector |
/// | 13–21 | reserved      | Must be 0 without PSE-36 |
/// | 22–31 | `addr`        | Physical page bits [31:22] |
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageDirectoryEntry {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6): set by CPU on first write to this 4 MiB page.
    pub dirty: bool,
    /// Page Size (bit 7): **must be 1** for a 4 MiB leaf.
    pub page_size: bool,
    /// Global (bit 8).
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// PAT selector for 4 MiB mappings (bit 12).
    pub pat_large: bool,
    /// Reserved (bits 13..21): must be 0.
    #[bits(9)]
    __res13_21: u16,
    /// Physical address bits **31:22** (4 MiB-aligned base).
    #[bits(10)]
    phys_addr_31_22: u16,
}

impl PageDirectoryEntry {
    /// A not-present entry.
    pub const EMPTY: Self = Self::new();

    /// Present, writable, supervisor-only 4 MiB leaf mapping `page`.
    #[inline]
    #[must_use]
    pub const fn large_page(page: PhysicalPage<Size4M>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_page_size(true)
            .with_physical_page(page)
    }

    /// Set the 4 MiB page base.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_physical_page(self, page: PhysicalPage<Size4M>) -> Self {
        self.with_phys_addr_31_22(page.number() as u16)
    }

    /// Get the 4 MiB page base.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4M> {
        PhysicalPage::from_number(self.phys_addr_31_22() as u32)
    }

    /// Whether this entry is a present 4 MiB mapping.
    #[inline]
    #[must_use]
    pub const fn is_large_leaf(self) -> bool {
        self.present() && self.page_size()
    }
}

/// Index into the page directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdIndex(u16);

impl PdIndex {
    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self((va.as_u32() >> 22) as u16)
    }

    /// Index of the entry mapping `page`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of_page(page: VirtualPage<Size4M>) -> Self {
        Self(page.number() as u16)
    }

    /// Construct from a raw value.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
#[derive(Clone, PartialEq, Eq)]
pub struct PageDirectory {
    entries: [PageDirectoryEntry; ENTRIES],
}

const _: () = assert!(size_of::<PageDirectory>() == 4096);

impl PageDirectory {
    /// A directory with no present entries.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageDirectoryEntry::EMPTY; ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, index: PdIndex) -> PageDirectoryEntry {
        self.entries[index.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, index: PdIndex, entry: PageDirectoryEntry) {
        self.entries[index.as_usize()] = entry;
    }

    #[inline]
    pub const fn clear(&mut self, index: PdIndex) {
        self.set(index, PageDirectoryEntry::EMPTY);
    }

    /// All entries, in index order.
    #[inline]
    #[must_use]
    pub const fn entries(&self) -> &[PageDirectoryEntry; ENTRIES] {
        &self.entries
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl core::fmt::Debug for PageDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_map();
        for (i, e) in self.entries.iter().enumerate().filter(|(_, e)| e.present()) {
            list.entry(&i, &e.physical_page());
        }
        list.finish()
    }
}
