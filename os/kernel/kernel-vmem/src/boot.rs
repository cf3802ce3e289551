//! # Boot Page Directory
//!
//! The directory the boot code loads into `CR3` before it enables paging. It
//! is computed entirely at compile time so nothing can fail at runtime:
//!
//! ```text
//! index   0           → physical page 0          (identity, removed after the jump)
//! index   1 .. K      → not present
//! index   K .. K+P    → physical pages 0 .. P    (higher-half kernel window)
//! index K+P .. 1024   → not present
//! ```
//!
//! where `K = offset / 4 MiB` and `P` is the number of mapped kernel pages.

use crate::page_directory::{ENTRIES, PageDirectory, PageDirectoryEntry, PdIndex};
use kernel_memory_addresses::{PhysicalPage, Size4M};

const LARGE_PAGE: u32 = 4 * 1024 * 1024;

/// Shape of the higher-half window the boot directory establishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootMapping {
    /// Virtual address at which physical address 0 appears.
    pub offset: u32,
    /// Number of 4 MiB pages mapped at `offset`.
    pub kernel_pages: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootMappingError {
    #[error("kernel offset {offset:#010x} is not 4 MiB aligned")]
    UnalignedOffset { offset: u32 },
    #[error("kernel window would replace the identity entry")]
    OverlapsIdentity,
    #[error("kernel window maps no pages")]
    Empty,
    #[error("kernel window {first}+{pages} exceeds the page directory")]
    ExceedsDirectory { first: usize, pages: usize },
}

impl BootMapping {
    /// Checks the mapping can be expressed by a single page directory.
    ///
    /// # Errors
    /// See [`BootMappingError`].
    pub const fn validate(&self) -> Result<(), BootMappingError> {
        if !self.offset.is_multiple_of(LARGE_PAGE) {
            return Err(BootMappingError::UnalignedOffset {
                offset: self.offset,
            });
        }

        let first = self.first_index();
        if first == 0 {
            return Err(BootMappingError::OverlapsIdentity);
        }
        if self.kernel_pages == 0 {
            return Err(BootMappingError::Empty);
        }
        if first + self.kernel_pages > ENTRIES {
            return Err(BootMappingError::ExceedsDirectory {
                first,
                pages: self.kernel_pages,
            });
        }

        Ok(())
    }

    /// Page-directory index of the first kernel window entry (`K`).
    #[inline]
    #[must_use]
    pub const fn first_index(&self) -> usize {
        (self.offset / LARGE_PAGE) as usize
    }
}

impl PageDirectory {
    /// Builds the boot directory for `mapping`.
    ///
    /// Usable in `const` context; the kernel evaluates it into a `static`.
    ///
    /// # Errors
    /// `mapping` fails [`BootMapping::validate`].
    #[allow(clippy::cast_possible_truncation)]
    pub const fn boot(mapping: BootMapping) -> Result<Self, BootMappingError> {
        if let Err(e) = mapping.validate() {
            return Err(e);
        }

        let mut pd = Self::zeroed();
        pd.set(
            PdIndex::new(0),
            PageDirectoryEntry::large_page(PhysicalPage::<Size4M>::from_number(0)),
        );

        let first = mapping.first_index();
        let mut page = 0;
        while page < mapping.kernel_pages {
            pd.set(
                PdIndex::new((first + page) as u16),
                PageDirectoryEntry::large_page(PhysicalPage::<Size4M>::from_number(page as u32)),
            );
            page += 1;
        }

        Ok(pd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_layout(pd: &PageDirectory, k: usize, p: usize) {
        let flags = |e: PageDirectoryEntry| e.present() && e.writable() && e.page_size();

        let e0 = pd.entries()[0];
        assert!(flags(e0));
        assert_eq!(e0.physical_page().number(), 0);

        for (i, e) in pd.entries().iter().enumerate().skip(1) {
            if (k..k + p).contains(&i) {
                assert!(flags(*e), "entry {i} must be a present large page");
                assert_eq!(e.physical_page().number() as usize, i - k);
                assert!(!e.user());
            } else {
                assert_eq!(*e, PageDirectoryEntry::EMPTY, "entry {i} must be absent");
            }
        }
    }

    #[test]
    fn kernel_layout() {
        let pd = PageDirectory::boot(BootMapping {
            offset: 0xC000_0000,
            kernel_pages: 2,
        })
        .unwrap();
        assert_layout(&pd, 768, 2);
    }

    #[test]
    fn various_windows() {
        for (k, p) in [(1, 1), (512, 4), (768, 256), (1023, 1)] {
            let pd = PageDirectory::boot(BootMapping {
                offset: (k as u32) * LARGE_PAGE,
                kernel_pages: p,
            })
            .unwrap();
            assert_layout(&pd, k, p);
        }
    }

    #[test]
    fn builds_at_compile_time() {
        const PD: PageDirectory = match PageDirectory::boot(BootMapping {
            offset: 0xC000_0000,
            kernel_pages: 1,
        }) {
            Ok(pd) => pd,
            Err(_) => panic!("invalid boot mapping"),
        };
        assert_layout(&PD, 768, 1);
    }

    #[test]
    fn rejects_invalid_mappings() {
        let check = |offset, kernel_pages| BootMapping {
            offset,
            kernel_pages,
        }
        .validate();

        assert_eq!(check(0, 1), Err(BootMappingError::OverlapsIdentity));
        assert_eq!(check(0xC000_0000, 0), Err(BootMappingError::Empty));
        assert_eq!(
            check(0xC000_0000, 257),
            Err(BootMappingError::ExceedsDirectory {
                first: 768,
                pages: 257
            })
        );
        assert_eq!(
            check(0xC010_0000, 1),
            Err(BootMappingError::UnalignedOffset {
                offset: 0xC010_0000
            })
        );
        assert_eq!(check(0xC000_0000, 256), Ok(()));
        assert!(
            PageDirectory::boot(BootMapping {
                offset: 0,
                kernel_pages: 1
            })
            .is_err()
        );
    }
}
