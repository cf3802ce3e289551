//! # Large-page mapping
//!
//! [`Mapper`] installs 4 MiB mappings into a page directory. Two
//! implementations exist:
//!
//! - [`PageDirectory`] itself, for directories that are not loaded in `CR3`
//!   (and for tests);
//! - [`ActivePageDirectory`], which wraps the directory the CPU is currently
//!   walking and invalidates the TLB entry of every page it changes.

use crate::page_directory::{PageDirectory, PageDirectoryEntry, PdIndex};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4M, VirtualAddress, VirtualPage};
use log::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapperError {
    #[error("virtual page {page} is already mapped to {existing}")]
    AlreadyMapped {
        page: VirtualPage<Size4M>,
        existing: PhysicalPage<Size4M>,
    },
    #[error("virtual page {page} is not mapped")]
    NotMapped { page: VirtualPage<Size4M> },
}

/// Installs, removes and resolves 4 MiB mappings.
pub trait Mapper {
    /// Maps `page` to `frame` using the attribute bits of `flags`.
    ///
    /// Mapping a page to the frame it already maps succeeds without change.
    ///
    /// # Errors
    /// [`MapperError::AlreadyMapped`] if `page` maps a different frame.
    fn map_large(
        &mut self,
        page: VirtualPage<Size4M>,
        frame: PhysicalPage<Size4M>,
        flags: PageDirectoryEntry,
    ) -> Result<(), MapperError>;

    /// Removes the mapping of `page` and returns the frame it mapped.
    ///
    /// # Errors
    /// [`MapperError::NotMapped`] if `page` is not mapped.
    fn unmap_large(&mut self, page: VirtualPage<Size4M>)
    -> Result<PhysicalPage<Size4M>, MapperError>;

    /// Resolves `va` through the directory.
    fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress>;
}

impl Mapper for PageDirectory {
    fn map_large(
        &mut self,
        page: VirtualPage<Size4M>,
        frame: PhysicalPage<Size4M>,
        flags: PageDirectoryEntry,
    ) -> Result<(), MapperError> {
        let index = PdIndex::of_page(page);
        let current = self.get(index);
        if current.is_large_leaf() {
            let existing = current.physical_page();
            return if existing == frame {
                Ok(())
            } else {
                Err(MapperError::AlreadyMapped { page, existing })
            };
        }

        trace!("Mapping {page} -> {frame}");
        self.set(
            index,
            flags
                .with_present(true)
                .with_page_size(true)
                .with_physical_page(frame),
        );
        Ok(())
    }

    fn unmap_large(
        &mut self,
        page: VirtualPage<Size4M>,
    ) -> Result<PhysicalPage<Size4M>, MapperError> {
        let index = PdIndex::of_page(page);
        let current = self.get(index);
        if !current.is_large_leaf() {
            return Err(MapperError::NotMapped { page });
        }
        self.clear(index);
        Ok(current.physical_page())
    }

    fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.get(PdIndex::from(va));
        if entry.is_large_leaf() {
            Some(entry.physical_page().join(va.offset::<Size4M>()))
        } else {
            None
        }
    }
}

/// The page directory currently loaded in `CR3`.
pub struct ActivePageDirectory<'a> {
    directory: &'a mut PageDirectory,
}

impl<'a> ActivePageDirectory<'a> {
    /// # Safety
    /// `directory` must be the page directory the CPU is currently using, and
    /// the caller must run at CPL 0.
    pub const unsafe fn new(directory: &'a mut PageDirectory) -> Self {
        Self { directory }
    }

    #[must_use]
    pub const fn directory(&self) -> &PageDirectory {
        self.directory
    }
}

impl Mapper for ActivePageDirectory<'_> {
    fn map_large(
        &mut self,
        page: VirtualPage<Size4M>,
        frame: PhysicalPage<Size4M>,
        flags: PageDirectoryEntry,
    ) -> Result<(), MapperError> {
        self.directory.map_large(page, frame, flags)?;
        // SAFETY: the directory is active and we are privileged (see `new`).
        unsafe { invalidate_page(page.base()) };
        Ok(())
    }

    fn unmap_large(
        &mut self,
        page: VirtualPage<Size4M>,
    ) -> Result<PhysicalPage<Size4M>, MapperError> {
        let frame = self.directory.unmap_large(page)?;
        // SAFETY: see `map_large`.
        unsafe { invalidate_page(page.base()) };
        Ok(frame)
    }

    fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.directory.translate(va)
    }
}

/// Drops the TLB entry covering `va`.
///
/// # Safety
/// Privileged instruction; CPL 0 only.
#[inline]
pub unsafe fn invalidate_page(va: VirtualAddress) {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "x86"))]
    let _ = va;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpage(n: u32) -> VirtualPage<Size4M> {
        VirtualPage::from_number(n)
    }

    fn frame(n: u32) -> PhysicalPage<Size4M> {
        PhysicalPage::from_number(n)
    }

    #[test]
    fn map_translate_unmap() {
        let mut pd = PageDirectory::zeroed();
        pd.map_large(vpage(770), frame(9), PageDirectoryEntry::new().with_writable(true))
            .unwrap();

        let entry = pd.get(PdIndex::new(770));
        assert!(entry.present() && entry.page_size() && entry.writable());
        assert_eq!(
            pd.translate(VirtualAddress::new(0xC080_1234)),
            Some(PhysicalAddress::new(0x0240_1234))
        );

        assert_eq!(pd.unmap_large(vpage(770)), Ok(frame(9)));
        assert_eq!(pd.translate(VirtualAddress::new(0xC080_1234)), None);
        assert_eq!(
            pd.unmap_large(vpage(770)),
            Err(MapperError::NotMapped { page: vpage(770) })
        );
    }

    #[test]
    fn remapping_same_frame_is_accepted() {
        let mut pd = PageDirectory::zeroed();
        let flags = PageDirectoryEntry::new().with_writable(true);
        pd.map_large(vpage(1), frame(1), flags).unwrap();
        assert_eq!(pd.map_large(vpage(1), frame(1), flags), Ok(()));
        assert_eq!(
            pd.map_large(vpage(1), frame(2), flags),
            Err(MapperError::AlreadyMapped {
                page: vpage(1),
                existing: frame(1)
            })
        );
    }

    #[test]
    #[cfg(not(target_arch = "x86"))]
    fn active_directory_delegates() {
        let mut pd = PageDirectory::zeroed();
        // SAFETY: invalidation is a no-op off x86.
        let mut active = unsafe { ActivePageDirectory::new(&mut pd) };
        active
            .map_large(vpage(3), frame(3), PageDirectoryEntry::new())
            .unwrap();
        assert!(active.directory().get(PdIndex::new(3)).present());
        assert_eq!(
            active.translate(VirtualAddress::new(0x00C0_0010)),
            Some(PhysicalAddress::new(0x00C0_0010))
        );
    }
}
