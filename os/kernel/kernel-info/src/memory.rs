//! # Memory Layout

use kernel_memory_addresses::TranslationOffset;

/// Size of a large (PSE) page; the boot mapping works in these units.
pub const LARGE_PAGE_SIZE: u32 = 4 * 1024 * 1024;

/// Distance between the kernel's virtual and physical addresses.
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const KERNEL_ADDR_OFFSET: u32 = 0xC000_0000;

/// [`KERNEL_ADDR_OFFSET`] as a translation context.
#[allow(clippy::cast_possible_truncation)]
pub const KERNEL_OFFSET: TranslationOffset = TranslationOffset::new(KERNEL_ADDR_OFFSET as usize);

/// Where the bootloader places the bytes in *physical* memory (LMA).
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const PHYS_LOAD: u32 = 0x0010_0000; // 1 MiB

/// End of legacy low memory (BIOS data, VGA, option ROMs). Never handed out.
pub const LOW_MEMORY_END: u32 = 0x0010_0000;

/// Page-directory index of the first higher-half entry.
pub const KERNEL_PAGE_DIRECTORY_INDEX: usize = (KERNEL_ADDR_OFFSET / LARGE_PAGE_SIZE) as usize;

/// Number of 4 MiB pages mapped above [`KERNEL_ADDR_OFFSET`] by the boot page
/// directory. The kernel image, its stack and the bootstrap heap must fit.
pub const BOOT_MAPPED_PAGES: usize = 2;

/// The size of the kernel stack.
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// The size of the statically reserved bootstrap heap.
pub const BOOTSTRAP_HEAP_SIZE: usize = 1024 * 1024;

const _: () = {
    assert!(KERNEL_ADDR_OFFSET.is_multiple_of(LARGE_PAGE_SIZE));
    assert!(PHYS_LOAD >= LOW_MEMORY_END);
    assert!(KERNEL_STACK_SIZE.is_multiple_of(16));
    assert!(BOOT_MAPPED_PAGES > 0);
    assert!(KERNEL_PAGE_DIRECTORY_INDEX > 0);
    assert!(KERNEL_PAGE_DIRECTORY_INDEX + BOOT_MAPPED_PAGES <= 1024);
    assert!(
        (PHYS_LOAD as usize) + KERNEL_STACK_SIZE + BOOTSTRAP_HEAP_SIZE
            < BOOT_MAPPED_PAGES * LARGE_PAGE_SIZE as usize
    );
};
