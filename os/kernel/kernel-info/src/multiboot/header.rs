//! Every multiboot-compliant kernel carries this header, 4-byte aligned, within
//! the first 8 KiB of its image. The kernel links it into a `.multiboot`
//! section that the linker script places first.
//!
//! ```
//! # use kernel_info::multiboot::Header;
//! #[used]
//! static MULTIBOOT_HEADER: Header = Header::new()
//!     .request_aligned_modules()
//!     .request_memory_map();
//! # assert!(MULTIBOOT_HEADER.is_valid());
//! ```

/// The value identifying the header to the bootloader.
pub const HEADER_MAGIC: u32 = 0x1BAD_B002;

const FLAG_ALIGN_MODULES: u32 = 1 << 0;
const FLAG_MEMORY_INFO: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct Header {
    magic: u32,
    /// Bits 0-15 are requirements the bootloader must honor or refuse to boot.
    flags: u32,
    /// `magic + flags + checksum == 0` (mod 2^32).
    checksum: u32,
}

const _: () = assert!(size_of::<Header>() == 12);

impl Header {
    /// A header requesting nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_flags(0)
    }

    const fn with_flags(flags: u32) -> Self {
        Self {
            magic: HEADER_MAGIC,
            flags,
            checksum: 0u32.wrapping_sub(HEADER_MAGIC.wrapping_add(flags)),
        }
    }

    /// Requests that boot modules be loaded on 4 KiB boundaries.
    #[must_use]
    pub const fn request_aligned_modules(self) -> Self {
        Self::with_flags(self.flags | FLAG_ALIGN_MODULES)
    }

    /// Requests `mem_lower`/`mem_upper` and the BIOS memory map.
    #[must_use]
    pub const fn request_memory_map(self) -> Self {
        Self::with_flags(self.flags | FLAG_MEMORY_INFO)
    }

    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    #[must_use]
    pub const fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Whether the three fields sum to zero, as the bootloader checks.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.magic == HEADER_MAGIC
            && self
                .magic
                .wrapping_add(self.flags)
                .wrapping_add(self.checksum)
                == 0
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}
