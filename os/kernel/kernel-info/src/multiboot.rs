//! # Multiboot v1 Handoff
//!
//! A multiboot-compliant bootloader (GRUB, QEMU's `-kernel`) enters the kernel
//! in 32-bit protected mode with paging disabled, `eax` holding
//! [`BOOTLOADER_MAGIC`] and `ebx` the physical address of the information
//! structure.
//!
//! Everything the structure points to is a *physical* address. This module
//! never dereferences raw pointers itself; all reads go through a
//! [`PhysicalMemory`] view, which the kernel implements on top of its
//! higher-half alias and tests implement over a byte buffer.
//!
//! ```text
//!         +-------------------+
//! 0       | flags             |    (required)
//!         +-------------------+
//! 4       | mem_lower         |    (present if flags[0] is set)
//! 8       | mem_upper         |    (present if flags[0] is set)
//!         +-------------------+
//! 12      | boot_device       |    (present if flags[1] is set)
//!         +-------------------+
//! 16      | cmdline           |    (present if flags[2] is set)
//!         +-------------------+
//! 20      | mods_count        |    (present if flags[3] is set)
//! 24      | mods_addr         |    (present if flags[3] is set)
//!         +-------------------+
//! 28 - 40 | syms              |    (present if flags[4] or flags[5] is set)
//!         +-------------------+
//! 44      | mmap_length       |    (present if flags[6] is set)
//! 48      | mmap_addr         |    (present if flags[6] is set)
//!         +-------------------+
//! ```

mod header;
mod info;
mod mmap;
mod module;

use core::ffi::CStr;
use kernel_memory_addresses::PhysicalAddress;

pub use header::{HEADER_MAGIC, Header};
pub use info::{InfoFlags, Multiboot};
pub use mmap::{MEMORY_MAP_ENTRY_MIN_SIZE, MemoryMapIter, MemoryRegion, MemoryRegionKind};
pub use module::{MODULE_ENTRY_SIZE, ModuleEntry, ModuleIter};

/// The value a multiboot bootloader leaves in `eax`.
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

/// Read access to physical memory.
///
/// Implementations return `None` for anything they cannot (or will not) expose,
/// e.g. addresses outside the mapped window.
pub trait PhysicalMemory {
    /// `len` bytes starting at `addr`.
    fn bytes(&self, addr: PhysicalAddress, len: usize) -> Option<&[u8]>;

    /// The zero-terminated string starting at `addr`.
    fn c_str(&self, addr: PhysicalAddress) -> Option<&CStr>;
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &T {
    fn bytes(&self, addr: PhysicalAddress, len: usize) -> Option<&[u8]> {
        (**self).bytes(addr, len)
    }

    fn c_str(&self, addr: PhysicalAddress) -> Option<&CStr> {
        (**self).c_str(addr)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultibootError {
    #[error("physical range {addr}+{len:#x} is not readable")]
    Unreadable { addr: PhysicalAddress, len: usize },
    #[error("malformed memory map entry at offset {offset:#x}")]
    MalformedMemoryMap { offset: usize },
    #[error("malformed module entry {index}")]
    MalformedModule { index: usize },
    #[error("command line is not valid UTF-8")]
    InvalidCommandLine,
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// A byte buffer standing in for physical memory, with physical address 0 at
/// index 0.
#[cfg(test)]
pub(crate) mod testing {
    use super::PhysicalMemory;
    use core::ffi::CStr;
    use kernel_memory_addresses::PhysicalAddress;

    pub struct Ram(pub Vec<u8>);

    impl Ram {
        pub fn new(size: usize) -> Self {
            Self(vec![0; size])
        }

        pub fn put_u32(&mut self, addr: u32, value: u32) {
            let a = addr as usize;
            self.0[a..a + 4].copy_from_slice(&value.to_le_bytes());
        }

        pub fn put_u64(&mut self, addr: u32, value: u64) {
            let a = addr as usize;
            self.0[a..a + 8].copy_from_slice(&value.to_le_bytes());
        }

        pub fn put_bytes(&mut self, addr: u32, value: &[u8]) {
            let a = addr as usize;
            self.0[a..a + value.len()].copy_from_slice(value);
        }
    }

    impl PhysicalMemory for Ram {
        fn bytes(&self, addr: PhysicalAddress, len: usize) -> Option<&[u8]> {
            self.0.get(addr.as_usize()..addr.as_usize().checked_add(len)?)
        }

        fn c_str(&self, addr: PhysicalAddress) -> Option<&CStr> {
            CStr::from_bytes_until_nul(self.0.get(addr.as_usize()..)?).ok()
        }
    }
}
