use super::{
    MemoryMapIter, ModuleIter, MultibootError, PhysicalMemory, module::MODULE_ENTRY_SIZE,
    read_u32,
};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// Bytes of the information structure this kernel reads (up to `mmap_addr`).
const INFO_SIZE: usize = 52;

/// The `flags` word of the information structure: which fields are valid.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct InfoFlags {
    /// `mem_lower` / `mem_upper` are valid.
    pub memory: bool,
    pub boot_device: bool,
    /// `cmdline` is valid.
    pub command_line: bool,
    /// `mods_count` / `mods_addr` are valid.
    pub modules: bool,
    pub aout_symbols: bool,
    pub elf_sections: bool,
    /// `mmap_length` / `mmap_addr` are valid.
    pub memory_map: bool,
    pub drives: bool,
    pub config_table: bool,
    pub boot_loader_name: bool,
    pub apm_table: bool,
    pub vbe: bool,
    pub framebuffer: bool,
    #[bits(19)]
    __: u32,
}

/// The boot payload: the multiboot information structure together with the
/// view through which everything it references is read.
pub struct Multiboot<'a, M: PhysicalMemory + ?Sized> {
    memory: &'a M,
    flags: InfoFlags,
    mem_lower: u32,
    mem_upper: u32,
    cmdline: u32,
    mods_count: u32,
    mods_addr: u32,
    mmap_length: u32,
    mmap_addr: u32,
}

impl<'a, M: PhysicalMemory + ?Sized> Multiboot<'a, M> {
    /// Reads the information structure at physical address `info`.
    ///
    /// # Errors
    /// [`MultibootError::Unreadable`] if the structure is not visible through `memory`.
    pub fn from_physical(memory: &'a M, info: PhysicalAddress) -> Result<Self, MultibootError> {
        let raw = memory
            .bytes(info, INFO_SIZE)
            .ok_or(MultibootError::Unreadable {
                addr: info,
                len: INFO_SIZE,
            })?;

        Ok(Self {
            memory,
            flags: InfoFlags::from_bits(read_u32(raw, 0)),
            mem_lower: read_u32(raw, 4),
            mem_upper: read_u32(raw, 8),
            cmdline: read_u32(raw, 16),
            mods_count: read_u32(raw, 20),
            mods_addr: read_u32(raw, 24),
            mmap_length: read_u32(raw, 44),
            mmap_addr: read_u32(raw, 48),
        })
    }

    #[must_use]
    pub const fn flags(&self) -> InfoFlags {
        self.flags
    }

    #[must_use]
    pub const fn physical_memory(&self) -> &'a M {
        self.memory
    }

    /// `(mem_lower, mem_upper)` in KiB, if the bootloader provided them.
    ///
    /// Lower memory starts at 0 (at most 640 KiB), upper memory at 1 MiB.
    #[must_use]
    pub const fn memory_bounds(&self) -> Option<(u32, u32)> {
        if self.flags.memory() {
            Some((self.mem_lower, self.mem_upper))
        } else {
            None
        }
    }

    /// The kernel command line, if one was passed.
    ///
    /// # Errors
    /// The string is unreadable or not UTF-8.
    pub fn command_line(&self) -> Result<Option<&'a str>, MultibootError> {
        if !self.flags.command_line() || self.cmdline == 0 {
            return Ok(None);
        }

        let memory: &'a M = self.memory;
        let addr = PhysicalAddress::new(self.cmdline);
        let raw = memory
            .c_str(addr)
            .ok_or(MultibootError::Unreadable { addr, len: 1 })?;
        raw.to_str()
            .map(Some)
            .map_err(|_| MultibootError::InvalidCommandLine)
    }

    /// The BIOS memory map, if present.
    ///
    /// # Errors
    /// The map buffer is not readable.
    pub fn memory_map(&self) -> Result<Option<MemoryMapIter<'a>>, MultibootError> {
        if !self.flags.memory_map() {
            return Ok(None);
        }

        let memory: &'a M = self.memory;
        let addr = PhysicalAddress::new(self.mmap_addr);
        let len = self.mmap_length as usize;
        let buffer = memory
            .bytes(addr, len)
            .ok_or(MultibootError::Unreadable { addr, len })?;
        Ok(Some(MemoryMapIter::new(buffer)))
    }

    /// The boot modules, if the bootloader reported any.
    ///
    /// # Errors
    /// The module array is not readable.
    pub fn modules(&self) -> Result<Option<ModuleIter<'a, M>>, MultibootError> {
        if !self.flags.modules() {
            return Ok(None);
        }

        let memory: &'a M = self.memory;
        let addr = PhysicalAddress::new(self.mods_addr);
        let len = (self.mods_count as usize)
            .checked_mul(MODULE_ENTRY_SIZE)
            .ok_or(MultibootError::Unreadable {
                addr,
                len: usize::MAX,
            })?;
        let entries = memory
            .bytes(addr, len)
            .ok_or(MultibootError::Unreadable { addr, len })?;
        Ok(Some(ModuleIter::new(memory, entries)))
    }
}

impl<M: PhysicalMemory + ?Sized> Clone for Multiboot<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: PhysicalMemory + ?Sized> Copy for Multiboot<'_, M> {}

impl<M: PhysicalMemory + ?Sized> core::fmt::Debug for Multiboot<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Multiboot")
            .field("flags", &self.flags)
            .field("mem_lower", &self.mem_lower)
            .field("mem_upper", &self.mem_upper)
            .field("mods_count", &self.mods_count)
            .field("mmap_length", &self.mmap_length)
            .finish_non_exhaustive()
    }
}
