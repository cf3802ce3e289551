//! # Panic Support
//!
//! The hardware-independent half of the panic subsystem:
//!
//! * [`SymbolMap`]: function start addresses and names, read from the
//!   `kernel.map` boot module when the bootloader loaded one. Each line is
//!   `<hex address> <name>`.
//! * [`FrameWalker`]: follows the saved-`ebp` chain of a stack.
//! * [`write_report`]: the text printed before the machine halts.
//!
//! ```text
//! Kernel panic: attempt to add with overflow
//!   0xC0101A3C kernel_alloc::pmm::Pmm::alloc+0x4C
//!   0xC0100217 kernel_entry+0x37
//! ```

use core::fmt;
use kernel_alloc::{BootstrapAllocError, BootstrapAllocator, Module, Range};
use kernel_memory_addresses::PhysicalAddress;

/// Name of the boot module holding the symbol map.
pub const SYMBOL_FILE: &str = "kernel.map";

/// Frames [`FrameWalker`] follows at most.
pub const MAX_FRAMES: usize = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PanicInitError {
    #[error("symbol map at {region} is not mapped")]
    Unreadable { region: Range<PhysicalAddress> },
    #[error("symbol map is not valid UTF-8")]
    NotUtf8,
    #[error("symbol map line {line} is malformed")]
    InvalidSymbolMap { line: usize },
    #[error(transparent)]
    Allocation(#[from] BootstrapAllocError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Symbol<'a> {
    pub address: u32,
    pub name: &'a str,
}

/// Symbols sorted by address.
#[derive(Debug, Copy, Clone)]
pub struct SymbolMap<'a> {
    symbols: &'a [Symbol<'a>],
}

impl<'a> SymbolMap<'a> {
    /// Parses `text`; the symbol table is allocated from `allocator`.
    ///
    /// Blank lines are skipped. Addresses are hexadecimal with an optional
    /// `0x` prefix.
    ///
    /// # Errors
    /// - [`PanicInitError::InvalidSymbolMap`] with the 1-based line number of
    ///   a line that has no name or no valid address.
    /// - [`PanicInitError::Allocation`] if the table does not fit.
    pub fn parse(
        text: &'a str,
        allocator: &mut BootstrapAllocator<'a>,
    ) -> Result<Self, PanicInitError> {
        let count = text.lines().filter(|l| !l.trim().is_empty()).count();
        let symbols = allocator.allocate_slice(count, Symbol { address: 0, name: "" })?;

        let mut slots = symbols.iter_mut();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let invalid = PanicInitError::InvalidSymbolMap { line: index + 1 };

            let (address, name) = line.split_once(char::is_whitespace).ok_or(invalid)?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid);
            }
            let digits = address
                .strip_prefix("0x")
                .or_else(|| address.strip_prefix("0X"))
                .unwrap_or(address);
            let address = u32::from_str_radix(digits, 16).map_err(|_| invalid)?;

            if let Some(slot) = slots.next() {
                *slot = Symbol { address, name };
            }
        }

        symbols.sort_unstable_by_key(|s| s.address);
        Ok(Self { symbols })
    }

    /// Like [`parse`](Self::parse), for raw module contents.
    ///
    /// # Errors
    /// [`PanicInitError::NotUtf8`], or any error of [`parse`](Self::parse).
    pub fn parse_bytes(
        bytes: &'a [u8],
        allocator: &mut BootstrapAllocator<'a>,
    ) -> Result<Self, PanicInitError> {
        let text = core::str::from_utf8(bytes).map_err(|_| PanicInitError::NotUtf8)?;
        Self::parse(text, allocator)
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { symbols: &[] }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The symbol whose code contains `address`, with the offset into it.
    ///
    /// A symbol ends where the next one starts, so an address at or past the
    /// last symbol has no match.
    #[must_use]
    pub fn lookup(&self, address: u32) -> Option<(&'a Symbol<'a>, u32)> {
        let next = self.symbols.partition_point(|s| s.address <= address);
        if next == 0 || next == self.symbols.len() {
            return None;
        }
        let symbols: &'a [Symbol<'a>] = self.symbols;
        let symbol = &symbols[next - 1];
        Some((symbol, address - symbol.address))
    }
}

/// The boot module carrying the symbol map, if the bootloader loaded one.
///
/// Matches on the file name of the module's first word, so
/// `/boot/kernel.map` is found too.
#[must_use]
pub fn symbol_file<'m, 'a>(modules: &'m [Module<'a>]) -> Option<&'m Module<'a>> {
    modules.iter().find(|m| {
        m.name
            .split_ascii_whitespace()
            .next()
            .and_then(|path| path.rsplit('/').next())
            == Some(SYMBOL_FILE)
    })
}

/// Iterator over the return addresses on a frame-pointer chain.
///
/// Every frame starts with the caller's `ebp` followed by the return
/// address. The walk stops at a null frame, a frame that does not move up
/// the stack, an unreadable frame or after [`MAX_FRAMES`].
pub struct FrameWalker<R> {
    frame: u32,
    read: R,
    remaining: usize,
}

impl<R: FnMut(u32) -> Option<u32>> FrameWalker<R> {
    /// `read` loads the 32-bit word at an address, or fails.
    #[must_use]
    pub const fn new(ebp: u32, read: R) -> Self {
        Self {
            frame: ebp,
            read,
            remaining: MAX_FRAMES,
        }
    }
}

impl<R: FnMut(u32) -> Option<u32>> Iterator for FrameWalker<R> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.frame == 0 || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let frame = self.frame;
        self.frame = 0;
        let caller = (self.read)(frame)?;
        let ret = (self.read)(frame.checked_add(4)?)?;
        if caller > frame {
            self.frame = caller;
        }
        Some(ret)
    }
}

/// Writes the panic report.
///
/// # Errors
/// Propagates errors of `out`.
pub fn write_report(
    out: &mut impl fmt::Write,
    message: impl fmt::Display,
    trace: impl IntoIterator<Item = u32>,
    symbols: &SymbolMap<'_>,
) -> fmt::Result {
    writeln!(out, "Kernel panic: {message}")?;
    for address in trace {
        match symbols.lookup(address) {
            Some((symbol, 0)) => writeln!(out, "  {address:#010X} {}", symbol.name)?,
            Some((symbol, offset)) => {
                writeln!(out, "  {address:#010X} {}+{offset:#X}", symbol.name)?;
            }
            None => writeln!(out, "  {address:#010X} ???")?,
        }
    }
    Ok(())
}
