//! QEMU's debug console.
//!
//! QEMU forwards every byte written to I/O port `0x402` to wherever
//! `-debugcon` points (`-debugcon stdio`, `-debugcon file:debug.log`). The
//! port is output only and never blocks. On real hardware it is usually
//! unused and writes are lost.

use crate::write_byte::WriteByte;
use core::fmt;

/// The port number for QEMU's debug port.
pub const QEMU_DEBUG_PORT: u16 = 0x402;

/// Byte sink for QEMU's debug port.
#[derive(Debug, Clone, Copy, Default)]
pub struct QemuDebugPort;

impl WriteByte for QemuDebugPort {
    #[inline]
    fn write_byte(&self, byte: u8) {
        dbg_putc(byte);
    }
}

/// Write a single byte to QEMU's debug port.
#[cfg(target_arch = "x86")]
#[allow(clippy::inline_always)]
#[inline(always)]
pub fn dbg_putc(byte: u8) {
    // SAFETY: Writing to the debug port has no side effects beyond the
    // emulator's output and touches no memory.
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") QEMU_DEBUG_PORT,
            in("al") byte,
            options(nomem, nostack, preserves_flags)
        );
    }
}

#[cfg(not(target_arch = "x86"))]
#[inline]
pub const fn dbg_putc(_byte: u8) {}

#[doc(hidden)]
pub fn qemu_write(args: fmt::Arguments<'_>) {
    use fmt::Write;
    // Ignore errors; this is best-effort debug output.
    let _ = crate::ByteWriter::new(&QemuDebugPort).write_fmt(args);
}
