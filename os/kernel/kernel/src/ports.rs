//! # x86 I/O Port Access
//!
//! The legacy 16-bit I/O port space, reached with `in`/`out` rather than
//! memory loads and stores. The kernel only talks to two devices here:
//!
//! ```text
//! 0x03F8-0x03FF   Serial Port #1 (COM1), see `serial`
//! 0x0402          QEMU debug console, see `kernel_log::qemu`
//! ```
//!
//! ## Safety Requirements
//!
//! Port access is privileged: the kernel runs at CPL 0 so `in`/`out` never
//! fault, but a write to the wrong port can still reprogram an unrelated
//! device. `in`/`out` are ordered against each other, not against normal
//! memory.

/// A single I/O port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Port(u16);

impl Port {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self(port)
    }

    /// The port `offset` registers above this one.
    #[must_use]
    pub const fn offset(self, offset: u16) -> Self {
        Self(self.0 + offset)
    }

    #[must_use]
    pub const fn number(self) -> u16 {
        self.0
    }

    /// # Safety
    /// See [`outb`].
    #[inline]
    pub unsafe fn write(self, val: u8) {
        unsafe { outb(self.0, val) }
    }

    /// # Safety
    /// See [`inb`].
    #[inline]
    pub unsafe fn read(self) -> u8 {
        unsafe { inb(self.0) }
    }
}

/// Write one byte to an I/O port with `out dx, al`.
///
/// # Safety
/// - **Privilege:** Execute at CPL0 or with I/O permission for `port`,
///   otherwise the CPU raises `#GP`.
/// - **Correct port:** `port` must belong to the intended device, and the
///   device must be in a state that accepts this write.
/// - **Ordering:** `out` is not a memory fence.
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one byte from an I/O port with `in al, dx`.
///
/// # Safety
/// - **Privilege:** Execute at CPL0 or with I/O permission for `port`.
/// - **Correct port:** reading some device registers has side effects (e.g.
///   the UART receive buffer); `port` must be one the caller may consume.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let mut v: u8;
    unsafe {
        core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
    }
    v
}
