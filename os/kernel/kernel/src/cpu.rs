use kernel_init::Halt;

/// The boot processor.
#[derive(Debug, Copy, Clone, Default)]
pub struct Cpu;

impl Cpu {
    /// Masks maskable interrupts.
    #[inline]
    pub fn disable_interrupts() {
        // SAFETY: CPL 0.
        unsafe { core::arch::asm!("cli", options(nomem, nostack)) };
    }

    /// The current `ebp`.
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn frame_pointer() -> u32 {
        let ebp: u32;
        // SAFETY: reads a register.
        unsafe {
            core::arch::asm!("mov {}, ebp", out(reg) ebp, options(nomem, nostack, preserves_flags));
        }
        ebp
    }
}

impl Halt for Cpu {
    fn halt_forever(&self) -> ! {
        loop {
            // SAFETY: CPL 0; with interrupts masked `hlt` only wakes for NMI/SMI.
            unsafe { core::arch::asm!("cli", "hlt", options(nomem, nostack)) };
        }
    }
}
