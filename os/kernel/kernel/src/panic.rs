use crate::cpu::Cpu;
use crate::init::{SERIAL, SYMBOLS};
use crate::kernel_stack;
use core::panic::PanicInfo;
use kernel_init::Halt;
use kernel_init::panic::{FrameWalker, SymbolMap, write_report};
use kernel_log::{ByteWriter, qemu_trace};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    Cpu::disable_interrupts();

    let empty = SymbolMap::empty();
    let symbols = SYMBOLS.get().unwrap_or(&empty);
    let trace = FrameWalker::new(Cpu::frame_pointer(), read_stack_word);

    if let Some(serial) = SERIAL.get() {
        let _ = write_report(&mut ByteWriter::new(serial), info.message(), trace, symbols);
    } else {
        qemu_trace!("Kernel panic: {}\n", info.message());
    }

    Cpu.halt_forever()
}

/// Loads a word from the kernel stack; anything outside it is refused.
fn read_stack_word(addr: u32) -> Option<u32> {
    let (bottom, top) = kernel_stack();
    if !addr.is_multiple_of(4) || addr < bottom || addr.checked_add(4)? > top {
        return None;
    }
    // SAFETY: aligned and inside the kernel stack.
    Some(unsafe { core::ptr::with_exposed_provenance::<u32>(addr as usize).read_volatile() })
}
