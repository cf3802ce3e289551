//! # Kernel Entry Point
//!
//! ```text
//! bootloader ─ eax = magic, ebx = multiboot info (physical) ─┐
//!                                                            ▼
//! _start (.boot.text, physical addresses, no stack)
//!   cli, magic check, CR3 ← boot directory, CR4.PSE, CR0.PG, jmp
//!                                                            ▼
//! higher_half_entry (linked at KERNEL_ADDR_OFFSET + physical)
//!   drop identity entry, invlpg, esp ← kernel stack, call
//!                                                            ▼
//! kernel_entry → kernel_init::run → kernel_main
//! ```

#![no_std]
#![no_main]
#![allow(unsafe_code)]

#[cfg(not(target_arch = "x86"))]
compile_error!("the kernel binary only targets 32-bit x86 (see i686-kernel.json)");

mod cpu;
mod init;
mod panic;
mod ports;
#[cfg(feature = "rt-test")]
mod rt_test;
mod serial;
mod tracing;

use crate::cpu::Cpu;
use crate::init::Kernel;
use kernel_info::memory::{BOOTSTRAP_HEAP_SIZE, KERNEL_ADDR_OFFSET, KERNEL_STACK_SIZE};
use kernel_info::multiboot::{BOOTLOADER_MAGIC, Header};
use kernel_init::{Abort, Halt, Ready};
use kernel_log::qemu_trace;
use kernel_memory_addresses::PhysicalAddress;
use kernel_registers::cr0::Cr0;
use kernel_registers::cr4::Cr4;
use kernel_vmem::{ActivePageDirectory, KERNEL_BOOT_MAPPING, PageDirectory};
use log::info;

#[used]
#[unsafe(link_section = ".multiboot")]
static MULTIBOOT_HEADER: Header = Header::new()
    .request_aligned_modules()
    .request_memory_map();

/// The page directory `_start` loads: identity entry 0 plus the higher-half
/// window. Entry 0 is cleared again by `higher_half_entry`.
#[unsafe(link_section = ".boot.data")]
#[unsafe(no_mangle)]
static mut BOOT_PAGE_DIRECTORY: PageDirectory = match PageDirectory::boot(KERNEL_BOOT_MAPPING) {
    Ok(directory) => directory,
    Err(_) => panic!("kernel boot mapping does not fit the page directory"),
};

/// 16-byte aligned stack
#[repr(C, align(16))]
struct Aligned<const N: usize>([u8; N]);

#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut KERNEL_STACK: Aligned<KERNEL_STACK_SIZE> = Aligned([0; KERNEL_STACK_SIZE]);

/// Backing store of the bootstrap allocator.
static mut BOOTSTRAP_HEAP: [u8; BOOTSTRAP_HEAP_SIZE] = [0; BOOTSTRAP_HEAP_SIZE];

const CR4_PSE: u32 = Cr4::new().with_pse(true).into_bits();
const CR0_PG: u32 = Cr0::new().with_pg_paging(true).into_bits();

/// Bounds `[bottom, top)` of the kernel stack.
#[allow(clippy::cast_possible_truncation)]
fn kernel_stack() -> (u32, u32) {
    let bottom = (&raw const KERNEL_STACK).addr() as u32;
    (bottom, bottom + KERNEL_STACK_SIZE as u32)
}

/// The multiboot entry point.
///
/// # Naked function & Paging
/// Runs at its physical address with paging off and no stack, so it only
/// touches registers. Every address it uses is a link-time constant:
/// higher-half symbols are turned physical by subtracting
/// `KERNEL_ADDR_OFFSET`. `eax` and `ebx` carry the bootloader's magic and
/// information pointer through to [`higher_half_entry`].
///
/// Interrupts are masked first and stay masked. With a wrong magic the CPU
/// halts without touching paging.
#[unsafe(no_mangle)]
#[unsafe(naked)]
#[unsafe(link_section = ".boot.text")]
pub extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "cli",
        "cmp eax, {magic}",
        "jne 2f",

        "lea ecx, [{directory} - {offset}]",
        "mov cr3, ecx",

        "mov ecx, cr4",
        "or ecx, {cr4_pse}",
        "mov cr4, ecx",

        // Point of no return: every fetch after this is translated.
        "mov ecx, cr0",
        "or ecx, {cr0_pg}",
        "mov cr0, ecx",

        // Absolute jump into the higher half; no stack exists for a call.
        "lea ecx, [{higher_half}]",
        "jmp ecx",

        "2:",
        "cli",
        "hlt",
        "jmp 2b",
        magic = const BOOTLOADER_MAGIC,
        directory = sym BOOT_PAGE_DIRECTORY,
        offset = const KERNEL_ADDR_OFFSET,
        cr4_pse = const CR4_PSE,
        cr0_pg = const CR0_PG,
        higher_half = sym higher_half_entry,
    );
}

/// First code running in the higher half.
///
/// Clears the identity entry before anything else can use it, sets up the
/// kernel stack with a null frame pointer ending backtraces, and calls
/// [`kernel_entry`] with `(magic, info)`.
#[unsafe(naked)]
extern "C" fn higher_half_entry() -> ! {
    core::arch::naked_asm!(
        "mov dword ptr [{directory}], 0",
        "invlpg [0]",

        "lea esp, [{stack} + {stack_size}]",
        "xor ebp, ebp",
        // Two pushes below; keep esp 16-byte aligned at the call.
        "sub esp, 8",
        "push ebx",
        "push eax",
        "call {rust_entry}",

        "2:",
        "cli",
        "hlt",
        "jmp 2b",
        directory = sym BOOT_PAGE_DIRECTORY,
        stack = sym KERNEL_STACK,
        stack_size = const KERNEL_STACK_SIZE,
        rust_entry = sym kernel_entry,
    );
}

/// Kernel entry running on the kernel stack.
///
/// # Notes
/// * `no_mangle` is used so the entry assembly can call it by name.
/// * It uses C ABI to have a defined convention when calling in from ASM.
#[unsafe(no_mangle)]
extern "C" fn kernel_entry(magic: u32, info: u32) -> ! {
    qemu_trace!("Kernel reporting to QEMU!\n");

    // SAFETY: the only `Kernel`, run through the sequence once below.
    let mut kernel = unsafe { Kernel::new(PhysicalAddress::new(info)) };
    match kernel_init::run(&mut kernel, magic, PhysicalAddress::new(info)) {
        Ok(ready) => kernel_main(ready),
        Err(failure) => Abort::from(&failure).halt(&Cpu),
    }
}

#[cfg_attr(not(feature = "rt-test"), allow(unused_mut))]
fn kernel_main(mut ready: Ready<'static, ActivePageDirectory<'static>>) -> ! {
    tracing::trace_memory_layout(&ready.profile.layout);

    #[cfg(feature = "rt-test")]
    rt_test::run(&mut ready);

    info!(
        "Kernel idle: {} frames and {} kernel pages free",
        ready.pmm.free_frames(),
        ready.vmm.free_pages()
    );
    Cpu.halt_forever()
}
