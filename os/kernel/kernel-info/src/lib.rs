//! # Kernel Configuration and Boot Interface
//!
//! This crate defines the memory layout constants and the boot interface
//! contract that govern the kernel's bring-up. It is the single source of
//! truth shared by the kernel's `build.rs`, its linker script, the boot
//! assembly and the memory subsystems.
//!
//! ## Architecture
//!
//! ### Memory Layout ([`memory`])
//! Establishes the kernel's virtual memory architecture:
//! * **Higher Half Design**: the kernel executes at [`KERNEL_ADDR_OFFSET`](memory::KERNEL_ADDR_OFFSET)
//!   plus its physical load address
//! * **Boot Mapping**: how many 4 MiB pages the boot page directory maps
//! * **Stack and Bootstrap Heap**: statically sized, placed by the linker
//!
//! ### Boot Information ([`multiboot`])
//! Defines the bootloader-to-kernel handoff interface (Multiboot v1):
//! * **Header**: the `.multiboot` header that makes the image bootable
//! * **Information Structure**: memory bounds, memory map, modules, command line
//! * **Physical Memory View**: the [`PhysicalMemory`](multiboot::PhysicalMemory) trait
//!   through which the boot payload is read
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Identity map (boot only,       │
//!             │  removed in the higher half)    │
//!             ├─────────────────────────────────┤ 0x0040_0000
//!             │                                 │
//!             │         User Space              │
//!             │                                 │
//! KERNEL_ADDR_OFFSET ─────────────────────────────┤ 0xC000_0000
//!             │  Kernel Text & Data (mapped     │
//!             │  from physical 0 by 4 MiB pages)│
//!             ├─────────────────────────────────┤
//!             │  Kernel virtual allocations     │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//!             │  (BIOS, VGA, real-mode IVT)     │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//!             ├─────────────────────────────────┤
//!             │    Available RAM / modules      │
//!             └─────────────────────────────────┘
//! ```
//!
//! ## Usage Patterns
//!
//! ### Build Script Integration
//! ```rust
//! // In build.rs
//! use kernel_info::memory::{KERNEL_ADDR_OFFSET, PHYS_LOAD};
//!
//! println!("cargo:rustc-link-arg=--defsym=KERNEL_ADDR_OFFSET={:#x}", KERNEL_ADDR_OFFSET);
//! println!("cargo:rustc-link-arg=--defsym=PHYS_LOAD={:#x}", PHYS_LOAD);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod multiboot;
