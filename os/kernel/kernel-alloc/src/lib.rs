//! # Kernel Memory Bootstrap and Management
//!
//! This crate turns what the bootloader tells us about memory into something
//! the rest of the kernel can rely on, and provides the first allocators that
//! operate on it. Nothing here needs a heap; every dynamically sized structure
//! is carved out of the statically reserved bootstrap heap.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │     Physical / Virtual Memory Managers              │
//! │    • 4 KiB frame bitmap                             │
//! │    • kernel-half page bitmap + 4 MiB mappings       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ &MemoryLayout, &mut BootstrapAllocator
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Memory Profile                         │
//! │    • kernel image bounds, total memory              │
//! │    • modules, reserved virtual/physical ranges      │
//! │    • translation offset                             │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ first allocations
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Bootstrap Allocator                       │
//! │    • bump allocation over a fixed buffer            │
//! │    • never frees                                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Bootstrap Allocator ([`bootstrap`])
//! * **Bump Allocation**: aligned regions carved off a single buffer
//! * **Structural Non-Overlap**: regions are produced by splitting the buffer
//! * **Single Owner**: neither `Clone` nor `Copy`; moved into the profile
//!
//! ### Memory Profile ([`profile`])
//! * **Discovery**: [`profile::discover`] reads the multiboot information
//!   structure through a [`PhysicalMemory`](kernel_info::multiboot::PhysicalMemory)
//!   view and validates it against the kernel image bounds
//! * **Reserved Ranges**: low memory, the kernel image, non-available memory-map
//!   entries and boot modules are never handed out
//!
//! ### Physical Memory Manager ([`pmm`])
//! One bit per 4 KiB frame; reserved frames are marked used at start-up and can
//! never be freed.
//!
//! ### Virtual Memory Manager ([`vmm`])
//! One bit per 4 KiB page of the kernel half; backed reservations are installed
//! through a [`Mapper`](kernel_vmem::Mapper) using 4 MiB pages, and conflicting
//! backings are refused.
//!
//! ## Usage Patterns
//!
//! ```ignore
//! let mut profile = discover(&payload, kernel_image, bootstrap_heap)?;
//! let MemProfile { layout, fixed_allocator } = &mut profile;
//! let pmm = Pmm::init(layout, fixed_allocator)?;
//! let vmm = Vmm::init(layout, fixed_allocator, active_directory)?;
//! ```
//!
//! ## Performance Characteristics
//!
//! * **Bootstrap Allocation**: O(1)
//! * **Frame Allocation**: O(n) worst case, O(1) typical with the next-free hint
//! * **Virtual Allocation**: O(n) first fit, skipping full bitmap words
//! * **Memory Overhead**: 1 bit per 4 KiB frame plus 32 KiB for the kernel half

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
pub mod pmm;
pub mod profile;
pub mod vmm;

pub use bootstrap::{BootstrapAllocError, BootstrapAllocator};
pub use pmm::{Pmm, PmmError};
pub use profile::{
    KernelImage, Map, MemProfile, MemoryDiscoveryError, MemoryLayout, Module, Range, discover,
};
pub use vmm::{Vmm, VmmError};
