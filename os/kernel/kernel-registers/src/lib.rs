//! # Typed IA-32 Control Registers
//!
//! 32-bit protected mode models of `CR0`, `CR3` and `CR4`. Loading is only
//! available with the `asm` feature on `x86` targets; the bit layouts
//! themselves are plain `const` values usable anywhere, including from the
//! boot assembly as `const` operands.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "cr4")]
pub mod cr4;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}
