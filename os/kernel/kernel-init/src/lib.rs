//! # Kernel Initialization
//!
//! Brings the kernel from "running in the higher half" to "memory managed":
//!
//! ```text
//! Boot → Serial → Logging → MemoryProfile → Panic → PMM → VMM → Ready
//!   │       │        │            │           │      │     │
//!   └───────┴────────┴────────────┴───────────┴──────┴─────┴──→ SystemFailure
//! ```
//!
//! The sequencer in [`run`] owns no business logic. Each stage is a method on
//! a [`Subsystems`] implementation; the sequencer calls them in order, feeds
//! every stage only what earlier stages produced and stops at the first
//! error. That error is reported once, through the logger if it is already
//! up or the serial line if only that is, and returned as a
//! [`SystemFailure`]. The caller then stops the machine with [`Abort`].
//!
//! Once the logger is up, every stage is bracketed by progress lines under the
//! [`MILESTONE`](kernel_log::MILESTONE) target, in the order a boot-time test
//! runner expects:
//!
//! ```text
//! [INFO] Init arch x86
//! [INFO] Init serial
//! [INFO] Done
//! [INFO] Init logging
//! [INFO] Done
//! [INFO] Arch init done
//! [INFO] Init memory profile
//! [INFO] Done
//! ...
//! [INFO] Init done
//! ```
//!
//! The [`panic`] module holds the pieces of the panic subsystem that do not
//! touch hardware: the symbol map read from the `kernel.map` boot module.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod abort;
mod error;
pub mod panic;
mod sequencer;

pub use abort::{Abort, Halt};
pub use error::{BootMagicMismatch, InitError, InitStage, SerialInitError, SystemFailure};
pub use sequencer::{Ready, SerialHandle, Subsystems, run, validate_boot_magic};
