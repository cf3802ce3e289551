//! # Kernel Logging
//!
//! Text output for the kernel, from the first byte on the serial line to the
//! `log` facade everything else uses.
//!
//! ## Output Path
//!
//! ```text
//! log::info!(...)
//!     ↓
//! KernelLogger (level filter, line format)
//!     ↓
//! ByteWriter (fmt::Write)
//!     ↓
//! &dyn WriteByte: serial port, LogChannel, QEMU debug port
//! ```
//!
//! ## Core Components
//!
//! * [`WriteByte`]: anything that accepts single bytes; implemented by the
//!   serial driver and, with the `qemu` feature, by [`qemu::QemuDebugPort`]
//! * [`LogChannel`]: fans out to a primary sink and an optional mirror
//! * [`KernelLogger`]: the `log::Log` backend. Lines look like
//!   `[INFO] (kernel_alloc::pmm): PMM: 3514 of 4096 frames free`. Records
//!   under the [`MILESTONE`] target drop the scope (`[INFO] Init PMM`), which
//!   is the form a boot-time test runner matches
//! * [`LogConfig`]: the maximum level, read from `log=<level>` on the kernel
//!   command line
//!
//! ## Usage
//!
//! ```rust,ignore
//! static SERIAL: SerialPort = SerialPort::com1();
//!
//! let config = LogConfig::from_command_line(cmdline).unwrap_or_default();
//! KernelLogger::init(&SERIAL, config)?;
//! log::info!("Kernel subsystem initialized");
//! ```
//!
//! ## Features
//!
//! * `qemu`: compiles in the debug console sink and makes [`qemu_trace!`]
//!   write to it. Without it the macro evaluates nothing.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod config;
mod logger;
mod write_byte;

#[cfg(feature = "qemu")]
pub mod qemu;

pub use config::{LogConfig, LogConfigError};
pub use logger::{KernelLogger, LoggingInitError, MILESTONE, format_record};
pub use write_byte::{ByteWriter, LogChannel, WriteByte};

/// Formats straight to QEMU's debug console, bypassing the logger.
///
/// Usable before anything else is initialized.
#[cfg(feature = "qemu")]
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu::qemu_write(core::format_args!($($arg)*));
    }};
}

#[cfg(not(feature = "qemu"))]
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{}};
}
