//! # 16550 UART
//!
//! Polled, transmit-only driver for the first serial port, configured for
//! 115200 baud 8N1. Its only job is to be the byte sink under the logger.

use crate::ports::Port;
use bitfield_struct::bitfield;
use kernel_init::SerialInitError;
use kernel_log::WriteByte;

/// I/O base of COM1.
pub const COM1: u16 = 0x3F8;

/// Divisor latch value for 115200 baud.
const BAUD_DIVISOR: u16 = 1;

/// Polls of the line status register before a byte is dropped.
const TRANSMIT_SPINS: u32 = 100_000;

const LOOPBACK_PROBE: u8 = 0xAE;

mod reg {
    pub const DATA: u16 = 0;
    pub const INTERRUPT_ENABLE: u16 = 1;
    pub const FIFO_CONTROL: u16 = 2;
    pub const LINE_CONTROL: u16 = 3;
    pub const MODEM_CONTROL: u16 = 4;
    pub const LINE_STATUS: u16 = 5;
    pub const SCRATCH: u16 = 7;
}

/// Line Control Register.
#[allow(dead_code)]
#[bitfield(u8)]
struct LineControl {
    /// Data bits minus five.
    #[bits(2)]
    word_length: u8,
    two_stop_bits: bool,
    parity: bool,
    even_parity: bool,
    stick_parity: bool,
    set_break: bool,
    /// Divisor Latch Access Bit: registers 0 and 1 address the baud divisor.
    dlab: bool,
}

/// Modem Control Register.
#[allow(dead_code)]
#[bitfield(u8)]
struct ModemControl {
    dtr: bool,
    rts: bool,
    out1: bool,
    /// Gates the interrupt line on PC hardware.
    out2: bool,
    loopback: bool,
    #[bits(3)]
    __: u8,
}

/// Line Status Register.
#[allow(dead_code)]
#[bitfield(u8)]
struct LineStatus {
    data_ready: bool,
    overrun_error: bool,
    parity_error: bool,
    framing_error: bool,
    break_interrupt: bool,
    /// The transmit holding register can take a byte.
    transmit_empty: bool,
    transmitter_idle: bool,
    fifo_error: bool,
}

/// A 16550-compatible UART.
#[derive(Debug)]
pub struct SerialPort {
    base: Port,
}

impl SerialPort {
    #[must_use]
    pub const fn new(base: u16) -> Self {
        Self {
            base: Port::new(base),
        }
    }

    /// Programs 115200 8N1 with FIFOs and no interrupts, then checks the chip
    /// echoes a byte in loopback mode.
    ///
    /// # Errors
    /// - [`SerialInitError::NotPresent`] if the scratch register does not
    ///   hold a value (no UART decodes the port).
    /// - [`SerialInitError::LoopbackFailed`] if the loopback echo is wrong.
    pub fn init(&self) -> Result<(), SerialInitError> {
        let port = self.base.number();
        let eight_n_one = LineControl::new().with_word_length(0b11);

        // SAFETY: COM1 registers at CPL 0; nothing else drives the UART yet.
        unsafe {
            self.write(reg::SCRATCH, LOOPBACK_PROBE);
            if self.read(reg::SCRATCH) != LOOPBACK_PROBE {
                return Err(SerialInitError::NotPresent { port });
            }

            self.write(reg::INTERRUPT_ENABLE, 0);
            self.write(reg::LINE_CONTROL, eight_n_one.with_dlab(true).into_bits());
            let [lo, hi] = BAUD_DIVISOR.to_le_bytes();
            self.write(reg::DATA, lo);
            self.write(reg::INTERRUPT_ENABLE, hi);
            self.write(reg::LINE_CONTROL, eight_n_one.into_bits());
            // Enable and clear FIFOs, 14 byte threshold.
            self.write(reg::FIFO_CONTROL, 0xC7);

            let modem = ModemControl::new()
                .with_dtr(true)
                .with_rts(true)
                .with_out1(true)
                .with_out2(true);
            self.write(reg::MODEM_CONTROL, modem.with_loopback(true).into_bits());
            self.write(reg::DATA, LOOPBACK_PROBE);
            if self.read(reg::DATA) != LOOPBACK_PROBE {
                return Err(SerialInitError::LoopbackFailed { port });
            }
            self.write(reg::MODEM_CONTROL, modem.into_bits());
        }
        Ok(())
    }

    fn line_status(&self) -> LineStatus {
        // SAFETY: reading LSR has no side effects on transmit.
        LineStatus::from_bits(unsafe { self.read(reg::LINE_STATUS) })
    }

    unsafe fn write(&self, register: u16, value: u8) {
        unsafe { self.base.offset(register).write(value) }
    }

    unsafe fn read(&self, register: u16) -> u8 {
        unsafe { self.base.offset(register).read() }
    }
}

impl WriteByte for SerialPort {
    fn write_byte(&self, byte: u8) {
        for _ in 0..TRANSMIT_SPINS {
            if self.line_status().transmit_empty() {
                // SAFETY: THR is empty; writing DATA with DLAB clear transmits.
                unsafe { self.write(reg::DATA, byte) };
                return;
            }
            core::hint::spin_loop();
        }
    }

    fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(b);
        }
    }
}
