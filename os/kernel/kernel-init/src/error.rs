use core::fmt;
use kernel_alloc::{MemoryDiscoveryError, PmmError, VmmError};
use kernel_log::LoggingInitError;

use crate::panic::PanicInitError;

/// The stages of kernel initialization, in order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InitStage {
    Boot,
    Serial,
    Logging,
    MemoryProfile,
    Panic,
    Pmm,
    Vmm,
    Ready,
}

impl InitStage {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Serial => "serial",
            Self::Logging => "logging",
            Self::MemoryProfile => "memory profile",
            Self::Panic => "panic",
            Self::Pmm => "PMM",
            Self::Vmm => "VMM",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bootloader magic {found:#010x} does not match {expected:#010x}")]
pub struct BootMagicMismatch {
    pub found: u32,
    pub expected: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerialInitError {
    #[error("no UART at port {port:#06x}")]
    NotPresent { port: u16 },
    #[error("UART at port {port:#06x} failed its loopback test")]
    LoopbackFailed { port: u16 },
}

/// Any stage error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    BootMagic(#[from] BootMagicMismatch),
    #[error(transparent)]
    Serial(#[from] SerialInitError),
    #[error(transparent)]
    Logging(#[from] LoggingInitError),
    #[error(transparent)]
    MemoryDiscovery(#[from] MemoryDiscoveryError),
    #[error(transparent)]
    Panic(#[from] PanicInitError),
    #[error(transparent)]
    Pmm(#[from] PmmError),
    #[error(transparent)]
    Vmm(#[from] VmmError),
}

/// Terminal state of a failed initialization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} initialization failed: {error}")]
pub struct SystemFailure {
    pub stage: InitStage,
    pub error: InitError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_alloc::PmmError;

    #[test]
    fn stages_are_ordered() {
        assert!(InitStage::Boot < InitStage::Serial);
        assert!(InitStage::MemoryProfile < InitStage::Panic);
        assert!(InitStage::Vmm < InitStage::Ready);
    }

    #[test]
    fn failure_message() {
        let failure = SystemFailure {
            stage: InitStage::Pmm,
            error: PmmError::OutOfMemory.into(),
        };
        assert_eq!(
            failure.to_string(),
            "PMM initialization failed: out of physical memory"
        );

        let failure = SystemFailure {
            stage: InitStage::Boot,
            error: BootMagicMismatch {
                found: 0xDEAD_BEEF,
                expected: 0x2BAD_B002,
            }
            .into(),
        };
        assert_eq!(
            failure.to_string(),
            "boot initialization failed: bootloader magic 0xdeadbeef does not match 0x2badb002"
        );
    }
}
