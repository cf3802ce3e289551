use crate::error::{BootMagicMismatch, InitError, InitStage, SerialInitError, SystemFailure};
use crate::panic::PanicInitError;
use core::fmt::{self, Write};
use kernel_alloc::{
    BootstrapAllocator, MemProfile, MemoryDiscoveryError, MemoryLayout, Pmm, PmmError, Vmm,
    VmmError,
};
use kernel_info::multiboot::BOOTLOADER_MAGIC;
use kernel_log::{ByteWriter, LoggingInitError, MILESTONE, WriteByte};
use kernel_vmem::Mapper;
use log::{Level, Log, Record};

/// The serial line as handed from the serial stage to logging.
pub type SerialHandle = &'static (dyn WriteByte + Sync);

const TARGET: &str = "kernel_init";

/// The kernel's subsystems, one `init` per stage.
///
/// Each method receives only what earlier stages produced.
pub trait Subsystems<'a> {
    /// What the bootloader handed over, e.g. the multiboot information address.
    type Payload: Copy;
    type Mapper: Mapper;

    /// Architecture name for the `Init arch <name>` progress line.
    const ARCH: &'static str;

    /// # Errors
    /// The serial port could not be brought up.
    fn init_serial(&mut self, payload: Self::Payload) -> Result<SerialHandle, SerialInitError>;

    /// Installs the logger on top of `serial` and returns it.
    ///
    /// # Errors
    /// A logger could not be installed.
    fn init_logging(&mut self, serial: SerialHandle) -> Result<&'static dyn Log, LoggingInitError>;

    /// # Errors
    /// The boot information does not describe usable memory.
    fn discover_memory(
        &mut self,
        payload: Self::Payload,
    ) -> Result<MemProfile<'a>, MemoryDiscoveryError>;

    /// # Errors
    /// The panic context could not be prepared.
    fn init_panic(
        &mut self,
        layout: &MemoryLayout<'a>,
        allocator: &mut BootstrapAllocator<'a>,
    ) -> Result<(), PanicInitError>;

    /// # Errors
    /// The physical memory manager could not be set up.
    fn init_pmm(
        &mut self,
        layout: &MemoryLayout<'a>,
        allocator: &mut BootstrapAllocator<'a>,
    ) -> Result<Pmm<'a>, PmmError>;

    /// # Errors
    /// The virtual memory manager could not be set up.
    fn init_vmm(
        &mut self,
        layout: &MemoryLayout<'a>,
        allocator: &mut BootstrapAllocator<'a>,
    ) -> Result<Vmm<'a, Self::Mapper>, VmmError>;
}

/// Everything a successful initialization produced.
pub struct Ready<'a, M: Mapper> {
    pub serial: SerialHandle,
    pub profile: MemProfile<'a>,
    pub pmm: Pmm<'a>,
    pub vmm: Vmm<'a, M>,
}

impl<M: Mapper> fmt::Debug for Ready<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ready")
            .field("profile", &self.profile)
            .field("pmm", &self.pmm)
            .field("vmm", &self.vmm)
            .finish_non_exhaustive()
    }
}

/// Checks the value the bootloader left in `eax`.
///
/// # Errors
/// [`BootMagicMismatch`] unless `magic` is the multiboot bootloader magic.
pub const fn validate_boot_magic(magic: u32) -> Result<(), BootMagicMismatch> {
    if magic == BOOTLOADER_MAGIC {
        Ok(())
    } else {
        Err(BootMagicMismatch {
            found: magic,
            expected: BOOTLOADER_MAGIC,
        })
    }
}

/// Runs all stages in order and stops at the first failure.
///
/// A failure is reported exactly once, through the logger if it is running,
/// else through the serial line if that is, else not at all. A wrong boot
/// magic fails the `Boot` stage before any subsystem is touched.
///
/// Progress is logged as `Init <stage>` and `Done` lines. The serial and
/// logging stages get theirs, framed by `Init arch <arch>` and
/// `Arch init done`, as soon as the logger is installed.
///
/// # Errors
/// The [`SystemFailure`] naming the failed stage. The caller must not
/// continue; see [`Abort`](crate::Abort).
pub fn run<'a, S: Subsystems<'a>>(
    subsystems: &mut S,
    magic: u32,
    payload: S::Payload,
) -> Result<Ready<'a, S::Mapper>, SystemFailure> {
    validate_boot_magic(magic).map_err(|error| SystemFailure {
        stage: InitStage::Boot,
        error: error.into(),
    })?;

    let mut channels = Channels::default();

    let serial = channels.stage(InitStage::Serial, || subsystems.init_serial(payload))?;
    channels.serial = Some(serial);

    let logger = channels.stage(InitStage::Logging, || subsystems.init_logging(serial))?;
    channels.logger = Some(logger);

    // Serial and logging came up before anything could log them.
    channels.info(format_args!("Init arch {}", S::ARCH));
    for stage in [InitStage::Serial, InitStage::Logging] {
        channels.info(format_args!("Init {stage}"));
        channels.info(format_args!("Done"));
    }
    channels.info(format_args!("Arch init done"));

    let mut profile = channels.stage(InitStage::MemoryProfile, || {
        subsystems.discover_memory(payload)
    })?;
    let (layout, allocator) = profile.split();

    channels.stage(InitStage::Panic, || subsystems.init_panic(layout, allocator))?;
    let pmm = channels.stage(InitStage::Pmm, || subsystems.init_pmm(layout, allocator))?;
    let vmm = channels.stage(InitStage::Vmm, || subsystems.init_vmm(layout, allocator))?;

    channels.info(format_args!("Init done"));
    Ok(Ready {
        serial,
        profile,
        pmm,
        vmm,
    })
}

/// The diagnostic outputs that are live so far.
#[derive(Default)]
struct Channels {
    serial: Option<SerialHandle>,
    logger: Option<&'static dyn Log>,
}

impl Channels {
    fn stage<T, E: Into<InitError>>(
        &self,
        stage: InitStage,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, SystemFailure> {
        self.info(format_args!("Init {stage}"));
        match init() {
            Ok(value) => {
                self.info(format_args!("Done"));
                Ok(value)
            }
            Err(error) => {
                let failure = SystemFailure {
                    stage,
                    error: error.into(),
                };
                self.report(&failure);
                Err(failure)
            }
        }
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        if let Some(logger) = self.logger {
            emit(logger, Level::Info, MILESTONE, args);
        }
    }

    fn report(&self, failure: &SystemFailure) {
        if let Some(logger) = self.logger {
            emit(logger, Level::Error, TARGET, format_args!("{failure}"));
        } else if let Some(serial) = self.serial {
            let _ = writeln!(ByteWriter::new(serial), "{failure}");
        }
    }
}

fn emit(logger: &dyn Log, level: Level, target: &str, args: fmt::Arguments<'_>) {
    logger.log(
        &Record::builder()
            .level(level)
            .target(target)
            .args(args)
            .build(),
    );
}
