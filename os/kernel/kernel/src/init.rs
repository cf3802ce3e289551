//! The kernel's [`Subsystems`]: what each init stage does on real hardware.

use crate::serial::{COM1, SerialPort};
use crate::{BOOT_PAGE_DIRECTORY, BOOTSTRAP_HEAP, tracing};
use core::ffi::CStr;
use kernel_alloc::{
    BootstrapAllocator, KernelImage, MemProfile, MemoryDiscoveryError, MemoryLayout, Pmm,
    PmmError, Vmm, VmmError, discover,
};
use kernel_info::memory::{BOOT_MAPPED_PAGES, KERNEL_OFFSET, LARGE_PAGE_SIZE};
use kernel_info::multiboot::{Multiboot, PhysicalMemory};
use kernel_init::panic::{PanicInitError, SymbolMap, symbol_file};
use kernel_init::{SerialHandle, SerialInitError, Subsystems};
use kernel_log::{KernelLogger, LogChannel, LogConfig, LoggingInitError};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::SyncOnceCell;
use kernel_vmem::ActivePageDirectory;
use log::{Log, info, warn};

static COM1_PORT: SerialPort = SerialPort::new(COM1);

/// Where text goes once the serial stage has completed.
pub static SERIAL: SyncOnceCell<LogChannel<'static>> = SyncOnceCell::new();

/// Symbols for panic backtraces, if a symbol map was loaded.
pub static SYMBOLS: SyncOnceCell<SymbolMap<'static>> = SyncOnceCell::new();

/// End of the physical memory the boot mapping makes visible.
#[allow(clippy::cast_possible_truncation)]
const WINDOW_END: u32 = BOOT_MAPPED_PAGES as u32 * LARGE_PAGE_SIZE;

/// Physical memory read through the boot mapping's higher-half window.
pub struct HigherHalf;

pub static PHYSICAL: HigherHalf = HigherHalf;

impl PhysicalMemory for HigherHalf {
    fn bytes(&self, addr: PhysicalAddress, len: usize) -> Option<&[u8]> {
        let end = addr.as_u32().checked_add(u32::try_from(len).ok()?)?;
        if end > WINDOW_END {
            return None;
        }
        let va = KERNEL_OFFSET.to_virtual(addr);
        // SAFETY: [addr, end) lies in the boot mapping, which stays mapped
        // read-write for the kernel's lifetime.
        Some(unsafe {
            core::slice::from_raw_parts(core::ptr::with_exposed_provenance(va.as_usize()), len)
        })
    }

    fn c_str(&self, addr: PhysicalAddress) -> Option<&CStr> {
        let rest = WINDOW_END.checked_sub(addr.as_u32())?;
        CStr::from_bytes_until_nul(self.bytes(addr, rest as usize)?).ok()
    }
}

unsafe extern "C" {
    static KERNEL_VADDR_START: u8;
    static KERNEL_VADDR_END: u8;
    static KERNEL_PHYSADDR_START: u8;
    static KERNEL_PHYSADDR_END: u8;
}

#[allow(clippy::cast_possible_truncation)]
fn symbol_value(symbol: *const u8) -> u32 {
    symbol.addr() as u32
}

/// The kernel image bounds defined by the linker script.
pub fn kernel_image() -> KernelImage {
    KernelImage {
        vaddr_start: VirtualAddress::new(symbol_value(&raw const KERNEL_VADDR_START)),
        vaddr_end: VirtualAddress::new(symbol_value(&raw const KERNEL_VADDR_END)),
        physaddr_start: PhysicalAddress::new(symbol_value(&raw const KERNEL_PHYSADDR_START)),
        physaddr_end: PhysicalAddress::new(symbol_value(&raw const KERNEL_PHYSADDR_END)),
    }
}

/// The running kernel, as seen by the init sequence.
pub struct Kernel {
    boot_info: PhysicalAddress,
}

impl Kernel {
    /// # Safety
    /// At most one `Kernel` may exist, and it may be run through the init
    /// sequence once: its stages hand out the bootstrap heap and the active
    /// page directory as exclusive references.
    pub const unsafe fn new(boot_info: PhysicalAddress) -> Self {
        Self { boot_info }
    }

    fn command_line(&self) -> Option<&'static str> {
        let boot = Multiboot::from_physical(&PHYSICAL, self.boot_info).ok()?;
        boot.command_line().ok().flatten()
    }
}

impl Subsystems<'static> for Kernel {
    type Payload = PhysicalAddress;
    type Mapper = ActivePageDirectory<'static>;

    const ARCH: &'static str = "x86";

    fn init_serial(&mut self, _: PhysicalAddress) -> Result<SerialHandle, SerialInitError> {
        COM1_PORT.init()?;

        let channel = LogChannel::new(&COM1_PORT);
        #[cfg(feature = "qemu")]
        let channel = channel.with_mirror(&kernel_log::qemu::QemuDebugPort);
        Ok(SERIAL.get_or_init(|| channel))
    }

    fn init_logging(
        &mut self,
        serial: SerialHandle,
    ) -> Result<&'static dyn Log, LoggingInitError> {
        let parsed = self
            .command_line()
            .map(LogConfig::from_command_line)
            .transpose();
        let config = parsed.unwrap_or_default().unwrap_or_default();

        let logger = KernelLogger::init(serial, config)?;
        if let Err(e) = parsed {
            warn!("{e}, logging at {}", config.level);
        }
        Ok(logger)
    }

    fn discover_memory(
        &mut self,
        payload: PhysicalAddress,
    ) -> Result<MemProfile<'static>, MemoryDiscoveryError> {
        let boot = Multiboot::from_physical(&PHYSICAL, payload)?;
        tracing::trace_boot_info(&boot);

        // SAFETY: the only reference to the heap; see `Kernel::new`.
        let heap: &'static mut [u8] = unsafe { &mut *(&raw mut BOOTSTRAP_HEAP) };
        discover(&boot, kernel_image(), heap)
    }

    fn init_panic(
        &mut self,
        layout: &MemoryLayout<'static>,
        allocator: &mut BootstrapAllocator<'static>,
    ) -> Result<(), PanicInitError> {
        let Some(module) = symbol_file(layout.modules) else {
            info!("No symbol map loaded, backtraces show addresses only");
            return Ok(());
        };

        let region = module.region;
        let bytes = PHYSICAL
            .bytes(region.start(), region.len() as usize)
            .ok_or(PanicInitError::Unreadable { region })?;
        let symbols = SymbolMap::parse_bytes(bytes, allocator)?;
        info!("Loaded {} symbols from {}", symbols.len(), module.name);

        if SYMBOLS.set(symbols).is_err() {
            warn!("Symbol map already loaded");
        }
        Ok(())
    }

    fn init_pmm(
        &mut self,
        layout: &MemoryLayout<'static>,
        allocator: &mut BootstrapAllocator<'static>,
    ) -> Result<Pmm<'static>, PmmError> {
        Pmm::init(layout, allocator)
    }

    fn init_vmm(
        &mut self,
        layout: &MemoryLayout<'static>,
        allocator: &mut BootstrapAllocator<'static>,
    ) -> Result<Vmm<'static, ActivePageDirectory<'static>>, VmmError> {
        // SAFETY: BOOT_PAGE_DIRECTORY is in CR3, we run at CPL 0 and this is
        // the only reference to it; see `Kernel::new`.
        let directory = unsafe { ActivePageDirectory::new(&mut *(&raw mut BOOT_PAGE_DIRECTORY)) };
        Vmm::init(layout, allocator, directory)
    }
}
