//! # Kernel Tracing helpers

use kernel_alloc::MemoryLayout;
use kernel_info::multiboot::{Multiboot, PhysicalMemory};
use log::{debug, info};

pub fn trace_boot_info<M: PhysicalMemory + ?Sized>(boot: &Multiboot<'_, M>) {
    let (lower, upper) = boot.memory_bounds().unwrap_or_default();
    info!(
        concat!(
            "Boot Info in Kernel:\n",
            "  flags    = {flags:#010x}\n",
            "  memory   = {lower} KiB lower, {upper} KiB upper\n",
            "  cmdline  = {cmdline}"
        ),
        flags = boot.flags().into_bits(),
        lower = lower,
        upper = upper,
        cmdline = boot.command_line().ok().flatten().unwrap_or(""),
    );

    if let Ok(Some(map)) = boot.memory_map() {
        for region in map.flatten() {
            debug!(
                "  mmap {:#012x}..{:#012x} {:?}",
                region.base,
                region.end(),
                region.kind
            );
        }
    }
}

pub fn trace_memory_layout(layout: &MemoryLayout<'_>) {
    info!(
        concat!(
            "Memory profile:\n",
            "  kernel   = {virt} at {phys}\n",
            "  memory   = {mem_kb} KiB\n",
            "  modules  = {modules}, reserved = {phys_reserved} physical / {virt_reserved} virtual"
        ),
        virt = layout.kernel_virtual(),
        phys = layout.kernel_physical(),
        mem_kb = layout.mem_kb,
        modules = layout.modules.len(),
        phys_reserved = layout.physical_reserved.len(),
        virt_reserved = layout.virtual_reserved.len(),
    );

    for module in layout.modules {
        debug!("  module {} {}", module.region, module.name);
    }
}
