//! Runtime checks run after initialization with the `rt-test` feature.
//!
//! Every check logs one `[INFO] <Subsystem>: Tested <what>` line on success,
//! which a host-side runner matches against the serial output.
//! Failures panic.

use crate::BOOT_PAGE_DIRECTORY;
use kernel_info::memory::KERNEL_OFFSET;
use kernel_init::Ready;
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::LoadRegisterUnsafe;
use kernel_registers::cr0::Cr0;
use kernel_registers::cr3::Cr3;
use kernel_registers::cr4::Cr4;
use kernel_log::MILESTONE;
use kernel_vmem::Mapper;
use log::info;

pub fn run<M: Mapper>(ready: &mut Ready<'static, M>) {
    control_registers();
    identity_mapping_removed(ready);
    translation(ready);
    frame_allocation(ready);
    page_allocation(ready);
    info!(target: MILESTONE, "Runtime tests done");
}

#[allow(clippy::cast_possible_truncation)]
fn control_registers() {
    // SAFETY: reading control registers at CPL 0 has no side effects.
    let (cr0, cr3, cr4) = unsafe { (Cr0::load_unsafe(), Cr3::load_unsafe(), Cr4::load_unsafe()) };
    assert!(cr0.pg_paging());
    assert!(cr4.pse());

    let directory = VirtualAddress::new((&raw const BOOT_PAGE_DIRECTORY).addr() as u32);
    assert_eq!(cr3.page_directory(), KERNEL_OFFSET.to_physical(directory));
    info!(target: MILESTONE, "Paging: Tested control registers");
}

fn identity_mapping_removed<M: Mapper>(ready: &Ready<'static, M>) {
    assert_eq!(ready.vmm.translate(VirtualAddress::new(0)), None);
    info!(target: MILESTONE, "Paging: Tested identity mapping removed");
}

fn translation<M: Mapper>(ready: &Ready<'static, M>) {
    let layout = &ready.profile.layout;
    let va = layout.vaddr_start;
    assert_eq!(KERNEL_OFFSET.to_physical(va), layout.physaddr_start);
    assert_eq!(ready.vmm.translate(va), Some(layout.physaddr_start));
    info!(target: MILESTONE, "Memory: Tested address translation");
}

fn frame_allocation<M: Mapper>(ready: &mut Ready<'static, M>) {
    let before = ready.pmm.free_frames();
    let frame = ready.pmm.alloc().unwrap_or_else(|e| panic!("{e}"));
    assert!(!ready.profile.layout.is_physically_reserved(frame.base()));
    assert!(!ready.profile.layout.kernel_physical().contains(frame.base()));
    ready.pmm.free(frame).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(ready.pmm.free_frames(), before);
    info!(target: MILESTONE, "PMM: Tested allocation");
}

fn page_allocation<M: Mapper>(ready: &mut Ready<'static, M>) {
    let before = ready.vmm.free_pages();
    let page = ready.vmm.allocate(4).unwrap_or_else(|e| panic!("{e}"));
    assert!(ready.vmm.is_reserved(page));
    assert!(!ready.profile.layout.kernel_virtual().contains(page));
    ready.vmm.release(page, 4).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(ready.vmm.free_pages(), before);
    info!(target: MILESTONE, "VMM: Tested allocation");
}
