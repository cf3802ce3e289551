//! # Physical Memory Manager
//!
//! A bitmap with one bit per 4 KiB frame below the end of memory. A set bit
//! means the frame is in use. The bitmap itself lives in the bootstrap heap.
//!
//! At [`init`](Pmm::init) every frame touched by a physically reserved range
//! (which always includes the low megabyte and the kernel image) is marked
//! used and stays so: [`free`](Pmm::free) refuses reserved frames.

use crate::bootstrap::{BootstrapAllocError, BootstrapAllocator};
use crate::profile::{MemoryLayout, Range};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use log::{debug, info};

const FRAME_SIZE: u32 = 4096;
const BITS: usize = u32::BITS as usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PmmError {
    #[error("no physical memory to manage")]
    NoMemory,
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("frame {frame} is not allocated")]
    NotAllocated { frame: PhysicalPage<Size4K> },
    #[error("frame {frame} is reserved")]
    Reserved { frame: PhysicalPage<Size4K> },
    #[error("frame {frame} is outside managed memory")]
    OutOfRange { frame: PhysicalPage<Size4K> },
    #[error(transparent)]
    Allocation(#[from] BootstrapAllocError),
}

pub struct Pmm<'a> {
    bitmap: &'a mut [u32],
    reserved: &'a [Range<PhysicalAddress>],
    kernel: Range<PhysicalAddress>,
    frames: usize,
    free: usize,
    next: usize,
}

impl<'a> Pmm<'a> {
    /// Builds the frame bitmap for `layout`.
    ///
    /// # Errors
    /// - [`PmmError::NoMemory`] if `layout` describes no whole frame.
    /// - [`PmmError::Allocation`] if the bitmap does not fit the bootstrap heap.
    pub fn init(
        layout: &MemoryLayout<'a>,
        allocator: &mut BootstrapAllocator<'a>,
    ) -> Result<Self, PmmError> {
        let frames = (layout.usable_end().as_u32() / FRAME_SIZE) as usize;
        if frames == 0 {
            return Err(PmmError::NoMemory);
        }

        let bitmap = allocator.allocate_slice(frames.div_ceil(BITS), 0u32)?;
        let tail = frames % BITS;
        if tail != 0
            && let Some(last) = bitmap.last_mut()
        {
            *last = !0 << tail;
        }

        let mut pmm = Self {
            bitmap,
            reserved: layout.physical_reserved,
            kernel: layout.kernel_physical(),
            frames,
            free: frames,
            next: 0,
        };

        pmm.reserve(pmm.kernel);
        for range in layout.physical_reserved {
            pmm.reserve(*range);
        }

        info!(
            "PMM: {} of {} frames free ({} KiB)",
            pmm.free,
            pmm.frames,
            pmm.free * (FRAME_SIZE as usize / 1024)
        );
        Ok(pmm)
    }

    /// Number of frames under management.
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.free
    }

    /// Whether `frame` is managed and currently free.
    #[must_use]
    pub fn is_free(&self, frame: PhysicalPage<Size4K>) -> bool {
        let index = frame.number() as usize;
        index < self.frames && !self.test(index)
    }

    /// Hands out a free frame.
    ///
    /// # Errors
    /// [`PmmError::OutOfMemory`] if every frame is in use.
    #[allow(clippy::cast_possible_truncation)]
    pub fn alloc(&mut self) -> Result<PhysicalPage<Size4K>, PmmError> {
        if self.free == 0 {
            return Err(PmmError::OutOfMemory);
        }

        let words = self.bitmap.len();
        let start = self.next / BITS;
        for step in 0..words {
            let word = (start + step) % words;
            let bits = self.bitmap[word];
            if bits == u32::MAX {
                continue;
            }

            let index = word * BITS + bits.trailing_ones() as usize;
            self.set(index);
            self.free -= 1;
            self.next = index + 1;
            return Ok(PhysicalPage::from_number(index as u32));
        }

        Err(PmmError::OutOfMemory)
    }

    /// Returns `frame` to the pool.
    ///
    /// # Errors
    /// - [`PmmError::OutOfRange`] if `frame` lies beyond managed memory.
    /// - [`PmmError::Reserved`] if `frame` belongs to a reserved range.
    /// - [`PmmError::NotAllocated`] if `frame` is already free.
    pub fn free(&mut self, frame: PhysicalPage<Size4K>) -> Result<(), PmmError> {
        let index = frame.number() as usize;
        if index >= self.frames {
            return Err(PmmError::OutOfRange { frame });
        }
        if self.is_reserved(frame) {
            return Err(PmmError::Reserved { frame });
        }
        if !self.test(index) {
            return Err(PmmError::NotAllocated { frame });
        }

        self.clear(index);
        self.free += 1;
        self.next = self.next.min(index);
        Ok(())
    }

    fn is_reserved(&self, frame: PhysicalPage<Size4K>) -> bool {
        let base = frame.base();
        let Some(end) = base.checked_add(FRAME_SIZE) else {
            return true;
        };
        let Some(frame) = Range::try_new(base, end) else {
            return true;
        };
        self.kernel.overlaps(&frame) || self.reserved.iter().any(|r| r.overlaps(&frame))
    }

    fn reserve(&mut self, range: Range<PhysicalAddress>) {
        if range.is_empty() {
            return;
        }

        let first = range.start().page::<Size4K>().number() as usize;
        let last = ((range.end().as_u32() - 1) / FRAME_SIZE) as usize;
        debug!("PMM: reserving {range}");
        for index in first..=last.min(self.frames.saturating_sub(1)) {
            if !self.test(index) {
                self.set(index);
                self.free -= 1;
            }
        }
    }

    fn test(&self, index: usize) -> bool {
        self.bitmap[index / BITS] & (1 << (index % BITS)) != 0
    }

    fn set(&mut self, index: usize) {
        self.bitmap[index / BITS] |= 1 << (index % BITS);
    }

    fn clear(&mut self, index: usize) {
        self.bitmap[index / BITS] &= !(1 << (index % BITS));
    }
}

impl core::fmt::Debug for Pmm<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pmm")
            .field("frames", &self.frames)
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::{TranslationOffset, VirtualAddress};

    fn pr(start: u32, end: u32) -> Range<PhysicalAddress> {
        Range::try_new(PhysicalAddress::new(start), PhysicalAddress::new(end)).unwrap()
    }

    fn layout(mem_kb: u32, reserved: &[Range<PhysicalAddress>]) -> MemoryLayout<'_> {
        MemoryLayout {
            vaddr_start: VirtualAddress::new(0xC010_0000),
            vaddr_end: VirtualAddress::new(0xC018_0000),
            physaddr_start: PhysicalAddress::new(0x10_0000),
            physaddr_end: PhysicalAddress::new(0x18_0000),
            mem_kb,
            modules: &[],
            virtual_reserved: &[],
            physical_reserved: reserved,
            offset: TranslationOffset::new(0xC000_0000),
        }
    }

    fn frame(n: u32) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(n)
    }

    #[test]
    fn reserved_and_kernel_frames_are_never_handed_out() {
        let reserved = [pr(0, 0x10_0000), pr(0x10_0000, 0x18_0000), pr(0x17_F000, 0x20_0800)];
        let layout = layout(16 * 1024, &reserved);
        let mut heap = vec![0u8; 4096];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        let mut pmm = Pmm::init(&layout, &mut alloc).unwrap();

        assert_eq!(pmm.total_frames(), 4096);
        assert_eq!(pmm.free_frames(), 4096 - 0x201);

        let mut seen = 0;
        while let Ok(f) = pmm.alloc() {
            let addr = f.base();
            assert!(!reserved.iter().any(|r| r.contains(addr)), "{addr} is reserved");
            assert!(addr.as_u32() >= 0x20_1000);
            seen += 1;
        }
        assert_eq!(seen, 4096 - 0x201);
        assert_eq!(pmm.free_frames(), 0);
        assert_eq!(pmm.alloc(), Err(PmmError::OutOfMemory));
    }

    #[test]
    fn free_checks() {
        let reserved = [pr(0, 0x18_0000)];
        let layout = layout(8 * 1024, &reserved);
        let mut heap = vec![0u8; 4096];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        let mut pmm = Pmm::init(&layout, &mut alloc).unwrap();

        let f = pmm.alloc().unwrap();
        assert_eq!(f, frame(0x180));
        assert!(!pmm.is_free(f));
        assert_eq!(pmm.free(f), Ok(()));
        assert!(pmm.is_free(f));
        assert_eq!(pmm.free(f), Err(PmmError::NotAllocated { frame: f }));

        assert_eq!(pmm.free(frame(0x10)), Err(PmmError::Reserved { frame: frame(0x10) }));
        assert_eq!(pmm.free(frame(0x800)), Err(PmmError::OutOfRange { frame: frame(0x800) }));
        assert!(!pmm.is_free(frame(0x800)));

        assert_eq!(pmm.alloc(), Ok(f));
    }

    #[test]
    fn kernel_frames_cannot_be_freed() {
        let reserved = [pr(0, 0x10_0000)];
        let layout = layout(8 * 1024, &reserved);
        let mut heap = vec![0u8; 4096];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        let mut pmm = Pmm::init(&layout, &mut alloc).unwrap();

        for n in [0x100, 0x140, 0x17F] {
            assert_eq!(pmm.free(frame(n)), Err(PmmError::Reserved { frame: frame(n) }));
            assert!(!pmm.is_free(frame(n)));
        }
        assert_eq!(pmm.alloc(), Ok(frame(0x180)));
    }

    #[test]
    fn partial_last_word() {
        let layout = layout(1024 + 20 * 4, &[]);
        let mut heap = vec![0u8; 4096];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        let mut pmm = Pmm::init(&layout, &mut alloc).unwrap();

        assert_eq!(pmm.total_frames(), 276);
        let before = pmm.free_frames();
        for _ in 0..before {
            assert!((pmm.alloc().unwrap().number() as usize) < 276);
        }
        assert_eq!(pmm.alloc(), Err(PmmError::OutOfMemory));
    }

    #[test]
    fn bitmap_must_fit_bootstrap_heap() {
        let layout = layout(64 * 1024, &[]);
        let mut heap = vec![0u8; 64];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        assert!(matches!(
            Pmm::init(&layout, &mut alloc),
            Err(PmmError::Allocation(_))
        ));
    }

    #[test]
    fn no_memory() {
        let layout = layout(0, &[]);
        let mut heap = vec![0u8; 64];
        let mut alloc = BootstrapAllocator::new(&mut heap);
        assert!(matches!(Pmm::init(&layout, &mut alloc), Err(PmmError::NoMemory)));
    }
}
