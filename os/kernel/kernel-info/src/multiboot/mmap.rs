//! Iterator over the BIOS memory map handed over by the bootloader.
//!
//! The buffer consists of one or more size/structure pairs; `size` is really
//! just used for skipping to the next pair:
//!
//! ```text
//!         +-------------------+
//! 0       | size              |   bytes that follow, at least 20
//!         +-------------------+
//! 4       | base_addr         |   u64
//! 12      | length            |   u64
//! 20      | type              |   u32
//!         +-------------------+
//! ```

use super::{MultibootError, read_u32, read_u64};
use core::fmt;

/// Smallest valid value of an entry's `size` field.
pub const MEMORY_MAP_ENTRY_MIN_SIZE: u32 = 20;

/// Describes the availability of a [`MemoryRegion`], as reported by the `type`
/// field of a memory map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegionKind {
    /// Type 1: RAM available for general use.
    Available,
    /// Type 3: usable memory holding ACPI tables.
    Acpi,
    /// Type 4: reserved memory to preserve across hibernation.
    Nvs,
    /// Type 5: defective RAM.
    Defective,
    /// Type 2 and anything undefined.
    Reserved(u32),
}

impl From<u32> for MemoryRegionKind {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Available,
            3 => Self::Acpi,
            4 => Self::Nvs,
            5 => Self::Defective,
            other => Self::Reserved(other),
        }
    }
}

/// A contiguous region of physical memory reported by the memory map.
///
/// Addresses are 64 bits wide even on 32-bit machines.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    /// Exclusive end address, saturating at `u64::MAX`.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.kind, MemoryRegionKind::Available)
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} @ {:#x} ({} KiB)",
            self.kind,
            self.base,
            self.length >> 10
        )
    }
}

/// Walks the memory map buffer.
///
/// A malformed entry yields one [`MultibootError::MalformedMemoryMap`] and ends
/// the iteration.
#[derive(Clone)]
pub struct MemoryMapIter<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> MemoryMapIter<'a> {
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }
}

impl Iterator for MemoryMapIter<'_> {
    type Item = Result<MemoryRegion, MultibootError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.buffer.get(self.offset..)?;
        if rest.is_empty() {
            return None;
        }

        let offset = self.offset;
        let malformed = |iter: &mut Self| {
            iter.offset = iter.buffer.len();
            Some(Err(MultibootError::MalformedMemoryMap { offset }))
        };

        if rest.len() < 4 {
            return malformed(self);
        }
        let size = read_u32(rest, 0);
        let step = (size as usize).saturating_add(4);
        if size < MEMORY_MAP_ENTRY_MIN_SIZE || step > rest.len() {
            return malformed(self);
        }

        self.offset += step;
        Some(Ok(MemoryRegion {
            base: read_u64(rest, 4),
            length: read_u64(rest, 12),
            kind: read_u32(rest, 20).into(),
        }))
    }
}

impl fmt::Debug for MemoryMapIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u32, base: u64, length: u64, kind: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&size.to_le_bytes());
        v.extend_from_slice(&base.to_le_bytes());
        v.extend_from_slice(&length.to_le_bytes());
        v.extend_from_slice(&kind.to_le_bytes());
        v.resize(size as usize + 4, 0);
        v
    }

    #[test]
    fn walks_entries_honoring_size() {
        let mut buf = entry(20, 0, 0x9_FC00, 1);
        buf.extend(entry(28, 0xF_0000, 0x1_0000, 2));
        buf.extend(entry(20, 0x10_0000, 0x7F0_0000, 1));
        buf.extend(entry(20, 0xFFFC_0000, 0x4_0000, 3));

        let regions: Vec<_> = MemoryMapIter::new(&buf).map(Result::unwrap).collect();
        assert_eq!(regions.len(), 4);
        assert!(regions[0].is_available());
        assert_eq!(regions[1].kind, MemoryRegionKind::Reserved(2));
        assert_eq!(regions[2].base, 0x10_0000);
        assert_eq!(regions[2].end(), 0x800_0000);
        assert_eq!(regions[3].kind, MemoryRegionKind::Acpi);
    }

    #[test]
    fn undersized_entry_is_malformed() {
        let mut buf = entry(20, 0, 0x1000, 1);
        buf.extend(entry(16, 0x1000, 0x1000, 1));
        let items: Vec<_> = MemoryMapIter::new(&buf).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(
            items[1],
            Err(MultibootError::MalformedMemoryMap { offset: 24 })
        );
    }

    #[test]
    fn truncated_entry_is_malformed() {
        let mut buf = entry(20, 0, 0x1000, 1);
        buf.truncate(18);
        let items: Vec<_> = MemoryMapIter::new(&buf).collect();
        assert_eq!(
            items,
            vec![Err(MultibootError::MalformedMemoryMap { offset: 0 })]
        );
    }

    #[test]
    fn empty_map() {
        assert_eq!(MemoryMapIter::new(&[]).count(), 0);
    }

    #[test]
    fn region_kinds() {
        assert_eq!(MemoryRegionKind::from(4), MemoryRegionKind::Nvs);
        assert_eq!(MemoryRegionKind::from(5), MemoryRegionKind::Defective);
        assert_eq!(MemoryRegionKind::from(7), MemoryRegionKind::Reserved(7));
    }
}
