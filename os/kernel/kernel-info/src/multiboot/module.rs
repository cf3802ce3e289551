use super::{MultibootError, PhysicalMemory, read_u32};
use kernel_memory_addresses::PhysicalAddress;

/// Size of one entry of the module array: start, end, string, reserved.
pub const MODULE_ENTRY_SIZE: usize = 16;

/// A boot module loaded next to the kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEntry<'a> {
    /// First byte of the module.
    pub start: PhysicalAddress,
    /// One past the last byte of the module.
    pub end: PhysicalAddress,
    /// The string the bootloader associated with the module; empty if none.
    pub name: &'a str,
}

/// Iterator over the module array.
///
/// A malformed entry yields [`MultibootError::MalformedModule`] and iteration
/// continues with the next one.
pub struct ModuleIter<'a, M: PhysicalMemory + ?Sized> {
    memory: &'a M,
    entries: &'a [u8],
    index: usize,
}

impl<'a, M: PhysicalMemory + ?Sized> ModuleIter<'a, M> {
    pub(crate) const fn new(memory: &'a M, entries: &'a [u8]) -> Self {
        Self {
            memory,
            entries,
            index: 0,
        }
    }

    fn parse(&self, raw: &[u8]) -> Result<ModuleEntry<'a>, MultibootError> {
        let malformed = MultibootError::MalformedModule { index: self.index };
        let start = read_u32(raw, 0);
        let end = read_u32(raw, 4);
        let string = read_u32(raw, 8);
        if end < start {
            return Err(malformed);
        }

        let name = if string == 0 {
            ""
        } else {
            let memory: &'a M = self.memory;
            memory
                .c_str(PhysicalAddress::new(string))
                .and_then(|s| s.to_str().ok())
                .ok_or(malformed)?
        };

        Ok(ModuleEntry {
            start: PhysicalAddress::new(start),
            end: PhysicalAddress::new(end),
            name,
        })
    }
}

impl<'a, M: PhysicalMemory + ?Sized> Iterator for ModuleIter<'a, M> {
    type Item = Result<ModuleEntry<'a>, MultibootError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.index * MODULE_ENTRY_SIZE;
        let raw = self.entries.get(offset..offset + MODULE_ENTRY_SIZE)?;
        let item = self.parse(raw);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.entries.len() / MODULE_ENTRY_SIZE - self.index;
        (left, Some(left))
    }
}

impl<M: PhysicalMemory + ?Sized> ExactSizeIterator for ModuleIter<'_, M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiboot::testing::Ram;

    fn entries(list: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut v = Vec::new();
        for &(start, end, string) in list {
            v.extend_from_slice(&start.to_le_bytes());
            v.extend_from_slice(&end.to_le_bytes());
            v.extend_from_slice(&string.to_le_bytes());
            v.extend_from_slice(&0u32.to_le_bytes());
        }
        v
    }

    #[test]
    fn reads_names_and_bounds() {
        let mut ram = Ram::new(0x100);
        ram.put_bytes(0x10, b"initrd\0");
        let raw = entries(&[(0x1000, 0x2000, 0x10), (0x2000, 0x2000, 0)]);
        let iter = ModuleIter::new(&ram, &raw);
        assert_eq!(iter.len(), 2);

        let modules: Vec<_> = iter.map(Result::unwrap).collect();
        assert_eq!(modules[0].name, "initrd");
        assert_eq!(modules[0].end - modules[0].start, 0x1000);
        assert_eq!(modules[1].name, "");
    }

    #[test]
    fn reversed_bounds_are_malformed() {
        let ram = Ram::new(0x10);
        let raw = entries(&[(0x2000, 0x1000, 0)]);
        let items: Vec<_> = ModuleIter::new(&ram, &raw).collect();
        assert_eq!(items, vec![Err(MultibootError::MalformedModule { index: 0 })]);
    }

    #[test]
    fn invalid_name_is_malformed() {
        let mut ram = Ram::new(0x100);
        ram.put_bytes(0x10, &[0xC3, 0x28, 0]);
        let raw = entries(&[(0, 0, 0), (0x1000, 0x2000, 0x10)]);
        let items: Vec<_> = ModuleIter::new(&ram, &raw).collect();
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err(MultibootError::MalformedModule { index: 1 }));
    }
}
