use crate::{MemoryAddress, PageSize};
use core::fmt;
use core::marker::PhantomData;

/// The low `S::SHIFT` bits of an address: its position inside a page of size `S`.
///
/// Translating through a 4 MiB directory entry keeps this part unchanged and
/// replaces only the page base.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageOffset<S: PageSize> {
    bytes: u32,
    _size: PhantomData<S>,
}

impl<S: PageSize> PageOffset<S> {
    const MASK: u32 = S::SIZE - 1;

    /// Bits above the page size are discarded.
    #[inline]
    #[must_use]
    pub const fn new(bytes: u32) -> Self {
        Self {
            bytes: bytes & Self::MASK,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn of(addr: MemoryAddress) -> Self {
        Self::new(addr.as_u32())
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.bytes
    }
}

impl<S: PageSize> fmt::Debug for PageOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:#x}/{}", self.bytes, S::as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Size4K, Size4M};

    #[test]
    fn masks_to_page() {
        assert_eq!(PageOffset::<Size4K>::new(0x1234_5678).as_u32(), 0x678);
        assert_eq!(PageOffset::<Size4M>::new(0xC012_3456).as_u32(), 0x12_3456);
        assert_eq!(format!("{:?}", PageOffset::<Size4K>::new(0x10)), "+0x10/4K");
    }
}
