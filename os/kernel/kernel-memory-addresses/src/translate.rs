//! # Higher-half address translation
//!
//! The kernel is linked to run at `offset + physical`, so translating between
//! the two spaces is a single addition or subtraction. Both directions wrap
//! modulo the address width; callers are expected to only translate addresses
//! that lie inside the mapped kernel window.

use crate::{PhysicalAddress, VirtualAddress};

/// Anything that can be moved between the virtual and physical spaces by
/// offset arithmetic: raw integers and raw pointers.
///
/// Translating never changes the kind of value, a pointer stays a pointer.
pub trait Address: Copy {
    /// The numeric value of this address.
    fn into_raw(self) -> usize;

    /// Rebuilds a value of this kind from its numeric address.
    fn from_raw(raw: usize) -> Self;
}

impl Address for usize {
    #[inline(always)]
    fn into_raw(self) -> usize {
        self
    }

    #[inline(always)]
    fn from_raw(raw: usize) -> Self {
        raw
    }
}

impl Address for u32 {
    #[inline(always)]
    fn into_raw(self) -> usize {
        self as usize
    }

    #[inline(always)]
    #[allow(clippy::cast_possible_truncation)]
    fn from_raw(raw: usize) -> Self {
        raw as u32
    }
}

impl<T> Address for *const T {
    #[inline(always)]
    fn into_raw(self) -> usize {
        self.expose_provenance()
    }

    #[inline(always)]
    fn from_raw(raw: usize) -> Self {
        core::ptr::with_exposed_provenance(raw)
    }
}

impl<T> Address for *mut T {
    #[inline(always)]
    fn into_raw(self) -> usize {
        self.expose_provenance()
    }

    #[inline(always)]
    fn from_raw(raw: usize) -> Self {
        core::ptr::with_exposed_provenance_mut(raw)
    }
}

/// The distance between a virtual address and the physical address it maps to.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TranslationOffset(usize);

impl TranslationOffset {
    #[inline]
    #[must_use]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// See [`virt_to_phys`].
    #[inline]
    #[must_use]
    pub fn virt_to_phys<A: Address>(self, addr: A) -> A {
        virt_to_phys(addr, self)
    }

    /// See [`phys_to_virt`].
    #[inline]
    #[must_use]
    pub fn phys_to_virt<A: Address>(self, addr: A) -> A {
        phys_to_virt(addr, self)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_physical(self, va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(va.as_u32().wrapping_sub(self.0 as u32))
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_virtual(self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(pa.as_u32().wrapping_add(self.0 as u32))
    }
}

impl core::fmt::Display for TranslationOffset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// Converts a higher-half virtual address to the physical address backing it.
#[inline]
#[must_use]
pub fn virt_to_phys<A: Address>(addr: A, offset: TranslationOffset) -> A {
    A::from_raw(addr.into_raw().wrapping_sub(offset.0))
}

/// Converts a physical address to its higher-half virtual alias.
#[inline]
#[must_use]
pub fn phys_to_virt<A: Address>(addr: A, offset: TranslationOffset) -> A {
    A::from_raw(addr.into_raw().wrapping_add(offset.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERNEL: TranslationOffset = TranslationOffset::new(0xC000_0000);

    #[test]
    fn physical_zero_is_kernel_base() {
        assert_eq!(phys_to_virt(0usize, KERNEL), 0xC000_0000);
        assert_eq!(phys_to_virt(123usize, KERNEL), 0xC000_0000 + 123);
        assert_eq!(virt_to_phys(0xC000_0000usize, KERNEL), 0);
        assert_eq!(virt_to_phys(0xC000_0000usize + 123, KERNEL), 123);
    }

    #[test]
    fn round_trip_holds_for_integers() {
        for addr in [0usize, 1, 0x1000, 0x0010_0000, 0x3FFF_FFFF] {
            assert_eq!(virt_to_phys(phys_to_virt(addr, KERNEL), KERNEL), addr);
        }
        for addr in [0u32, 0xC000_0000, 0xFFFF_FFFF] {
            assert_eq!(phys_to_virt(virt_to_phys(addr, KERNEL), KERNEL), addr);
        }
    }

    #[test]
    fn zero_offset_is_identity() {
        let zero = TranslationOffset::default();
        assert_eq!(phys_to_virt(0x1234usize, zero), 0x1234);
        assert_eq!(virt_to_phys(0x1234usize, zero), 0x1234);
    }

    #[test]
    fn pointers_stay_pointers() {
        let value = 7u8;
        let ptr: *const u8 = &raw const value;
        let moved = phys_to_virt(ptr, TranslationOffset::new(0x10));
        assert_eq!(moved.addr(), ptr.addr().wrapping_add(0x10));
        let back = virt_to_phys(moved, TranslationOffset::new(0x10));
        assert_eq!(back, ptr);
        // SAFETY: `back` has the same address and exposed provenance as `ptr`.
        assert_eq!(unsafe { *back }, 7);
    }

    #[test]
    fn typed_addresses() {
        let va = KERNEL.to_virtual(PhysicalAddress::new(0x0010_0000));
        assert_eq!(va, VirtualAddress::new(0xC010_0000));
        assert_eq!(KERNEL.to_physical(va), PhysicalAddress::new(0x0010_0000));
        assert_eq!(KERNEL.phys_to_virt(0x42usize), 0xC000_0042);
        assert_eq!(KERNEL.virt_to_phys(0xC000_0042usize), 0x42);
    }
}
