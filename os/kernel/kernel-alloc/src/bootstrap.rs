//! # Bootstrap Allocator
//!
//! A bump allocator over one fixed buffer, used before any general-purpose
//! heap exists. Memory is handed out linearly and never reclaimed.
//!
//! Regions are carved off the front of the remaining buffer with
//! [`split_at_mut`](slice::split_at_mut), so two returned regions can never
//! overlap and each one borrows the buffer for its full lifetime `'a`.
//!
//! ```text
//! buffer: ┌────────┬──┬─────────────┬──────────────────────────────┐
//!         │ region │▒▒│   region    │          remaining           │
//!         └────────┴──┴─────────────┴──────────────────────────────┘
//!                   ^ alignment padding
//! ```
//!
//! There is exactly one allocator per boot; it is deliberately neither `Clone`
//! nor `Copy` and is moved into the memory profile once discovery is done.

use core::mem::MaybeUninit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapAllocError {
    #[error("out of bootstrap memory: requested {requested} bytes, {remaining} remaining")]
    OutOfBootstrapMemory { requested: usize, remaining: usize },
    #[error("invalid layout: size {size}, alignment {align}")]
    InvalidLayout { size: usize, align: usize },
}

pub struct BootstrapAllocator<'a> {
    remaining: &'a mut [u8],
    capacity: usize,
    used: usize,
}

impl<'a> BootstrapAllocator<'a> {
    /// Serves allocations from `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a mut [u8]) -> Self {
        let capacity = buffer.len();
        Self {
            remaining: buffer,
            capacity,
            used: 0,
        }
    }

    /// Total size of the backing buffer.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out so far, including alignment padding.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available (before alignment padding of the next request).
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// # Errors
    /// - [`BootstrapAllocError::InvalidLayout`] if `align` is not a power of two.
    /// - [`BootstrapAllocError::OutOfBootstrapMemory`] if the aligned request does not fit;
    ///   the allocator is left unchanged.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<&'a mut [u8], BootstrapAllocError> {
        if !align.is_power_of_two() {
            return Err(BootstrapAllocError::InvalidLayout { size, align });
        }

        let buffer = core::mem::take(&mut self.remaining);
        let padding = buffer.as_ptr().addr().wrapping_neg() & (align - 1);
        let available = buffer.len();
        let fits = padding
            .checked_add(size)
            .is_some_and(|needed| needed <= available);
        if !fits {
            self.remaining = buffer;
            return Err(BootstrapAllocError::OutOfBootstrapMemory {
                requested: size,
                remaining: available,
            });
        }

        let (_, aligned) = buffer.split_at_mut(padding);
        let (region, rest) = aligned.split_at_mut(size);
        self.remaining = rest;
        self.used += padding + size;
        Ok(region)
    }

    /// Allocates room for `len` values of `T` without initializing them.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    pub fn allocate_uninit<T>(
        &mut self,
        len: usize,
    ) -> Result<&'a mut [MaybeUninit<T>], BootstrapAllocError> {
        let size = size_of::<T>()
            .checked_mul(len)
            .ok_or(BootstrapAllocError::InvalidLayout {
                size: usize::MAX,
                align: align_of::<T>(),
            })?;
        let bytes = self.allocate(size, align_of::<T>())?;

        // SAFETY: `bytes` is exclusively borrowed for 'a, aligned for `T`, and
        // `size_of::<T>() * len` bytes long; `MaybeUninit<T>` has no validity
        // requirements.
        Ok(unsafe { core::slice::from_raw_parts_mut(bytes.as_mut_ptr().cast(), len) })
    }

    /// Allocates `len` values of `T`, each initialized to `fill`.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    pub fn allocate_slice<T: Copy>(
        &mut self,
        len: usize,
        fill: T,
    ) -> Result<&'a mut [T], BootstrapAllocError> {
        let slots = self.allocate_uninit::<T>(len)?;
        for slot in slots.iter_mut() {
            slot.write(fill);
        }

        // SAFETY: every element was initialized above.
        Ok(unsafe { assume_init(slots) })
    }

    /// Collects `items` into a freshly allocated slice.
    ///
    /// Room for `items.len()` elements is reserved up front; if the iterator
    /// ends early, the returned slice is shortened accordingly.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    pub fn allocate_iter<T, I>(&mut self, items: I) -> Result<&'a mut [T], BootstrapAllocError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let items = items.into_iter();
        let slots = self.allocate_uninit::<T>(items.len())?;

        let mut written = 0;
        for (slot, item) in slots.iter_mut().zip(items) {
            slot.write(item);
            written += 1;
        }

        // SAFETY: the first `written` elements were initialized above.
        Ok(unsafe { assume_init(&mut slots[..written]) })
    }

    /// Moves `value` into the bootstrap heap.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    pub fn allocate_value<T>(&mut self, value: T) -> Result<&'a mut T, BootstrapAllocError> {
        let slot = self.allocate_uninit::<T>(1)?;
        Ok(slot[0].write(value))
    }

    /// Bootstrap memory is never reclaimed; the region is simply forgotten.
    #[allow(clippy::unused_self)]
    pub fn deallocate<T>(&mut self, region: &'a mut [T]) {
        let _ = region;
    }
}

impl core::fmt::Debug for BootstrapAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAllocator")
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

/// # Safety
/// Every element of `slots` must be initialized.
unsafe fn assume_init<T>(slots: &mut [MaybeUninit<T>]) -> &mut [T] {
    // SAFETY: guaranteed by the caller; `MaybeUninit<T>` has the layout of `T`.
    unsafe { &mut *(core::ptr::from_mut(slots) as *mut [T]) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(64))]
    struct Heap([u8; 4096]);

    fn ranges_overlap(a: &[u8], b: &[u8]) -> bool {
        let (a0, a1) = (a.as_ptr().addr(), a.as_ptr().addr() + a.len());
        let (b0, b1) = (b.as_ptr().addr(), b.as_ptr().addr() + b.len());
        a0 < b1 && b0 < a1
    }

    #[test]
    fn regions_are_aligned_and_disjoint() {
        let mut heap = Heap([0; 4096]);
        let mut alloc = BootstrapAllocator::new(&mut heap.0);

        let a = alloc.allocate(3, 1).unwrap();
        let b = alloc.allocate(16, 16).unwrap();
        let c = alloc.allocate(100, 64).unwrap();

        assert_eq!(a.len(), 3);
        assert_eq!(b.as_ptr().addr() % 16, 0);
        assert_eq!(c.as_ptr().addr() % 64, 0);
        assert!(!ranges_overlap(a, b));
        assert!(!ranges_overlap(b, c));
        assert!(!ranges_overlap(a, c));

        a.fill(0xAA);
        b.fill(0xBB);
        c.fill(0xCC);
        assert!(a.iter().all(|&x| x == 0xAA));
        assert!(b.iter().all(|&x| x == 0xBB));
    }

    #[test]
    fn accounting_includes_padding() {
        let mut heap = Heap([0; 4096]);
        let mut alloc = BootstrapAllocator::new(&mut heap.0);
        assert_eq!(alloc.capacity(), 4096);

        alloc.allocate(1, 1).unwrap();
        alloc.allocate(8, 8).unwrap();
        assert_eq!(alloc.used(), 16);
        assert_eq!(alloc.remaining(), 4096 - 16);
        assert_eq!(alloc.used() + alloc.remaining(), alloc.capacity());
    }

    #[test]
    fn exhaustion_is_reported_and_harmless() {
        let mut heap = Heap([0; 4096]);
        let mut alloc = BootstrapAllocator::new(&mut heap.0);
        alloc.allocate(4000, 1).unwrap();

        assert_eq!(
            alloc.allocate(200, 1).unwrap_err(),
            BootstrapAllocError::OutOfBootstrapMemory {
                requested: 200,
                remaining: 96
            }
        );
        assert_eq!(alloc.remaining(), 96);
        assert_eq!(alloc.allocate(96, 1).unwrap().len(), 96);
        assert_eq!(alloc.remaining(), 0);
        assert!(alloc.allocate(1, 1).is_err());
        assert_eq!(alloc.allocate(0, 1).unwrap().len(), 0);
    }

    #[test]
    fn alignment_padding_counts_against_capacity() {
        let mut heap = Heap([0; 4096]);
        let mut alloc = BootstrapAllocator::new(&mut heap.0);
        alloc.allocate(1, 1).unwrap();
        assert!(matches!(
            alloc.allocate(4095, 64),
            Err(BootstrapAllocError::OutOfBootstrapMemory { .. })
        ));
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let mut heap = Heap([0; 4096]);
        let mut alloc = BootstrapAllocator::new(&mut heap.0);
        assert_eq!(
            alloc.allocate(8, 3),
            Err(BootstrapAllocError::InvalidLayout { size: 8, align: 3 })
        );
        assert_eq!(alloc.used(), 0);
    }

    #[test]
    fn typed_helpers() {
        let mut heap = Heap([0; 4096]);
        let mut alloc = BootstrapAllocator::new(&mut heap.0);

        let words = alloc.allocate_slice(10, 7u32).unwrap();
        assert_eq!(words, &[7; 10]);
        assert_eq!(words.as_ptr().addr() % align_of::<u32>(), 0);

        let squares = alloc.allocate_iter((0..5u32).map(|x| u64::from(x * x))).unwrap();
        assert_eq!(squares, &[0, 1, 4, 9, 16]);

        let value = alloc.allocate_value((1u16, 2u64)).unwrap();
        value.0 = 9;
        assert_eq!(*value, (9, 2));

        words[0] = 1;
        alloc.deallocate(words);
        assert_eq!(squares[4], 16);
    }
}
