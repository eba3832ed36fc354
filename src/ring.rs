//! Descriptor rings
//!
//! A [`DescRing`] is a typed view over a slice of the driver's DMA region.
//! It does not own the memory; the device keeps the backing [`DmaRegion`]
//! alive for as long as its rings exist.
//!
//! # Ownership protocol
//!
//! Each slot is owned by exactly one side at a time, as told by the OWN bit.
//! Software may only write a slot while OWN is clear. Arming a slot is:
//! fill address and length, [`DescRing::publish`] (barrier and cache
//! clean), then set OWN and publish again. The chip completes a slot by
//! clearing OWN; software calls [`DescRing::refresh`] before looking at it.
//!
//! [`DmaRegion`]: crate::dma::DmaRegion

use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{fence, Ordering};

use memory_addr::PhysAddr;

use crate::types::Descriptor;
use crate::{KernelFunc, UseKernelFunc};

pub struct DescRing<D: Descriptor> {
    base: NonNull<D>,
    phys: PhysAddr,
    len: usize,
    _marker: PhantomData<D>,
}

// SAFETY: the ring is only reached through the lock of the engine owning it.
unsafe impl<D: Descriptor> Send for DescRing<D> {}

impl<D: Descriptor> DescRing<D> {
    /// # Safety
    /// `base` must point at `len` zeroed descriptors in DMA memory at `phys`,
    /// suitably aligned and valid for as long as the ring is used.
    pub unsafe fn new(base: *mut D, phys: PhysAddr, len: usize) -> Self {
        assert!(len.is_power_of_two());
        debug_assert!(!base.is_null());
        Self {
            base: NonNull::new_unchecked(base),
            phys,
            len,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn phys_addr(&self) -> PhysAddr {
        self.phys
    }

    /// Slot after `index`, wrapping at the end of the ring
    #[inline]
    pub fn next(&self, index: usize) -> usize {
        (index + 1) & (self.len - 1)
    }

    #[inline]
    pub fn get(&self, index: usize) -> &D {
        assert!(index < self.len);
        unsafe { &*self.base.as_ptr().add(index) }
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut D {
        assert!(index < self.len);
        unsafe { &mut *self.base.as_ptr().add(index) }
    }

    /// Make software writes to slot `index` visible to the chip, in order
    #[inline]
    pub fn publish(&self, index: usize) {
        fence(Ordering::SeqCst);
        let addr = self.base.as_ptr() as usize + index * D::SIZE;
        UseKernelFunc::clean_dcache_range(addr, D::SIZE);
    }

    /// Drop any stale cached copy of slot `index` before reading it
    #[inline]
    pub fn refresh(&self, index: usize) {
        let addr = self.base.as_ptr() as usize + index * D::SIZE;
        UseKernelFunc::invalidate_dcache_range(addr, D::SIZE);
        fence(Ordering::SeqCst);
    }
}
