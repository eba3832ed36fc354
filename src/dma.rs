//! DMA memory owned by the driver
//!
//! [`DmaRegion`] wraps one physically contiguous allocation from the
//! platform and returns it when dropped, so a bring-up that fails halfway
//! unwinds by simply returning the error. [`RxBufferPool`] is the receive
//! data area: it may span several regions, and a frame never straddles two.

use alloc::vec::Vec;

use memory_addr::{align_up, PhysAddr, VirtAddr};

use crate::constants::*;
use crate::{KernelFunc, PcnetError, PcnetResult, UseKernelFunc};

/// A physically contiguous, page aligned, zeroed allocation
pub struct DmaRegion {
    vaddr: VirtAddr,
    paddr: PhysAddr,
    pages: usize,
}

impl DmaRegion {
    /// Allocate at least `size` bytes that the chip can reach, `max_phys`
    /// being the highest reachable address
    pub fn alloc(size: usize, max_phys: usize) -> PcnetResult<Self> {
        let pages = align_up(size.max(1), DMA_PAGE_SIZE) / DMA_PAGE_SIZE;
        let (vaddr, paddr) = UseKernelFunc::dma_alloc_coherent(pages, PhysAddr::from(max_phys))
            .ok_or(PcnetError::InsufficientResources)?;

        let region = Self {
            vaddr,
            paddr,
            pages,
        };

        // The region is released by drop if it is out of reach.
        if paddr.as_usize() + (pages * DMA_PAGE_SIZE - 1) > max_phys {
            error!(
                "PCnet: DMA region {:#x}+{:#x} above limit {:#x}",
                paddr.as_usize(),
                pages * DMA_PAGE_SIZE,
                max_phys
            );
            return Err(PcnetError::InsufficientResources);
        }

        region.zero();
        Ok(region)
    }

    pub fn size(&self) -> usize {
        self.pages * DMA_PAGE_SIZE
    }

    pub fn vaddr(&self) -> VirtAddr {
        self.vaddr
    }

    pub fn paddr(&self) -> PhysAddr {
        self.paddr
    }

    /// Virtual pointer `offset` bytes into the region
    pub fn ptr_at<T>(&self, offset: usize) -> *mut T {
        debug_assert!(offset + core::mem::size_of::<T>() <= self.size());
        (self.vaddr.as_usize() + offset) as *mut T
    }

    /// Physical address `offset` bytes into the region
    pub fn phys_at(&self, offset: usize) -> PhysAddr {
        debug_assert!(offset <= self.size());
        PhysAddr::from(self.paddr.as_usize() + offset)
    }

    fn zero(&self) {
        unsafe { core::ptr::write_bytes(self.vaddr.as_usize() as *mut u8, 0, self.size()) };
        UseKernelFunc::clean_dcache_range(self.vaddr.as_usize(), self.size());
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        UseKernelFunc::dma_free_coherent(self.vaddr, self.pages);
    }
}

// SAFETY: the region is plain memory owned exclusively by this value, and
// shared access only hands out addresses.
unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

/// Fixed set of receive frame buffers, reused for the life of the device
pub struct RxBufferPool {
    fragments: Vec<DmaRegion>,
    frame_size: usize,
    frames_per_fragment: usize,
    count: usize,
}

impl RxBufferPool {
    /// Allocate `count` buffers of `frame_size` bytes each
    pub fn alloc(count: usize, frame_size: usize, max_phys: usize) -> PcnetResult<Self> {
        let fragment_size = RX_FRAGMENT_PAGES * DMA_PAGE_SIZE;
        if frame_size == 0 || frame_size > fragment_size {
            return Err(PcnetError::InvalidParameter);
        }

        let frames_per_fragment = fragment_size / frame_size;
        let fragment_count = count.div_ceil(frames_per_fragment);

        let mut fragments = Vec::new();
        fragments
            .try_reserve_exact(fragment_count)
            .map_err(|_| PcnetError::InsufficientResources)?;

        let mut remaining = count;
        while remaining > 0 {
            let frames = remaining.min(frames_per_fragment);
            fragments.push(DmaRegion::alloc(frames * frame_size, max_phys)?);
            remaining -= frames;
        }

        debug!(
            "PCnet: {} receive buffers of {} bytes in {} fragments",
            count,
            frame_size,
            fragments.len()
        );

        Ok(Self {
            fragments,
            frame_size,
            frames_per_fragment,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    fn locate(&self, index: usize) -> (&DmaRegion, usize) {
        assert!(index < self.count);
        let fragment = &self.fragments[index / self.frames_per_fragment];
        let offset = (index % self.frames_per_fragment) * self.frame_size;
        (fragment, offset)
    }

    /// Physical address of buffer `index`
    pub fn phys_addr(&self, index: usize) -> PhysAddr {
        let (fragment, offset) = self.locate(index);
        fragment.phys_at(offset)
    }

    /// The first `len` bytes of buffer `index`
    ///
    /// Only meaningful while the matching descriptor is owned by software.
    pub fn frame(&self, index: usize, len: usize) -> &[u8] {
        let (fragment, offset) = self.locate(index);
        let len = len.min(self.frame_size);
        let ptr = fragment.ptr_at::<u8>(offset);
        UseKernelFunc::invalidate_dcache_range(ptr as usize, len);
        unsafe { core::slice::from_raw_parts(ptr, len) }
    }
}
