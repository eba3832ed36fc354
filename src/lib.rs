//! # pcnet32-driver
//!
//! A `no_std` driver core for the AMD PCnet32 (LANCE family) Ethernet
//! controllers: Am79C970A, Am79C971, Am79C973 and the emulated PCnet-PCI II
//! found in most hypervisors.
//!
//! The crate programs the chip registers, builds and drains the receive and
//! transmit descriptor rings, and turns chip interrupts into packet delivery
//! and completion events for a networking stack supplied by the caller.
//! Both register widths (word and double word I/O) and both descriptor
//! layouts (software style 0 and 2) are supported; the choice is made once
//! at bring-up by probing the chip.
//!
//! ## Basic Usage
//!
//! ```rust,ignore
//! use pcnet32_driver::{MmioPorts, Pcnet, PcnetConfig, PacketList};
//!
//! let ports = MmioPorts::new(bar1_phys);
//! let nic = Pcnet::init(ports, my_stack, PcnetConfig::default())?;
//!
//! // From the interrupt line:
//! nic.interrupt_service();
//! // From the deferred worker it schedules:
//! nic.interrupt_service_worker();
//!
//! let mut batch = PacketList::new();
//! batch.push_back(packet);
//! nic.send(&mut batch)?;
//! ```
//!
//! The platform provides DMA memory, address translation and delays through
//! the [`KernelFunc`] interface.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod constants;
pub mod dma;
pub mod io;
pub mod net;
pub mod pcnet;
pub mod regs;
pub mod ring;
pub mod rx;
pub mod tx;
pub mod types;

#[cfg(test)]
mod sim;

extern crate alloc;

use memory_addr::{PhysAddr, VirtAddr};

#[macro_use]
extern crate log;

pub use config::PcnetConfig;
pub use io::{MmioPorts, PortIo, RegisterWidth, Registers};
pub use net::{InterruptStatus, LinkInformation, NetStack, PacketList, RxPacket, TxPacket};
pub use pcnet::{DeviceStats, Pcnet};
pub use types::SoftwareStyle;

#[cfg(target_arch = "x86_64")]
pub use io::IoPorts;

/// Error type for PCnet driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcnetError {
    /// DMA memory or pool memory could not be allocated.
    ///
    /// Returned only during bring-up; everything allocated so far has been
    /// released again.
    InsufficientResources,
    /// The chip did not report initialization done within the timeout.
    NotReady,
    /// The link is not active, nothing was queued.
    NoNetworkConnection,
    /// The transmit queue is over its limit and the whole batch was refused.
    ///
    /// The batch is left with the caller, who may retry later.
    ResourceInUse,
    /// The configuration cannot be honored by the probed chip.
    InvalidParameter,
    /// The requested information class or operation is not supported.
    NotSupported,
}

impl core::fmt::Display for PcnetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            PcnetError::InsufficientResources => "insufficient resources",
            PcnetError::NotReady => "device not ready",
            PcnetError::NoNetworkConnection => "no network connection",
            PcnetError::ResourceInUse => "transmit queue full",
            PcnetError::InvalidParameter => "invalid parameter",
            PcnetError::NotSupported => "not supported",
        };
        f.write_str(msg)
    }
}

/// Result type for PCnet driver functions.
pub type PcnetResult<T = ()> = Result<T, PcnetError>;

/// Kernel function interface that must be implemented by the platform
///
/// This trait provides the kernel-level operations the driver needs:
/// address translation for the register window, DMA memory management,
/// timing, and cache maintenance around descriptor hand-offs.
#[crate_interface::def_interface]
pub trait KernelFunc {
    /// Convert physical address to virtual address
    fn phys_to_virt(addr: PhysAddr) -> VirtAddr;

    /// Busy-wait for the specified duration
    fn busy_wait(duration: core::time::Duration);

    /// Allocate `pages` physically contiguous, zeroed, page-aligned pages
    /// whose last byte is at or below `max_phys`.
    ///
    /// Returns the virtual and physical address of the first page, or `None`
    /// when memory is exhausted.
    fn dma_alloc_coherent(pages: usize, max_phys: PhysAddr) -> Option<(VirtAddr, PhysAddr)>;

    /// Release memory obtained from `dma_alloc_coherent`.
    fn dma_free_coherent(vaddr: VirtAddr, pages: usize);

    /// Clean (write-back) data cache range
    ///
    /// Ensures CPU-written data is flushed to memory so hardware DMA can see it.
    /// Must be called before hardware reads from a buffer (e.g., before TX).
    fn clean_dcache_range(addr: usize, size: usize);

    /// Invalidate (discard) data cache range
    ///
    /// Forces CPU to read from memory instead of cache on next access.
    /// Must be called before CPU reads hardware-written data (e.g., after RX).
    fn invalidate_dcache_range(addr: usize, size: usize);
}

pub struct UseKernelFunc;

impl KernelFunc for UseKernelFunc {
    #[doc = " Convert physical address to virtual address"]
    fn phys_to_virt(addr: PhysAddr) -> VirtAddr {
        crate_interface::call_interface!(KernelFunc::phys_to_virt(addr))
    }

    #[doc = " Busy-wait for the specified duration"]
    fn busy_wait(duration: core::time::Duration) {
        crate_interface::call_interface!(KernelFunc::busy_wait(duration))
    }

    fn dma_alloc_coherent(pages: usize, max_phys: PhysAddr) -> Option<(VirtAddr, PhysAddr)> {
        crate_interface::call_interface!(KernelFunc::dma_alloc_coherent(pages, max_phys))
    }

    fn dma_free_coherent(vaddr: VirtAddr, pages: usize) {
        crate_interface::call_interface!(KernelFunc::dma_free_coherent(vaddr, pages))
    }

    #[doc = " Clean (write-back) data cache range"]
    fn clean_dcache_range(addr: usize, size: usize) {
        crate_interface::call_interface!(KernelFunc::clean_dcache_range(addr, size))
    }

    #[doc = " Invalidate (discard) data cache range"]
    fn invalidate_dcache_range(addr: usize, size: usize) {
        crate_interface::call_interface!(KernelFunc::invalidate_dcache_range(addr, size))
    }
}
