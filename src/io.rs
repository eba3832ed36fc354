//! Register access
//!
//! The PCnet exposes a small I/O window: the station address PROM, a reset
//! port, and an address/data port pair through which every CSR and BCR is
//! reached indirectly. The window is decoded either with 16-bit accesses
//! (WIO) or with 32-bit accesses (DWIO); which one is fixed at bring-up.

use core::ptr::{read_volatile, write_volatile};

use memory_addr::PhysAddr;

use crate::regs::{DwioPort, PcnetBcr, PcnetCsr, WioPort};
use crate::{KernelFunc, UseKernelFunc};

/// Raw access to the chip's I/O window
pub trait PortIo: Send + Sync {
    fn read8(&self, offset: usize) -> u8;

    fn read16(&self, offset: usize) -> u16;

    fn write16(&self, offset: usize, value: u16);

    fn read32(&self, offset: usize) -> u32;

    fn write32(&self, offset: usize, value: u32);
}

/// The I/O window mapped through a memory BAR
pub struct MmioPorts {
    base: usize,
}

impl MmioPorts {
    /// Map the register window at `mmio_base`
    /// # Arguments
    /// * `mmio_base` - Physical base address of the device MMIO region
    pub fn new(mmio_base: PhysAddr) -> Self {
        let base = UseKernelFunc::phys_to_virt(mmio_base).as_usize();
        Self { base }
    }
}

impl PortIo for MmioPorts {
    #[inline]
    fn read8(&self, offset: usize) -> u8 {
        unsafe { read_volatile((self.base + offset) as *const u8) }
    }

    #[inline]
    fn read16(&self, offset: usize) -> u16 {
        unsafe { read_volatile((self.base + offset) as *const u16) }
    }

    #[inline]
    fn write16(&self, offset: usize, value: u16) {
        unsafe { write_volatile((self.base + offset) as *mut u16, value) }
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// The I/O window reached through legacy x86 I/O ports
#[cfg(target_arch = "x86_64")]
pub struct IoPorts {
    base: u16,
}

#[cfg(target_arch = "x86_64")]
impl IoPorts {
    /// # Safety
    /// `base` must be the I/O BAR of a PCnet device owned by this driver.
    pub unsafe fn new(base: u16) -> Self {
        Self { base }
    }

    #[inline]
    fn port(&self, offset: usize) -> u16 {
        self.base + offset as u16
    }
}

#[cfg(target_arch = "x86_64")]
impl PortIo for IoPorts {
    #[inline]
    fn read8(&self, offset: usize) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") self.port(offset),
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    #[inline]
    fn read16(&self, offset: usize) -> u16 {
        let value: u16;
        unsafe {
            core::arch::asm!(
                "in ax, dx",
                in("dx") self.port(offset),
                out("ax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    #[inline]
    fn write16(&self, offset: usize, value: u16) {
        unsafe {
            core::arch::asm!(
                "out dx, ax",
                in("dx") self.port(offset),
                in("ax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "in eax, dx",
                in("dx") self.port(offset),
                out("eax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        unsafe {
            core::arch::asm!(
                "out dx, eax",
                in("dx") self.port(offset),
                in("eax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

/// Width of the register window accesses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWidth {
    /// 16-bit word I/O
    Word,
    /// 32-bit double word I/O
    DoubleWord,
}

/// CSR and BCR access on top of a [`PortIo`] window
pub struct Registers<IO> {
    io: IO,
    width: RegisterWidth,
}

impl<IO: PortIo> Registers<IO> {
    /// Wrap `io`; accesses start out 16 bits wide, as after a chip reset
    pub fn new(io: IO) -> Self {
        Self {
            io,
            width: RegisterWidth::Word,
        }
    }

    pub fn width(&self) -> RegisterWidth {
        self.width
    }

    pub(crate) fn set_width(&mut self, width: RegisterWidth) {
        self.width = width;
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    /// Read a control and status register
    pub fn read_csr(&self, reg: PcnetCsr) -> u16 {
        match self.width {
            RegisterWidth::Word => {
                self.io.write16(WioPort::RegisterAddress as usize, reg as u16);
                self.io.read16(WioPort::RegisterData as usize)
            }
            RegisterWidth::DoubleWord => {
                self.io.write32(DwioPort::RegisterAddress as usize, reg as u32);
                self.io.read32(DwioPort::RegisterData as usize) as u16
            }
        }
    }

    /// Write a control and status register
    pub fn write_csr(&self, reg: PcnetCsr, value: u16) {
        match self.width {
            RegisterWidth::Word => {
                self.io.write16(WioPort::RegisterAddress as usize, reg as u16);
                self.io.write16(WioPort::RegisterData as usize, value);
            }
            RegisterWidth::DoubleWord => {
                self.io.write32(DwioPort::RegisterAddress as usize, reg as u32);
                self.io.write32(DwioPort::RegisterData as usize, value as u32);
            }
        }
    }

    /// Read a bus configuration register
    pub fn read_bcr(&self, reg: PcnetBcr) -> u16 {
        match self.width {
            RegisterWidth::Word => {
                self.io.write16(WioPort::RegisterAddress as usize, reg as u16);
                self.io.read16(WioPort::BusData as usize)
            }
            RegisterWidth::DoubleWord => {
                self.io.write32(DwioPort::RegisterAddress as usize, reg as u32);
                self.io.read32(DwioPort::BusData as usize) as u16
            }
        }
    }

    /// Write a bus configuration register
    pub fn write_bcr(&self, reg: PcnetBcr, value: u16) {
        match self.width {
            RegisterWidth::Word => {
                self.io.write16(WioPort::RegisterAddress as usize, reg as u16);
                self.io.write16(WioPort::BusData as usize, value);
            }
            RegisterWidth::DoubleWord => {
                self.io.write32(DwioPort::RegisterAddress as usize, reg as u32);
                self.io.write32(DwioPort::BusData as usize, value as u32);
            }
        }
    }

    /// Software reset, issued as a read of the reset port at the current width
    pub fn reset(&self) {
        match self.width {
            RegisterWidth::Word => {
                self.io.read16(WioPort::Reset as usize);
            }
            RegisterWidth::DoubleWord => {
                self.io.read32(DwioPort::Reset as usize);
            }
        }
    }

    /// Read one byte of the station address PROM
    pub fn read_aprom(&self, index: usize) -> u8 {
        self.io.read8(WioPort::Aprom as usize + index)
    }
}
