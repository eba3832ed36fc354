//! Hardware-defined descriptor and initialization block layouts
//!
//! The chip supports two software styles, selected once at bring-up:
//!
//! * style 0 (16-bit): 8 byte descriptors whose status byte shares a word
//!   with a 24-bit buffer address, and a 24 byte init block that encodes the
//!   ring lengths next to the ring addresses.
//! * style 2 (32-bit): 16 byte descriptors with a full 32-bit buffer address,
//!   status in the upper half of the length word, and a 28 byte init block
//!   that encodes the ring lengths in the mode word.
//!
//! The status bits sit at the same positions in both styles once a
//! descriptor word is read as a `u32`, so the rest of the driver only deals
//! with [`Descriptor`], [`RxDescriptor`] and [`TxDescriptor`].
//!
//! Every accessor is a volatile access: the chip reads and writes these
//! structures behind the compiler's back.

use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};

use crate::constants::*;
use crate::regs::{desc_status, init_mode};

#[inline(always)]
fn vread<T: Copy>(field: *const T) -> T {
    // SAFETY: `field` always comes from `addr_of!` on a live descriptor.
    unsafe { read_volatile(field) }
}

#[inline(always)]
fn vwrite<T: Copy>(field: *mut T, value: T) {
    // SAFETY: `field` always comes from `addr_of_mut!` on a live descriptor.
    unsafe { write_volatile(field, value) }
}

/// Software style selected by BCR20
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftwareStyle {
    /// LANCE compatible 16-bit structures
    Sw16,
    /// PCnet-PCI 32-bit structures
    Sw32,
}

impl SoftwareStyle {
    /// Required alignment of both descriptor rings
    pub const fn ring_alignment(self) -> usize {
        match self {
            SoftwareStyle::Sw16 => RING_ALIGNMENT_16,
            SoftwareStyle::Sw32 => RING_ALIGNMENT_32,
        }
    }

    /// Highest physical address the chip can reach
    pub const fn max_dma_address(self) -> usize {
        match self {
            SoftwareStyle::Sw16 => MAX_DMA_ADDRESS_16,
            SoftwareStyle::Sw32 => MAX_DMA_ADDRESS_32,
        }
    }

    /// Largest ring the init block can describe
    pub const fn max_ring_length(self) -> usize {
        match self {
            SoftwareStyle::Sw16 => MAX_RING_LENGTH_16,
            SoftwareStyle::Sw32 => MAX_RING_LENGTH_32,
        }
    }

    pub const fn init_block_size(self) -> usize {
        match self {
            SoftwareStyle::Sw16 => core::mem::size_of::<InitBlock16>(),
            SoftwareStyle::Sw32 => core::mem::size_of::<InitBlock32>(),
        }
    }

    pub const fn rx_descriptor_size(self) -> usize {
        match self {
            SoftwareStyle::Sw16 => RxDesc16::SIZE,
            SoftwareStyle::Sw32 => RxDesc32::SIZE,
        }
    }

    pub const fn tx_descriptor_size(self) -> usize {
        match self {
            SoftwareStyle::Sw16 => TxDesc16::SIZE,
            SoftwareStyle::Sw32 => TxDesc32::SIZE,
        }
    }
}

/// Field access shared by receive and transmit descriptors
///
/// Implementations must keep the buffer address and the status bits apart
/// even when the layout packs them into the same word.
pub trait Descriptor: Sized + 'static {
    /// Size of one descriptor in the ring
    const SIZE: usize = core::mem::size_of::<Self>();

    /// Status bits this layout can hold
    const STATUS_MASK: u32;

    /// Physical address of the data buffer
    fn buffer_address(&self) -> u32;

    /// Set the buffer address, leaving the status bits alone
    fn set_buffer_address(&mut self, address: u32);

    /// Status bits, positioned as in [`desc_status`]
    fn status(&self) -> u32;

    /// Overwrite the status bits, leaving address and length alone
    fn write_status(&mut self, status: u32);

    /// Byte count of the buffer, decoded from its negative encoding
    fn buffer_length(&self) -> u16;

    /// Store `length` as the negative byte count the chip expects
    fn set_buffer_length(&mut self, length: u16);

    fn set_status_bits(&mut self, bits: u32) {
        self.write_status(self.status() | (bits & Self::STATUS_MASK));
    }

    fn clear_status_bits(&mut self, bits: u32) {
        self.write_status(self.status() & !bits);
    }

    fn is_owned_by_hw(&self) -> bool {
        (self.status() & desc_status::OWN) != 0
    }

    /// Whether the descriptor describes a whole frame (STP and ENP)
    fn is_whole_frame(&self) -> bool {
        let status = self.status();
        (status & desc_status::STP) != 0 && (status & desc_status::ENP) != 0
    }
}

/// Receive specific fields
pub trait RxDescriptor: Descriptor {
    /// Received byte count as written by the chip, unmasked
    fn message_length(&self) -> u32;

    fn set_message_length(&mut self, length: u32);
}

/// Transmit specific fields
pub trait TxDescriptor: Descriptor {
    /// Error bits of the completion word
    const ERROR_MASK: u32;

    fn error_flags(&self) -> u32;

    fn clear_error_bits(&mut self, bits: u32);
}

#[inline(always)]
fn negate_length(length: u16) -> u16 {
    length.wrapping_neg()
}

#[inline(always)]
fn decode_length(raw: u16) -> u16 {
    raw.wrapping_neg() & (desc_status::LENGTH_MASK as u16)
}

/// Receive descriptor, software style 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RxDesc16 {
    /// Buffer address bits 23:0, status bits 31:24
    pub buffer_address: u32,
    /// Negative buffer byte count
    pub buffer_length: u16,
    /// Received byte count
    pub message_length: u16,
}

impl Descriptor for RxDesc16 {
    const STATUS_MASK: u32 = 0xFF00_0000;

    fn buffer_address(&self) -> u32 {
        vread(addr_of!(self.buffer_address)) & init_mode::INIT16_ADDRESS_MASK
    }

    fn set_buffer_address(&mut self, address: u32) {
        let word = vread(addr_of!(self.buffer_address));
        let word = (word & Self::STATUS_MASK) | (address & !Self::STATUS_MASK);
        vwrite(addr_of_mut!(self.buffer_address), word);
    }

    fn status(&self) -> u32 {
        vread(addr_of!(self.buffer_address)) & Self::STATUS_MASK
    }

    fn write_status(&mut self, status: u32) {
        let word = vread(addr_of!(self.buffer_address));
        let word = (word & !Self::STATUS_MASK) | (status & Self::STATUS_MASK);
        vwrite(addr_of_mut!(self.buffer_address), word);
    }

    fn buffer_length(&self) -> u16 {
        decode_length(vread(addr_of!(self.buffer_length)))
    }

    fn set_buffer_length(&mut self, length: u16) {
        vwrite(addr_of_mut!(self.buffer_length), negate_length(length));
    }
}

impl RxDescriptor for RxDesc16 {
    fn message_length(&self) -> u32 {
        vread(addr_of!(self.message_length)) as u32
    }

    fn set_message_length(&mut self, length: u32) {
        vwrite(addr_of_mut!(self.message_length), length as u16);
    }
}

/// Receive descriptor, software style 2
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RxDesc32 {
    pub buffer_address: u32,
    /// Status bits 31:16, negative buffer byte count 15:0
    pub buffer_length: u32,
    /// Received byte count in bits 11:0, runt and collision counts above
    pub message_length: u32,
    pub reserved: u32,
}

impl Descriptor for RxDesc32 {
    const STATUS_MASK: u32 = 0xFFFF_0000;

    fn buffer_address(&self) -> u32 {
        vread(addr_of!(self.buffer_address))
    }

    fn set_buffer_address(&mut self, address: u32) {
        vwrite(addr_of_mut!(self.buffer_address), address);
    }

    fn status(&self) -> u32 {
        vread(addr_of!(self.buffer_length)) & Self::STATUS_MASK
    }

    fn write_status(&mut self, status: u32) {
        let word = vread(addr_of!(self.buffer_length));
        let word = (word & !Self::STATUS_MASK) | (status & Self::STATUS_MASK);
        vwrite(addr_of_mut!(self.buffer_length), word);
    }

    fn buffer_length(&self) -> u16 {
        decode_length(vread(addr_of!(self.buffer_length)) as u16)
    }

    fn set_buffer_length(&mut self, length: u16) {
        let word = vread(addr_of!(self.buffer_length));
        let word = (word & Self::STATUS_MASK) | negate_length(length) as u32;
        vwrite(addr_of_mut!(self.buffer_length), word);
    }
}

impl RxDescriptor for RxDesc32 {
    fn message_length(&self) -> u32 {
        vread(addr_of!(self.message_length))
    }

    fn set_message_length(&mut self, length: u32) {
        vwrite(addr_of_mut!(self.message_length), length);
    }
}

/// Transmit descriptor, software style 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TxDesc16 {
    /// Buffer address bits 23:0, status bits 31:24
    pub buffer_address: u32,
    /// Error flags 31:16, negative buffer byte count 15:0
    pub buffer_length: u32,
}

impl Descriptor for TxDesc16 {
    const STATUS_MASK: u32 = 0xFF00_0000;

    fn buffer_address(&self) -> u32 {
        vread(addr_of!(self.buffer_address)) & init_mode::INIT16_ADDRESS_MASK
    }

    fn set_buffer_address(&mut self, address: u32) {
        let word = vread(addr_of!(self.buffer_address));
        let word = (word & Self::STATUS_MASK) | (address & !Self::STATUS_MASK);
        vwrite(addr_of_mut!(self.buffer_address), word);
    }

    fn status(&self) -> u32 {
        vread(addr_of!(self.buffer_address)) & Self::STATUS_MASK
    }

    fn write_status(&mut self, status: u32) {
        let word = vread(addr_of!(self.buffer_address));
        let word = (word & !Self::STATUS_MASK) | (status & Self::STATUS_MASK);
        vwrite(addr_of_mut!(self.buffer_address), word);
    }

    fn buffer_length(&self) -> u16 {
        decode_length(vread(addr_of!(self.buffer_length)) as u16)
    }

    fn set_buffer_length(&mut self, length: u16) {
        let word = vread(addr_of!(self.buffer_length));
        let word = (word & Self::ERROR_MASK) | negate_length(length) as u32;
        vwrite(addr_of_mut!(self.buffer_length), word);
    }
}

impl TxDescriptor for TxDesc16 {
    const ERROR_MASK: u32 = 0xFFFF_0000;

    fn error_flags(&self) -> u32 {
        vread(addr_of!(self.buffer_length)) & Self::ERROR_MASK
    }

    fn clear_error_bits(&mut self, bits: u32) {
        let word = vread(addr_of!(self.buffer_length));
        vwrite(addr_of_mut!(self.buffer_length), word & !(bits & Self::ERROR_MASK));
    }
}

/// Transmit descriptor, software style 2
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TxDesc32 {
    pub buffer_address: u32,
    /// Status bits 31:16, negative buffer byte count 15:0
    pub buffer_length: u32,
    /// BUFF, UFLO, EXDEF, LCOL, LCAR, RTRY and the retry count
    pub error_flags: u32,
    pub reserved: u32,
}

impl Descriptor for TxDesc32 {
    const STATUS_MASK: u32 = 0xFFFF_0000;

    fn buffer_address(&self) -> u32 {
        vread(addr_of!(self.buffer_address))
    }

    fn set_buffer_address(&mut self, address: u32) {
        vwrite(addr_of_mut!(self.buffer_address), address);
    }

    fn status(&self) -> u32 {
        vread(addr_of!(self.buffer_length)) & Self::STATUS_MASK
    }

    fn write_status(&mut self, status: u32) {
        let word = vread(addr_of!(self.buffer_length));
        let word = (word & !Self::STATUS_MASK) | (status & Self::STATUS_MASK);
        vwrite(addr_of_mut!(self.buffer_length), word);
    }

    fn buffer_length(&self) -> u16 {
        decode_length(vread(addr_of!(self.buffer_length)) as u16)
    }

    fn set_buffer_length(&mut self, length: u16) {
        let word = vread(addr_of!(self.buffer_length));
        let word = (word & Self::STATUS_MASK) | negate_length(length) as u32;
        vwrite(addr_of_mut!(self.buffer_length), word);
    }
}

impl TxDescriptor for TxDesc32 {
    const ERROR_MASK: u32 = 0xFC00_000F;

    fn error_flags(&self) -> u32 {
        vread(addr_of!(self.error_flags)) & Self::ERROR_MASK
    }

    fn clear_error_bits(&mut self, bits: u32) {
        let word = vread(addr_of!(self.error_flags));
        vwrite(addr_of_mut!(self.error_flags), word & !(bits & Self::ERROR_MASK));
    }
}

/// Initialization block, software style 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InitBlock16 {
    pub mode: u16,
    pub physical_address: [u8; ETH_ALEN],
    pub logical_address: [u16; 4],
    /// Receive ring address bits 23:0, log2 ring length in bits 31:29
    pub receive_ring_address: u32,
    /// Transmit ring address bits 23:0, log2 ring length in bits 31:29
    pub transmit_ring_address: u32,
}

impl InitBlock16 {
    pub fn new(
        mac: [u8; ETH_ALEN],
        rx_ring: u32,
        rx_ring_len: usize,
        tx_ring: u32,
        tx_ring_len: usize,
    ) -> Self {
        Self {
            mode: 0,
            physical_address: mac,
            logical_address: [0; 4],
            receive_ring_address: encode_ring16(rx_ring, rx_ring_len),
            transmit_ring_address: encode_ring16(tx_ring, tx_ring_len),
        }
    }
}

fn encode_ring16(address: u32, ring_len: usize) -> u32 {
    let log2 = ring_len.trailing_zeros();
    (address & init_mode::INIT16_ADDRESS_MASK)
        | ((log2 << init_mode::INIT16_RING_LENGTH_SHIFT) & init_mode::INIT16_RING_LENGTH_MASK)
}

/// Initialization block, software style 2
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InitBlock32 {
    /// Mode bits 15:0, log2 receive ring length 23:20, log2 transmit ring length 31:28
    pub mode: u32,
    pub physical_address: [u8; ETH_ALEN],
    pub reserved: u16,
    pub logical_address: [u32; 2],
    pub receive_ring_address: u32,
    pub transmit_ring_address: u32,
}

impl InitBlock32 {
    pub fn new(
        mac: [u8; ETH_ALEN],
        rx_ring: u32,
        rx_ring_len: usize,
        tx_ring: u32,
        tx_ring_len: usize,
    ) -> Self {
        let rx_log2 = rx_ring_len.trailing_zeros();
        let tx_log2 = tx_ring_len.trailing_zeros();
        let mode = ((rx_log2 << init_mode::INIT32_RECEIVE_RING_LENGTH_SHIFT)
            & init_mode::INIT32_RECEIVE_RING_LENGTH_MASK)
            | ((tx_log2 << init_mode::INIT32_TRANSMIT_RING_LENGTH_SHIFT)
                & init_mode::INIT32_TRANSMIT_RING_LENGTH_MASK);

        Self {
            mode,
            physical_address: mac,
            reserved: 0,
            logical_address: [0; 2],
            receive_ring_address: rx_ring,
            transmit_ring_address: tx_ring,
        }
    }
}
