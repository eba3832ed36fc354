//! Boundary with the networking stack

use alloc::collections::VecDeque;

use memory_addr::PhysAddr;

use crate::constants::ETH_ALEN;
use crate::PcnetResult;

/// Ordered batch of outbound packets, oldest first
pub type PacketList<P> = VecDeque<P>;

/// Outcome reported back to the interrupt dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptStatus {
    NotClaimed,
    Claimed,
}

/// Link information classes understood by [`Pcnet::get_set_information`]
///
/// [`Pcnet::get_set_information`]: crate::Pcnet::get_set_information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkInformation {
    /// Checksum offload capability flags
    ChecksumOffload,
}

/// A frame sitting in a receive buffer, lent to the stack during delivery
///
/// The view is zero-copy: the bytes live in the driver's receive pool and
/// are handed back to the chip as soon as delivery returns.
#[derive(Debug, Clone, Copy)]
pub struct RxPacket<'a> {
    data: &'a [u8],
    phys_addr: PhysAddr,
}

impl<'a> RxPacket<'a> {
    pub(crate) fn new(data: &'a [u8], phys_addr: PhysAddr) -> Self {
        Self { data, phys_addr }
    }

    /// Frame bytes
    pub fn packet(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Physical address of the first frame byte
    pub fn phys_addr(&self) -> PhysAddr {
        self.phys_addr
    }
}

/// An outbound frame owned by the stack
///
/// The frame must stay at the same physical address, and reachable by the
/// chip, until it is handed back through
/// [`NetStack::free_transmitted_packet`].
pub trait TxPacket: Send {
    /// Physical address of the first byte to put on the wire
    fn phys_addr(&self) -> PhysAddr;

    /// Bytes to put on the wire, without FCS
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The networking stack driving this device
pub trait NetStack: Send + Sync {
    type Packet: TxPacket;

    /// Called once, the first time the device comes up
    fn register_link(&self, mac_addr: [u8; ETH_ALEN]) -> PcnetResult;

    /// Report link state changes, `speed` in bits per second
    fn set_link_state(&self, active: bool, speed: u64);

    /// Deliver a received frame; the view is only valid during the call
    fn process_received_packet(&self, packet: RxPacket<'_>);

    /// Take back a packet the device is done with
    fn free_transmitted_packet(&self, packet: Self::Packet) {
        drop(packet);
    }
}
