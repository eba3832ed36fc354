//! Transmit engine
//!
//! Packets offered by the stack wait in a FIFO until a descriptor is free.
//! A descriptor is free while its buffer address is zero; it stays busy from
//! the moment a packet is placed in it until the reap after the chip hands
//! it back, so every slot of the ring can carry a packet.

use alloc::vec::Vec;

use crate::io::{PortIo, Registers};
use crate::net::{PacketList, TxPacket};
use crate::regs::register_bits::*;
use crate::regs::{desc_status, PcnetCsr};
use crate::ring::DescRing;
use crate::types::{TxDesc16, TxDesc32, TxDescriptor};
use crate::{PcnetError, PcnetResult};

/// Transmit side counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxCounters {
    pub packets: u64,
    pub bytes: u64,
    /// Batches refused because the queue was over its limit
    pub dropped_batches: u64,
}

/// Whether the chip can send `packet` from a single descriptor
///
/// The byte count field is 12 bits wide and a zero buffer address marks a
/// free slot.
pub fn is_transmittable<P: TxPacket>(packet: &P) -> bool {
    let len = packet.len();
    let phys = packet.phys_addr().as_usize();
    len != 0 && len <= desc_status::LENGTH_MASK as usize && phys != 0 && phys <= u32::MAX as usize
}

/// Transmit ring of one descriptor layout, and the packets it carries
pub struct TransmitRing<D: TxDescriptor, P> {
    ring: DescRing<D>,
    packets: Vec<Option<P>>,
    next_to_use: usize,
    last_reaped: usize,
    in_flight: usize,
}

impl<D: TxDescriptor, P: TxPacket> TransmitRing<D, P> {
    pub fn new(ring: DescRing<D>) -> PcnetResult<Self> {
        let len = ring.len();
        let mut packets = Vec::new();
        packets
            .try_reserve_exact(len)
            .map_err(|_| PcnetError::InsufficientResources)?;
        packets.resize_with(len, || None);

        Ok(Self {
            ring,
            packets,
            next_to_use: 0,
            last_reaped: len - 1,
            in_flight: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn next_to_use(&self) -> usize {
        self.next_to_use
    }

    pub fn last_reaped(&self) -> usize {
        self.last_reaped
    }

    /// Descriptors holding a packet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn ring(&self) -> &DescRing<D> {
        &self.ring
    }

    /// Move packets from the front of `pending` into free slots, returning
    /// how many were handed to the chip
    pub fn fill(&mut self, pending: &mut PacketList<P>) -> usize {
        let mut filled = 0;

        while self.in_flight < self.ring.len() {
            let Some(packet) = pending.pop_front() else {
                break;
            };

            assert!(
                is_transmittable(&packet),
                "PCnet: cannot transmit {} bytes at {:#x}",
                packet.len(),
                packet.phys_addr().as_usize()
            );

            let index = self.next_to_use;
            debug_assert_eq!(self.ring.get(index).buffer_address(), 0);

            let desc = self.ring.get_mut(index);
            desc.set_buffer_address(packet.phys_addr().as_usize() as u32);
            desc.set_buffer_length(packet.len() as u16);
            self.ring.publish(index);

            self.ring
                .get_mut(index)
                .set_status_bits(desc_status::OWN | desc_status::STP | desc_status::ENP);
            self.ring.publish(index);

            self.packets[index] = Some(packet);
            self.next_to_use = self.ring.next(index);
            self.in_flight += 1;
            filled += 1;
        }

        filled
    }

    /// Take back every slot the chip has finished with, in ring order
    pub fn reap(&mut self, done: &mut Vec<P>) -> usize {
        let mut reaped = 0;

        loop {
            let index = self.ring.next(self.last_reaped);
            self.ring.refresh(index);
            let desc = self.ring.get(index);
            if desc.buffer_address() == 0 || desc.is_owned_by_hw() {
                break;
            }

            assert!(
                desc.is_whole_frame(),
                "PCnet: transmit descriptor {} is not a whole frame ({:#x})",
                index,
                desc.status()
            );
            if desc.error_flags() != 0 {
                debug!(
                    "PCnet: transmit descriptor {} completed with errors {:#x}",
                    index,
                    desc.error_flags()
                );
            }

            self.release(index, done);
            self.last_reaped = index;
            reaped += 1;
        }

        reaped
    }

    /// Pull every in-flight packet out of the ring, finished or not, and
    /// restart at slot 0. The chip must be stopped or about to be reset.
    pub fn reclaim_all(&mut self, done: &mut Vec<P>) {
        for index in 0..self.ring.len() {
            if self.packets[index].is_some() || self.ring.get(index).buffer_address() != 0 {
                self.release(index, done);
            }
        }
        self.next_to_use = 0;
        self.last_reaped = self.ring.len() - 1;
        self.in_flight = 0;
    }

    fn release(&mut self, index: usize, done: &mut Vec<P>) {
        let desc = self.ring.get_mut(index);
        desc.set_buffer_address(0);
        desc.clear_status_bits(D::STATUS_MASK);
        desc.clear_error_bits(D::ERROR_MASK);
        self.ring.publish(index);

        if let Some(packet) = self.packets[index].take() {
            done.push(packet);
            self.in_flight -= 1;
        }
    }
}

/// The transmit ring in whichever layout the chip was set up with
pub enum TxRing<P> {
    Sw16(TransmitRing<TxDesc16, P>),
    Sw32(TransmitRing<TxDesc32, P>),
}

impl<P: TxPacket> TxRing<P> {
    fn fill(&mut self, pending: &mut PacketList<P>) -> usize {
        match self {
            TxRing::Sw16(ring) => ring.fill(pending),
            TxRing::Sw32(ring) => ring.fill(pending),
        }
    }

    fn reap(&mut self, done: &mut Vec<P>) -> usize {
        match self {
            TxRing::Sw16(ring) => ring.reap(done),
            TxRing::Sw32(ring) => ring.reap(done),
        }
    }

    fn reclaim_all(&mut self, done: &mut Vec<P>) {
        match self {
            TxRing::Sw16(ring) => ring.reclaim_all(done),
            TxRing::Sw32(ring) => ring.reclaim_all(done),
        }
    }

    pub fn in_flight(&self) -> usize {
        match self {
            TxRing::Sw16(ring) => ring.in_flight(),
            TxRing::Sw32(ring) => ring.in_flight(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TxRing::Sw16(ring) => ring.len(),
            TxRing::Sw32(ring) => ring.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transmit ring plus the queue of packets waiting for it
///
/// Lives behind the transmit lock; every method assumes it is held.
pub struct Transmitter<P> {
    ring: TxRing<P>,
    pending: PacketList<P>,
    counters: TxCounters,
}

impl<P: TxPacket> Transmitter<P> {
    pub fn new(ring: TxRing<P>) -> Self {
        Self {
            ring,
            pending: PacketList::new(),
            counters: TxCounters::default(),
        }
    }

    pub fn ring(&self) -> &TxRing<P> {
        &self.ring
    }

    /// Packets accepted but not yet placed in a descriptor
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn counters(&self) -> TxCounters {
        self.counters
    }

    /// Queue the whole of `batch`, or none of it when the queue already
    /// holds `limit` packets or more
    ///
    /// On refusal `batch` is left as it was. A batch holding a packet the
    /// chip cannot send is refused with [`PcnetError::InvalidParameter`].
    pub fn enqueue(&mut self, batch: &mut PacketList<P>, limit: Option<usize>) -> PcnetResult {
        if let Some(bad) = batch.iter().find(|packet| !is_transmittable(*packet)) {
            warn!(
                "PCnet: refusing batch with a {} byte packet at {:#x}",
                bad.len(),
                bad.phys_addr().as_usize()
            );
            return Err(PcnetError::InvalidParameter);
        }

        if let Some(limit) = limit {
            if self.pending.len() >= limit {
                self.counters.dropped_batches += 1;
                warn!(
                    "PCnet: transmit queue at {} packets, refusing {} more",
                    self.pending.len(),
                    batch.len()
                );
                return Err(PcnetError::ResourceInUse);
            }
        }

        self.pending.append(batch);
        Ok(())
    }

    /// Submit queued packets to free descriptors and, if any went out, tell
    /// the chip to poll the ring
    pub fn drain_pending<IO: PortIo>(&mut self, regs: &Registers<IO>) -> usize {
        let filled = self.ring.fill(&mut self.pending);
        if filled != 0 {
            regs.write_csr(
                PcnetCsr::Status,
                CSR0_TRANSMIT_DEMAND | CSR0_INTERRUPT_ENABLED,
            );
        }
        filled
    }

    /// Collect completed packets into `done`, then refill the freed slots
    pub fn reap<IO: PortIo>(&mut self, regs: &Registers<IO>, done: &mut Vec<P>) -> usize {
        let first = done.len();
        let reaped = self.ring.reap(done);
        for packet in &done[first..] {
            self.counters.packets += 1;
            self.counters.bytes += packet.len() as u64;
        }

        if reaped != 0 {
            self.drain_pending(regs);
        }
        reaped
    }

    /// Take every packet out of the ring and the queue
    pub fn reclaim_all(&mut self, done: &mut Vec<P>) {
        self.ring.reclaim_all(done);
        done.extend(self.pending.drain(..));
    }

    /// Take every packet out of the ring, keeping the queue for resubmission
    pub fn reclaim_in_flight(&mut self, done: &mut Vec<P>) {
        self.ring.reclaim_all(done);
    }
}
