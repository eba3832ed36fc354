//! Receive engine
//!
//! Every receive descriptor is armed with its own buffer from the
//! [`RxBufferPool`] for the whole life of the device. Reaping hands each
//! completed frame to the stack in place, then gives the slot straight back
//! to the chip.

use crate::dma::RxBufferPool;
use crate::net::{NetStack, RxPacket};
use crate::regs::desc_status;
use crate::ring::DescRing;
use crate::types::{RxDesc16, RxDesc32, RxDescriptor};

/// Receive side counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RxCounters {
    pub packets: u64,
    pub bytes: u64,
    pub errors: u64,
}

/// Receive ring of one descriptor layout
pub struct ReceiveRing<D: RxDescriptor> {
    ring: DescRing<D>,
    buffers: RxBufferPool,
    /// Next slot the chip will complete
    begin: usize,
    counters: RxCounters,
}

impl<D: RxDescriptor> ReceiveRing<D> {
    /// Pair each slot of `ring` with a buffer of `buffers` and arm them all
    pub fn new(ring: DescRing<D>, buffers: RxBufferPool) -> Self {
        assert_eq!(ring.len(), buffers.len());
        let mut rx = Self {
            ring,
            buffers,
            begin: 0,
            counters: RxCounters::default(),
        };
        rx.arm_all();
        rx
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn counters(&self) -> RxCounters {
        self.counters
    }

    pub fn ring(&self) -> &DescRing<D> {
        &self.ring
    }

    /// Give every slot back to the chip and restart at slot 0
    pub fn arm_all(&mut self) {
        for index in 0..self.ring.len() {
            self.arm(index);
        }
        self.begin = 0;
    }

    fn arm(&mut self, index: usize) {
        let address = self.buffers.phys_addr(index).as_usize() as u32;
        let frame_size = self.buffers.frame_size() as u16;

        let desc = self.ring.get_mut(index);
        desc.clear_status_bits(D::STATUS_MASK);
        desc.set_buffer_address(address);
        desc.set_buffer_length(frame_size);
        desc.set_message_length(0);
        self.ring.publish(index);

        self.ring.get_mut(index).set_status_bits(desc_status::OWN);
        self.ring.publish(index);
    }

    /// Deliver every frame the chip has completed, returning how many slots
    /// were recycled
    pub fn reap<S: NetStack>(&mut self, stack: &S) -> usize {
        let mut reaped = 0;

        loop {
            let index = self.begin;
            self.ring.refresh(index);
            let desc = self.ring.get(index);
            let status = desc.status();
            if status & desc_status::OWN != 0 {
                break;
            }

            // Buffers hold a maximum frame, the chip never chains them.
            assert!(
                desc.is_whole_frame(),
                "PCnet: receive descriptor {} is not a whole frame ({:#x})",
                index,
                status
            );

            if status & desc_status::ERR == 0 {
                let length = (desc.message_length() & desc_status::LENGTH_MASK) as usize;
                let data = self.buffers.frame(index, length);
                self.counters.packets += 1;
                self.counters.bytes += data.len() as u64;
                stack.process_received_packet(RxPacket::new(data, self.buffers.phys_addr(index)));
            } else {
                debug!("PCnet: dropping receive frame, status {:#x}", status);
                self.counters.errors += 1;
            }

            self.arm(index);
            self.begin = self.ring.next(index);
            reaped += 1;
        }

        reaped
    }
}

/// The receive ring in whichever layout the chip was set up with
pub enum Receiver {
    Sw16(ReceiveRing<RxDesc16>),
    Sw32(ReceiveRing<RxDesc32>),
}

impl Receiver {
    pub fn reap<S: NetStack>(&mut self, stack: &S) -> usize {
        match self {
            Receiver::Sw16(rx) => rx.reap(stack),
            Receiver::Sw32(rx) => rx.reap(stack),
        }
    }

    pub fn arm_all(&mut self) {
        match self {
            Receiver::Sw16(rx) => rx.arm_all(),
            Receiver::Sw32(rx) => rx.arm_all(),
        }
    }

    pub fn counters(&self) -> RxCounters {
        match self {
            Receiver::Sw16(rx) => rx.counters(),
            Receiver::Sw32(rx) => rx.counters(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Receiver::Sw16(rx) => rx.len(),
            Receiver::Sw32(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
