//! PCnet32 device

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use memory_addr::align_up;
use spin::Mutex;

use crate::config::PcnetConfig;
use crate::constants::*;
use crate::dma::{DmaRegion, RxBufferPool};
use crate::io::{PortIo, RegisterWidth, Registers};
use crate::net::{InterruptStatus, LinkInformation, NetStack, PacketList};
use crate::regs::register_bits::*;
use crate::regs::{PcnetBcr, PcnetCsr};
use crate::ring::DescRing;
use crate::rx::{ReceiveRing, Receiver};
use crate::tx::{TransmitRing, Transmitter, TxRing};
use crate::types::{InitBlock16, InitBlock32, SoftwareStyle};
use crate::{KernelFunc, PcnetError, PcnetResult, UseKernelFunc};

/// Device statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// Number of frames handed to the stack.
    pub rx_pkts: u64,
    /// Number of bytes handed to the stack, FCS included.
    pub rx_bytes: u64,
    /// Number of frames the chip completed with an error.
    pub rx_errors: u64,
    /// Number of packets the chip finished sending.
    pub tx_pkts: u64,
    /// Number of bytes the chip finished sending.
    pub tx_bytes: u64,
    /// Number of send batches refused by the queue limit.
    pub tx_dropped_batches: u64,
}

impl core::fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "rx_pkts: {}, rx_bytes: {}, rx_errors: {}, tx_pkts: {}, tx_bytes: {}, tx_dropped_batches: {}",
            self.rx_pkts,
            self.rx_bytes,
            self.rx_errors,
            self.tx_pkts,
            self.tx_bytes,
            self.tx_dropped_batches
        )
    }
}

/// Where the init block and the two rings sit in the shared DMA region
struct RegionLayout {
    rx_offset: usize,
    tx_offset: usize,
    size: usize,
}

impl RegionLayout {
    fn new(style: SoftwareStyle, config: &PcnetConfig) -> Self {
        let alignment = style.ring_alignment();
        let rx_offset = align_up(style.init_block_size(), alignment);
        let rx_ring_size = align_up(config.rx_ring_length * style.rx_descriptor_size(), alignment);
        let tx_offset = rx_offset + rx_ring_size;
        let size = tx_offset + config.tx_ring_length * style.tx_descriptor_size();
        Self {
            rx_offset,
            tx_offset,
            size,
        }
    }
}

/// An AMD PCnet32 Ethernet controller
///
/// Shared between the interrupt top half, the deferred worker and any
/// number of senders; every entry point takes `&self`. Bring-up and reset
/// take `&mut self`.
pub struct Pcnet<IO: PortIo, S: NetStack> {
    regs: Registers<IO>,
    stack: S,
    config: PcnetConfig,
    style: SoftwareStyle,
    mac_addr: [u8; ETH_ALEN],
    rx: Mutex<Receiver>,
    tx: Mutex<Transmitter<S::Packet>>,
    /// CSR0 cause bits acknowledged by the top half, not yet serviced
    pending_status: AtomicU32,
    link_active: AtomicBool,
    link_registered: bool,
    /// Init block and both descriptor rings. Declared last: the rings above
    /// point into it.
    region: DmaRegion,
}

impl<IO: PortIo, S: NetStack> Pcnet<IO, S> {
    /// Probe the chip and build every structure it needs, without starting it
    ///
    /// On failure everything allocated so far is released again.
    pub fn new(io: IO, stack: S, config: PcnetConfig) -> PcnetResult<Self> {
        let mut regs = Registers::new(io);

        // A reset read returns the chip to word I/O.
        regs.reset();
        if regs.read_bcr(PcnetBcr::BusControl) & BCR18_DOUBLE_WORD_IO != 0 {
            regs.set_width(RegisterWidth::DoubleWord);
            regs.reset();
        }

        let mac_addr: [u8; ETH_ALEN] = core::array::from_fn(|i| regs.read_aprom(i));
        info!(
            "PCnet: MAC {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}, {:?} register access",
            mac_addr[0],
            mac_addr[1],
            mac_addr[2],
            mac_addr[3],
            mac_addr[4],
            mac_addr[5],
            regs.width()
        );

        let style_select = (BCR20_SOFTWARE_STYLE_PCNET_PCI << BCR20_SOFTWARE_STYLE_SHIFT)
            & BCR20_SOFTWARE_STYLE_MASK;
        regs.write_bcr(PcnetBcr::SoftwareStyle, style_select);

        let style = if regs.read_bcr(PcnetBcr::SoftwareStyle) & BCR20_SOFTWARE_SIZE_32 != 0 {
            SoftwareStyle::Sw32
        } else {
            SoftwareStyle::Sw16
        };
        config.validate(style)?;

        let layout = RegionLayout::new(style, &config);
        let max_phys = style.max_dma_address();
        let region = DmaRegion::alloc(layout.size, max_phys)?;

        let frame_size = align_up(RX_FRAME_SIZE, RX_FRAME_ALIGNMENT);
        let buffers = RxBufferPool::alloc(config.rx_ring_length, frame_size, max_phys)?;

        let rx_phys = region.phys_at(layout.rx_offset);
        let tx_phys = region.phys_at(layout.tx_offset);
        let rx_len = config.rx_ring_length;
        let tx_len = config.tx_ring_length;

        // SAFETY: the layout keeps the init block and both rings inside the
        // zeroed region and aligned for their descriptor type, and `region`
        // outlives the rings as the last field of the device.
        let (rx, tx) = unsafe {
            match style {
                SoftwareStyle::Sw16 => (
                    Receiver::Sw16(ReceiveRing::new(
                        DescRing::new(region.ptr_at(layout.rx_offset), rx_phys, rx_len),
                        buffers,
                    )),
                    TxRing::Sw16(TransmitRing::new(DescRing::new(
                        region.ptr_at(layout.tx_offset),
                        tx_phys,
                        tx_len,
                    ))?),
                ),
                SoftwareStyle::Sw32 => (
                    Receiver::Sw32(ReceiveRing::new(
                        DescRing::new(region.ptr_at(layout.rx_offset), rx_phys, rx_len),
                        buffers,
                    )),
                    TxRing::Sw32(TransmitRing::new(DescRing::new(
                        region.ptr_at(layout.tx_offset),
                        tx_phys,
                        tx_len,
                    ))?),
                ),
            }
        };

        let rx_ring = rx_phys.as_usize() as u32;
        let tx_ring = tx_phys.as_usize() as u32;
        unsafe {
            match style {
                SoftwareStyle::Sw16 => core::ptr::write_volatile(
                    region.ptr_at::<InitBlock16>(0),
                    InitBlock16::new(mac_addr, rx_ring, rx_len, tx_ring, tx_len),
                ),
                SoftwareStyle::Sw32 => core::ptr::write_volatile(
                    region.ptr_at::<InitBlock32>(0),
                    InitBlock32::new(mac_addr, rx_ring, rx_len, tx_ring, tx_len),
                ),
            }
        }
        UseKernelFunc::clean_dcache_range(region.vaddr().as_usize(), style.init_block_size());

        debug!(
            "PCnet: {:?} structures at {:#x}, rx ring {:#x} x{}, tx ring {:#x} x{}",
            style,
            region.paddr().as_usize(),
            rx_ring,
            rx_len,
            tx_ring,
            tx_len
        );

        Ok(Self {
            regs,
            stack,
            config,
            style,
            mac_addr,
            rx: Mutex::new(rx),
            tx: Mutex::new(Transmitter::new(tx)),
            pending_status: AtomicU32::new(0),
            link_active: AtomicBool::new(false),
            link_registered: false,
            region,
        })
    }

    /// Probe, set up and start the device
    pub fn init(io: IO, stack: S, config: PcnetConfig) -> PcnetResult<Self> {
        let mut nic = Self::new(io, stack, config)?;
        nic.reset()?;
        Ok(nic)
    }

    /// (Re)start the chip from the init block and bring the link up
    ///
    /// Receive slots are all handed back to the chip. Packets that were in
    /// the transmit ring are released to the stack; packets still queued are
    /// kept and submitted once the chip runs.
    ///
    /// The link is down from the reset read on. If the restart fails it
    /// stays down and a link that was up is reported lost.
    pub fn reset(&mut self) -> PcnetResult {
        let was_active = core::mem::replace(self.link_active.get_mut(), false);
        if let Err(err) = self.restart() {
            if was_active {
                self.stack.set_link_state(false, 0);
            }
            return Err(err);
        }

        {
            let mut tx = self.tx.lock();
            self.link_active.store(true, Ordering::Release);
            tx.drain_pending(&self.regs);
        }
        self.stack.set_link_state(true, LINK_SPEED_10_MBPS);
        info!("PCnet: link up at 10 Mbps");
        Ok(())
    }

    /// Reset the chip, feed it the init block and start it
    fn restart(&mut self) -> PcnetResult {
        self.regs.reset();

        let mut released = Vec::new();
        self.rx.get_mut().arm_all();
        self.tx.get_mut().reclaim_in_flight(&mut released);
        for packet in released {
            self.stack.free_transmitted_packet(packet);
        }

        let features = self.regs.read_csr(PcnetCsr::FeatureControl)
            | CSR4_AUTO_PAD_TRANSMIT
            | CSR4_AUTO_STRIP_RECEIVE
            | CSR4_TRANSMIT_START_MASK;
        self.regs.write_csr(PcnetCsr::FeatureControl, features);

        let init_block = self.region.paddr().as_usize();
        self.regs
            .write_csr(PcnetCsr::InitBlockAddress0, init_block as u16);
        self.regs
            .write_csr(PcnetCsr::InitBlockAddress1, (init_block >> 16) as u16);
        self.regs.write_csr(PcnetCsr::Status, CSR0_INIT);

        let mut init_done = false;
        for _ in 0..self.config.init_poll_count() {
            if self.regs.read_csr(PcnetCsr::Status) & CSR0_INIT_DONE != 0 {
                init_done = true;
                break;
            }
            UseKernelFunc::busy_wait(self.config.init_poll_interval);
        }
        if !init_done {
            warn!(
                "PCnet: init block not read within {:?}",
                self.config.init_timeout
            );
            return Err(PcnetError::NotReady);
        }

        self.regs.write_csr(PcnetCsr::Status, CSR0_INIT_DONE);
        self.regs
            .write_csr(PcnetCsr::Status, CSR0_START | CSR0_INTERRUPT_ENABLED);

        if !self.link_registered {
            self.stack.register_link(self.mac_addr)?;
            self.link_registered = true;
        }
        Ok(())
    }

    /// Stop the chip and report the link down
    ///
    /// Packets stay where they are until [`Pcnet::reset`] or drop.
    pub fn stop(&self) {
        {
            let _tx = self.tx.lock();
            self.regs.write_csr(PcnetCsr::Status, CSR0_STOP);
            self.link_active.store(false, Ordering::Release);
        }
        self.stack.set_link_state(false, 0);
        info!("PCnet: stopped");
    }

    /// Queue a batch of packets for transmission
    ///
    /// The whole batch is taken, leaving `packets` empty, or none of it is.
    /// When the queue already holds twice the ring length, the batch is
    /// refused with [`PcnetError::ResourceInUse`] unless packet dropping is
    /// disabled in the configuration.
    pub fn send(&self, packets: &mut PacketList<S::Packet>) -> PcnetResult {
        let mut tx = self.tx.lock();
        if !self.link_active.load(Ordering::Acquire) {
            return Err(PcnetError::NoNetworkConnection);
        }

        tx.enqueue(packets, self.config.tx_queue_limit())?;
        tx.drain_pending(&self.regs);
        Ok(())
    }

    /// Interrupt top half
    ///
    /// Acknowledges every pending cause and records it for
    /// [`Pcnet::interrupt_service_worker`]. Takes no lock.
    pub fn interrupt_service(&self) -> InterruptStatus {
        let pending = self.regs.read_csr(PcnetCsr::Status) & CSR0_INTERRUPT_MASK;
        if pending == 0 {
            return InterruptStatus::NotClaimed;
        }

        self.pending_status
            .fetch_or(pending as u32, Ordering::AcqRel);
        self.regs
            .write_csr(PcnetCsr::Status, pending | CSR0_INTERRUPT_ENABLED);
        InterruptStatus::Claimed
    }

    /// Interrupt bottom half, run from a context that may take locks
    pub fn interrupt_service_worker(&self) -> InterruptStatus {
        let pending = self.pending_status.swap(0, Ordering::AcqRel) as u16;
        if pending == 0 {
            return InterruptStatus::NotClaimed;
        }

        if pending & CSR0_RECEIVE_INTERRUPT != 0 {
            self.reap_received();
        }
        if pending & CSR0_TRANSMIT_INTERRUPT != 0 {
            self.reap_transmitted();
        }
        InterruptStatus::Claimed
    }

    /// Deliver completed receive frames, returning how many were processed
    pub fn reap_received(&self) -> usize {
        self.rx.lock().reap(&self.stack)
    }

    /// Release completed transmit packets and refill the ring
    pub fn reap_transmitted(&self) -> usize {
        let mut done = Vec::new();
        let reaped = self.tx.lock().reap(&self.regs, &mut done);
        for packet in done {
            self.stack.free_transmitted_packet(packet);
        }
        reaped
    }

    /// Query or change link information
    ///
    /// No checksum offload is available: a query yields no capability flags
    /// and any change is refused.
    pub fn get_set_information(&self, kind: LinkInformation, set: bool) -> PcnetResult<u32> {
        match kind {
            LinkInformation::ChecksumOffload if set => Err(PcnetError::NotSupported),
            LinkInformation::ChecksumOffload => Ok(0),
        }
    }

    pub fn mac_addr(&self) -> [u8; ETH_ALEN] {
        self.mac_addr
    }

    pub fn is_link_active(&self) -> bool {
        self.link_active.load(Ordering::Acquire)
    }

    /// Link speed in bits per second, `None` while the link is down
    pub fn link_speed(&self) -> Option<u64> {
        self.is_link_active().then_some(LINK_SPEED_10_MBPS)
    }

    pub fn style(&self) -> SoftwareStyle {
        self.style
    }

    pub fn register_width(&self) -> RegisterWidth {
        self.regs.width()
    }

    pub fn config(&self) -> &PcnetConfig {
        &self.config
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn io(&self) -> &IO {
        self.regs.io()
    }

    pub fn stats(&self) -> DeviceStats {
        let rx = self.rx.lock().counters();
        let tx = self.tx.lock().counters();
        DeviceStats {
            rx_pkts: rx.packets,
            rx_bytes: rx.bytes,
            rx_errors: rx.errors,
            tx_pkts: tx.packets,
            tx_bytes: tx.bytes,
            tx_dropped_batches: tx.dropped_batches,
        }
    }
}

impl<IO: PortIo, S: NetStack> Drop for Pcnet<IO, S> {
    fn drop(&mut self) {
        self.regs.write_csr(PcnetCsr::Status, CSR0_STOP);

        let mut released = Vec::new();
        self.tx.get_mut().reclaim_all(&mut released);
        for packet in released {
            self.stack.free_transmitted_packet(packet);
        }
        debug!("PCnet: released, {}", self.stats());
    }
}
