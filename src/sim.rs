//! Test doubles: platform memory, a simulated chip and a recording stack
//!
//! The fake physical address space is per thread, so tests running in
//! parallel never see each other's allocations.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::RefCell;
use std::sync::Arc;

use memory_addr::{PhysAddr, VirtAddr};
use spin::Mutex;

use crate::constants::DMA_PAGE_SIZE;
use crate::io::PortIo;
use crate::net::{NetStack, RxPacket, TxPacket};
use crate::regs::register_bits::*;
use crate::regs::desc_status;
use crate::types::*;
use crate::{KernelFunc, PcnetError, PcnetResult};

/// Station address burned into the simulated APROM
pub const SIM_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

/// First fake physical address handed out
const PHYS_BASE: usize = 0x0010_0000;

struct FakeRegion {
    phys: usize,
    virt: usize,
    size: usize,
}

#[derive(Default)]
struct FakeMemory {
    /// Live regions, sorted by physical address
    regions: Vec<FakeRegion>,
    /// Allocations left before every allocation fails
    fail_after: Option<usize>,
}

thread_local! {
    static MEMORY: RefCell<FakeMemory> = RefCell::new(FakeMemory::default());
}

fn region_layout(size: usize) -> Layout {
    Layout::from_size_align(size, DMA_PAGE_SIZE).unwrap()
}

/// Number of DMA regions currently allocated on this thread
pub fn live_dma_allocations() -> usize {
    MEMORY.with(|m| m.borrow().regions.len())
}

/// Let `count` more DMA allocations succeed, then fail every one after
pub fn fail_dma_allocation_after(count: usize) {
    MEMORY.with(|m| m.borrow_mut().fail_after = Some(count));
}

pub fn clear_dma_failure() {
    MEMORY.with(|m| m.borrow_mut().fail_after = None);
}

/// Virtual address backing fake physical address `phys`
pub fn virt_of(phys: usize) -> usize {
    MEMORY.with(|m| {
        m.borrow()
            .regions
            .iter()
            .find(|r| phys >= r.phys && phys < r.phys + r.size)
            .map(|r| r.virt + (phys - r.phys))
            .unwrap_or_else(|| panic!("physical address {:#x} is not mapped", phys))
    })
}

pub fn write_phys(phys: usize, data: &[u8]) {
    let virt = virt_of(phys);
    unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), virt as *mut u8, data.len()) };
}

pub fn read_phys(phys: usize, len: usize) -> Vec<u8> {
    let virt = virt_of(phys);
    unsafe { core::slice::from_raw_parts(virt as *const u8, len) }.to_vec()
}

fn read_phys_u32(phys: usize) -> u32 {
    let bytes = read_phys(phys, 4);
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

struct TestKernel;

#[crate_interface::impl_interface]
impl KernelFunc for TestKernel {
    fn phys_to_virt(addr: PhysAddr) -> VirtAddr {
        let phys = addr.as_usize();
        let mapped = MEMORY.with(|m| {
            m.borrow()
                .regions
                .iter()
                .find(|r| phys >= r.phys && phys < r.phys + r.size)
                .map(|r| r.virt + (phys - r.phys))
        });
        VirtAddr::from(mapped.unwrap_or(phys))
    }

    fn busy_wait(_duration: core::time::Duration) {}

    fn dma_alloc_coherent(pages: usize, max_phys: PhysAddr) -> Option<(VirtAddr, PhysAddr)> {
        MEMORY.with(|m| {
            let mut memory = m.borrow_mut();
            if let Some(left) = memory.fail_after {
                if left == 0 {
                    return None;
                }
                memory.fail_after = Some(left - 1);
            }

            let size = pages * DMA_PAGE_SIZE;
            let mut phys = PHYS_BASE;
            for region in &memory.regions {
                if phys + size <= region.phys {
                    break;
                }
                phys = phys.max(region.phys + region.size);
            }
            if phys + size - 1 > max_phys.as_usize() {
                return None;
            }

            let virt = unsafe { alloc_zeroed(region_layout(size)) } as usize;
            assert_ne!(virt, 0);
            let at = memory.regions.partition_point(|r| r.phys < phys);
            memory.regions.insert(at, FakeRegion { phys, virt, size });
            Some((VirtAddr::from(virt), PhysAddr::from(phys)))
        })
    }

    fn dma_free_coherent(vaddr: VirtAddr, pages: usize) {
        MEMORY.with(|m| {
            let mut memory = m.borrow_mut();
            let index = memory
                .regions
                .iter()
                .position(|r| r.virt == vaddr.as_usize())
                .expect("freeing unknown DMA region");
            let region = memory.regions.remove(index);
            assert_eq!(region.size, pages * DMA_PAGE_SIZE);
            unsafe { dealloc(region.virt as *mut u8, region_layout(region.size)) };
        })
    }

    fn clean_dcache_range(_addr: usize, _size: usize) {}

    fn invalidate_dcache_range(_addr: usize, _size: usize) {}
}

/// Rings as the chip read them from the init block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInitBlock {
    pub sw32: bool,
    pub mac: [u8; 6],
    pub rx_base: usize,
    pub rx_len: usize,
    pub tx_base: usize,
    pub tx_len: usize,
}

struct ChipState {
    rap: u32,
    csr: [u16; 128],
    bcr: [u16; 32],
    aprom: [u8; 16],
    legacy_style: bool,
    never_init_done: bool,
    word_accesses: usize,
    dword_accesses: usize,
    resets: usize,
    transmit_demands: usize,
    init: Option<ParsedInitBlock>,
    rx_next: usize,
    tx_next: usize,
    transmitted: Vec<(u32, u16)>,
}

/// A PCnet-PCI II as seen through its I/O window
///
/// Word accesses decode the WIO map and double word accesses the DWIO map.
/// Descriptor rings live in the fake physical memory of the current thread.
/// Clones share the same chip.
#[derive(Clone)]
pub struct SimChip {
    state: Arc<Mutex<ChipState>>,
}

impl SimChip {
    pub fn new() -> Self {
        let mut aprom = [0u8; 16];
        aprom[..6].copy_from_slice(&SIM_MAC);
        aprom[14] = 0x57;
        aprom[15] = 0x57;

        let mut state = ChipState {
            rap: 0,
            csr: [0; 128],
            bcr: [0; 32],
            aprom,
            legacy_style: false,
            never_init_done: false,
            word_accesses: 0,
            dword_accesses: 0,
            resets: 0,
            transmit_demands: 0,
            init: None,
            rx_next: 0,
            tx_next: 0,
            transmitted: Vec::new(),
        };
        state.bcr[18] = 0x9001;
        state.soft_reset();
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Strap the chip for double word I/O
    pub fn with_dwio(self) -> Self {
        self.state.lock().bcr[18] |= BCR18_DOUBLE_WORD_IO;
        self
    }

    /// Ignore software style selection, staying with 16-bit structures
    pub fn with_legacy_style(self) -> Self {
        self.state.lock().legacy_style = true;
        self
    }

    /// Never report the init block as read
    pub fn never_init_done(self) -> Self {
        self.state.lock().never_init_done = true;
        self
    }

    pub fn csr(&self, index: usize) -> u16 {
        self.state.lock().read_csr(index)
    }

    pub fn word_accesses(&self) -> usize {
        self.state.lock().word_accesses
    }

    pub fn dword_accesses(&self) -> usize {
        self.state.lock().dword_accesses
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    pub fn transmit_demands(&self) -> usize {
        self.state.lock().transmit_demands
    }

    pub fn init_block(&self) -> Option<ParsedInitBlock> {
        self.state.lock().init
    }

    /// Set CSR0 cause bits as if events had happened
    pub fn raise(&self, bits: u16) {
        self.state.lock().csr[0] |= bits & CSR0_INTERRUPT_MASK;
    }

    pub fn transmitted(&self) -> Vec<(u32, u16)> {
        self.state.lock().transmitted.clone()
    }

    pub fn rx_slot_owned_by_chip(&self, index: usize) -> bool {
        self.with_rx_desc(index, |desc| desc.is_owned())
    }

    pub fn rx_slot_length(&self, index: usize) -> u16 {
        self.with_rx_desc(index, |desc| desc.length())
    }

    /// DMA a good frame into the next receive slot
    ///
    /// Returns `false` when the slot is still owned by software.
    pub fn receive_frame(&self, data: &[u8]) -> bool {
        self.receive(data, desc_status::STP | desc_status::ENP)
    }

    pub fn receive_error_frame(&self, data: &[u8]) -> bool {
        self.receive(
            data,
            desc_status::ERR | desc_status::RX_CRC | desc_status::STP | desc_status::ENP,
        )
    }

    /// DMA the first buffer of a frame spanning several descriptors
    pub fn receive_chained(&self, data: &[u8]) -> bool {
        self.receive(data, desc_status::STP)
    }

    fn receive(&self, data: &[u8], status: u32) -> bool {
        let mut state = self.state.lock();
        let init = state.init.expect("chip not initialized");
        let index = state.rx_next;

        let accepted = with_desc(init.sw32, init.rx_base, index, |desc: &mut dyn SimRxDesc| {
            if !desc.is_owned() {
                return false;
            }
            write_phys(desc.address() as usize, data);
            desc.complete(data.len() as u32, status);
            true
        });
        if accepted {
            state.rx_next = (index + 1) % init.rx_len;
            state.csr[0] |= CSR0_RECEIVE_INTERRUPT;
        }
        accepted
    }

    /// Send up to `count` frames from the transmit ring, in ring order
    pub fn complete_transmits(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let init = state.init.expect("chip not initialized");
        let mut sent = 0;

        while sent < count {
            let index = state.tx_next;
            let done = with_tx_desc(init.sw32, init.tx_base, index, |desc| desc.transmit());
            let Some(frame) = done else {
                break;
            };
            state.transmitted.push(frame);
            state.tx_next = (index + 1) % init.tx_len;
            sent += 1;
        }

        if sent != 0 {
            state.csr[0] |= CSR0_TRANSMIT_INTERRUPT;
        }
        sent
    }

    fn with_rx_desc<R>(&self, index: usize, f: impl FnOnce(&mut dyn SimRxDesc) -> R) -> R {
        let init = self.state.lock().init.expect("chip not initialized");
        with_desc(init.sw32, init.rx_base, index, f)
    }
}

/// Chip side view of a receive descriptor
trait SimRxDesc {
    fn is_owned(&self) -> bool;
    fn address(&self) -> u32;
    fn length(&self) -> u16;
    fn complete(&mut self, length: u32, status: u32);
}

impl<D: RxDescriptor> SimRxDesc for D {
    fn is_owned(&self) -> bool {
        Descriptor::is_owned_by_hw(self)
    }

    fn address(&self) -> u32 {
        Descriptor::buffer_address(self)
    }

    fn length(&self) -> u16 {
        Descriptor::buffer_length(self)
    }

    fn complete(&mut self, length: u32, status: u32) {
        self.set_message_length(length);
        self.write_status(status);
    }
}

fn with_desc<R>(
    sw32: bool,
    base: usize,
    index: usize,
    f: impl FnOnce(&mut dyn SimRxDesc) -> R,
) -> R {
    let desc: &mut dyn SimRxDesc = if sw32 {
        unsafe { &mut *(virt_of(base + index * RxDesc32::SIZE) as *mut RxDesc32) }
    } else {
        unsafe { &mut *(virt_of(base + index * RxDesc16::SIZE) as *mut RxDesc16) }
    };
    f(desc)
}

/// Chip side view of a transmit descriptor
trait SimTxDesc {
    /// Send the frame if the slot is ready, handing it back to software
    fn transmit(&mut self) -> Option<(u32, u16)>;
}

impl<D: TxDescriptor> SimTxDesc for D {
    fn transmit(&mut self) -> Option<(u32, u16)> {
        if !self.is_owned_by_hw() {
            return None;
        }
        let frame = (self.buffer_address(), self.buffer_length());
        self.clear_status_bits(desc_status::OWN);
        Some(frame)
    }
}

fn with_tx_desc<R>(
    sw32: bool,
    base: usize,
    index: usize,
    f: impl FnOnce(&mut dyn SimTxDesc) -> R,
) -> R {
    let desc: &mut dyn SimTxDesc = if sw32 {
        unsafe { &mut *(virt_of(base + index * TxDesc32::SIZE) as *mut TxDesc32) }
    } else {
        unsafe { &mut *(virt_of(base + index * TxDesc16::SIZE) as *mut TxDesc16) }
    };
    f(desc)
}

impl ChipState {
    fn soft_reset(&mut self) {
        self.csr[0] = CSR0_STOP;
        self.csr[3] = 0;
        self.csr[4] = 0x0115;
        self.csr[15] = 0;
    }

    fn read_csr(&self, index: usize) -> u16 {
        let value = self.csr[index];
        if index == 0 && value & CSR0_INTERRUPT_MASK != 0 {
            value | CSR0_INTERRUPT
        } else {
            value
        }
    }

    fn write_csr(&mut self, index: usize, value: u16) {
        if index != 0 {
            self.csr[index] = value;
            return;
        }

        let mut csr0 = self.csr[0] & !(value & CSR0_INTERRUPT_MASK);
        csr0 = (csr0 & !CSR0_INTERRUPT_ENABLED) | (value & CSR0_INTERRUPT_ENABLED);

        if value & CSR0_STOP != 0 {
            self.csr[0] = CSR0_STOP;
            return;
        }
        if value & CSR0_INIT != 0 {
            csr0 &= !CSR0_STOP;
            csr0 |= CSR0_INIT;
            if !self.never_init_done {
                self.fetch_init_block();
                csr0 |= CSR0_INIT_DONE;
            }
        }
        if value & CSR0_START != 0 {
            csr0 &= !CSR0_STOP;
            csr0 |= CSR0_START | CSR0_RECEIVE_ON | CSR0_TRANSMIT_ON;
        }
        if value & CSR0_TRANSMIT_DEMAND != 0 {
            self.transmit_demands += 1;
        }
        self.csr[0] = csr0;
    }

    fn write_bcr(&mut self, index: usize, value: u16) {
        if index == 20 {
            if self.legacy_style {
                return;
            }
            let style = value & BCR20_SOFTWARE_STYLE_MASK;
            let size32 = if style == 2 || style == 3 {
                BCR20_SOFTWARE_SIZE_32
            } else {
                0
            };
            self.bcr[20] = style | size32;
            return;
        }
        self.bcr[index] = value;
    }

    fn fetch_init_block(&mut self) {
        let address = self.csr[1] as usize | (self.csr[2] as usize) << 16;
        let sw32 = self.bcr[20] & BCR20_SOFTWARE_SIZE_32 != 0;

        let parsed = if sw32 {
            let mode = read_phys_u32(address);
            let mac = read_phys(address + 4, 6);
            ParsedInitBlock {
                sw32,
                mac: [mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]],
                rx_base: read_phys_u32(address + 20) as usize,
                rx_len: 1 << ((mode >> 20) & 0xF),
                tx_base: read_phys_u32(address + 24) as usize,
                tx_len: 1 << ((mode >> 28) & 0xF),
            }
        } else {
            let mac = read_phys(address + 2, 6);
            let rx = read_phys_u32(address + 16);
            let tx = read_phys_u32(address + 20);
            ParsedInitBlock {
                sw32,
                mac: [mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]],
                rx_base: (rx & 0x00FF_FFFF) as usize,
                rx_len: 1 << (rx >> 29),
                tx_base: (tx & 0x00FF_FFFF) as usize,
                tx_len: 1 << (tx >> 29),
            }
        };

        self.init = Some(parsed);
        self.rx_next = 0;
        self.tx_next = 0;
    }

    fn register(&self) -> usize {
        (self.rap & 0x7F) as usize
    }
}

impl PortIo for SimChip {
    fn read8(&self, offset: usize) -> u8 {
        self.state.lock().aprom[offset & 0xF]
    }

    fn read16(&self, offset: usize) -> u16 {
        let mut state = self.state.lock();
        state.word_accesses += 1;
        match offset {
            0x10 => state.read_csr(state.register()),
            0x12 => state.rap as u16,
            0x14 => {
                state.resets += 1;
                state.soft_reset();
                0
            }
            0x16 => state.bcr[state.register() & 0x1F],
            _ => 0,
        }
    }

    fn write16(&self, offset: usize, value: u16) {
        let mut state = self.state.lock();
        state.word_accesses += 1;
        match offset {
            0x10 => {
                let index = state.register();
                state.write_csr(index, value);
            }
            0x12 => state.rap = value as u32,
            0x16 => {
                let index = state.register() & 0x1F;
                state.write_bcr(index, value);
            }
            _ => {}
        }
    }

    fn read32(&self, offset: usize) -> u32 {
        let mut state = self.state.lock();
        state.dword_accesses += 1;
        match offset {
            0x10 => state.read_csr(state.register()) as u32,
            0x14 => state.rap,
            0x18 => {
                state.resets += 1;
                state.soft_reset();
                0
            }
            0x1C => state.bcr[state.register() & 0x1F] as u32,
            _ => 0,
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock();
        state.dword_accesses += 1;
        match offset {
            0x10 => {
                let index = state.register();
                state.write_csr(index, value as u16);
            }
            0x14 => state.rap = value,
            0x1C => {
                let index = state.register() & 0x1F;
                state.write_bcr(index, value as u16);
            }
            _ => {}
        }
    }
}

/// Outbound packet with a made-up, never dereferenced, physical address
#[derive(Debug, PartialEq, Eq)]
pub struct TestPacket {
    id: usize,
    len: usize,
    phys: usize,
}

impl TestPacket {
    const PHYS_BASE: usize = 0x00C0_0000;
    const STRIDE: usize = 0x800;

    pub fn new(id: usize) -> Self {
        Self {
            id,
            len: 60 + id % 64,
            phys: Self::PHYS_BASE + id * Self::STRIDE,
        }
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    pub fn with_phys_addr(mut self, phys: usize) -> Self {
        self.phys = phys;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn id_from_phys(phys: usize) -> usize {
        (phys - Self::PHYS_BASE) / Self::STRIDE
    }
}

impl TxPacket for TestPacket {
    fn phys_addr(&self) -> PhysAddr {
        PhysAddr::from(self.phys)
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[derive(Default)]
struct StackLog {
    registrations: Vec<[u8; 6]>,
    link_events: Vec<(bool, u64)>,
    received: Vec<Vec<u8>>,
    freed: Vec<usize>,
}

/// Networking stack that records every call; clones share the record
#[derive(Clone, Default)]
pub struct RecordingStack {
    log: Arc<Mutex<StackLog>>,
    fail_registration: bool,
}

impl RecordingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_registration(mut self) -> Self {
        self.fail_registration = true;
        self
    }

    pub fn registrations(&self) -> Vec<[u8; 6]> {
        self.log.lock().registrations.clone()
    }

    pub fn link_events(&self) -> Vec<(bool, u64)> {
        self.log.lock().link_events.clone()
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.log.lock().received.clone()
    }

    /// Ids of freed packets, in the order they were freed
    pub fn freed(&self) -> Vec<usize> {
        self.log.lock().freed.clone()
    }
}

impl NetStack for RecordingStack {
    type Packet = TestPacket;

    fn register_link(&self, mac_addr: [u8; 6]) -> PcnetResult {
        if self.fail_registration {
            return Err(PcnetError::InsufficientResources);
        }
        self.log.lock().registrations.push(mac_addr);
        Ok(())
    }

    fn set_link_state(&self, active: bool, speed: u64) {
        self.log.lock().link_events.push((active, speed));
    }

    fn process_received_packet(&self, packet: RxPacket<'_>) {
        self.log.lock().received.push(packet.packet().to_vec());
    }

    fn free_transmitted_packet(&self, packet: TestPacket) {
        let mut log = self.log.lock();
        assert!(
            !log.freed.contains(&packet.id),
            "packet {} freed twice",
            packet.id
        );
        log.freed.push(packet.id);
    }
}
