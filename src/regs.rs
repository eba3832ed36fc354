/// I/O window offsets in word I/O (WIO, 16-bit) mode
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WioPort {
    Aprom = 0x00, // Station address PROM, byte addressable
    RegisterData = 0x10,
    RegisterAddress = 0x12,
    Reset = 0x14,
    BusData = 0x16,
}

/// I/O window offsets in double word I/O (DWIO, 32-bit) mode
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwioPort {
    Aprom = 0x00,
    RegisterData = 0x10,
    RegisterAddress = 0x14,
    Reset = 0x18,
    BusData = 0x1C,
}

/// Control and status registers used by the driver
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcnetCsr {
    Status = 0,
    InitBlockAddress0 = 1,
    InitBlockAddress1 = 2,
    InterruptMask = 3,
    FeatureControl = 4,
    Mode = 15,
}

/// Bus configuration registers used by the driver
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcnetBcr {
    BusControl = 18,
    SoftwareStyle = 20,
}

/// Register content bit definitions
#[allow(dead_code)]
pub mod register_bits {
    // CSR0 status bits. Cause bits are write-1-to-clear, IENA is write-0-to-clear.
    pub const CSR0_ERROR: u16 = 0x8000;
    pub const CSR0_BABBLE: u16 = 0x4000;
    pub const CSR0_COLLISION_ERROR: u16 = 0x2000;
    pub const CSR0_MISSED_FRAME: u16 = 0x1000;
    pub const CSR0_MEMORY_ERROR: u16 = 0x0800;
    pub const CSR0_RECEIVE_INTERRUPT: u16 = 0x0400;
    pub const CSR0_TRANSMIT_INTERRUPT: u16 = 0x0200;
    pub const CSR0_INIT_DONE: u16 = 0x0100;
    pub const CSR0_INTERRUPT: u16 = 0x0080;
    pub const CSR0_INTERRUPT_ENABLED: u16 = 0x0040;
    pub const CSR0_RECEIVE_ON: u16 = 0x0020;
    pub const CSR0_TRANSMIT_ON: u16 = 0x0010;
    pub const CSR0_TRANSMIT_DEMAND: u16 = 0x0008;
    pub const CSR0_STOP: u16 = 0x0004;
    pub const CSR0_START: u16 = 0x0002;
    pub const CSR0_INIT: u16 = 0x0001;

    /// Every CSR0 bit that can raise an interrupt
    pub const CSR0_INTERRUPT_MASK: u16 = CSR0_BABBLE
        | CSR0_COLLISION_ERROR
        | CSR0_MISSED_FRAME
        | CSR0_MEMORY_ERROR
        | CSR0_RECEIVE_INTERRUPT
        | CSR0_TRANSMIT_INTERRUPT
        | CSR0_INIT_DONE;

    // CSR4 feature control
    pub const CSR4_AUTO_PAD_TRANSMIT: u16 = 0x0800;
    pub const CSR4_AUTO_STRIP_RECEIVE: u16 = 0x0400;
    pub const CSR4_TRANSMIT_START_MASK: u16 = 0x0008;

    // BCR18 bus control
    pub const BCR18_DOUBLE_WORD_IO: u16 = 0x0080;

    // BCR20 software style
    pub const BCR20_SOFTWARE_STYLE_MASK: u16 = 0x00FF;
    pub const BCR20_SOFTWARE_STYLE_SHIFT: u16 = 0;
    pub const BCR20_SOFTWARE_STYLE_LANCE: u16 = 0;
    pub const BCR20_SOFTWARE_STYLE_PCNET_PCI: u16 = 2;
    pub const BCR20_SOFTWARE_SIZE_32: u16 = 0x0100;
}

/// Descriptor status bits, shared by the 16-bit and 32-bit layouts
#[allow(dead_code)]
pub mod desc_status {
    pub const OWN: u32 = 0x8000_0000;
    pub const ERR: u32 = 0x4000_0000;
    pub const STP: u32 = 0x0200_0000;
    pub const ENP: u32 = 0x0100_0000;

    // Receive error detail
    pub const RX_FRAMING: u32 = 0x2000_0000;
    pub const RX_OVERFLOW: u32 = 0x1000_0000;
    pub const RX_CRC: u32 = 0x0800_0000;
    pub const RX_BUFFER: u32 = 0x0400_0000;

    // Transmit control
    pub const TX_ADD_FCS: u32 = 0x2000_0000;
    pub const TX_MORE: u32 = 0x1000_0000;
    pub const TX_ONE: u32 = 0x0800_0000;
    pub const TX_DEFERRED: u32 = 0x0400_0000;

    /// Byte count and message count width
    pub const LENGTH_MASK: u32 = 0x0FFF;
}

/// Initialization block mode bits (CSR15 image)
#[allow(dead_code)]
pub mod init_mode {
    pub const DISABLE_RECEIVE: u16 = 0x0001;
    pub const DISABLE_TRANSMIT: u16 = 0x0002;
    pub const PROMISCUOUS: u16 = 0x8000;

    pub const INIT16_RING_LENGTH_SHIFT: u32 = 29;
    pub const INIT16_RING_LENGTH_MASK: u32 = 0xE000_0000;
    pub const INIT16_ADDRESS_MASK: u32 = 0x00FF_FFFF;

    pub const INIT32_RECEIVE_RING_LENGTH_SHIFT: u32 = 20;
    pub const INIT32_RECEIVE_RING_LENGTH_MASK: u32 = 0x00F0_0000;
    pub const INIT32_TRANSMIT_RING_LENGTH_SHIFT: u32 = 28;
    pub const INIT32_TRANSMIT_RING_LENGTH_MASK: u32 = 0xF000_0000;
}
