//! Driver constants
//!
//! Sizes, alignments and timing values for the PCnet32 family. Register
//! offsets and bit definitions live in [`crate::regs`].

/// Ethernet address length (MAC address)
pub const ETH_ALEN: usize = 6;

/// Default number of receive descriptors
pub const DEFAULT_RX_RING_LENGTH: usize = 32;

/// Default number of transmit descriptors
pub const DEFAULT_TX_RING_LENGTH: usize = 32;

/// Queued transmit packets allowed per transmit descriptor before new
/// batches are refused
pub const TX_QUEUE_DEPTH_FACTOR: usize = 2;

/// Largest frame the receive buffers are sized for
pub const RX_FRAME_SIZE: usize = 1518;

/// Alignment of each receive buffer inside the receive pool
pub const RX_FRAME_ALIGNMENT: usize = 16;

/// Pages per receive pool fragment
pub const RX_FRAGMENT_PAGES: usize = 4;

/// Size of a DMA page as handed out by the platform
pub const DMA_PAGE_SIZE: usize = memory_addr::PAGE_SIZE_4K;

/// Default bound on waiting for the chip to consume the init block
pub const INIT_TIMEOUT_US: u64 = 1_000_000;

/// Busy-wait step while polling for init done
pub const INIT_POLL_INTERVAL_US: u64 = 10;

/// Link speed reported to the networking stack, in bits per second
pub const LINK_SPEED_10_MBPS: u64 = 10_000_000;

/// Descriptor ring alignment, 16-bit software style
pub const RING_ALIGNMENT_16: usize = 8;

/// Descriptor ring alignment, 32-bit software style
pub const RING_ALIGNMENT_32: usize = 16;

/// Highest physical address the chip can reach in 16-bit software style
pub const MAX_DMA_ADDRESS_16: usize = 0x00FF_FFFF;

/// Highest physical address the chip can reach in 32-bit software style
pub const MAX_DMA_ADDRESS_32: usize = 0xFFFF_FFFF;

/// Largest ring the 16-bit init block can encode (log2 = 7)
pub const MAX_RING_LENGTH_16: usize = 128;

/// Largest ring the 32-bit init block can encode (log2 = 9)
pub const MAX_RING_LENGTH_32: usize = 512;
