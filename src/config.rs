//! Per-device configuration

use core::time::Duration;

use crate::constants::*;
use crate::types::SoftwareStyle;
use crate::{PcnetError, PcnetResult};

/// Settings fixed when the device is brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcnetConfig {
    /// Receive descriptors, a power of two
    pub rx_ring_length: usize,
    /// Transmit descriptors, a power of two
    pub tx_ring_length: usize,
    /// Queue every batch offered to `send`, however deep the queue gets
    pub disable_packet_dropping: bool,
    /// How long to wait for the chip to read the init block
    pub init_timeout: Duration,
    /// Busy-wait step while waiting for the init block to be read
    pub init_poll_interval: Duration,
}

impl Default for PcnetConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PcnetConfig {
    pub const fn new() -> Self {
        Self {
            rx_ring_length: DEFAULT_RX_RING_LENGTH,
            tx_ring_length: DEFAULT_TX_RING_LENGTH,
            disable_packet_dropping: false,
            init_timeout: Duration::from_micros(INIT_TIMEOUT_US),
            init_poll_interval: Duration::from_micros(INIT_POLL_INTERVAL_US),
        }
    }

    pub const fn with_ring_lengths(mut self, rx: usize, tx: usize) -> Self {
        self.rx_ring_length = rx;
        self.tx_ring_length = tx;
        self
    }

    pub const fn with_packet_dropping_disabled(mut self, disabled: bool) -> Self {
        self.disable_packet_dropping = disabled;
        self
    }

    pub const fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Queue depth at which new batches are refused, `None` when unlimited
    pub fn tx_queue_limit(&self) -> Option<usize> {
        if self.disable_packet_dropping {
            None
        } else {
            Some(self.tx_ring_length * TX_QUEUE_DEPTH_FACTOR)
        }
    }

    /// Number of init-done polls that fit in the timeout
    pub fn init_poll_count(&self) -> u64 {
        let step = self.init_poll_interval.as_nanos().max(1);
        (self.init_timeout.as_nanos() / step).max(1) as u64
    }

    /// Check the ring lengths against what `style` can encode
    pub fn validate(&self, style: SoftwareStyle) -> PcnetResult {
        for len in [self.rx_ring_length, self.tx_ring_length] {
            if !len.is_power_of_two() || len > style.max_ring_length() {
                error!(
                    "PCnet: ring length {} unsupported with {:?} descriptors",
                    len, style
                );
                return Err(PcnetError::InvalidParameter);
            }
        }
        Ok(())
    }
}
