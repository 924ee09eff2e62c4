//! Bridge configuration.

use std::time::Duration;

/// Tunables for the bridge's buffering and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Window per host read call; also the read-ahead/input-queue capacity
    /// and the write-readiness threshold for the pending-output buffer.
    pub read_chunk: usize,
    /// Capacity of the single-packet datagram receive buffer.
    pub recv_capacity: usize,
    /// Delay before a flush task reschedules itself when a host write is
    /// already in flight. Nonzero so the event loop is not busy-rescheduled.
    pub write_retry: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_chunk: 64 * 1024,
            recv_capacity: 64 * 1024,
            write_retry: Duration::from_millis(1),
        }
    }
}
