// crates/canopen-rs/src/config.rs
//! Static configuration of the SDO master: queue depth, transfer timeout and
//! per-engine protocol quirks for non-conformant devices.

/// Default number of requests that may wait in one node's queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Default time a transfer may wait for each server response.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Deviations from CiA 301 tolerated by the SDO client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdoQuirks {
    /// Do not check that responses echo the requested index/subindex.
    pub ignore_multiplexer: bool,
    /// Read an expedited frame without the size-indicated bit as carrying no
    /// data. By default the size is unspecified and all 4 bytes are taken
    /// (upload) or the object's own size up to 4 bytes (download).
    pub unsized_expedited_is_empty: bool,
}

/// Configuration shared by every per-node request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdoConfig {
    /// Maximum number of requests waiting in one node's queue, excluding the active one.
    pub queue_depth: usize,
    /// Per-response timeout in milliseconds. Expiry aborts the transfer.
    pub timeout_ms: u32,
    pub quirks: SdoQuirks,
}

impl Default for SdoConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            quirks: SdoQuirks::default(),
        }
    }
}

impl SdoConfig {
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_quirks(mut self, quirks: SdoQuirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// Transfer timeout in microseconds, the time base of the engine.
    pub fn timeout_us(&self) -> u64 {
        self.timeout_ms as u64 * 1000
    }
}
