// crates/canopen-rs/tests/simulator/interface.rs
use canopen_rs::hal::{CanFrame, CanInterface, CanopenError};
use std::collections::VecDeque;

/// A simulated CAN controller that buffers transmitted frames in memory.
#[derive(Debug, Default)]
pub struct SimulatedInterface {
    /// Outgoing frames (from the master to the bus)
    tx_queue: VecDeque<CanFrame>,
    /// When set, every write fails as if the controller were bus-off.
    pub fail_writes: bool,
}

impl SimulatedInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames written but not yet taken.
    pub fn pending(&self) -> usize {
        self.tx_queue.len()
    }

    /// Extracts all pending transmitted frames.
    pub fn take_tx_frames(&mut self) -> Vec<CanFrame> {
        self.tx_queue.drain(..).collect()
    }
}

impl CanInterface for SimulatedInterface {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), CanopenError> {
        if self.fail_writes {
            return Err(CanopenError::IoError);
        }
        self.tx_queue.push_back(*frame);
        Ok(())
    }
}
