// crates/canopen-rs/src/sdo/async_client.rs
//! Drives one `SdoClient` over the bus with a response timeout.
//!
//! The engine is sans-io: frames go out through a `CanInterface` passed in by
//! the caller, responses are pushed in with `handle_frame`, and the timeout is
//! a deadline checked by `tick`. When a transfer ends, the call that ended it
//! returns an `SdoCompletion`; every started transfer produces exactly one.

use crate::config::SdoConfig;
use crate::hal::{CanInterface, CanopenError};
use crate::log::{LogContext, my_debug, my_error, my_trace, my_warn};
use crate::sdo::abort::SdoAbortCode;
use crate::sdo::client::{SdoClient, SdoClientAction, SdoClientState, SdoTransferKind};
use crate::sdo::frame::SdoFrame;
use crate::sdo::request::SdoStatus;
use crate::types::NodeId;
use alloc::vec::Vec;

/// The terminal result of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdoCompletion {
    pub status: SdoStatus,
    /// Upload: the bytes received. Download: the payload, handed back.
    pub data: Vec<u8>,
}

/// Asynchronous SDO client engine for a single node.
#[derive(Debug)]
pub struct SdoAsyncClient {
    node: NodeId,
    client: SdoClient,
    running: bool,
    timeout_us: u64,
    /// Armed on every frame sent, cleared when the transfer ends.
    deadline_us: Option<u64>,
    ctx: LogContext,
}

impl SdoAsyncClient {
    pub fn new(node: NodeId, config: &SdoConfig) -> Self {
        Self {
            node,
            client: SdoClient::new(config.quirks),
            running: false,
            timeout_us: config.timeout_us(),
            deadline_us: None,
            ctx: LogContext::new("SDO", node.get()),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Protocol state of the bound (or last) transfer.
    pub fn state(&self) -> SdoClientState {
        self.client.state()
    }

    /// The time at which `tick` must be called to detect a timeout.
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadline_us
    }

    /// Binds a transfer to the engine and sends its initiate frame.
    ///
    /// `data` is ignored for uploads. A failed write is logged and left to the
    /// timeout, so the transfer still ends through the normal path.
    pub fn start(
        &mut self,
        can: &mut dyn CanInterface,
        kind: SdoTransferKind,
        index: u16,
        sub_index: u8,
        data: Vec<u8>,
        current_time_us: u64,
    ) -> Result<(), CanopenError> {
        if self.running {
            my_warn!(
                self.ctx,
                "Rejecting 0x{:04X}/{}: a transfer is already running",
                index,
                sub_index
            );
            return Err(CanopenError::AlreadyRunning);
        }
        let frame = match kind {
            SdoTransferKind::Upload => self.client.start_upload(index, sub_index),
            SdoTransferKind::Download => self.client.start_download(index, sub_index, data),
        };
        self.running = true;
        my_debug!(
            self.ctx,
            "Started {:?} of 0x{:04X}/{}",
            kind,
            index,
            sub_index
        );
        self.send(can, &frame, current_time_us);
        Ok(())
    }

    /// Feeds a response from this engine's node.
    ///
    /// Returns `NotRunning` if no transfer is bound; the frame is then dropped.
    pub fn handle_frame(
        &mut self,
        can: &mut dyn CanInterface,
        frame: &SdoFrame,
        current_time_us: u64,
    ) -> Result<Option<SdoCompletion>, CanopenError> {
        if !self.running {
            return Err(CanopenError::NotRunning);
        }
        let completion = match self.client.feed(frame) {
            SdoClientAction::Send(next) => {
                self.send(can, &next, current_time_us);
                None
            }
            SdoClientAction::Done => Some(self.complete(SdoStatus::Ok)),
            SdoClientAction::Abort(abort) => {
                self.send(can, &abort, current_time_us);
                let code = self.client.abort_code();
                Some(self.complete(SdoStatus::LocalAbort(code)))
            }
            SdoClientAction::RemoteAbort(code) => Some(self.complete(SdoStatus::RemoteAbort(code))),
            SdoClientAction::Ignored => {
                my_trace!(self.ctx, "Ignoring {:02X?}", frame.data);
                None
            }
        };
        Ok(completion)
    }

    /// Aborts the bound transfer with `TIMEOUT` once its deadline has passed.
    pub fn tick(
        &mut self,
        can: &mut dyn CanInterface,
        current_time_us: u64,
    ) -> Option<SdoCompletion> {
        match self.deadline_us {
            Some(deadline) if self.running && current_time_us >= deadline => {}
            _ => return None,
        }
        let (index, sub_index) = self.client.multiplexer();
        my_warn!(
            self.ctx,
            "No response for 0x{:04X}/{} in {:?}, aborting",
            index,
            sub_index,
            self.client.state()
        );
        let code = SdoAbortCode::Timeout.code();
        self.send(can, &SdoFrame::abort(index, sub_index, code), current_time_us);
        Some(self.complete(SdoStatus::LocalAbort(code)))
    }

    /// Stops the bound transfer without waiting for a reply.
    ///
    /// The server is told with a general-error abort; the transfer completes
    /// as `Cancelled`.
    pub fn stop(&mut self, can: &mut dyn CanInterface) -> Option<SdoCompletion> {
        if !self.running {
            return None;
        }
        let (index, sub_index) = self.client.multiplexer();
        my_debug!(self.ctx, "Stopping 0x{:04X}/{}", index, sub_index);
        let abort = SdoFrame::abort(index, sub_index, SdoAbortCode::General.code());
        if let Err(e) = can.send_frame(&abort.to_can(self.node.sdo_rx_cob_id())) {
            my_error!(self.ctx, "Failed to send abort: {:?}", e);
        }
        Some(self.complete(SdoStatus::Cancelled))
    }

    fn send(&mut self, can: &mut dyn CanInterface, frame: &SdoFrame, current_time_us: u64) {
        my_trace!(self.ctx, "Sending {:02X?}", frame.data);
        if let Err(e) = can.send_frame(&frame.to_can(self.node.sdo_rx_cob_id())) {
            my_error!(self.ctx, "Failed to send SDO frame: {:?}", e);
        }
        self.deadline_us = Some(current_time_us + self.timeout_us);
    }

    fn complete(&mut self, status: SdoStatus) -> SdoCompletion {
        self.running = false;
        self.deadline_us = None;
        SdoCompletion {
            status,
            data: self.client.take_data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::CanFrame;
    use alloc::vec;

    #[derive(Default)]
    struct RecordingBus {
        sent: Vec<CanFrame>,
    }

    impl CanInterface for RecordingBus {
        fn send_frame(&mut self, frame: &CanFrame) -> Result<(), CanopenError> {
            self.sent.push(*frame);
            Ok(())
        }
    }

    fn engine() -> SdoAsyncClient {
        let config = SdoConfig::default().with_timeout_ms(100);
        SdoAsyncClient::new(NodeId::try_from(4).unwrap(), &config)
    }

    fn response(bytes: [u8; 8]) -> SdoFrame {
        SdoFrame { data: bytes }
    }

    #[test]
    fn test_expedited_upload() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        engine
            .start(&mut bus, SdoTransferKind::Upload, 0x1017, 0, Vec::new(), 0)
            .unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.next_deadline(), Some(100_000));
        assert_eq!(bus.sent.len(), 1);
        assert_eq!(bus.sent[0].cob_id, 0x604);
        assert_eq!(bus.sent[0].data, [0x40, 0x17, 0x10, 0x00, 0, 0, 0, 0]);

        let completion = engine
            .handle_frame(&mut bus, &response([0x4B, 0x17, 0x10, 0x00, 0xE8, 0x03, 0, 0]), 10)
            .unwrap()
            .unwrap();
        assert_eq!(completion.status, SdoStatus::Ok);
        assert_eq!(completion.data, vec![0xE8, 0x03]);
        assert!(!engine.is_running());
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_already_running() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        engine
            .start(&mut bus, SdoTransferKind::Upload, 0x1000, 0, Vec::new(), 0)
            .unwrap();
        assert_eq!(
            engine.start(&mut bus, SdoTransferKind::Upload, 0x1001, 0, Vec::new(), 0),
            Err(CanopenError::AlreadyRunning)
        );
        assert_eq!(bus.sent.len(), 1);
    }

    #[test]
    fn test_frame_while_idle() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        assert_eq!(
            engine.handle_frame(&mut bus, &response([0x60, 0, 0, 0, 0, 0, 0, 0]), 0),
            Err(CanopenError::NotRunning)
        );
    }

    #[test]
    fn test_timeout_is_terminal() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        engine
            .start(&mut bus, SdoTransferKind::Upload, 0x1018, 1, Vec::new(), 1_000)
            .unwrap();
        assert_eq!(engine.tick(&mut bus, 100_999), None);

        let completion = engine.tick(&mut bus, 101_000).unwrap();
        assert_eq!(completion.status, SdoStatus::LocalAbort(0x0504_0000));
        assert_eq!(bus.sent.len(), 2);
        assert_eq!(bus.sent[1].data, [0x80, 0x18, 0x10, 0x01, 0x00, 0x00, 0x04, 0x05]);

        // Nothing more happens once the transfer is over.
        assert_eq!(engine.tick(&mut bus, 500_000), None);
        assert_eq!(bus.sent.len(), 2);
    }

    #[test]
    fn test_deadline_restarts_on_every_frame() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        engine
            .start(&mut bus, SdoTransferKind::Download, 0x2000, 0, vec![0xAA; 10], 0)
            .unwrap();
        engine
            .handle_frame(&mut bus, &response([0x60, 0x00, 0x20, 0x00, 0, 0, 0, 0]), 90_000)
            .unwrap();
        assert_eq!(engine.next_deadline(), Some(190_000));
        assert_eq!(engine.tick(&mut bus, 150_000), None);
        assert!(engine.is_running());
    }

    #[test]
    fn test_local_abort_sends_frame() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        engine
            .start(&mut bus, SdoTransferKind::Download, 0x2000, 0, vec![0xAA; 10], 0)
            .unwrap();
        // Upload response to a download request
        let completion = engine
            .handle_frame(&mut bus, &response([0x41, 0x00, 0x20, 0x00, 10, 0, 0, 0]), 5)
            .unwrap()
            .unwrap();
        assert_eq!(completion.status, SdoStatus::LocalAbort(0x0504_0001));
        assert_eq!(completion.data, vec![0xAA; 10]);
        assert!(bus.sent.last().unwrap().data[0] == 0x80);
    }

    #[test]
    fn test_remote_abort() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        engine
            .start(&mut bus, SdoTransferKind::Upload, 0x6000, 0, Vec::new(), 0)
            .unwrap();
        let abort = SdoFrame::abort(0x6000, 0, 0x0602_0000);
        let completion = engine.handle_frame(&mut bus, &abort, 5).unwrap().unwrap();
        assert_eq!(completion.status, SdoStatus::RemoteAbort(0x0602_0000));
        // No reply to a remote abort
        assert_eq!(bus.sent.len(), 1);
    }

    #[test]
    fn test_stop() {
        let mut bus = RecordingBus::default();
        let mut engine = engine();
        assert!(engine.stop(&mut bus).is_none());
        engine
            .start(&mut bus, SdoTransferKind::Upload, 0x1008, 0, Vec::new(), 0)
            .unwrap();
        let completion = engine.stop(&mut bus).unwrap();
        assert_eq!(completion.status, SdoStatus::Cancelled);
        assert!(!engine.is_running());
        assert!(bus.sent[1].data[0] == 0x80);
    }
}
