// crates/canopen-rs/src/sdo/server.rs
//! The responder side of an SDO transfer.
//!
//! One `SdoServer` serves one transfer at a time. Each request frame yields at
//! most one reply frame; the object itself is reached through `ObjectAccess`.

use crate::config::SdoQuirks;
use crate::hal::ObjectAccess;
use crate::sdo::abort::SdoAbortCode;
use crate::sdo::frame::{
    ClientCommand, EXPEDITED_MAX_SIZE, SEGMENT_MAX_SIZE, SdoFrame, ServerCommand,
};
use alloc::vec::Vec;
use log::{debug, trace, warn};

/// Protocol state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SdoServerState {
    #[default]
    Idle,
    /// Receiving download segments.
    SegmentDownload,
    /// Sending upload segments.
    SegmentUpload,
    /// The last transfer completed. A new initiate request may follow.
    Done,
    /// The last transfer was aborted by either side.
    Aborted,
}

/// Holds the context of an ongoing segmented transfer.
#[derive(Debug, Clone, Default)]
struct SegmentedTransfer {
    index: u16,
    sub_index: u8,
    /// Toggle bit expected on the next client segment.
    toggle: bool,
    /// Upload: the object value. Download: bytes received so far.
    buffer: Vec<u8>,
    /// Upload: offset of the next byte to send.
    offset: usize,
    /// Download: size announced by the client.
    size: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SdoServer {
    state: SdoServerState,
    transfer: SegmentedTransfer,
    abort_code: u32,
    quirks: SdoQuirks,
}

impl SdoServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server pairing with clients that send empty payloads as unsized
    /// expedited frames (`SdoQuirks::unsized_expedited_is_empty`).
    pub fn with_quirks(quirks: SdoQuirks) -> Self {
        Self {
            quirks,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SdoServerState {
        self.state
    }

    /// Abort code of the last aborted transfer, 0 otherwise.
    pub fn abort_code(&self) -> u32 {
        self.abort_code
    }

    /// Drops any transfer in progress.
    pub fn reset(&mut self) {
        self.state = SdoServerState::Idle;
        self.transfer = SegmentedTransfer::default();
        self.abort_code = 0;
    }

    /// Processes one client request and returns the reply to send, if any.
    ///
    /// An initiate request always starts a new transfer, dropping a segmented
    /// one left behind by a client that timed out.
    pub fn handle_request(
        &mut self,
        request: &SdoFrame,
        od: &mut dyn ObjectAccess,
    ) -> Option<SdoFrame> {
        trace!("[SDO-SRV] Received {:02X?} in {:?}", request.data, self.state);
        if request.is_abort() {
            debug!(
                "[SDO-SRV] Client aborted 0x{:04X}/{} with {:#010x}",
                request.index(),
                request.sub_index(),
                request.abort_code()
            );
            self.reset();
            self.state = SdoServerState::Aborted;
            self.abort_code = request.abort_code();
            return None;
        }

        let reply = match ClientCommand::try_from(request.cs()) {
            Ok(ClientCommand::InitiateDownload) => self.initiate_download(request, od),
            Ok(ClientCommand::InitiateUpload) => self.initiate_upload(request, od),
            Ok(ClientCommand::DownloadSegment) => self.download_segment(request, od),
            Ok(ClientCommand::UploadSegment) => self.upload_segment(request),
            // Abort was handled above; the rest are not client commands.
            Ok(ClientCommand::Abort) | Err(_) => Err(SdoAbortCode::InvalidCs),
        };
        match reply {
            Ok(frame) => {
                trace!("[SDO-SRV] Replying {:02X?}", frame.data);
                Some(frame)
            }
            Err(code) => Some(self.abort(request, code)),
        }
    }

    fn initiate_download(
        &mut self,
        request: &SdoFrame,
        od: &mut dyn ObjectAccess,
    ) -> Result<SdoFrame, SdoAbortCode> {
        self.reset();
        let (index, sub_index) = request.multiplexer();
        let info = od
            .lookup(index, sub_index)
            .ok_or(SdoAbortCode::NoSuchObject)?;
        if !info.access.is_writable() {
            return Err(SdoAbortCode::ReadOnly);
        }

        let mut reply = SdoFrame::new();
        reply.set_cs(ServerCommand::InitiateDownload as u8);
        reply.set_multiplexer(index, sub_index);

        if request.is_expedited() {
            // Without a size indication the object's own size applies.
            let size = if request.is_size_indicated() {
                request.expedited_size()
            } else if self.quirks.unsized_expedited_is_empty {
                0
            } else {
                info.value.len().min(EXPEDITED_MAX_SIZE)
            };
            commit(od, index, sub_index, request.expedited_data(size))?;
            self.state = SdoServerState::Done;
            debug!(
                "[SDO-SRV] Expedited download to 0x{:04X}/{} ({} bytes) done",
                index, sub_index, size
            );
            return Ok(reply);
        }

        self.transfer.index = index;
        self.transfer.sub_index = sub_index;
        if request.is_size_indicated() {
            self.transfer.size = Some(request.indicated_size() as usize);
        }
        self.state = SdoServerState::SegmentDownload;
        debug!(
            "[SDO-SRV] Segmented download to 0x{:04X}/{} started (size {:?})",
            index, sub_index, self.transfer.size
        );
        Ok(reply)
    }

    fn download_segment(
        &mut self,
        request: &SdoFrame,
        od: &mut dyn ObjectAccess,
    ) -> Result<SdoFrame, SdoAbortCode> {
        if self.state != SdoServerState::SegmentDownload {
            return Err(SdoAbortCode::InvalidCs);
        }
        if request.toggle() != self.transfer.toggle {
            return Err(SdoAbortCode::Toggle);
        }
        let segment = request.segment_data();
        let received = self.transfer.buffer.len() + segment.len();
        if self.transfer.size.is_some_and(|size| received > size) {
            return Err(SdoAbortCode::LengthTooHigh);
        }
        if self.transfer.buffer.try_reserve(segment.len()).is_err() {
            return Err(SdoAbortCode::OutOfMemory);
        }
        self.transfer.buffer.extend_from_slice(segment);

        let mut reply = SdoFrame::new();
        reply.set_cs(ServerCommand::DownloadSegment as u8);
        reply.set_toggle(self.transfer.toggle);
        self.transfer.toggle = !self.transfer.toggle;

        if request.is_end_segment() {
            if self.transfer.size.is_some_and(|size| received < size) {
                return Err(SdoAbortCode::LengthTooLow);
            }
            let (index, sub_index) = (self.transfer.index, self.transfer.sub_index);
            commit(od, index, sub_index, &self.transfer.buffer)?;
            debug!(
                "[SDO-SRV] Segmented download to 0x{:04X}/{} ({} bytes) done",
                index, sub_index, received
            );
            self.transfer = SegmentedTransfer::default();
            self.state = SdoServerState::Done;
        }
        Ok(reply)
    }

    fn initiate_upload(
        &mut self,
        request: &SdoFrame,
        od: &mut dyn ObjectAccess,
    ) -> Result<SdoFrame, SdoAbortCode> {
        self.reset();
        let (index, sub_index) = request.multiplexer();
        let info = od
            .lookup(index, sub_index)
            .ok_or(SdoAbortCode::NoSuchObject)?;
        if !info.access.is_readable() {
            return Err(SdoAbortCode::WriteOnly);
        }

        let mut reply = SdoFrame::new();
        reply.set_cs(ServerCommand::InitiateUpload as u8);
        reply.set_multiplexer(index, sub_index);
        let size = info.value.len();

        // An empty object goes segmented: expedited cannot indicate 0 bytes.
        if (1..=EXPEDITED_MAX_SIZE).contains(&size) {
            reply.set_expedited(true);
            reply.set_size_indicated(true);
            reply.set_expedited_size(size);
            reply.set_expedited_data(&info.value);
            self.state = SdoServerState::Done;
            debug!(
                "[SDO-SRV] Expedited upload of 0x{:04X}/{} ({} bytes) done",
                index, sub_index, size
            );
            return Ok(reply);
        }

        reply.set_size_indicated(true);
        reply.set_indicated_size(size as u32);
        self.transfer = SegmentedTransfer {
            index,
            sub_index,
            buffer: info.value,
            ..SegmentedTransfer::default()
        };
        self.state = SdoServerState::SegmentUpload;
        debug!(
            "[SDO-SRV] Segmented upload of 0x{:04X}/{} started ({} bytes)",
            index, sub_index, size
        );
        Ok(reply)
    }

    fn upload_segment(&mut self, request: &SdoFrame) -> Result<SdoFrame, SdoAbortCode> {
        if self.state != SdoServerState::SegmentUpload {
            return Err(SdoAbortCode::InvalidCs);
        }
        if request.toggle() != self.transfer.toggle {
            return Err(SdoAbortCode::Toggle);
        }
        let start = self.transfer.offset;
        let end = (start + SEGMENT_MAX_SIZE).min(self.transfer.buffer.len());

        let mut reply = SdoFrame::new();
        reply.set_cs(ServerCommand::UploadSegment as u8);
        reply.set_toggle(self.transfer.toggle);
        reply.set_segment_data(&self.transfer.buffer[start..end]);
        self.transfer.offset = end;
        self.transfer.toggle = !self.transfer.toggle;

        if end >= self.transfer.buffer.len() {
            reply.set_end_segment(true);
            debug!(
                "[SDO-SRV] Segmented upload of 0x{:04X}/{} done",
                self.transfer.index, self.transfer.sub_index
            );
            self.transfer = SegmentedTransfer::default();
            self.state = SdoServerState::Done;
        }
        Ok(reply)
    }

    fn abort(&mut self, request: &SdoFrame, code: SdoAbortCode) -> SdoFrame {
        // Segment requests carry no multiplexer; report the one being served.
        let (index, sub_index) = match self.state {
            SdoServerState::SegmentDownload | SdoServerState::SegmentUpload => {
                (self.transfer.index, self.transfer.sub_index)
            }
            _ => request.multiplexer(),
        };
        warn!(
            "[SDO-SRV] Aborting 0x{:04X}/{}: {}",
            index, sub_index, code
        );
        self.transfer = SegmentedTransfer::default();
        self.state = SdoServerState::Aborted;
        self.abort_code = code.code();
        SdoFrame::abort(index, sub_index, code.code())
    }
}

fn commit(
    od: &mut dyn ObjectAccess,
    index: u16,
    sub_index: u8,
    data: &[u8],
) -> Result<(), SdoAbortCode> {
    od.commit(index, sub_index, data).map_err(|code| {
        warn!(
            "[SDO-SRV] Commit of 0x{:04X}/{} refused with {:#010x}",
            index, sub_index, code
        );
        SdoAbortCode::try_from(code).unwrap_or(SdoAbortCode::CantStore)
    })
}
