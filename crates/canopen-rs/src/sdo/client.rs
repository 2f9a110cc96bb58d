// crates/canopen-rs/src/sdo/client.rs
//! The client side of an SDO transfer as a pure state machine.
//!
//! The machine never touches the network or a clock: `start_*` returns the
//! first frame to send and `feed` turns each server response into the next
//! action. The async engine (`async_client`) owns the timer and the socket.

use crate::config::SdoQuirks;
use crate::sdo::abort::SdoAbortCode;
use crate::sdo::frame::{
    ClientCommand, EXPEDITED_MAX_SIZE, SEGMENT_MAX_SIZE, SdoFrame, ServerCommand,
};
use alloc::vec::Vec;
use log::{debug, trace, warn};

/// Direction of an SDO transfer, seen from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SdoTransferKind {
    /// Read an object from the server.
    #[default]
    Upload,
    /// Write an object to the server.
    Download,
}

/// Protocol state of a client transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SdoClientState {
    /// No transfer started since the last reset.
    #[default]
    Idle,
    /// Waiting for the response to a non-expedited initiate request.
    Init,
    /// Waiting for the response to an expedited initiate download.
    InitExpedited,
    /// Exchanging segments; the toggle bit alternates on every round trip.
    Segment,
    /// Waiting for the server to confirm the final download segment.
    EndSegment,
    Done,
    /// A protocol violation was detected locally.
    Aborted,
    /// The server sent an abort.
    RemoteAbort,
}

impl SdoClientState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::RemoteAbort)
    }
}

/// What the owner of the machine must do after a call to `feed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoClientAction {
    /// Send the frame and wait for the next response.
    Send(SdoFrame),
    /// The transfer completed successfully.
    Done,
    /// A violation was detected; send the abort frame. The transfer is over.
    Abort(SdoFrame),
    /// The server aborted the transfer with the given code.
    RemoteAbort(u32),
    /// The frame does not belong to a running transfer.
    Ignored,
}

/// State of one client-side SDO transfer. Reset at every `start_*`.
#[derive(Debug, Clone, Default)]
pub struct SdoClient {
    state: SdoClientState,
    kind: SdoTransferKind,
    index: u16,
    sub_index: u8,
    /// Toggle bit of the next segment frame we send.
    toggle: bool,
    /// Download: bytes already sent. Upload: bytes already received.
    pos: usize,
    /// Size announced by the server on upload, or by us on download.
    indicated_size: Option<usize>,
    buffer: Vec<u8>,
    abort_code: u32,
    quirks: SdoQuirks,
}

impl SdoClient {
    pub fn new(quirks: SdoQuirks) -> Self {
        Self {
            quirks,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SdoClientState {
        self.state
    }

    pub fn kind(&self) -> SdoTransferKind {
        self.kind
    }

    pub fn multiplexer(&self) -> (u16, u8) {
        (self.index, self.sub_index)
    }

    /// Abort code of an `Aborted` or `RemoteAbort` transfer, 0 otherwise.
    pub fn abort_code(&self) -> u32 {
        self.abort_code
    }

    /// Bytes received so far on upload, or the payload being downloaded.
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Moves the payload buffer out of the machine.
    pub fn take_data(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.buffer)
    }

    fn reset(&mut self, kind: SdoTransferKind, index: u16, sub_index: u8, buffer: Vec<u8>) {
        self.kind = kind;
        self.index = index;
        self.sub_index = sub_index;
        self.toggle = false;
        self.pos = 0;
        self.indicated_size = None;
        self.buffer = buffer;
        self.abort_code = 0;
    }

    /// Starts writing `data` to `index`/`sub_index` and returns the initiate frame.
    ///
    /// Payloads of up to 4 bytes (including empty ones) go expedited in the
    /// initiate frame itself; larger ones announce their size and follow in segments.
    pub fn start_download(&mut self, index: u16, sub_index: u8, data: Vec<u8>) -> SdoFrame {
        let size = data.len();
        self.reset(SdoTransferKind::Download, index, sub_index, data);

        let mut frame = SdoFrame::new();
        frame.set_cs(ClientCommand::InitiateDownload as u8);
        frame.set_multiplexer(index, sub_index);
        if size <= EXPEDITED_MAX_SIZE {
            frame.set_expedited(true);
            // A 2-bit `4 - n` code cannot express 0 bytes; leave the size unindicated.
            if size > 0 {
                frame.set_size_indicated(true);
                frame.set_expedited_size(size);
                frame.set_expedited_data(&self.buffer);
            }
            self.pos = size;
            self.state = SdoClientState::InitExpedited;
        } else {
            frame.set_size_indicated(true);
            frame.set_indicated_size(size as u32);
            self.indicated_size = Some(size);
            self.state = SdoClientState::Init;
        }
        debug!(
            "[SDO] Client: initiate download 0x{:04X}/{} ({} bytes, {:?})",
            index, sub_index, size, self.state
        );
        frame
    }

    /// Starts reading `index`/`sub_index` and returns the initiate frame.
    pub fn start_upload(&mut self, index: u16, sub_index: u8) -> SdoFrame {
        self.reset(SdoTransferKind::Upload, index, sub_index, Vec::new());
        self.state = SdoClientState::Init;

        let mut frame = SdoFrame::new();
        frame.set_cs(ClientCommand::InitiateUpload as u8);
        frame.set_multiplexer(index, sub_index);
        debug!("[SDO] Client: initiate upload 0x{:04X}/{}", index, sub_index);
        frame
    }

    /// Advances the transfer with one server response.
    pub fn feed(&mut self, frame: &SdoFrame) -> SdoClientAction {
        trace!("[SDO] Client: received {:02X?} in {:?}", frame.data, self.state);
        match self.state {
            SdoClientState::Idle
            | SdoClientState::Done
            | SdoClientState::Aborted
            | SdoClientState::RemoteAbort => return SdoClientAction::Ignored,
            _ => {}
        }

        if frame.is_abort() {
            self.abort_code = frame.abort_code();
            self.state = SdoClientState::RemoteAbort;
            warn!(
                "[SDO] Client: server aborted 0x{:04X}/{} with {:#010x}",
                self.index, self.sub_index, self.abort_code
            );
            return SdoClientAction::RemoteAbort(self.abort_code);
        }

        match (self.state, self.kind) {
            (SdoClientState::InitExpedited, _) => {
                if let Err(code) = self.expect_initiate(frame, ServerCommand::InitiateDownload) {
                    return self.abort(code);
                }
                self.complete()
            }
            (SdoClientState::Init, SdoTransferKind::Download) => {
                if let Err(code) = self.expect_initiate(frame, ServerCommand::InitiateDownload) {
                    return self.abort(code);
                }
                SdoClientAction::Send(self.next_download_segment())
            }
            (SdoClientState::Init, SdoTransferKind::Upload) => {
                if let Err(code) = self.expect_initiate(frame, ServerCommand::InitiateUpload) {
                    return self.abort(code);
                }
                self.handle_upload_initiate(frame)
            }
            (SdoClientState::Segment, SdoTransferKind::Download)
            | (SdoClientState::EndSegment, SdoTransferKind::Download) => {
                if let Err(code) = self.expect_segment(frame, ServerCommand::DownloadSegment) {
                    return self.abort(code);
                }
                self.toggle = !self.toggle;
                if self.state == SdoClientState::EndSegment {
                    self.complete()
                } else {
                    SdoClientAction::Send(self.next_download_segment())
                }
            }
            (SdoClientState::Segment, SdoTransferKind::Upload) => {
                if let Err(code) = self.expect_segment(frame, ServerCommand::UploadSegment) {
                    return self.abort(code);
                }
                self.toggle = !self.toggle;
                self.handle_upload_segment(frame)
            }
            // Upload never waits in EndSegment: the end bit arrives on the server's segment.
            (SdoClientState::EndSegment, SdoTransferKind::Upload) => self.abort(SdoAbortCode::General),
            _ => SdoClientAction::Ignored,
        }
    }

    fn expect_initiate(
        &self,
        frame: &SdoFrame,
        expected: ServerCommand,
    ) -> Result<(), SdoAbortCode> {
        if frame.cs() != expected as u8 {
            return Err(SdoAbortCode::InvalidCs);
        }
        if !self.quirks.ignore_multiplexer && frame.multiplexer() != (self.index, self.sub_index) {
            warn!(
                "[SDO] Client: response for 0x{:04X}/{} while addressing 0x{:04X}/{}",
                frame.index(),
                frame.sub_index(),
                self.index,
                self.sub_index
            );
            return Err(SdoAbortCode::General);
        }
        Ok(())
    }

    fn expect_segment(&self, frame: &SdoFrame, expected: ServerCommand) -> Result<(), SdoAbortCode> {
        if frame.cs() != expected as u8 {
            return Err(SdoAbortCode::InvalidCs);
        }
        if frame.toggle() != self.toggle {
            return Err(SdoAbortCode::Toggle);
        }
        Ok(())
    }

    fn handle_upload_initiate(&mut self, frame: &SdoFrame) -> SdoClientAction {
        if frame.is_expedited() {
            let size = if frame.is_size_indicated() {
                frame.expedited_size()
            } else if self.quirks.unsized_expedited_is_empty {
                0
            } else {
                EXPEDITED_MAX_SIZE
            };
            self.buffer.extend_from_slice(frame.expedited_data(size));
            self.pos = size;
            return self.complete();
        }

        // The announced size is only checked against; the buffer grows per segment.
        if frame.is_size_indicated() {
            self.indicated_size = Some(frame.indicated_size() as usize);
        }
        self.state = SdoClientState::Segment;
        SdoClientAction::Send(self.upload_segment_request())
    }

    fn handle_upload_segment(&mut self, frame: &SdoFrame) -> SdoClientAction {
        let segment = frame.segment_data();
        if let Some(size) = self.indicated_size {
            if self.pos + segment.len() > size {
                return self.abort(SdoAbortCode::LengthTooHigh);
            }
        }
        if self.buffer.try_reserve(segment.len()).is_err() {
            return self.abort(SdoAbortCode::OutOfMemory);
        }
        self.buffer.extend_from_slice(segment);
        self.pos += segment.len();

        if !frame.is_end_segment() {
            return SdoClientAction::Send(self.upload_segment_request());
        }
        match self.indicated_size {
            Some(size) if self.pos < size => self.abort(SdoAbortCode::LengthTooLow),
            _ => self.complete(),
        }
    }

    fn upload_segment_request(&self) -> SdoFrame {
        let mut frame = SdoFrame::new();
        frame.set_cs(ClientCommand::UploadSegment as u8);
        frame.set_toggle(self.toggle);
        frame
    }

    fn next_download_segment(&mut self) -> SdoFrame {
        let end = (self.pos + SEGMENT_MAX_SIZE).min(self.buffer.len());
        let mut frame = SdoFrame::new();
        frame.set_cs(ClientCommand::DownloadSegment as u8);
        frame.set_toggle(self.toggle);
        frame.set_segment_data(&self.buffer[self.pos..end]);
        self.pos = end;

        let last = self.pos >= self.buffer.len();
        frame.set_end_segment(last);
        self.state = if last {
            SdoClientState::EndSegment
        } else {
            SdoClientState::Segment
        };
        frame
    }

    fn complete(&mut self) -> SdoClientAction {
        self.state = SdoClientState::Done;
        debug!(
            "[SDO] Client: {:?} of 0x{:04X}/{} done ({} bytes)",
            self.kind, self.index, self.sub_index, self.pos
        );
        SdoClientAction::Done
    }

    fn abort(&mut self, code: SdoAbortCode) -> SdoClientAction {
        self.state = SdoClientState::Aborted;
        self.abort_code = code.code();
        warn!(
            "[SDO] Client: aborting 0x{:04X}/{}: {}",
            self.index, self.sub_index, code
        );
        SdoClientAction::Abort(SdoFrame::abort(self.index, self.sub_index, code.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn response(cs: ServerCommand, index: u16, sub: u8) -> SdoFrame {
        let mut frame = SdoFrame::new();
        frame.set_cs(cs as u8);
        frame.set_multiplexer(index, sub);
        frame
    }

    fn segment_ack(toggle: bool) -> SdoFrame {
        let mut frame = SdoFrame::new();
        frame.set_cs(ServerCommand::DownloadSegment as u8);
        frame.set_toggle(toggle);
        frame
    }

    fn upload_segment(toggle: bool, data: &[u8], end: bool) -> SdoFrame {
        let mut frame = SdoFrame::new();
        frame.set_cs(ServerCommand::UploadSegment as u8);
        frame.set_toggle(toggle);
        frame.set_segment_data(data);
        frame.set_end_segment(end);
        frame
    }

    #[test]
    fn test_expedited_download() {
        let mut client = SdoClient::default();
        let init = client.start_download(0x1017, 0, vec![0xE8, 0x03]);
        assert_eq!(init.data, [0x2B, 0x17, 0x10, 0x00, 0xE8, 0x03, 0x00, 0x00]);
        assert_eq!(client.state(), SdoClientState::InitExpedited);

        let action = client.feed(&response(ServerCommand::InitiateDownload, 0x1017, 0));
        assert_eq!(action, SdoClientAction::Done);
        assert_eq!(client.state(), SdoClientState::Done);
    }

    #[test]
    fn test_empty_download_is_expedited_without_size() {
        let mut client = SdoClient::default();
        let init = client.start_download(0x2000, 1, Vec::new());
        assert!(init.is_expedited());
        assert!(!init.is_size_indicated());
        assert_eq!(client.state(), SdoClientState::InitExpedited);
    }

    #[test]
    fn test_eight_byte_download_uses_two_segments() {
        let mut client = SdoClient::default();
        let init = client.start_download(0x2000, 0, (1..=8).collect());
        assert!(!init.is_expedited());
        assert!(init.is_size_indicated());
        assert_eq!(init.indicated_size(), 8);
        assert_eq!(client.state(), SdoClientState::Init);

        let SdoClientAction::Send(first) =
            client.feed(&response(ServerCommand::InitiateDownload, 0x2000, 0))
        else {
            panic!("expected first segment");
        };
        assert_eq!(first.cs(), ClientCommand::DownloadSegment as u8);
        assert!(!first.toggle());
        assert_eq!(first.segment_data(), &[1, 2, 3, 4, 5, 6, 7]);
        assert!(!first.is_end_segment());

        let SdoClientAction::Send(second) = client.feed(&segment_ack(false)) else {
            panic!("expected second segment");
        };
        assert!(second.toggle());
        assert_eq!(second.segment_data(), &[8]);
        assert!(second.is_end_segment());
        assert_eq!(client.state(), SdoClientState::EndSegment);

        assert_eq!(client.feed(&segment_ack(true)), SdoClientAction::Done);
    }

    #[test]
    fn test_wrong_toggle_aborts() {
        let mut client = SdoClient::default();
        client.start_download(0x2000, 0, vec![0; 20]);
        client.feed(&response(ServerCommand::InitiateDownload, 0x2000, 0));

        let action = client.feed(&segment_ack(true));
        let SdoClientAction::Abort(frame) = action else {
            panic!("expected abort, got {:?}", action);
        };
        assert_eq!(frame.abort_code(), SdoAbortCode::Toggle as u32);
        assert_eq!(frame.multiplexer(), (0x2000, 0));
        assert_eq!(client.state(), SdoClientState::Aborted);
        assert_eq!(client.feed(&segment_ack(false)), SdoClientAction::Ignored);
    }

    #[test]
    fn test_wrong_toggle_on_later_segment_aborts() {
        let mut client = SdoClient::default();
        client.start_download(0x2000, 0, vec![0x5A; 30]);
        client.feed(&response(ServerCommand::InitiateDownload, 0x2000, 0));
        assert!(matches!(client.feed(&segment_ack(false)), SdoClientAction::Send(_)));
        assert!(matches!(client.feed(&segment_ack(true)), SdoClientAction::Send(_)));

        // Third ack must carry toggle 0 again.
        let action = client.feed(&segment_ack(true));
        assert!(matches!(action, SdoClientAction::Abort(f) if f.abort_code() == 0x0503_0000));
        assert_eq!(client.state(), SdoClientState::Aborted);
        assert_eq!(client.abort_code(), SdoAbortCode::Toggle.code());
    }

    #[test]
    fn test_wrong_command_specifier_aborts() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let action = client.feed(&response(ServerCommand::InitiateDownload, 0x1008, 0));
        assert!(matches!(action, SdoClientAction::Abort(f) if f.abort_code() == 0x0504_0001));
    }

    #[test]
    fn test_remote_abort_captures_code() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let abort = SdoFrame::abort(0x1008, 0, 0x0602_0000);
        assert_eq!(client.feed(&abort), SdoClientAction::RemoteAbort(0x0602_0000));
        assert_eq!(client.state(), SdoClientState::RemoteAbort);
        assert_eq!(client.abort_code(), 0x0602_0000);
    }

    #[test]
    fn test_multiplexer_echo_is_checked_unless_quirked() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let mut reply = response(ServerCommand::InitiateUpload, 0x1009, 0);
        reply.set_expedited(true);
        reply.set_size_indicated(true);
        reply.set_expedited_size(1);
        assert!(matches!(client.feed(&reply), SdoClientAction::Abort(_)));

        let mut client = SdoClient::new(SdoQuirks {
            ignore_multiplexer: true,
            ..SdoQuirks::default()
        });
        client.start_upload(0x1008, 0);
        assert_eq!(client.feed(&reply), SdoClientAction::Done);
    }

    #[test]
    fn test_segmented_upload() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let mut reply = response(ServerCommand::InitiateUpload, 0x1008, 0);
        reply.set_size_indicated(true);
        reply.set_indicated_size(10);

        let SdoClientAction::Send(req) = client.feed(&reply) else {
            panic!("expected segment request");
        };
        assert_eq!(req.cs(), ClientCommand::UploadSegment as u8);
        assert!(!req.toggle());

        let SdoClientAction::Send(req) = client.feed(&upload_segment(false, b"canopen", false))
        else {
            panic!("expected segment request");
        };
        assert!(req.toggle());
        assert_eq!(client.feed(&upload_segment(true, b"-rs", true)), SdoClientAction::Done);
        assert_eq!(client.take_data(), b"canopen-rs".to_vec());
    }

    #[test]
    fn test_upload_length_checks() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let mut reply = response(ServerCommand::InitiateUpload, 0x1008, 0);
        reply.set_size_indicated(true);
        reply.set_indicated_size(5);
        client.feed(&reply);
        let action = client.feed(&upload_segment(false, b"toolong", true));
        assert!(matches!(action, SdoClientAction::Abort(f) if f.abort_code() == 0x0607_0012));

        client.start_upload(0x1008, 0);
        client.feed(&reply);
        let action = client.feed(&upload_segment(false, b"abc", true));
        assert!(matches!(action, SdoClientAction::Abort(f) if f.abort_code() == 0x0607_0013));
    }

    #[test]
    fn test_end_bit_terminates_upload_without_indicated_size() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let reply = response(ServerCommand::InitiateUpload, 0x1008, 0);
        assert!(matches!(client.feed(&reply), SdoClientAction::Send(_)));
        assert_eq!(client.feed(&upload_segment(false, b"ab", true)), SdoClientAction::Done);
        assert_eq!(client.data(), b"ab");
    }

    #[test]
    fn test_unsized_expedited_upload() {
        let mut reply = response(ServerCommand::InitiateUpload, 0x1018, 1);
        reply.set_expedited(true);
        reply.set_expedited_data(&[0x78, 0x56, 0x34, 0x12]);

        let mut client = SdoClient::default();
        client.start_upload(0x1018, 1);
        assert_eq!(client.feed(&reply), SdoClientAction::Done);
        assert_eq!(client.data(), &[0x78, 0x56, 0x34, 0x12]);

        let mut client = SdoClient::new(SdoQuirks {
            unsized_expedited_is_empty: true,
            ..SdoQuirks::default()
        });
        client.start_upload(0x1018, 1);
        assert_eq!(client.feed(&reply), SdoClientAction::Done);
        assert!(client.data().is_empty());
    }

    #[test]
    fn test_huge_indicated_size_is_not_preallocated() {
        let mut client = SdoClient::default();
        client.start_upload(0x1008, 0);
        let mut reply = response(ServerCommand::InitiateUpload, 0x1008, 0);
        reply.set_size_indicated(true);
        reply.set_indicated_size(u32::MAX);

        assert!(matches!(client.feed(&reply), SdoClientAction::Send(_)));
        assert_eq!(client.state(), SdoClientState::Segment);
        assert!(client.buffer.capacity() <= SEGMENT_MAX_SIZE);

        assert!(matches!(
            client.feed(&upload_segment(false, b"abc", false)),
            SdoClientAction::Send(_)
        ));
        assert!(client.buffer.capacity() < 64);

        // The announced size still bounds the transfer.
        let action = client.feed(&upload_segment(true, b"de", true));
        assert!(matches!(action, SdoClientAction::Abort(f) if f.abort_code() == 0x0607_0013));
    }
}
