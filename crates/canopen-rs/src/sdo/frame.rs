// crates/canopen-rs/src/sdo/frame.rs
//! Bit-level accessors for the 8-byte SDO payload.
//!
//! Byte 0 is the command byte:
//!
//! | bits | initiate frames              | segment frames           |
//! |------|------------------------------|--------------------------|
//! | 7-5  | command specifier            | command specifier        |
//! | 4    | -                            | toggle                   |
//! | 3-2  | `4 - n` (expedited size)     | `7 - n` (bits 3-1)       |
//! | 1    | expedited                    |                          |
//! | 0    | size indicated               | no more segments         |
//!
//! Bytes 1-2 hold the index (little-endian), byte 3 the subindex. Bytes 4-7
//! hold the indicated size, the expedited data or the abort code. Segment
//! frames carry up to 7 data bytes starting at byte 1.
//! (Reference: CiA 301, Section 7.2.4.3)

use crate::CanopenError;
use crate::hal::CanFrame;

/// Size of every SDO CAN payload.
pub const SDO_FRAME_LEN: usize = 8;
/// Maximum payload of an expedited transfer.
pub const EXPEDITED_MAX_SIZE: usize = 4;
/// Maximum payload of one segment.
pub const SEGMENT_MAX_SIZE: usize = 7;

const CS_SHIFT: u8 = 5;
const CS_MASK: u8 = 0b111;
const TOGGLE_BIT: u8 = 1 << 4;
const EXPEDITED_BIT: u8 = 1 << 1;
const SIZE_INDICATED_BIT: u8 = 1 << 0;
const END_SEGMENT_BIT: u8 = 1 << 0;
const SEGMENT_SIZE_SHIFT: u8 = 1;
const SEGMENT_SIZE_MASK: u8 = 0b111;
const EXPEDITED_SIZE_SHIFT: u8 = 2;
const EXPEDITED_SIZE_MASK: u8 = 0b11;

const MUX_OFFSET: usize = 1;
const DATA_OFFSET: usize = 4;
const SEGMENT_DATA_OFFSET: usize = 1;

/// Command specifiers sent by the client (CCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientCommand {
    DownloadSegment = 0,
    InitiateDownload = 1,
    InitiateUpload = 2,
    UploadSegment = 3,
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = CanopenError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::DownloadSegment),
            1 => Ok(Self::InitiateDownload),
            2 => Ok(Self::InitiateUpload),
            3 => Ok(Self::UploadSegment),
            4 => Ok(Self::Abort),
            _ => Err(CanopenError::InvalidCommandSpecifier(value)),
        }
    }
}

/// Command specifiers sent by the server (SCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerCommand {
    UploadSegment = 0,
    DownloadSegment = 1,
    InitiateUpload = 2,
    InitiateDownload = 3,
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = CanopenError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::UploadSegment),
            1 => Ok(Self::DownloadSegment),
            2 => Ok(Self::InitiateUpload),
            3 => Ok(Self::InitiateDownload),
            4 => Ok(Self::Abort),
            _ => Err(CanopenError::InvalidCommandSpecifier(value)),
        }
    }
}

/// Command specifier value shared by both directions for an abort.
pub const CS_ABORT: u8 = 4;

/// One SDO payload. All setters assume their value is in range; the state
/// machines are the only writers and never violate that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdoFrame {
    pub data: [u8; SDO_FRAME_LEN],
}

impl SdoFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts the SDO payload from a received CAN frame. Short frames are
    /// zero-padded; an empty frame has no command byte and is rejected.
    pub fn from_can(frame: &CanFrame) -> Result<Self, CanopenError> {
        let payload = frame.payload();
        if payload.is_empty() {
            return Err(CanopenError::BufferTooShort);
        }
        let mut data = [0u8; SDO_FRAME_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self { data })
    }

    /// Wraps the payload in a full-length CAN frame.
    pub fn to_can(&self, cob_id: u16) -> CanFrame {
        CanFrame {
            cob_id,
            dlc: SDO_FRAME_LEN as u8,
            data: self.data,
        }
    }

    /// Builds an abort frame for the given multiplexer.
    pub fn abort(index: u16, sub_index: u8, code: u32) -> Self {
        let mut frame = Self::new();
        frame.set_cs(CS_ABORT);
        frame.set_multiplexer(index, sub_index);
        frame.set_abort_code(code);
        frame
    }

    // --- Command byte ---

    pub fn cs(&self) -> u8 {
        (self.data[0] >> CS_SHIFT) & CS_MASK
    }

    pub fn set_cs(&mut self, cs: u8) {
        self.data[0] = (self.data[0] & !(CS_MASK << CS_SHIFT)) | ((cs & CS_MASK) << CS_SHIFT);
    }

    pub fn is_abort(&self) -> bool {
        self.cs() == CS_ABORT
    }

    pub fn toggle(&self) -> bool {
        self.data[0] & TOGGLE_BIT != 0
    }

    pub fn set_toggle(&mut self, toggle: bool) {
        self.set_flag(TOGGLE_BIT, toggle);
    }

    pub fn is_end_segment(&self) -> bool {
        self.data[0] & END_SEGMENT_BIT != 0
    }

    pub fn set_end_segment(&mut self, end: bool) {
        self.set_flag(END_SEGMENT_BIT, end);
    }

    pub fn is_size_indicated(&self) -> bool {
        self.data[0] & SIZE_INDICATED_BIT != 0
    }

    pub fn set_size_indicated(&mut self, indicated: bool) {
        self.set_flag(SIZE_INDICATED_BIT, indicated);
    }

    pub fn is_expedited(&self) -> bool {
        self.data[0] & EXPEDITED_BIT != 0
    }

    pub fn set_expedited(&mut self, expedited: bool) {
        self.set_flag(EXPEDITED_BIT, expedited);
    }

    /// Number of data bytes in a segment frame (0-7), stored as `7 - n`.
    pub fn segment_size(&self) -> usize {
        SEGMENT_MAX_SIZE - ((self.data[0] >> SEGMENT_SIZE_SHIFT) & SEGMENT_SIZE_MASK) as usize
    }

    pub fn set_segment_size(&mut self, size: usize) {
        let code = ((SEGMENT_MAX_SIZE - size) as u8) & SEGMENT_SIZE_MASK;
        self.data[0] = (self.data[0] & !(SEGMENT_SIZE_MASK << SEGMENT_SIZE_SHIFT))
            | (code << SEGMENT_SIZE_SHIFT);
    }

    /// Number of data bytes in an expedited initiate frame (1-4), stored as `4 - n`.
    pub fn expedited_size(&self) -> usize {
        EXPEDITED_MAX_SIZE - ((self.data[0] >> EXPEDITED_SIZE_SHIFT) & EXPEDITED_SIZE_MASK) as usize
    }

    pub fn set_expedited_size(&mut self, size: usize) {
        let code = ((EXPEDITED_MAX_SIZE - size) as u8) & EXPEDITED_SIZE_MASK;
        self.data[0] = (self.data[0] & !(EXPEDITED_SIZE_MASK << EXPEDITED_SIZE_SHIFT))
            | (code << EXPEDITED_SIZE_SHIFT);
    }

    // --- Multiplexer ---

    pub fn index(&self) -> u16 {
        u16::from_le_bytes([self.data[MUX_OFFSET], self.data[MUX_OFFSET + 1]])
    }

    pub fn sub_index(&self) -> u8 {
        self.data[MUX_OFFSET + 2]
    }

    pub fn multiplexer(&self) -> (u16, u8) {
        (self.index(), self.sub_index())
    }

    pub fn set_multiplexer(&mut self, index: u16, sub_index: u8) {
        self.data[MUX_OFFSET..MUX_OFFSET + 2].copy_from_slice(&index.to_le_bytes());
        self.data[MUX_OFFSET + 2] = sub_index;
    }

    // --- Bytes 4-7 ---

    fn word(&self) -> u32 {
        u32::from_le_bytes([
            self.data[DATA_OFFSET],
            self.data[DATA_OFFSET + 1],
            self.data[DATA_OFFSET + 2],
            self.data[DATA_OFFSET + 3],
        ])
    }

    fn set_word(&mut self, value: u32) {
        self.data[DATA_OFFSET..].copy_from_slice(&value.to_le_bytes());
    }

    pub fn indicated_size(&self) -> u32 {
        self.word()
    }

    pub fn set_indicated_size(&mut self, size: u32) {
        self.set_word(size);
    }

    pub fn abort_code(&self) -> u32 {
        self.word()
    }

    pub fn set_abort_code(&mut self, code: u32) {
        self.set_word(code);
    }

    /// The first `size` bytes of the expedited data field.
    pub fn expedited_data(&self, size: usize) -> &[u8] {
        &self.data[DATA_OFFSET..DATA_OFFSET + size.min(EXPEDITED_MAX_SIZE)]
    }

    /// Copies up to 4 bytes into the expedited data field.
    pub fn set_expedited_data(&mut self, data: &[u8]) {
        let len = data.len().min(EXPEDITED_MAX_SIZE);
        self.data[DATA_OFFSET..DATA_OFFSET + len].copy_from_slice(&data[..len]);
    }

    /// The data bytes of a segment frame, as announced by its size code.
    pub fn segment_data(&self) -> &[u8] {
        &self.data[SEGMENT_DATA_OFFSET..SEGMENT_DATA_OFFSET + self.segment_size()]
    }

    /// Copies up to 7 bytes into the segment data field and sets the size code.
    pub fn set_segment_data(&mut self, data: &[u8]) {
        let len = data.len().min(SEGMENT_MAX_SIZE);
        self.data[SEGMENT_DATA_OFFSET..SEGMENT_DATA_OFFSET + len].copy_from_slice(&data[..len]);
        self.set_segment_size(len);
    }

    fn set_flag(&mut self, mask: u8, value: bool) {
        if value {
            self.data[0] |= mask;
        } else {
            self.data[0] &= !mask;
        }
    }
}
