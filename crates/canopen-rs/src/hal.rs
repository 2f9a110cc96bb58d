use crate::od::AccessType;
use crate::types::NodeIdError;
use alloc::vec::Vec;
use core::array::TryFromSliceError;
use core::fmt;

/// Defines a portable, descriptive Error type for the CANopen stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanopenError {
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// The payload does not fit into a single CAN frame.
    BufferTooLong,
    /// An underlying I/O error occurred while writing a frame.
    IoError,
    /// A value is not a valid NodeId.
    InvalidNodeId(u8),
    /// A received frame carries a command specifier that is not valid in this direction.
    InvalidCommandSpecifier(u8),
    /// A transfer is already bound to this SDO engine.
    AlreadyRunning,
    /// No transfer is bound to this SDO engine.
    NotRunning,
    /// The per-node request queue reached its configured depth.
    QueueFull,
    /// No request queue exists for this node id.
    NoSuchNode(u8),
    /// The transfer was aborted by this stack with the given abort code.
    LocalAbort(u32),
    /// The transfer was aborted by the remote server with the given abort code.
    RemoteAbort(u32),
    /// The transfer was removed from the queue before it completed.
    Cancelled,
    /// The uploaded data does not match the size of the requested type.
    TypeMismatch,
}

impl fmt::Display for CanopenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "Buffer is too short for the frame"),
            Self::BufferTooLong => write!(f, "Payload is longer than 8 bytes"),
            Self::IoError => write!(f, "An underlying I/O error occurred"),
            Self::InvalidNodeId(v) => write!(f, "Invalid NodeId value: {v}"),
            Self::InvalidCommandSpecifier(v) => {
                write!(f, "Invalid SDO command specifier: {v}")
            }
            Self::AlreadyRunning => write!(f, "An SDO transfer is already running"),
            Self::NotRunning => write!(f, "No SDO transfer is running"),
            Self::QueueFull => write!(f, "The SDO request queue is full"),
            Self::NoSuchNode(v) => write!(f, "No SDO request queue for node {v}"),
            Self::LocalAbort(code) => write!(
                f,
                "SDO transfer aborted locally: {:#010x} ({})",
                code,
                crate::sdo::abort_code_str(*code)
            ),
            Self::RemoteAbort(code) => write!(
                f,
                "SDO transfer aborted by server: {:#010x} ({})",
                code,
                crate::sdo::abort_code_str(*code)
            ),
            Self::Cancelled => write!(f, "SDO transfer was cancelled"),
            Self::TypeMismatch => {
                write!(f, "The uploaded data does not match the requested type")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CanopenError {}

// --- From Implementations for Error Conversion ---

impl From<TryFromSliceError> for CanopenError {
    fn from(_: TryFromSliceError) -> Self {
        CanopenError::BufferTooShort
    }
}

impl From<NodeIdError> for CanopenError {
    fn from(err: NodeIdError) -> Self {
        match err {
            NodeIdError::InvalidRange(val) => CanopenError::InvalidNodeId(val),
        }
    }
}

/// A classic CAN 2.0A data frame: 11-bit identifier and up to 8 data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub cob_id: u16,
    pub dlc: u8,
    pub data: [u8; 8],
}

impl CanFrame {
    /// Builds a frame from an identifier and a payload of at most 8 bytes.
    pub fn new(cob_id: u16, payload: &[u8]) -> Result<Self, CanopenError> {
        if payload.len() > 8 {
            return Err(CanopenError::BufferTooLong);
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            cob_id,
            dlc: payload.len() as u8,
            data,
        })
    }

    /// The valid part of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.dlc as usize).min(8)]
    }
}

/// Hardware Abstraction Layer (HAL) for CAN frame transmission.
///
/// This trait abstracts the physical sending of CAN frames, enabling the
/// core CANopen protocol logic to remain platform-agnostic (no_std).
/// Reception is push-based: the application reads frames from its socket and
/// hands them to the stack (`SdoRequestQueue::handle_frame`, `SdoMaster::handle_frame`).
pub trait CanInterface {
    /// Queues a frame for transmission. Must not block.
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), CanopenError>;
}

/// What the server role needs to know about one object before transferring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Current value, as sent on upload. Its length is the object size.
    pub value: Vec<u8>,
    pub access: AccessType,
}

/// Object dictionary accessor used by the SDO server role.
///
/// The dictionary itself (EDS parsing, storage, PDO mapping) lives outside
/// this crate; `od::ObjectDictionary` is a minimal in-memory implementation.
pub trait ObjectAccess {
    /// Looks up an object, returning `None` if it does not exist.
    fn lookup(&self, index: u16, sub_index: u8) -> Option<ObjectInfo>;

    /// Stores a completely received download. Returns an SDO abort code on refusal.
    fn commit(&mut self, index: u16, sub_index: u8, data: &[u8]) -> Result<(), u32>;
}
