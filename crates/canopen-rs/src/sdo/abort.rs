// crates/canopen-rs/src/sdo/abort.rs
//! SDO abort codes.
//! (Reference: CiA 301, Table 22)

use core::fmt;

/// Abort codes raised by this stack. Codes received from a server are kept
/// as raw `u32` since a device may send any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SdoAbortCode {
    /// Toggle bit not alternated
    Toggle = 0x0503_0000,
    /// SDO protocol timed out
    Timeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCs = 0x0504_0001,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the object dictionary
    NoSuchObject = 0x0602_0000,
    /// Data type does not match, length of service parameter does not match
    LengthMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    LengthTooHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    LengthTooLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// General error
    General = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
}

impl SdoAbortCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<SdoAbortCode> for u32 {
    fn from(code: SdoAbortCode) -> Self {
        code as u32
    }
}

impl TryFrom<u32> for SdoAbortCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ABORT_CODES
            .iter()
            .find(|(code, _)| *code as u32 == value)
            .map(|(code, _)| *code)
            .ok_or(value)
    }
}

impl fmt::Display for SdoAbortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", abort_code_str(*self as u32))
    }
}

const ABORT_CODES: &[(SdoAbortCode, &str)] = &[
    (SdoAbortCode::Toggle, "Toggle bit not alternated"),
    (SdoAbortCode::Timeout, "SDO protocol timed out"),
    (SdoAbortCode::InvalidCs, "Command specifier not valid or unknown"),
    (SdoAbortCode::OutOfMemory, "Out of memory"),
    (SdoAbortCode::UnsupportedAccess, "Unsupported access to an object"),
    (SdoAbortCode::WriteOnly, "Attempt to read a write only object"),
    (SdoAbortCode::ReadOnly, "Attempt to write a read only object"),
    (SdoAbortCode::NoSuchObject, "Object does not exist"),
    (SdoAbortCode::LengthMismatch, "Length of service parameter does not match"),
    (SdoAbortCode::LengthTooHigh, "Length of service parameter too high"),
    (SdoAbortCode::LengthTooLow, "Length of service parameter too low"),
    (SdoAbortCode::NoSuchSubIndex, "Sub-index does not exist"),
    (SdoAbortCode::General, "General error"),
    (SdoAbortCode::CantStore, "Data cannot be transferred or stored"),
];

/// Codes a device may report that this stack never raises itself.
const REMOTE_ONLY_CODES: &[(u32, &str)] = &[
    (0x0504_0002, "Invalid block size"),
    (0x0504_0003, "Invalid sequence number"),
    (0x0504_0004, "CRC error"),
    (0x0601_0003, "Sub-index cannot be written"),
    (0x0604_0041, "Object cannot be mapped to the PDO"),
    (0x0604_0042, "PDO length exceeded"),
    (0x0604_0043, "General parameter incompatibility"),
    (0x0604_0047, "General internal incompatibility in the device"),
    (0x0606_0000, "Access failed due to a hardware error"),
    (0x0609_0030, "Value range of parameter exceeded"),
    (0x0609_0031, "Value of parameter written too high"),
    (0x0609_0032, "Value of parameter written too low"),
    (0x0609_0036, "Maximum value is less than minimum value"),
    (0x060A_0023, "Resource not available"),
    (0x0800_0021, "Data cannot be stored because of local control"),
    (0x0800_0022, "Data cannot be stored because of the device state"),
    (0x0800_0023, "No object dictionary present"),
    (0x0800_0024, "No data available"),
];

/// Human-readable description of a raw abort code, "UNKNOWN" if not standard.
pub fn abort_code_str(code: u32) -> &'static str {
    ABORT_CODES
        .iter()
        .map(|(abort, text)| (*abort as u32, *text))
        .chain(REMOTE_ONLY_CODES.iter().copied())
        .find(|(value, _)| *value == code)
        .map(|(_, text)| text)
        .unwrap_or("UNKNOWN")
}
