// crates/canopen-rs/src/sdo/request.rs
//! The transfer descriptor handed to a request queue.

use crate::hal::CanopenError;
use crate::sdo::client::SdoTransferKind;
use crate::types::NodeId;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Outcome of a transfer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SdoStatus {
    /// Queued or in flight.
    #[default]
    Pending,
    Ok,
    /// Aborted by this stack (protocol violation, timeout, out of memory).
    LocalAbort(u32),
    /// Aborted by the server; the code is taken verbatim from the wire.
    RemoteAbort(u32),
    /// Removed by a queue flush.
    Cancelled,
}

impl SdoStatus {
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }

    /// The abort code of a local or remote abort.
    pub fn abort_code(self) -> Option<u32> {
        match self {
            Self::LocalAbort(code) | Self::RemoteAbort(code) => Some(code),
            _ => None,
        }
    }

    /// Maps the status to a `Result`, for callers that treat any failure as an error.
    pub fn into_result(self) -> Result<(), CanopenError> {
        match self {
            Self::Ok => Ok(()),
            Self::Pending => Err(CanopenError::NotRunning),
            Self::LocalAbort(code) => Err(CanopenError::LocalAbort(code)),
            Self::RemoteAbort(code) => Err(CanopenError::RemoteAbort(code)),
            Self::Cancelled => Err(CanopenError::Cancelled),
        }
    }
}

/// Completion callback. Receives the finished descriptor, with its status
/// and (for uploads) the received bytes.
pub type SdoCallback = Box<dyn FnOnce(SdoRequest) + Send>;

/// One object access: target, direction, payload, outcome and completion callback.
///
/// The descriptor is moved into the queue on submit and handed back through
/// the callback, so exactly one owner can touch the payload at any time.
pub struct SdoRequest {
    pub node: NodeId,
    pub kind: SdoTransferKind,
    pub index: u16,
    pub sub_index: u8,
    /// Download: the bytes to write. Upload: the bytes received, once done.
    pub data: Vec<u8>,
    pub status: SdoStatus,
    callback: Option<SdoCallback>,
}

impl SdoRequest {
    /// Describes a read of `index`/`sub_index` on `node`.
    pub fn upload(node: NodeId, index: u16, sub_index: u8) -> Self {
        Self {
            node,
            kind: SdoTransferKind::Upload,
            index,
            sub_index,
            data: Vec::new(),
            status: SdoStatus::Pending,
            callback: None,
        }
    }

    /// Describes a write of `data` to `index`/`sub_index` on `node`.
    pub fn download(node: NodeId, index: u16, sub_index: u8, data: Vec<u8>) -> Self {
        Self {
            kind: SdoTransferKind::Download,
            data,
            ..Self::upload(node, index, sub_index)
        }
    }

    /// Sets the completion callback. It runs exactly once, from `finish`.
    pub fn on_done<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(SdoRequest) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Runs the completion callback, consuming the descriptor.
    ///
    /// Queues return finished descriptors instead of calling back themselves,
    /// so the owner of the queue can release its locks first.
    pub fn finish(mut self) {
        if let Some(callback) = self.callback.take() {
            callback(self);
        }
    }
}

impl fmt::Debug for SdoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdoRequest")
            .field("node", &self.node)
            .field("kind", &self.kind)
            .field("index", &format_args!("0x{:04X}", self.index))
            .field("sub_index", &self.sub_index)
            .field("data", &self.data)
            .field("status", &self.status)
            .field(
                "callback",
                &if self.callback.is_some() {
                    "Some(<FnOnce>)"
                } else {
                    "None"
                },
            )
            .finish()
    }
}
