#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (payload buffers, request queues)
extern crate alloc;

// --- Foundation Modules ---
pub mod config;
pub mod hal;
mod log;
pub mod types;

// --- Higher Layers ---
pub mod od;
pub mod sdo;

// --- Top-level Exports ---
pub use config::{SdoConfig, SdoQuirks};
pub use hal::{CanFrame, CanInterface, CanopenError, ObjectAccess, ObjectInfo};
pub use od::{AccessType, ObjectDictionary, ObjectEntry};
pub use sdo::{
    SdoAbortCode, SdoEnqueueError, SdoRequest, SdoRequestQueue, SdoServer, SdoStatus,
    SdoTransferKind,
    abort_code_str,
};
#[cfg(feature = "std")]
pub use sdo::SdoMaster;
pub use types::{NodeId, NodeIdError};
