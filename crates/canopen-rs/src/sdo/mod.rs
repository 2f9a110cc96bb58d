// crates/canopen-rs/src/sdo/mod.rs
pub mod abort;
pub mod async_client;
pub mod client;
pub mod frame;
#[cfg(feature = "std")]
pub mod master;
pub mod queue;
pub mod request;
pub mod server;

pub use abort::{SdoAbortCode, abort_code_str};
pub use async_client::{SdoAsyncClient, SdoCompletion};
pub use client::{SdoClient, SdoClientAction, SdoClientState, SdoTransferKind};
pub use frame::SdoFrame;
#[cfg(feature = "std")]
pub use master::SdoMaster;
pub use queue::{SdoEnqueueError, SdoRequestQueue};
pub use request::{SdoCallback, SdoRequest, SdoStatus};
pub use server::{SdoServer, SdoServerState};
