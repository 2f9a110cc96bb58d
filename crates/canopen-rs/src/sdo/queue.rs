// crates/canopen-rs/src/sdo/queue.rs
//! Serializes the transfers of one node onto its SDO engine.

use crate::config::SdoConfig;
use crate::hal::{CanInterface, CanopenError};
use crate::log::{LogContext, my_debug, my_info, my_trace, my_warn};
use crate::sdo::async_client::{SdoAsyncClient, SdoCompletion};
use crate::sdo::frame::SdoFrame;
use crate::sdo::request::{SdoRequest, SdoStatus};
use crate::types::NodeId;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::{fmt, mem};

/// A request the queue refused, handed back to the caller with the reason.
///
/// The request keeps its payload and its callback, which has not run.
#[derive(Debug)]
pub struct SdoEnqueueError {
    error: CanopenError,
    request: SdoRequest,
}

impl SdoEnqueueError {
    pub fn new(error: CanopenError, request: SdoRequest) -> Self {
        Self { error, request }
    }

    /// Why the request was refused: `QueueFull` or `NoSuchNode`.
    pub fn error(&self) -> CanopenError {
        self.error
    }

    pub fn request(&self) -> &SdoRequest {
        &self.request
    }

    pub fn into_request(self) -> SdoRequest {
        self.request
    }
}

impl fmt::Display for SdoEnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:04X}/{})",
            self.error, self.request.index, self.request.sub_index
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SdoEnqueueError {}

impl From<SdoEnqueueError> for CanopenError {
    fn from(err: SdoEnqueueError) -> Self {
        err.error
    }
}

/// FIFO of pending transfers in front of one `SdoAsyncClient`.
///
/// At most one request is bound to the engine at a time; the next one starts
/// as soon as the active one ends, whatever its outcome. Methods that can end
/// a transfer return the finished requests in completion order; the caller
/// must call `SdoRequest::finish` on each of them.
#[derive(Debug)]
pub struct SdoRequestQueue {
    node: NodeId,
    depth: usize,
    pending: VecDeque<SdoRequest>,
    active: Option<SdoRequest>,
    engine: SdoAsyncClient,
    ctx: LogContext,
}

impl SdoRequestQueue {
    pub fn new(node: NodeId, config: &SdoConfig) -> Self {
        Self {
            node,
            depth: config.queue_depth,
            pending: VecDeque::with_capacity(config.queue_depth),
            active: None,
            engine: SdoAsyncClient::new(node, config),
            ctx: LogContext::new("SDO-Q", node.get()),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Number of requests waiting behind the active one.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// `true` when no request is bound to the engine.
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// The request currently bound to the engine.
    pub fn active(&self) -> Option<&SdoRequest> {
        self.active.as_ref()
    }

    /// The time at which `tick` must be called next.
    pub fn next_deadline(&self) -> Option<u64> {
        self.engine.next_deadline()
    }

    /// Appends a request and starts it right away if the engine is idle.
    ///
    /// Fails with `QueueFull` when `queue_depth` requests are already waiting.
    /// A rejected request comes back untouched inside the error.
    pub fn enqueue(
        &mut self,
        can: &mut dyn CanInterface,
        request: SdoRequest,
        current_time_us: u64,
    ) -> Result<(), SdoEnqueueError> {
        if request.node != self.node {
            let error = CanopenError::NoSuchNode(request.node.get());
            return Err(SdoEnqueueError::new(error, request));
        }
        if self.pending.len() >= self.depth {
            my_warn!(
                self.ctx,
                "Queue full ({} waiting), rejecting 0x{:04X}/{}",
                self.pending.len(),
                request.index,
                request.sub_index
            );
            return Err(SdoEnqueueError::new(CanopenError::QueueFull, request));
        }
        my_trace!(
            self.ctx,
            "Queued {:?} of 0x{:04X}/{}",
            request.kind,
            request.index,
            request.sub_index
        );
        self.pending.push_back(request);
        self.schedule(can, current_time_us);
        Ok(())
    }

    /// Feeds a response from this queue's node to the active transfer.
    #[must_use]
    pub fn handle_frame(
        &mut self,
        can: &mut dyn CanInterface,
        frame: &SdoFrame,
        current_time_us: u64,
    ) -> Vec<SdoRequest> {
        let mut finished = Vec::new();
        match self.engine.handle_frame(can, frame, current_time_us) {
            Ok(Some(completion)) => {
                finished.extend(self.complete_active(completion));
                self.schedule(can, current_time_us);
            }
            Ok(None) => {}
            Err(_) => my_warn!(self.ctx, "Dropping unsolicited frame {:02X?}", frame.data),
        }
        finished
    }

    /// Checks the active transfer's timeout.
    #[must_use]
    pub fn tick(&mut self, can: &mut dyn CanInterface, current_time_us: u64) -> Vec<SdoRequest> {
        let mut finished = Vec::new();
        if let Some(completion) = self.engine.tick(can, current_time_us) {
            finished.extend(self.complete_active(completion));
            self.schedule(can, current_time_us);
        }
        finished
    }

    /// Cancels everything: the active transfer is stopped without waiting for
    /// the server and every waiting request is marked `Cancelled`.
    #[must_use]
    pub fn flush(&mut self, can: &mut dyn CanInterface) -> Vec<SdoRequest> {
        let mut finished = Vec::with_capacity(self.pending.len() + 1);
        if let Some(completion) = self.engine.stop(can) {
            finished.extend(self.complete_active(completion));
        }
        let cancelled = self.pending.len();
        finished.extend(self.pending.drain(..).map(|mut request| {
            request.status = SdoStatus::Cancelled;
            request
        }));
        if !finished.is_empty() {
            my_debug!(
                self.ctx,
                "Flushed {} request(s), {} of them queued",
                finished.len(),
                cancelled
            );
        }
        finished
    }

    /// Starts the head of the queue if the engine is idle.
    fn schedule(&mut self, can: &mut dyn CanInterface, current_time_us: u64) {
        if self.active.is_some() {
            return;
        }
        let Some(mut request) = self.pending.pop_front() else {
            return;
        };
        let data = mem::take(&mut request.data);
        match self.engine.start(
            can,
            request.kind,
            request.index,
            request.sub_index,
            data,
            current_time_us,
        ) {
            Ok(()) => self.active = Some(request),
            // `active` is empty, so the engine cannot be busy.
            Err(e) => {
                my_warn!(self.ctx, "Could not start request: {}", e);
                self.pending.push_front(request);
            }
        }
    }

    fn complete_active(&mut self, completion: SdoCompletion) -> Option<SdoRequest> {
        let mut request = self.active.take()?;
        request.status = completion.status;
        request.data = completion.data;
        match request.status {
            SdoStatus::Ok => my_info!(
                self.ctx,
                "{:?} of 0x{:04X}/{} done ({} bytes)",
                request.kind,
                request.index,
                request.sub_index,
                request.data.len()
            ),
            status => my_warn!(
                self.ctx,
                "{:?} of 0x{:04X}/{} failed: {:?}",
                request.kind,
                request.index,
                request.sub_index,
                status
            ),
        }
        Some(request)
    }
}
