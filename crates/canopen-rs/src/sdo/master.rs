// crates/canopen-rs/src/sdo/master.rs
//! Thread-safe SDO master: one request queue per node id, plus blocking and
//! typed helpers on top of the callback API.
//!
//! The master does no I/O on its own. An event loop must push every received
//! frame into `handle_frame` and call `tick` no later than `next_action_time`.
//! Queues of different nodes are locked independently, so nodes may be
//! driven from different threads.

use crate::config::SdoConfig;
use crate::hal::{CanFrame, CanInterface, CanopenError};
use crate::sdo::frame::SdoFrame;
use crate::sdo::queue::{SdoEnqueueError, SdoRequestQueue};
use crate::sdo::request::{SdoRequest, SdoStatus};
use crate::types::NodeId;
use log::{debug, info, trace};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub struct SdoMaster<C: CanInterface> {
    can: Mutex<C>,
    /// Indexed by `NodeId::slot`. Built once, never resized.
    queues: Vec<Mutex<SdoRequestQueue>>,
    config: SdoConfig,
    epoch: Instant,
}

impl<C: CanInterface> SdoMaster<C> {
    /// Creates a queue for every node id (1-127).
    pub fn new(can: C, config: SdoConfig) -> Self {
        let queues = NodeId::all()
            .map(|node| Mutex::new(SdoRequestQueue::new(node, &config)))
            .collect();
        info!(
            "[SDO] Master started (queue depth {}, timeout {} ms)",
            config.queue_depth, config.timeout_ms
        );
        Self {
            can: Mutex::new(can),
            queues,
            config,
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &SdoConfig {
        &self.config
    }

    /// Microseconds since the master was created; the time base of every deadline.
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Locks the CAN interface, e.g. to inspect a test double.
    pub fn interface(&self) -> MutexGuard<'_, C> {
        lock(&self.can)
    }

    /// Queues a request on its node. The callback runs from whichever thread
    /// ends the transfer (`handle_frame`, `tick` or `flush`). A refused
    /// request is returned inside the error.
    pub fn submit(&self, request: SdoRequest) -> Result<(), SdoEnqueueError> {
        let now = self.now_us();
        let queue = match self.queue(request.node) {
            Ok(queue) => queue,
            Err(err) => return Err(SdoEnqueueError::new(err, request)),
        };
        let mut queue = lock(queue);
        let mut can = lock(&self.can);
        queue.enqueue(&mut *can, request, now)
    }

    /// Reads an object; `on_done` receives the request with the uploaded bytes.
    pub fn upload<F>(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
        on_done: F,
    ) -> Result<(), SdoEnqueueError>
    where
        F: FnOnce(SdoRequest) + Send + 'static,
    {
        self.submit(SdoRequest::upload(node, index, sub_index).on_done(on_done))
    }

    /// Writes an object; `on_done` receives the finished request.
    pub fn download<F>(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
        data: Vec<u8>,
        on_done: F,
    ) -> Result<(), SdoEnqueueError>
    where
        F: FnOnce(SdoRequest) + Send + 'static,
    {
        self.submit(SdoRequest::download(node, index, sub_index, data).on_done(on_done))
    }

    /// Reads an object and waits for the outcome.
    ///
    /// Another thread must be driving `handle_frame` and `tick`; calling this
    /// from the event loop itself never returns.
    pub fn upload_blocking(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
    ) -> Result<Vec<u8>, CanopenError> {
        let request = self.wait_for(SdoRequest::upload(node, index, sub_index))?;
        request.status.into_result()?;
        Ok(request.data)
    }

    /// Writes an object and waits for the outcome.
    pub fn download_blocking(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
        data: Vec<u8>,
    ) -> Result<(), CanopenError> {
        let request = self.wait_for(SdoRequest::download(node, index, sub_index, data))?;
        request.status.into_result()
    }

    pub fn read_u8(&self, node: NodeId, index: u16, sub_index: u8) -> Result<u8, CanopenError> {
        let data = self.upload_blocking(node, index, sub_index)?;
        Ok(u8::from_le_bytes(exact(&data)?))
    }

    pub fn read_u16(&self, node: NodeId, index: u16, sub_index: u8) -> Result<u16, CanopenError> {
        let data = self.upload_blocking(node, index, sub_index)?;
        Ok(u16::from_le_bytes(exact(&data)?))
    }

    pub fn read_u32(&self, node: NodeId, index: u16, sub_index: u8) -> Result<u32, CanopenError> {
        let data = self.upload_blocking(node, index, sub_index)?;
        Ok(u32::from_le_bytes(exact(&data)?))
    }

    /// Reads a VISIBLE_STRING, dropping trailing NUL padding.
    pub fn read_string(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
    ) -> Result<String, CanopenError> {
        let data = self.upload_blocking(node, index, sub_index)?;
        let text = String::from_utf8_lossy(&data);
        Ok(text.trim_end_matches('\0').to_string())
    }

    pub fn write_u8(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
        value: u8,
    ) -> Result<(), CanopenError> {
        self.download_blocking(node, index, sub_index, value.to_le_bytes().to_vec())
    }

    pub fn write_u16(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
        value: u16,
    ) -> Result<(), CanopenError> {
        self.download_blocking(node, index, sub_index, value.to_le_bytes().to_vec())
    }

    pub fn write_u32(
        &self,
        node: NodeId,
        index: u16,
        sub_index: u8,
        value: u32,
    ) -> Result<(), CanopenError> {
        self.download_blocking(node, index, sub_index, value.to_le_bytes().to_vec())
    }

    /// Routes a received frame to the queue of the node that sent it.
    ///
    /// Returns `Ok(false)` for frames outside the SDO response range
    /// (0x581-0x5FF), which the caller may hand to other protocol layers.
    pub fn handle_frame(&self, frame: &CanFrame) -> Result<bool, CanopenError> {
        let Some(node) = NodeId::from_sdo_tx_cob_id(frame.cob_id) else {
            trace!("[SDO] Ignoring frame with COB-ID 0x{:03X}", frame.cob_id);
            return Ok(false);
        };
        let sdo = SdoFrame::from_can(frame)?;
        let now = self.now_us();
        let finished = {
            let mut queue = lock(self.queue(node)?);
            let mut can = lock(&self.can);
            queue.handle_frame(&mut *can, &sdo, now)
        };
        finish_all(finished);
        Ok(true)
    }

    /// Expires overdue transfers on every node.
    pub fn tick(&self) {
        let now = self.now_us();
        for queue in &self.queues {
            let finished = {
                let mut queue = lock(queue);
                if queue.next_deadline().is_none_or(|deadline| deadline > now) {
                    continue;
                }
                let mut can = lock(&self.can);
                queue.tick(&mut *can, now)
            };
            finish_all(finished);
        }
    }

    /// The earliest deadline over all nodes, in `now_us` time.
    pub fn next_action_time(&self) -> Option<u64> {
        self.queues
            .iter()
            .filter_map(|queue| lock(queue).next_deadline())
            .min()
    }

    /// Cancels the active and queued requests of one node. Their callbacks
    /// run before this returns, with status `Cancelled`.
    pub fn flush(&self, node: NodeId) -> Result<(), CanopenError> {
        let finished = {
            let mut queue = lock(self.queue(node)?);
            let mut can = lock(&self.can);
            queue.flush(&mut *can)
        };
        if !finished.is_empty() {
            debug!("[SDO] Flushed {} request(s) of node {}", finished.len(), node);
        }
        finish_all(finished);
        Ok(())
    }

    /// Flushes every node.
    pub fn shutdown(&self) {
        for node in NodeId::all() {
            // Every node id has a queue.
            let _ = self.flush(node);
        }
        info!("[SDO] Master shut down");
    }

    fn queue(&self, node: NodeId) -> Result<&Mutex<SdoRequestQueue>, CanopenError> {
        self.queues
            .get(node.slot())
            .ok_or(CanopenError::NoSuchNode(node.get()))
    }

    fn wait_for(&self, request: SdoRequest) -> Result<SdoRequest, CanopenError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.submit(request.on_done(move |done| {
            let _ = tx.send(done);
        }))?;
        // The sender only disappears without sending if the request was dropped.
        rx.recv().map_err(|_| CanopenError::Cancelled)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn finish_all(finished: Vec<SdoRequest>) {
    for request in finished {
        if request.status != SdoStatus::Ok {
            trace!(
                "[SDO] Delivering {:?} for 0x{:04X}/{}",
                request.status, request.index, request.sub_index
            );
        }
        request.finish();
    }
}

fn exact<const N: usize>(data: &[u8]) -> Result<[u8; N], CanopenError> {
    data.try_into().map_err(|_| CanopenError::TypeMismatch)
}
