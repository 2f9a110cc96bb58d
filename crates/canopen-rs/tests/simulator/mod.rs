// crates/canopen-rs/tests/simulator/mod.rs
#![allow(dead_code)]

pub mod interface;

pub use interface::SimulatedInterface;

use canopen_rs::hal::{CanFrame, ObjectAccess, ObjectInfo};
use canopen_rs::od::{AccessType, ObjectDictionary, ObjectEntry};
use canopen_rs::sdo::{SdoEnqueueError, SdoFrame, SdoRequest, SdoRequestQueue, SdoServer};
use canopen_rs::{NodeId, SdoConfig, SdoQuirks};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn node(id: u8) -> NodeId {
    NodeId::try_from(id).unwrap()
}

/// Object dictionary that records every commit, in order.
#[derive(Debug, Default)]
pub struct RecordingOd {
    pub od: ObjectDictionary,
    pub commits: Vec<(u16, u8, Vec<u8>)>,
}

impl ObjectAccess for RecordingOd {
    fn lookup(&self, index: u16, sub_index: u8) -> Option<ObjectInfo> {
        self.od.lookup(index, sub_index)
    }

    fn commit(&mut self, index: u16, sub_index: u8, data: &[u8]) -> Result<(), u32> {
        self.od.commit(index, sub_index, data)?;
        self.commits.push((index, sub_index, data.to_vec()));
        Ok(())
    }
}

/// A remote device: an SDO server in front of an object dictionary.
#[derive(Debug)]
pub struct ServerNode {
    pub node_id: NodeId,
    pub server: SdoServer,
    pub od: RecordingOd,
    /// When set, requests are swallowed without reply.
    pub silent: bool,
}

impl ServerNode {
    pub fn new(node_id: NodeId) -> Self {
        let mut od = ObjectDictionary::new();
        od.insert(0x1000, 0, ObjectEntry::u32("Device type", AccessType::Constant, 0x0002_0192));
        od.insert(0x1001, 0, ObjectEntry::u8("Error register", AccessType::ReadOnly, 0));
        od.insert(
            0x1008,
            0,
            ObjectEntry::variable("Device name", AccessType::Constant, b"sim-drive\0\0".to_vec()),
        );
        od.insert(0x1017, 0, ObjectEntry::u16("Producer heartbeat time", AccessType::ReadWrite, 0));
        od.insert(0x1018, 1, ObjectEntry::u32("Vendor-ID", AccessType::ReadOnly, 0x0000_029C));
        od.insert(0x2000, 0, ObjectEntry::variable("Scratch domain", AccessType::ReadWrite, Vec::new()));
        od.insert(0x2001, 0, ObjectEntry::u32("Scratch u32", AccessType::ReadWrite, 0));
        Self {
            node_id,
            // The master sends empty downloads as unsized expedited frames.
            server: SdoServer::with_quirks(SdoQuirks {
                unsized_expedited_is_empty: true,
                ..SdoQuirks::default()
            }),
            od: RecordingOd { od, commits: Vec::new() },
            silent: false,
        }
    }

    /// Processes one frame seen on the bus and returns the reply, if any.
    pub fn handle(&mut self, frame: &CanFrame) -> Option<CanFrame> {
        if frame.cob_id != self.node_id.sdo_rx_cob_id() || self.silent {
            return None;
        }
        let request = SdoFrame::from_can(frame).ok()?;
        self.server
            .handle_request(&request, &mut self.od)
            .map(|reply| reply.to_can(self.node_id.sdo_tx_cob_id()))
    }
}

/// One request queue wired to one simulated device over a virtual bus.
pub struct QueueHarness {
    pub queue: SdoRequestQueue,
    pub interface: SimulatedInterface,
    pub device: ServerNode,
    /// Current simulation time in microseconds.
    pub current_time_us: u64,
    /// Trace of every frame put on the bus, in both directions.
    pub history: Vec<CanFrame>,
}

impl QueueHarness {
    pub fn new(node_id: u8, config: SdoConfig) -> Self {
        let node = node(node_id);
        Self {
            queue: SdoRequestQueue::new(node, &config),
            interface: SimulatedInterface::new(),
            device: ServerNode::new(node),
            current_time_us: 0,
            history: Vec::new(),
        }
    }

    pub fn submit(&mut self, request: SdoRequest) -> Result<(), SdoEnqueueError> {
        self.queue
            .enqueue(&mut self.interface, request, self.current_time_us)
    }

    /// Delivers frames back and forth until the bus is quiet, running the
    /// callback of every request that finishes on the way.
    pub fn run_until_quiet(&mut self) {
        loop {
            let frames = self.interface.take_tx_frames();
            if frames.is_empty() {
                break;
            }
            for frame in frames {
                self.history.push(frame);
                let Some(reply) = self.device.handle(&frame) else {
                    continue;
                };
                self.history.push(reply);
                let sdo = SdoFrame::from_can(&reply).unwrap();
                let finished =
                    self.queue
                        .handle_frame(&mut self.interface, &sdo, self.current_time_us);
                finished.into_iter().for_each(SdoRequest::finish);
            }
        }
    }

    /// Frames written by the queue that the device has not seen yet.
    pub fn interface_pending(&self) -> usize {
        self.interface.pending()
    }

    /// Hands a hand-crafted response to the queue, bypassing the device.
    pub fn feed(&mut self, response: &SdoFrame) -> Vec<SdoRequest> {
        self.queue
            .handle_frame(&mut self.interface, response, self.current_time_us)
    }

    /// Advances simulation time and fires any expired timeout.
    pub fn advance(&mut self, duration_us: u64) {
        self.current_time_us += duration_us;
        let finished = self.queue.tick(&mut self.interface, self.current_time_us);
        finished.into_iter().for_each(SdoRequest::finish);
    }

    /// Frames sent by the master since the start of the test.
    pub fn requests(&self) -> Vec<SdoFrame> {
        self.history
            .iter()
            .filter(|f| f.cob_id == self.device.node_id.sdo_rx_cob_id())
            .map(|f| SdoFrame::from_can(f).unwrap())
            .collect()
    }
}
