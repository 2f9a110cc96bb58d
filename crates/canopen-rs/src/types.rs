// crates/canopen-rs/src/types.rs
use core::convert::TryFrom;
use core::fmt;

/// Lowest valid CANopen node id.
pub const MIN_NODE_ID: u8 = 1;

/// Highest valid CANopen node id.
pub const MAX_NODE_ID: u8 = 127;

/// Function code of the SDO server -> client channel (TSDO, 0x580 + node id).
pub const COB_SDO_TX: u16 = 0x580;

/// Function code of the SDO client -> server channel (RSDO, 0x600 + node id).
pub const COB_SDO_RX: u16 = 0x600;

/// Represents a CANopen node id, wrapping a `u8` to ensure type safety.
///
/// Valid node ids are in the range 1-127. Node id 0 is reserved for NMT
/// broadcast and is never the target of an SDO transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u8);

impl NodeId {
    /// Returns the raw node id.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot of this node in a fixed-size node table.
    pub const fn slot(self) -> usize {
        (self.0 - MIN_NODE_ID) as usize
    }

    /// COB-ID on which this node's SDO server receives requests.
    pub const fn sdo_rx_cob_id(self) -> u16 {
        COB_SDO_RX + self.0 as u16
    }

    /// COB-ID on which this node's SDO server sends responses.
    pub const fn sdo_tx_cob_id(self) -> u16 {
        COB_SDO_TX + self.0 as u16
    }

    /// Recovers the node id from an SDO response COB-ID (0x581..=0x5FF).
    pub fn from_sdo_tx_cob_id(cob_id: u16) -> Option<Self> {
        if cob_id & 0x780 != COB_SDO_TX {
            return None;
        }
        Self::try_from((cob_id & 0x7F) as u8).ok()
    }

    /// Iterates over every valid node id in ascending order.
    pub fn all() -> impl Iterator<Item = NodeId> {
        (MIN_NODE_ID..=MAX_NODE_ID).map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for invalid Node ID creation.
#[derive(Debug, PartialEq, Eq)]
pub enum NodeIdError {
    /// Node ID is outside the valid range (1-127).
    InvalidRange(u8),
}

impl fmt::Display for NodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeIdError::InvalidRange(value) => {
                write!(f, "Invalid NodeId value: {}. Valid range is 1-127.", value)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NodeIdError {}

impl TryFrom<u8> for NodeId {
    type Error = NodeIdError;

    /// Creates a `NodeId` from a `u8`, returning an error if the value is not a valid
    /// CANopen node identifier.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            MIN_NODE_ID..=MAX_NODE_ID => Ok(NodeId(value)),
            _ => Err(NodeIdError::InvalidRange(value)),
        }
    }
}

impl From<NodeId> for u8 {
    /// Converts a `NodeId` back into its underlying `u8` representation.
    fn from(node_id: NodeId) -> Self {
        node_id.0
    }
}
