// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::block::BlockId;
use crate::port::PortId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed edge from an output port to an input port.
///
/// `block` is the nearest scope containing both endpoints; the mutators on
/// [`Program`](crate::Program) keep it consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Source output port
    pub source: PortId,
    /// Destination input port
    pub destination: PortId,
    /// Owning block
    pub block: BlockId,
}

impl Connection {
    pub(crate) fn new(source: PortId, destination: PortId, block: BlockId) -> Self {
        Self {
            id: ConnectionId::new(),
            source,
            destination,
            block,
        }
    }
}
