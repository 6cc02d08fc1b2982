// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::connection::ConnectionId;
use crate::node::NodeId;
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId(pub Uuid);

impl PortId {
    /// Create a new random port ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Declaration of a port before its node exists
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    /// Port name (may be empty)
    pub name: String,
    /// Declared type
    pub value_type: ValueType,
}

impl PortSpec {
    /// Create a named port declaration
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    /// Create an unnamed port declaration
    pub fn unnamed(value_type: ValueType) -> Self {
        Self::new(String::new(), value_type)
    }
}

/// A port on a node
#[derive(Debug, Clone)]
pub struct Port {
    /// Unique port ID
    pub id: PortId,
    /// Owning node
    pub node: NodeId,
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Current (possibly unified) type
    pub value_type: ValueType,
    /// Attached connections in creation order
    pub(crate) connections: Vec<ConnectionId>,
}

impl Port {
    pub(crate) fn new(node: NodeId, direction: PortDirection, spec: PortSpec) -> Self {
        Self {
            id: PortId::new(),
            node,
            name: spec.name,
            direction,
            value_type: spec.value_type,
            connections: Vec::new(),
        }
    }

    /// Connections attached to this port, oldest first
    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    /// Whether any connection is attached
    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    /// Whether this is an input port
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub(crate) fn attach(&mut self, connection: ConnectionId) {
        self.connections.push(connection);
    }

    /// Detach a connection, returning whether it was attached
    pub(crate) fn detach(&mut self, connection: ConnectionId) -> bool {
        match self.connections.iter().position(|c| *c == connection) {
            Some(index) => {
                self.connections.remove(index);
                true
            }
            None => false,
        }
    }
}
