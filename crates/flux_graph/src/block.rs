// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blocks: the lexical scopes nodes live in.

use crate::connection::ConnectionId;
use crate::node::NodeId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub Uuid);

impl BlockId {
    /// Create a new random block ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

/// A scope of generated code.
///
/// `nodes` holds the direct members only; nodes inside nested branch blocks
/// belong to those blocks. `connections` holds the edges whose nearest
/// common scope is this block.
#[derive(Debug, Clone)]
pub struct Block {
    /// Unique block ID
    pub id: BlockId,
    /// Branch node owning this block, `None` for the program-level block
    pub owner: Option<NodeId>,
    pub(crate) nodes: IndexSet<NodeId>,
    pub(crate) connections: IndexSet<ConnectionId>,
}

impl Block {
    pub(crate) fn new(owner: Option<NodeId>) -> Self {
        Self {
            id: BlockId::new(),
            owner,
            nodes: IndexSet::new(),
            connections: IndexSet::new(),
        }
    }

    /// Direct member nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// Connections owned by this block in insertion order
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    /// Whether `node` is a direct member
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Whether this block owns `connection`
    pub fn contains_connection(&self, connection: ConnectionId) -> bool {
        self.connections.contains(&connection)
    }

    /// Number of direct member nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the block has no direct members
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
