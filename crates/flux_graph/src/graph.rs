// SPDX-License-Identifier: MIT OR Apache-2.0
//! Program graph: the arena holding every block, node, port and connection.
//!
//! All editing goes through the mutators here so that the membership
//! invariants hold at all times:
//! - a node is a direct member of exactly one block,
//! - a connection is owned by the nearest block enclosing both endpoints,
//! - both ports of a connection list it, in creation order,
//! - an input port has at most one connection.

use crate::block::{Block, BlockId};
use crate::connection::{Connection, ConnectionId};
use crate::node::{LiteralValue, Node, NodeId, NodeKind};
use crate::port::{Port, PortDirection, PortId, PortSpec};
use crate::types::ValueType;
use crate::unify::{self, Reaction};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use tracing::debug;

/// A whole program: the root block and everything nested in it
#[derive(Debug, Clone)]
pub struct Program {
    root: BlockId,
    blocks: IndexMap<BlockId, Block>,
    nodes: IndexMap<NodeId, Node>,
    connections: IndexMap<ConnectionId, Connection>,
    port_owners: HashMap<PortId, NodeId>,
    observers: HashMap<PortId, Reaction>,
}

impl Program {
    /// Create an empty program with a root block
    pub fn new() -> Self {
        let root = Block::new(None);
        let root_id = root.id;
        let mut blocks = IndexMap::new();
        blocks.insert(root_id, root);
        Self {
            root: root_id,
            blocks,
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            port_owners: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    /// The program-level block
    pub fn root(&self) -> BlockId {
        self.root
    }

    /// Get a block by ID
    pub fn block(&self, block_id: BlockId) -> Option<&Block> {
        self.blocks.get(&block_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the number of nodes, nested ones included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a port by ID
    pub fn port(&self, port_id: PortId) -> Option<&Port> {
        let node = self.port_owners.get(&port_id)?;
        self.nodes.get(node)?.port(port_id)
    }

    fn port_mut(&mut self, port_id: PortId) -> Option<&mut Port> {
        let node = self.port_owners.get(&port_id)?;
        self.nodes.get_mut(node)?.port_mut(port_id)
    }

    /// Node owning a port
    pub fn port_node(&self, port_id: PortId) -> Option<NodeId> {
        self.port_owners.get(&port_id).copied()
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node with explicit ports to a block.
    ///
    /// Branch nodes own nested blocks and must be created with
    /// [`Program::add_branch`].
    pub fn add_node(
        &mut self,
        block: BlockId,
        kind: NodeKind,
        inputs: Vec<PortSpec>,
        outputs: Vec<PortSpec>,
    ) -> Result<NodeId, GraphError> {
        if matches!(kind, NodeKind::Branch { .. }) {
            return Err(GraphError::UnsupportedKind(kind.label()));
        }
        self.insert_node(block, kind, inputs, outputs)
    }

    fn insert_node(
        &mut self,
        block: BlockId,
        kind: NodeKind,
        inputs: Vec<PortSpec>,
        outputs: Vec<PortSpec>,
    ) -> Result<NodeId, GraphError> {
        if !self.blocks.contains_key(&block) {
            return Err(GraphError::BlockNotFound(block));
        }

        let id = NodeId::new();
        let inputs: Vec<Port> = inputs
            .into_iter()
            .map(|spec| Port::new(id, PortDirection::Input, spec))
            .collect();
        let outputs: Vec<Port> = outputs
            .into_iter()
            .map(|spec| Port::new(id, PortDirection::Output, spec))
            .collect();

        for port in inputs.iter().chain(outputs.iter()) {
            self.port_owners.insert(port.id, id);
        }
        if let Some((index, reaction)) = unify::driving_reaction(&kind) {
            if let Some(port) = inputs.get(index) {
                self.observers.insert(port.id, reaction);
            }
        }

        debug!("Added {} node {:?} to block {:?}", kind.label(), id, block);
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                block,
                position: [0.0, 0.0],
                inputs,
                outputs,
            },
        );
        self.blocks[&block].nodes.insert(id);
        Ok(id)
    }

    /// Add a plain call node
    pub fn add_call(
        &mut self,
        block: BlockId,
        name: impl Into<String>,
        inputs: Vec<PortSpec>,
        outputs: Vec<PortSpec>,
    ) -> Result<NodeId, GraphError> {
        self.insert_node(block, NodeKind::Call { name: name.into() }, inputs, outputs)
    }

    /// Add a literal node with one output of the literal's type
    pub fn add_literal(&mut self, block: BlockId, value: LiteralValue) -> Result<NodeId, GraphError> {
        let output = PortSpec::unnamed(value.value_type());
        self.insert_node(block, NodeKind::Literal(value), Vec::new(), vec![output])
    }

    /// Add a branch node together with its two nested blocks
    pub fn add_branch(&mut self, block: BlockId) -> Result<NodeId, GraphError> {
        if !self.blocks.contains_key(&block) {
            return Err(GraphError::BlockNotFound(block));
        }

        let true_block = Block::new(None);
        let false_block = Block::new(None);
        let kind = NodeKind::Branch {
            true_block: true_block.id,
            false_block: false_block.id,
        };
        let (true_id, false_id) = (true_block.id, false_block.id);
        self.blocks.insert(true_id, true_block);
        self.blocks.insert(false_id, false_block);

        let id = self.insert_node(
            block,
            kind,
            vec![PortSpec::new("cond", ValueType::bool())],
            Vec::new(),
        )?;
        self.blocks[&true_id].owner = Some(id);
        self.blocks[&false_id].owner = Some(id);
        Ok(id)
    }

    /// Add an `append(slice, value)` node
    pub fn add_append(&mut self, block: BlockId) -> Result<NodeId, GraphError> {
        self.insert_node(
            block,
            NodeKind::Append,
            vec![
                PortSpec::new("slice", ValueType::Generic),
                PortSpec::new("value", ValueType::Generic),
            ],
            vec![PortSpec::unnamed(ValueType::Generic)],
        )
    }

    /// Add a `delete(map, key)` node
    pub fn add_delete(&mut self, block: BlockId) -> Result<NodeId, GraphError> {
        self.insert_node(
            block,
            NodeKind::Delete,
            vec![
                PortSpec::new("map", ValueType::Generic),
                PortSpec::new("key", ValueType::Generic),
            ],
            Vec::new(),
        )
    }

    /// Add a `len(x)` node; its output is always `int`
    pub fn add_len(&mut self, block: BlockId) -> Result<NodeId, GraphError> {
        self.insert_node(
            block,
            NodeKind::Len,
            vec![PortSpec::unnamed(ValueType::Generic)],
            vec![PortSpec::unnamed(ValueType::int())],
        )
    }

    /// Add a `make` node, optionally choosing its type right away
    pub fn add_make(&mut self, block: BlockId, ty: Option<ValueType>) -> Result<NodeId, GraphError> {
        let id = self.insert_node(
            block,
            NodeKind::Make { ty: None },
            Vec::new(),
            vec![PortSpec::unnamed(ValueType::Generic)],
        )?;
        if let Some(ty) = ty {
            if let Err(err) = self.set_make_type(id, ty) {
                self.remove_node(id)?;
                return Err(err);
            }
        }
        Ok(id)
    }

    /// Choose the type a `make` node creates.
    ///
    /// Rebuilds its inputs as `len` (plus `cap` for slices); connections to
    /// the previous inputs are severed.
    pub fn set_make_type(&mut self, node_id: NodeId, ty: ValueType) -> Result<(), GraphError> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        if !matches!(node.kind, NodeKind::Make { .. }) {
            return Err(GraphError::NotMakeNode(node_id));
        }
        if !ty.is_makeable() {
            return Err(GraphError::NotMakeable(ty));
        }

        let old_inputs: Vec<PortId> = node.inputs.iter().map(|p| p.id).collect();
        let severed: Vec<ConnectionId> = node
            .inputs
            .iter()
            .flat_map(|p| p.connections.iter().copied())
            .collect();
        for connection in severed {
            self.remove_connection(connection)?;
        }
        for port in old_inputs {
            self.port_owners.remove(&port);
        }

        let mut inputs = vec![Port::new(
            node_id,
            PortDirection::Input,
            PortSpec::new("len", ValueType::int()),
        )];
        if matches!(ty.underlying(), ValueType::Slice(_)) {
            inputs.push(Port::new(
                node_id,
                PortDirection::Input,
                PortSpec::new("cap", ValueType::int()),
            ));
        }
        for port in &inputs {
            self.port_owners.insert(port.id, node_id);
        }

        let node = &mut self.nodes[&node_id];
        node.inputs = inputs;
        node.kind = NodeKind::Make { ty: Some(ty.clone()) };
        let output = node.outputs.first().map(|p| p.id);

        if let Some(output) = output {
            if self.set_port_type(output, ty) {
                unify::propagate_from(self, output);
            }
        }
        Ok(())
    }

    /// Remove a node, severing its connections.
    ///
    /// For a branch node the nested blocks and everything in them go too.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        let node = self.nodes.get(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let home = node.block;

        let mut doomed = vec![node_id];
        for nested in node.kind.nested_blocks() {
            doomed.extend(self.all_nodes(nested));
        }

        let mut severed = IndexSet::new();
        for id in &doomed {
            if let Some(node) = self.nodes.get(id) {
                for port in node.ports() {
                    severed.extend(port.connections.iter().copied());
                }
            }
        }
        for connection in severed {
            self.remove_connection(connection)?;
        }

        let mut removed = None;
        for id in doomed {
            let Some(node) = self.nodes.shift_remove(&id) else {
                continue;
            };
            for nested in node.kind.nested_blocks() {
                self.blocks.shift_remove(&nested);
            }
            for port in node.ports() {
                self.port_owners.remove(&port.id);
                self.observers.remove(&port.id);
            }
            if id == node_id {
                removed = Some(node);
            }
        }
        if let Some(block) = self.blocks.get_mut(&home) {
            block.nodes.shift_remove(&node_id);
        }

        debug!("Removed node {:?} from block {:?}", node_id, home);
        removed.ok_or(GraphError::NodeNotFound(node_id))
    }

    /// Move a node into another block, re-homing its connections
    pub fn move_node(&mut self, node_id: NodeId, target: BlockId) -> Result<(), GraphError> {
        if !self.blocks.contains_key(&target) {
            return Err(GraphError::BlockNotFound(target));
        }
        let node = self.nodes.get(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        let from = node.block;
        if from == target {
            return Ok(());
        }
        if self
            .scope_chain(target)
            .iter()
            .any(|b| self.blocks.get(b).and_then(|b| b.owner) == Some(node_id))
        {
            return Err(GraphError::InvalidMove { node: node_id, target });
        }

        self.blocks[&from].nodes.shift_remove(&node_id);
        self.blocks[&target].nodes.insert(node_id);
        self.nodes[&node_id].block = target;

        let mut moved = vec![node_id];
        for nested in self.nodes[&node_id].kind.nested_blocks() {
            moved.extend(self.all_nodes(nested));
        }
        let mut affected = IndexSet::new();
        for id in moved {
            if let Some(node) = self.nodes.get(&id) {
                for port in node.ports() {
                    affected.extend(port.connections.iter().copied());
                }
            }
        }
        for connection_id in affected {
            let Some(connection) = self.connections.get(&connection_id) else {
                continue;
            };
            let (Some(src), Some(dst)) = (
                self.port_node(connection.source),
                self.port_node(connection.destination),
            ) else {
                continue;
            };
            let owner = self.common_block(self.nodes[&src].block, self.nodes[&dst].block);
            let current = connection.block;
            if owner != current {
                if let Some(block) = self.blocks.get_mut(&current) {
                    block.connections.shift_remove(&connection_id);
                }
                self.blocks[&owner].connections.insert(connection_id);
                self.connections[&connection_id].block = owner;
            }
        }

        debug!("Moved node {:?} from block {:?} to {:?}", node_id, from, target);
        Ok(())
    }

    /// Set a node's canvas position
    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = position;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect an output to an input, placing the connection in the
    /// nearest block enclosing both nodes
    pub fn connect(&mut self, source: PortId, destination: PortId) -> Result<ConnectionId, GraphError> {
        let (src, dst) = self.check_endpoints(source, destination)?;
        let block = self.common_block(self.nodes[&src].block, self.nodes[&dst].block);
        self.add_connection(block, source, destination)
    }

    /// Add a connection owned by `block`.
    ///
    /// `block` must be the nearest block enclosing both endpoints.
    pub fn add_connection(
        &mut self,
        block: BlockId,
        source: PortId,
        destination: PortId,
    ) -> Result<ConnectionId, GraphError> {
        if !self.blocks.contains_key(&block) {
            return Err(GraphError::BlockNotFound(block));
        }
        let (src, dst) = self.check_endpoints(source, destination)?;
        let expected = self.common_block(self.nodes[&src].block, self.nodes[&dst].block);
        if expected != block {
            return Err(GraphError::ScopeMismatch {
                expected,
                found: block,
            });
        }

        let connection = Connection::new(source, destination, block);
        let id = connection.id;
        if let Some(port) = self.port_mut(source) {
            port.attach(id);
        }
        if let Some(port) = self.port_mut(destination) {
            port.attach(id);
        }
        self.blocks[&block].connections.insert(id);
        self.connections.insert(id, connection);

        unify::connections_changed(self, source);
        unify::connections_changed(self, destination);
        Ok(id)
    }

    /// Remove a connection and sever both ports' references to it
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Result<Connection, GraphError> {
        let connection = self
            .connections
            .shift_remove(&connection_id)
            .ok_or(GraphError::ConnectionNotFound(connection_id))?;
        if let Some(block) = self.blocks.get_mut(&connection.block) {
            block.connections.shift_remove(&connection_id);
        }
        for port in [connection.source, connection.destination] {
            if let Some(port) = self.port_mut(port) {
                port.detach(connection_id);
            }
        }

        unify::connections_changed(self, connection.source);
        unify::connections_changed(self, connection.destination);
        Ok(connection)
    }

    fn check_endpoints(&self, source: PortId, destination: PortId) -> Result<(NodeId, NodeId), GraphError> {
        let src = self.port(source).ok_or(GraphError::PortNotFound(source))?;
        let dst = self.port(destination).ok_or(GraphError::PortNotFound(destination))?;
        if src.direction != PortDirection::Output || dst.direction != PortDirection::Input {
            return Err(GraphError::DirectionMismatch {
                output: source,
                input: destination,
            });
        }
        if dst.is_connected() {
            return Err(GraphError::InputAlreadyConnected(destination));
        }
        Ok((src.node, dst.node))
    }

    // ------------------------------------------------------------------
    // Type bookkeeping
    // ------------------------------------------------------------------

    /// Set a port's type, returning whether it changed
    pub(crate) fn set_port_type(&mut self, port_id: PortId, value_type: ValueType) -> bool {
        match self.port_mut(port_id) {
            Some(port) if port.value_type != value_type => {
                port.value_type = value_type;
                true
            }
            _ => false,
        }
    }

    /// Reaction registered for a port's connection changes
    pub(crate) fn observer(&self, port_id: PortId) -> Option<Reaction> {
        self.observers.get(&port_id).copied()
    }

    // ------------------------------------------------------------------
    // Scope queries
    // ------------------------------------------------------------------

    /// Enclosing block, `None` for the root
    pub fn outer(&self, block: BlockId) -> Option<BlockId> {
        let owner = self.blocks.get(&block)?.owner?;
        self.nodes.get(&owner).map(|n| n.block)
    }

    /// Outermost enclosing block
    pub fn outermost(&self, block: BlockId) -> BlockId {
        match self.outer(block) {
            Some(outer) => self.outermost(outer),
            None => block,
        }
    }

    /// `block` followed by each enclosing block up to the root
    pub fn scope_chain(&self, block: BlockId) -> Vec<BlockId> {
        let mut chain = vec![block];
        let mut current = block;
        while let Some(outer) = self.outer(current) {
            chain.push(outer);
            current = outer;
        }
        chain
    }

    /// Nearest block enclosing both `a` and `b`
    pub fn common_block(&self, a: BlockId, b: BlockId) -> BlockId {
        let chain = self.scope_chain(a);
        self.scope_chain(b)
            .into_iter()
            .find(|block| chain.contains(block))
            .unwrap_or(self.root)
    }

    /// Walk `node` outward through its owning branch nodes until reaching a
    /// direct member of `block`.
    ///
    /// Returns `None` when the walk leaves the program without passing
    /// through `block`.
    pub fn resolve_member(&self, block: BlockId, node: NodeId) -> Option<NodeId> {
        let scope = self.blocks.get(&block)?;
        let mut current = node;
        loop {
            if scope.contains_node(current) {
                return Some(current);
            }
            let home = self.nodes.get(&current)?.block;
            current = self.blocks.get(&home)?.owner?;
        }
    }

    /// Whether `node` lives somewhere inside the nested blocks of `branch`
    pub fn is_nested_in(&self, node: NodeId, branch: NodeId) -> bool {
        let mut current = node;
        loop {
            let Some(owner) = self
                .nodes
                .get(&current)
                .and_then(|n| self.blocks.get(&n.block))
                .and_then(|b| b.owner)
            else {
                return false;
            };
            if owner == branch {
                return true;
            }
            current = owner;
        }
    }

    /// Every node in `block` and, recursively, its nested blocks
    pub fn all_nodes(&self, block: BlockId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let Some(scope) = self.blocks.get(&block) else {
            return nodes;
        };
        for id in scope.nodes() {
            nodes.push(id);
            if let Some(node) = self.nodes.get(&id) {
                for nested in node.kind.nested_blocks() {
                    nodes.extend(self.all_nodes(nested));
                }
            }
        }
        nodes
    }

    /// Every connection owned by `block` or, recursively, its nested blocks
    pub fn all_connections(&self, block: BlockId) -> Vec<ConnectionId> {
        let mut connections = Vec::new();
        let Some(scope) = self.blocks.get(&block) else {
            return connections;
        };
        connections.extend(scope.connections());
        for id in scope.nodes() {
            if let Some(node) = self.nodes.get(&id) {
                for nested in node.kind.nested_blocks() {
                    connections.extend(self.all_connections(nested));
                }
            }
        }
        connections
    }

    /// Connections feeding `node`.
    ///
    /// For a branch node this includes connections into any node of its
    /// nested blocks whose source lies outside the branch.
    pub fn input_connections(&self, node_id: NodeId) -> Vec<ConnectionId> {
        self.boundary_connections(node_id, PortDirection::Input)
    }

    /// Connections leaving `node`.
    ///
    /// For a branch node this includes connections out of any node of its
    /// nested blocks whose destination lies outside the branch.
    pub fn output_connections(&self, node_id: NodeId) -> Vec<ConnectionId> {
        self.boundary_connections(node_id, PortDirection::Output)
    }

    fn boundary_connections(&self, node_id: NodeId, direction: PortDirection) -> Vec<ConnectionId> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };
        let mut connections: Vec<ConnectionId> = Self::ports_of(node, direction)
            .flat_map(|p| p.connections.iter().copied())
            .collect();

        for nested in node.kind.nested_blocks() {
            for inner in self.all_nodes(nested) {
                let Some(inner) = self.nodes.get(&inner) else {
                    continue;
                };
                for id in Self::ports_of(inner, direction).flat_map(|p| p.connections.iter().copied()) {
                    let far_port = self.connections.get(&id).map(|c| match direction {
                        PortDirection::Input => c.source,
                        PortDirection::Output => c.destination,
                    });
                    let internal = far_port
                        .and_then(|p| self.port_node(p))
                        .is_some_and(|far| self.is_nested_in(far, node_id));
                    if !internal {
                        connections.push(id);
                    }
                }
            }
        }
        connections
    }

    fn ports_of(node: &Node, direction: PortDirection) -> std::slice::Iter<'_, Port> {
        match direction {
            PortDirection::Input => node.inputs.iter(),
            PortDirection::Output => node.outputs.iter(),
        }
    }

    /// Connections into member nodes of `block` that it does not own
    pub fn block_input_connections(&self, block: BlockId) -> Vec<ConnectionId> {
        let Some(scope) = self.blocks.get(&block) else {
            return Vec::new();
        };
        scope
            .nodes()
            .flat_map(|n| self.input_connections(n))
            .filter(|c| !scope.contains_connection(*c))
            .collect()
    }

    /// Connections out of member nodes of `block` that it does not own
    pub fn block_output_connections(&self, block: BlockId) -> Vec<ConnectionId> {
        let Some(scope) = self.blocks.get(&block) else {
            return Vec::new();
        };
        scope
            .nodes()
            .flat_map(|n| self.output_connections(n))
            .filter(|c| !scope.contains_connection(*c))
            .collect()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

/// Error when editing the graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Block not found
    #[error("Block not found: {0:?}")]
    BlockNotFound(BlockId),

    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port not found: {0:?}")]
    PortNotFound(PortId),

    /// Connection not found
    #[error("Connection not found: {0:?}")]
    ConnectionNotFound(ConnectionId),

    /// Connection must run from an output to an input
    #[error("Connection must run from an output to an input: {output:?} -> {input:?}")]
    DirectionMismatch {
        /// Port used as the source
        output: PortId,
        /// Port used as the destination
        input: PortId,
    },

    /// Input port is already connected
    #[error("Input already connected: {0:?}")]
    InputAlreadyConnected(PortId),

    /// Connection placed in the wrong block
    #[error("Connection belongs in block {expected:?}, not {found:?}")]
    ScopeMismatch {
        /// Nearest block enclosing both endpoints
        expected: BlockId,
        /// Block that was requested
        found: BlockId,
    },

    /// A node cannot move into its own nested block
    #[error("Node {node:?} cannot move into its own nested block {target:?}")]
    InvalidMove {
        /// Node being moved
        node: NodeId,
        /// Requested destination
        target: BlockId,
    },

    /// Kind cannot be created through this constructor
    #[error("Unsupported node kind for add_node: {0}")]
    UnsupportedKind(String),

    /// Node is not a `make` node
    #[error("Not a make node: {0:?}")]
    NotMakeNode(NodeId),

    /// Type cannot be created with `make`
    #[error("Type cannot be made: {0}")]
    NotMakeable(ValueType),
}
