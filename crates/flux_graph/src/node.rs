// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph.

use crate::block::BlockId;
use crate::port::{Port, PortId};
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant value produced by a literal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// String constant
    String(String),
    /// Integer constant
    Int(i64),
    /// Floating point constant
    Float(f64),
    /// Boolean constant
    Bool(bool),
}

impl LiteralValue {
    /// Type of the literal's output port
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::string(),
            Self::Int(_) => ValueType::int(),
            Self::Float(_) => ValueType::basic("float64"),
            Self::Bool(_) => ValueType::bool(),
        }
    }

    /// Source text of the literal
    pub fn source(&self) -> String {
        match self {
            Self::String(s) => format!("{s:?}"),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{f:.1}"),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// What a node computes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain function call
    Call {
        /// Called function
        name: String,
    },
    /// Constant value
    Literal(LiteralValue),
    /// Two-way conditional owning one nested block per branch
    Branch {
        /// Executed when the condition holds
        true_block: BlockId,
        /// Executed otherwise
        false_block: BlockId,
    },
    /// Built-in `append(slice, value)`
    Append,
    /// Built-in `delete(map, key)`
    Delete,
    /// Built-in `len(x)`
    Len,
    /// Built-in `make(T, len[, cap])`
    Make {
        /// Type being made, once chosen
        ty: Option<ValueType>,
    },
}

impl NodeKind {
    /// Display label
    pub fn label(&self) -> String {
        match self {
            Self::Call { name } => name.clone(),
            Self::Literal(value) => value.source(),
            Self::Branch { .. } => "if".to_string(),
            Self::Append => "append".to_string(),
            Self::Delete => "delete".to_string(),
            Self::Len => "len".to_string(),
            Self::Make { .. } => "make".to_string(),
        }
    }

    /// Nested blocks owned by this node
    pub fn nested_blocks(&self) -> Vec<BlockId> {
        match self {
            Self::Branch {
                true_block,
                false_block,
            } => vec![*true_block, *false_block],
            _ => Vec::new(),
        }
    }

    /// Render the node's expression given its argument list.
    ///
    /// A `make` node must have a type; code generation rejects one without.
    pub fn expression(&self, args: &str) -> String {
        match self {
            Self::Literal(value) => value.source(),
            Self::Make { ty: Some(ty) } if args.is_empty() => format!("make({ty})"),
            Self::Make { ty: Some(ty) } => format!("make({ty}, {args})"),
            other => format!("{}({args})", other.label()),
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// What the node computes
    pub kind: NodeKind,
    /// Home block
    pub block: BlockId,
    /// Position in the editor canvas
    pub position: [f32; 2],
    /// Input ports
    pub inputs: Vec<Port>,
    /// Output ports
    pub outputs: Vec<Port>,
}

impl Node {
    /// Get an input port by index
    pub fn input(&self, index: usize) -> Option<&Port> {
        self.inputs.get(index)
    }

    /// Get an output port by index
    pub fn output(&self, index: usize) -> Option<&Port> {
        self.outputs.get(index)
    }

    /// Get a port by ID
    pub fn port(&self, port_id: PortId) -> Option<&Port> {
        self.ports().find(|p| p.id == port_id)
    }

    pub(crate) fn port_mut(&mut self, port_id: PortId) -> Option<&mut Port> {
        self.inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .find(|p| p.id == port_id)
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}
