// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow graph model and code generator for Flux.
//!
//! A program is a tree of blocks holding nodes whose typed ports are wired
//! together by connections. This crate provides:
//! - Graph editing with scope rules for connections
//! - Per-block execution order with cycle detection
//! - Go source emission with variable bindings across nested scopes
//! - Type unification for the generic built-ins (`append`, `delete`,
//!   `len`, `make`)
//!
//! ## Architecture
//!
//! Blocks, nodes and connections live in arenas owned by [`Program`] and
//! refer to each other by id. Branch nodes own two nested blocks. Node
//! positions are relaxed in the background by the [`layout`] loop.

pub mod types;
pub mod port;
pub mod connection;
pub mod node;
pub mod block;
pub mod graph;
pub mod unify;
pub mod schedule;
pub mod codegen;
pub mod settings;
pub mod layout;

pub use types::ValueType;
pub use port::{Port, PortDirection, PortId, PortSpec};
pub use connection::{Connection, ConnectionId};
pub use node::{LiteralValue, Node, NodeId, NodeKind};
pub use block::{Block, BlockId};
pub use graph::{GraphError, Program};
pub use schedule::CycleError;
pub use codegen::{Bindings, CodegenError, Emitter, NameGenerator};
pub use settings::{CodegenSettings, SettingsError};
pub use layout::SharedProgram;
