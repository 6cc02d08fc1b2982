// SPDX-License-Identifier: MIT OR Apache-2.0
//! Source generation from an ordered block.
//!
//! [`Emitter::code`] walks a block's nodes in [`Program::node_order`] and
//! writes one statement per node, or a nested `if`/`else` for a branch,
//! threading a map from destination input ports to variable names.
//!
//! Values produced inside a nested block and consumed outside it are
//! declared up front in the consuming scope; the producing statement then
//! copies its result into that variable.

use crate::block::BlockId;
use crate::connection::Connection;
use crate::graph::Program;
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{Port, PortId};
use crate::schedule::CycleError;
use crate::settings::CodegenSettings;
use crate::types::ValueType;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Variable bound to each destination input port
pub type Bindings = HashMap<PortId, String>;

static GLOBAL_NAMES: NameGenerator = NameGenerator::new();

/// Source of unique variable names.
///
/// The process-wide instance returned by [`NameGenerator::global`] lives
/// for the whole session and should only be reset when a new session
/// starts. Tests and callers wanting reproducible output can use their own.
#[derive(Debug)]
pub struct NameGenerator {
    next: Mutex<u64>,
}

impl NameGenerator {
    /// Create a generator whose first name ends in `1`
    pub const fn new() -> Self {
        Self {
            next: parking_lot::const_mutex(0),
        }
    }

    /// The process-wide generator
    pub fn global() -> &'static NameGenerator {
        &GLOBAL_NAMES
    }

    /// Allocate a fresh name
    pub fn next_name(&self, prefix: &str) -> String {
        let mut next = self.next.lock();
        *next += 1;
        format!("{prefix}{next}")
    }

    /// Restart numbering
    pub fn reset(&self) {
        *self.next.lock() = 0;
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates source for blocks of a program
pub struct Emitter<'a> {
    program: &'a Program,
    names: &'a NameGenerator,
    settings: CodegenSettings,
}

impl<'a> Emitter<'a> {
    /// Emitter using default settings and the global name generator
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            names: NameGenerator::global(),
            settings: CodegenSettings::default(),
        }
    }

    /// Draw names from `names` instead of the global generator
    pub fn with_names(mut self, names: &'a NameGenerator) -> Self {
        self.names = names;
        self
    }

    /// Use custom layout settings
    pub fn with_settings(mut self, settings: CodegenSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Generate the statements of `block` at nesting level `indent`.
    ///
    /// `bindings` is copied on entry: names bound here are visible to the
    /// nested blocks emitted by this call but not to the caller.
    pub fn code(&self, block: BlockId, indent: usize, bindings: &Bindings) -> Result<String, CodegenError> {
        let scope = self
            .program
            .block(block)
            .ok_or(CodegenError::BlockNotFound(block))?;
        let order = self.program.node_order(block).map_err(|err| {
            warn!("Cannot generate code: {err}");
            CodegenError::from(err)
        })?;

        let mut vars = bindings.clone();
        let mut out = String::new();
        let pad = self.settings.pad(indent);

        for connection in scope.connections() {
            let Some(connection) = self.program.connection(connection) else {
                continue;
            };
            if vars.contains_key(&connection.destination) || !self.produced_in_nested_scope(block, connection) {
                continue;
            }
            let name = self.declare(&self.crossing_type(connection), &pad, &mut out);
            vars.insert(connection.destination, name);
        }

        for node_id in order {
            let node = self
                .program
                .node(node_id)
                .ok_or(CodegenError::NodeNotFound(node_id))?;
            trace!("Emitting {} node {:?}", node.kind.label(), node_id);
            match node.kind {
                NodeKind::Make { ty: None } => return Err(CodegenError::UntypedMake(node_id)),
                NodeKind::Branch {
                    true_block,
                    false_block,
                } => self.emit_branch(node, true_block, false_block, indent, &vars, &mut out)?,
                _ => self.emit_statement(node, &pad, &mut vars, &mut out),
            }
        }
        Ok(out)
    }

    /// Whether the connection's source sits strictly inside a block nested
    /// in `block`
    fn produced_in_nested_scope(&self, block: BlockId, connection: &Connection) -> bool {
        let Some(source_block) = self
            .program
            .port_node(connection.source)
            .and_then(|n| self.program.node(n))
            .map(|n| n.block)
        else {
            return false;
        };
        let mut current = self.program.outer(source_block);
        while let Some(scope) = current {
            if scope == block {
                return true;
            }
            current = self.program.outer(scope);
        }
        false
    }

    /// Declared type of a value crossing a scope boundary
    fn crossing_type(&self, connection: &Connection) -> ValueType {
        let destination = self.port_type(connection.destination);
        if !destination.is_generic() {
            return destination;
        }
        self.port_type(connection.source)
    }

    fn port_type(&self, port: PortId) -> ValueType {
        self.program
            .port(port)
            .map(|p| p.value_type.clone())
            .unwrap_or_default()
    }

    fn declare(&self, value_type: &ValueType, pad: &str, out: &mut String) -> String {
        let name = self.names.next_name(&self.settings.var_prefix);
        if value_type.is_generic() {
            debug!("Declaring {name} with unresolved type");
        }
        push_line(out, pad, &format!("var {name} {value_type}"));
        name
    }

    /// Variable feeding `input`, declaring a zero-valued placeholder when
    /// nothing is bound to it
    fn input_name(&self, input: &Port, pad: &str, vars: &Bindings, out: &mut String) -> String {
        if let Some(name) = vars.get(&input.id) {
            return name.clone();
        }
        if input.is_connected() {
            debug!("Input {:?} is connected from outside any enclosing scope", input.id);
        }
        self.declare(&input.value_type, pad, out)
    }

    fn emit_statement(&self, node: &Node, pad: &str, vars: &mut Bindings, out: &mut String) {
        let args: Vec<String> = node
            .inputs
            .iter()
            .map(|input| self.input_name(input, pad, vars, out))
            .collect();

        let mut outputs = Vec::with_capacity(node.outputs.len());
        let mut any_connected = false;
        // existing variable -> freshly produced value
        let mut copies: IndexMap<String, String> = IndexMap::new();
        for output in &node.outputs {
            if !output.is_connected() {
                outputs.push("_".to_string());
                continue;
            }
            any_connected = true;
            let name = self.names.next_name(&self.settings.var_prefix);
            for connection in output.connections() {
                let Some(connection) = self.program.connection(*connection) else {
                    continue;
                };
                match vars.get(&connection.destination) {
                    Some(existing) => {
                        copies.insert(existing.clone(), name.clone());
                    }
                    None => {
                        vars.insert(connection.destination, name.clone());
                    }
                }
            }
            outputs.push(name);
        }

        let expression = node.kind.expression(&args.join(", "));
        if any_connected {
            push_line(out, pad, &format!("{} := {expression}", outputs.join(", ")));
        } else {
            push_line(out, pad, &expression);
        }
        if !copies.is_empty() {
            let (existing, produced): (Vec<String>, Vec<String>) = copies.into_iter().unzip();
            push_line(out, pad, &format!("{} = {}", existing.join(", "), produced.join(", ")));
        }
    }

    fn emit_branch(
        &self,
        node: &Node,
        true_block: BlockId,
        false_block: BlockId,
        indent: usize,
        vars: &Bindings,
        out: &mut String,
    ) -> Result<(), CodegenError> {
        let pad = self.settings.pad(indent);
        let condition = match node.input(0) {
            Some(input) => self.input_name(input, &pad, vars, out),
            None => "false".to_string(),
        };

        push_line(out, &pad, &format!("if {condition} {{"));
        out.push_str(&self.code(true_block, indent + 1, vars)?);
        push_line(out, &pad, "} else {");
        out.push_str(&self.code(false_block, indent + 1, vars)?);
        push_line(out, &pad, "}");
        Ok(())
    }
}

fn push_line(out: &mut String, pad: &str, line: &str) {
    out.push_str(pad);
    out.push_str(line);
    out.push('\n');
}

impl Program {
    /// Generate the statements of `block` with default settings and the
    /// global name generator
    pub fn code(&self, block: BlockId, indent: usize, bindings: &Bindings) -> Result<String, CodegenError> {
        Emitter::new(self).code(block, indent, bindings)
    }
}

/// Error during code generation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    /// A block (this one or a nested one) has no valid execution order
    #[error("Cyclic graph: block {block:?} has no valid execution order")]
    CyclicGraph {
        /// Block containing the cycle
        block: BlockId,
    },

    /// Block not found
    #[error("Block not found: {0:?}")]
    BlockNotFound(BlockId),

    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// A `make` node has no type chosen yet
    #[error("Make node {0:?} has no type")]
    UntypedMake(NodeId),
}

impl From<CycleError> for CodegenError {
    fn from(err: CycleError) -> Self {
        Self::CyclicGraph { block: err.0 }
    }
}
