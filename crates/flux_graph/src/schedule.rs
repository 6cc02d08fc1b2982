// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution order of the nodes in one block.

use crate::block::BlockId;
use crate::graph::Program;
use crate::node::NodeId;
use std::collections::HashSet;

/// Error when a block's nodes have no valid execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Block {0:?} contains a cycle")]
pub struct CycleError(pub BlockId);

impl Program {
    /// Order the direct members of `block` so that every source of a
    /// connection owned by `block` precedes its destination.
    ///
    /// The walk starts from the terminal nodes (no outgoing connection owned
    /// by `block`) and inserts each node after its dependencies. A source
    /// living in a nested block stands for the member node that encloses it;
    /// sources that never resolve to a member are provided by an outer scope
    /// and ignored here.
    ///
    /// Nodes already placed are tracked globally, while the nodes on the
    /// current insertion path are tracked in a set copied on each descent
    /// and cleared for every terminal. Reaching a node already on the path
    /// is a cycle; reaching one placed via another path is not.
    pub fn node_order(&self, block: BlockId) -> Result<Vec<NodeId>, CycleError> {
        let Some(scope) = self.block(block) else {
            return Ok(Vec::new());
        };

        let terminals: Vec<NodeId> = scope
            .nodes()
            .filter(|node| {
                !self
                    .output_connections(*node)
                    .iter()
                    .any(|c| self.connection(*c).is_some_and(|c| c.block == block))
            })
            .collect();
        if terminals.is_empty() && !scope.is_empty() {
            return Err(CycleError(block));
        }

        let mut order = Vec::with_capacity(scope.node_count());
        let mut placed = HashSet::new();
        for terminal in terminals {
            if !self.insert_in_order(block, terminal, HashSet::new(), &mut placed, &mut order) {
                return Err(CycleError(block));
            }
        }
        Ok(order)
    }

    fn insert_in_order(
        &self,
        block: BlockId,
        node: NodeId,
        mut path: HashSet<NodeId>,
        placed: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> bool {
        if !path.insert(node) {
            return false;
        }
        if !placed.insert(node) {
            return true;
        }

        for connection in self.input_connections(node) {
            let Some(connection) = self.connection(connection) else {
                continue;
            };
            if connection.block != block {
                continue;
            }
            let Some(source) = self
                .port_node(connection.source)
                .and_then(|n| self.resolve_member(block, n))
            else {
                continue;
            };
            if !self.insert_in_order(block, source, path.clone(), placed, order) {
                return false;
            }
        }
        order.push(node);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::port::{PortId, PortSpec};
    use crate::types::ValueType;

    fn call(program: &mut Program, block: BlockId, name: &str, inputs: usize, outputs: usize) -> NodeId {
        program
            .add_call(
                block,
                name,
                vec![PortSpec::unnamed(ValueType::int()); inputs],
                vec![PortSpec::unnamed(ValueType::int()); outputs],
            )
            .unwrap()
    }

    fn out(program: &Program, node: NodeId, index: usize) -> PortId {
        program.node(node).unwrap().outputs[index].id
    }

    fn inp(program: &Program, node: NodeId, index: usize) -> PortId {
        program.node(node).unwrap().inputs[index].id
    }

    fn wire(program: &mut Program, from: NodeId, output: usize, to: NodeId, input: usize) {
        let (source, destination) = (out(program, from, output), inp(program, to, input));
        program.connect(source, destination).unwrap();
    }

    fn assert_valid_order(program: &Program, block: BlockId, order: &[NodeId]) {
        let members: Vec<NodeId> = program.block(block).unwrap().nodes().collect();
        assert_eq!(order.len(), members.len());
        for member in &members {
            assert_eq!(order.iter().filter(|n| *n == member).count(), 1);
        }
        let index = |n: NodeId| order.iter().position(|o| *o == n).unwrap();
        for connection in program.block(block).unwrap().connections() {
            let connection = program.connection(connection).unwrap();
            let src = program.resolve_member(block, program.port_node(connection.source).unwrap());
            let dst = program.resolve_member(block, program.port_node(connection.destination).unwrap());
            if let (Some(src), Some(dst)) = (src, dst) {
                assert!(index(src) < index(dst));
            }
        }
    }

    #[test]
    fn test_simple_chain() {
        let mut program = Program::new();
        let root = program.root();
        let b = call(&mut program, root, "b", 1, 0);
        let a = call(&mut program, root, "a", 0, 1);
        wire(&mut program, a, 0, b, 0);

        assert_eq!(program.node_order(root).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_two_node_cycle() {
        let mut program = Program::new();
        let root = program.root();
        let a = call(&mut program, root, "a", 1, 1);
        let b = call(&mut program, root, "b", 1, 1);
        wire(&mut program, a, 0, b, 0);
        wire(&mut program, b, 0, a, 0);

        assert_eq!(program.node_order(root), Err(CycleError(root)));
    }

    #[test]
    fn test_cycle_behind_terminal() {
        let mut program = Program::new();
        let root = program.root();
        let a = call(&mut program, root, "a", 1, 1);
        let b = call(&mut program, root, "b", 1, 2);
        let sink = call(&mut program, root, "sink", 1, 0);
        wire(&mut program, a, 0, b, 0);
        wire(&mut program, b, 0, a, 0);
        wire(&mut program, b, 1, sink, 0);

        assert_eq!(program.node_order(root), Err(CycleError(root)));
    }

    #[test]
    fn test_self_dependency() {
        let mut program = Program::new();
        let root = program.root();
        let a = call(&mut program, root, "a", 1, 2);
        let sink = call(&mut program, root, "sink", 1, 0);
        wire(&mut program, a, 0, a, 0);
        wire(&mut program, a, 1, sink, 0);

        assert_eq!(program.node_order(root), Err(CycleError(root)));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut program = Program::new();
        let root = program.root();
        let a = call(&mut program, root, "a", 0, 1);
        let b = call(&mut program, root, "b", 1, 1);
        let c = call(&mut program, root, "c", 1, 1);
        let d = call(&mut program, root, "d", 2, 0);
        wire(&mut program, a, 0, b, 0);
        wire(&mut program, a, 0, c, 0);
        wire(&mut program, b, 0, d, 0);
        wire(&mut program, c, 0, d, 1);

        let order = program.node_order(root).unwrap();
        assert_eq!(order, vec![a, b, c, d]);
        assert_valid_order(&program, root, &order);
    }

    #[test]
    fn test_shared_source_across_terminals() {
        let mut program = Program::new();
        let root = program.root();
        let a = call(&mut program, root, "a", 0, 1);
        let x = call(&mut program, root, "x", 1, 0);
        let y = call(&mut program, root, "y", 1, 0);
        let lone = call(&mut program, root, "lone", 0, 0);
        wire(&mut program, a, 0, x, 0);
        wire(&mut program, a, 0, y, 0);

        let order = program.node_order(root).unwrap();
        assert_eq!(order, vec![a, x, y, lone]);
        assert_valid_order(&program, root, &order);
    }

    #[test]
    fn test_empty_and_disconnected_blocks() {
        let mut program = Program::new();
        let root = program.root();
        assert_eq!(program.node_order(root).unwrap(), Vec::new());

        let a = call(&mut program, root, "a", 0, 0);
        let b = call(&mut program, root, "b", 0, 0);
        assert_eq!(program.node_order(root).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_nested_sources_resolve_to_branch() {
        let mut program = Program::new();
        let root = program.root();
        let branch = program.add_branch(root).unwrap();
        let NodeKind::Branch { true_block, .. } = program.node(branch).unwrap().kind.clone() else {
            panic!("expected branch");
        };
        let q = call(&mut program, root, "q", 1, 0);
        let p = call(&mut program, root, "p", 0, 1);
        let c = call(&mut program, true_block, "c", 1, 1);
        wire(&mut program, p, 0, c, 0);
        wire(&mut program, c, 0, q, 0);

        let order = program.node_order(root).unwrap();
        assert_eq!(order, vec![p, branch, q]);
        assert_valid_order(&program, root, &order);
        assert_eq!(program.node_order(true_block).unwrap(), vec![c]);
    }

    #[test]
    fn test_branch_feeding_its_own_condition() {
        let mut program = Program::new();
        let root = program.root();
        let branch = program.add_branch(root).unwrap();
        let NodeKind::Branch { true_block, .. } = program.node(branch).unwrap().kind.clone() else {
            panic!("expected branch");
        };
        let c = program
            .add_call(true_block, "c", Vec::new(), vec![PortSpec::unnamed(ValueType::bool())])
            .unwrap();
        wire(&mut program, c, 0, branch, 0);

        assert_eq!(program.node_order(root), Err(CycleError(root)));
    }
}
