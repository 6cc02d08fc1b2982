// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic-type unification for built-in nodes.
//!
//! Each built-in registers a [`Reaction`] on one driving input when it is
//! created. After a mutator changes that port's connection set the reaction
//! derives the types of the node's dependent ports from whatever output the
//! driving port is wired to. Reactions are pure: they read the program and
//! return the updates to apply, so they are idempotent and safe to re-run.
//!
//! A mismatching shape is not an error here; the ports stay `Generic` and
//! any complaint is left to a later type-checking stage.

use crate::graph::Program;
use crate::node::{NodeId, NodeKind};
use crate::port::{PortDirection, PortId};
use crate::types::ValueType;
use std::collections::{HashMap, VecDeque};
use tracing::{trace, warn};

/// Upper bound on how often one port's reaction may fire per edit
const MAX_REACTIONS_PER_PORT: usize = 16;

/// Reaction to a change in a driving port's connection set
pub type Reaction = fn(&Program, NodeId) -> Vec<TypeUpdate>;

/// New type for a port
#[derive(Debug, Clone, PartialEq)]
pub struct TypeUpdate {
    /// Port to retype
    pub port: PortId,
    /// Its new type
    pub value_type: ValueType,
}

impl TypeUpdate {
    fn new(port: PortId, value_type: ValueType) -> Self {
        Self { port, value_type }
    }
}

/// Driving input index and reaction for a node kind
pub(crate) fn driving_reaction(kind: &NodeKind) -> Option<(usize, Reaction)> {
    match kind {
        NodeKind::Append => Some((0, unify_append)),
        NodeKind::Delete => Some((0, unify_delete)),
        NodeKind::Len => Some((0, unify_len)),
        _ => None,
    }
}

/// Type of the output feeding `port`, if it is connected
fn source_type(program: &Program, port: PortId) -> Option<&ValueType> {
    let connection = program.port(port)?.connections().first()?;
    let source = program.connection(*connection)?.source;
    program.port(source).map(|p| &p.value_type)
}

fn unify_append(program: &Program, node_id: NodeId) -> Vec<TypeUpdate> {
    let Some(node) = program.node(node_id) else {
        return Vec::new();
    };
    let (Some(slice), Some(value), Some(out)) = (node.input(0), node.input(1), node.output(0)) else {
        return Vec::new();
    };

    let resolved = source_type(program, slice.id).and_then(|t| {
        let (t, _) = t.indirect();
        match t.underlying() {
            ValueType::Slice(elem) => Some((t.clone(), (**elem).clone())),
            _ => None,
        }
    });
    match resolved {
        Some((slice_type, elem)) => vec![
            TypeUpdate::new(slice.id, slice_type.clone()),
            TypeUpdate::new(value.id, elem),
            TypeUpdate::new(out.id, slice_type),
        ],
        None => vec![
            TypeUpdate::new(slice.id, ValueType::Generic),
            TypeUpdate::new(value.id, ValueType::Generic),
            TypeUpdate::new(out.id, ValueType::Generic),
        ],
    }
}

fn unify_delete(program: &Program, node_id: NodeId) -> Vec<TypeUpdate> {
    let Some(node) = program.node(node_id) else {
        return Vec::new();
    };
    let (Some(map), Some(key)) = (node.input(0), node.input(1)) else {
        return Vec::new();
    };

    let resolved = source_type(program, map.id).and_then(|t| {
        let (t, _) = t.indirect();
        match t.underlying() {
            ValueType::Map(key, _) => Some((t.clone(), (**key).clone())),
            _ => None,
        }
    });
    match resolved {
        Some((map_type, key_type)) => vec![
            TypeUpdate::new(map.id, map_type),
            TypeUpdate::new(key.id, key_type),
        ],
        None => vec![
            TypeUpdate::new(map.id, ValueType::Generic),
            TypeUpdate::new(key.id, ValueType::Generic),
        ],
    }
}

fn unify_len(program: &Program, node_id: NodeId) -> Vec<TypeUpdate> {
    let Some(input) = program.node(node_id).and_then(|n| n.input(0)) else {
        return Vec::new();
    };

    let value_type = match source_type(program, input.id) {
        // len of a pointer is only valid for pointers to arrays
        Some(t) => match t.indirect() {
            (elem, true) if !matches!(elem.underlying(), ValueType::Array(..)) => elem.clone(),
            _ => t.clone(),
        },
        None => ValueType::Generic,
    };
    vec![TypeUpdate::new(input.id, value_type)]
}

/// Run reactions after `port`'s connection set changed
pub(crate) fn connections_changed(program: &mut Program, port: PortId) {
    propagate(program, VecDeque::from([port]));
}

/// Re-run reactions downstream of an output whose type changed
pub(crate) fn propagate_from(program: &mut Program, output: PortId) {
    propagate(program, downstream(program, output).into());
}

fn downstream(program: &Program, port: PortId) -> Vec<PortId> {
    let Some(port) = program.port(port) else {
        return Vec::new();
    };
    if port.direction != PortDirection::Output {
        return Vec::new();
    }
    port.connections()
        .iter()
        .filter_map(|c| program.connection(*c))
        .map(|c| c.destination)
        .collect()
}

fn propagate(program: &mut Program, mut queue: VecDeque<PortId>) {
    let mut fired: HashMap<PortId, usize> = HashMap::new();

    while let Some(port) = queue.pop_front() {
        let Some(reaction) = program.observer(port) else {
            continue;
        };
        let Some(node) = program.port_node(port) else {
            continue;
        };
        let count = fired.entry(port).or_default();
        *count += 1;
        if *count > MAX_REACTIONS_PER_PORT {
            warn!("Type propagation did not settle at port {:?}; giving up", port);
            continue;
        }

        for update in reaction(program, node) {
            if program.set_port_type(update.port, update.value_type.clone()) {
                trace!("Port {:?} unified to {}", update.port, update.value_type);
                queue.extend(downstream(program, update.port));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::Program;
    use crate::port::PortSpec;
    use crate::types::ValueType;

    fn source(program: &mut Program, ty: ValueType) -> crate::port::PortId {
        let root = program.root();
        let node = program
            .add_call(root, "source", Vec::new(), vec![PortSpec::unnamed(ty)])
            .unwrap();
        program.node(node).unwrap().outputs[0].id
    }

    fn types(program: &Program, node: crate::node::NodeId) -> (Vec<ValueType>, Vec<ValueType>) {
        let node = program.node(node).unwrap();
        (
            node.inputs.iter().map(|p| p.value_type.clone()).collect(),
            node.outputs.iter().map(|p| p.value_type.clone()).collect(),
        )
    }

    #[test]
    fn test_len_unifies_and_resets() {
        let mut program = Program::new();
        let root = program.root();
        let ints = ValueType::slice(ValueType::int());
        let src = source(&mut program, ints.clone());
        let len = program.add_len(root).unwrap();
        let input = program.node(len).unwrap().inputs[0].id;

        let conn = program.connect(src, input).unwrap();
        assert_eq!(types(&program, len), (vec![ints], vec![ValueType::int()]));

        program.remove_connection(conn).unwrap();
        assert_eq!(types(&program, len), (vec![ValueType::Generic], vec![ValueType::int()]));
    }

    #[test]
    fn test_removing_source_node_resets_len() {
        let mut program = Program::new();
        let root = program.root();
        let ints = ValueType::slice(ValueType::int());
        let src = source(&mut program, ints.clone());
        let len = program.add_len(root).unwrap();
        let input = program.node(len).unwrap().inputs[0].id;
        program.connect(src, input).unwrap();
        assert_eq!(types(&program, len).0, vec![ints]);

        let producer = program.port_node(src).unwrap();
        program.remove_node(producer).unwrap();
        assert!(!program.port(input).unwrap().is_connected());
        assert_eq!(types(&program, len).0, vec![ValueType::Generic]);
    }

    #[test]
    fn test_len_dereferences_non_array_pointers() {
        let mut program = Program::new();
        let root = program.root();
        let src = source(&mut program, ValueType::pointer(ValueType::slice(ValueType::int())));
        let len = program.add_len(root).unwrap();
        let input = program.node(len).unwrap().inputs[0].id;
        program.connect(src, input).unwrap();
        assert_eq!(types(&program, len).0, vec![ValueType::slice(ValueType::int())]);

        let array_ptr = ValueType::pointer(ValueType::array(3, ValueType::int()));
        let src = source(&mut program, array_ptr.clone());
        let len = program.add_len(root).unwrap();
        let input = program.node(len).unwrap().inputs[0].id;
        program.connect(src, input).unwrap();
        assert_eq!(types(&program, len).0, vec![array_ptr]);
    }

    #[test]
    fn test_append_follows_pointer() {
        let mut program = Program::new();
        let root = program.root();
        let strings = ValueType::slice(ValueType::string());
        let src = source(&mut program, ValueType::pointer(strings.clone()));
        let append = program.add_append(root).unwrap();
        let slice = program.node(append).unwrap().inputs[0].id;

        let conn = program.connect(src, slice).unwrap();
        assert_eq!(
            types(&program, append),
            (vec![strings.clone(), ValueType::string()], vec![strings])
        );

        program.remove_connection(conn).unwrap();
        assert_eq!(
            types(&program, append),
            (vec![ValueType::Generic, ValueType::Generic], vec![ValueType::Generic])
        );
    }

    #[test]
    fn test_append_shape_mismatch_stays_generic() {
        let mut program = Program::new();
        let root = program.root();
        let src = source(&mut program, ValueType::int());
        let append = program.add_append(root).unwrap();
        let slice = program.node(append).unwrap().inputs[0].id;

        program.connect(src, slice).unwrap();
        assert_eq!(
            types(&program, append),
            (vec![ValueType::Generic, ValueType::Generic], vec![ValueType::Generic])
        );
    }

    #[test]
    fn test_delete_takes_key_type() {
        let mut program = Program::new();
        let root = program.root();
        let ages = ValueType::named("Ages", ValueType::map(ValueType::string(), ValueType::int()));
        let src = source(&mut program, ages.clone());
        let delete = program.add_delete(root).unwrap();
        let map = program.node(delete).unwrap().inputs[0].id;

        program.connect(src, map).unwrap();
        assert_eq!(types(&program, delete).0, vec![ages, ValueType::string()]);
    }

    #[test]
    fn test_propagates_through_chain() {
        let mut program = Program::new();
        let root = program.root();
        let append = program.add_append(root).unwrap();
        let len = program.add_len(root).unwrap();
        let append_out = program.node(append).unwrap().outputs[0].id;
        let len_in = program.node(len).unwrap().inputs[0].id;
        program.connect(append_out, len_in).unwrap();
        assert_eq!(types(&program, len).0, vec![ValueType::Generic]);

        let floats = ValueType::slice(ValueType::basic("float64"));
        let src = source(&mut program, floats.clone());
        let slice = program.node(append).unwrap().inputs[0].id;
        let conn = program.connect(src, slice).unwrap();
        assert_eq!(types(&program, len).0, vec![floats]);

        program.remove_connection(conn).unwrap();
        assert_eq!(types(&program, len).0, vec![ValueType::Generic]);
    }

    #[test]
    fn test_make_rebuilds_inputs() {
        let mut program = Program::new();
        let root = program.root();
        let ints = ValueType::slice(ValueType::int());
        let make = program.add_make(root, Some(ints.clone())).unwrap();
        assert_eq!(
            types(&program, make),
            (vec![ValueType::int(), ValueType::int()], vec![ints])
        );

        let len = program.add_len(root).unwrap();
        let make_out = program.node(make).unwrap().outputs[0].id;
        let len_in = program.node(len).unwrap().inputs[0].id;
        program.connect(make_out, len_in).unwrap();

        let lookup = ValueType::map(ValueType::string(), ValueType::bool());
        program.set_make_type(make, lookup.clone()).unwrap();
        let node = program.node(make).unwrap();
        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.inputs[0].name, "len");
        assert_eq!(types(&program, len).0, vec![lookup]);

        assert!(program.set_make_type(make, ValueType::int()).is_err());
        assert!(program.set_make_type(len, ValueType::slice(ValueType::int())).is_err());
    }
}
