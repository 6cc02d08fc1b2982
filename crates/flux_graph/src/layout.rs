// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background layout of node positions.
//!
//! The editor relaxes node positions continuously while the user edits.
//! Each step copies what it needs under a read lock, computes new positions
//! without holding the lock, and writes them back under a short write lock,
//! so it never observes a half-applied edit. Scheduling and code generation
//! ignore positions entirely.

use crate::block::BlockId;
use crate::graph::{GraphError, Program};
use crate::node::NodeId;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Program shared between the editing thread and the layout loop
pub type SharedProgram = Arc<RwLock<Program>>;

/// Interval between layout steps
pub const REFORM_INTERVAL: Duration = Duration::from_millis(33);

/// Nodes closer than this push each other apart
const REPULSION_RADIUS: f32 = 128.0;

/// Preferred horizontal gap from a source to its destination
const CONNECTION_GAP: f32 = 64.0;

/// Wrap a program for sharing with a layout loop
pub fn share(program: Program) -> SharedProgram {
    Arc::new(RwLock::new(program))
}

struct Snapshot {
    positions: IndexMap<NodeId, [f32; 2]>,
    edges: Vec<(NodeId, NodeId)>,
}

fn snapshot(program: &Program, block: BlockId) -> Result<Snapshot, GraphError> {
    let scope = program.block(block).ok_or(GraphError::BlockNotFound(block))?;
    let positions = scope
        .nodes()
        .filter_map(|id| program.node(id).map(|n| (id, n.position)))
        .collect();
    let edges = scope
        .connections()
        .filter_map(|id| program.connection(id))
        .filter_map(|c| {
            let src = program.port_node(c.source)?;
            let dst = program.port_node(c.destination)?;
            Some((program.resolve_member(block, src)?, program.resolve_member(block, dst)?))
        })
        .collect();
    Ok(Snapshot { positions, edges })
}

fn relax(snapshot: &Snapshot, dt: f32) -> IndexMap<NodeId, [f32; 2]> {
    let count = snapshot.positions.len();
    if count == 0 {
        return IndexMap::new();
    }

    let mut center = [0.0f32, 0.0];
    for p in snapshot.positions.values() {
        center[0] += p[0];
        center[1] += p[1];
    }
    center[0] /= count as f32;
    center[1] /= count as f32;

    let mut velocity: IndexMap<NodeId, [f32; 2]> =
        snapshot.positions.keys().map(|id| (*id, [0.0, 0.0])).collect();

    for (a, pa) in &snapshot.positions {
        for (b, pb) in &snapshot.positions {
            if a == b {
                continue;
            }
            let dir = [pa[0] - pb[0], pa[1] - pb[1]];
            let d = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
            if d > REPULSION_RADIUS {
                continue;
            }
            let scale = 2.0 * (REPULSION_RADIUS - d) / (1.0 + d);
            let v = &mut velocity[a];
            v[0] += dir[0] * scale;
            v[1] += dir[1] * scale;
        }
    }

    for (src, dst) in &snapshot.edges {
        if src == dst {
            continue;
        }
        let (ps, pd) = (snapshot.positions[src], snapshot.positions[dst]);
        // favour left-to-right flow with little vertical pull
        let pull = [(pd[0] - (ps[0] + CONNECTION_GAP)) * 2.0, (pd[1] - ps[1]) / 2.0];
        velocity[src][0] += pull[0];
        velocity[src][1] += pull[1];
        velocity[dst][0] -= pull[0];
        velocity[dst][1] -= pull[1];
    }

    snapshot
        .positions
        .iter()
        .map(|(id, p)| {
            let v = velocity[id];
            let v = [v[0] + (center[0] - p[0]) / 4.0, v[1] + (center[1] - p[1]) / 4.0];
            (*id, [p[0] + v[0] * 2.0 * dt, p[1] + v[1] * 2.0 * dt])
        })
        .collect()
}

/// Run one layout step for the direct members of `block`
pub fn reform_step(program: &SharedProgram, block: BlockId, dt: f32) -> Result<(), GraphError> {
    let snapshot = snapshot(&program.read(), block)?;
    let positions = relax(&snapshot, dt);

    let mut program = program.write();
    for (id, position) in positions {
        // nodes removed since the snapshot are skipped
        if program.node(id).is_some_and(|n| n.block == block) {
            program.set_position(id, position)?;
        }
    }
    Ok(())
}

/// Handle to a running layout loop
pub struct ReformHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReformHandle {
    /// Whether the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Layout loop panicked");
            }
        }
    }
}

impl Drop for ReformHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Relax `block` every [`REFORM_INTERVAL`] on a background thread until
/// stopped or the block disappears
pub fn spawn_reform(program: SharedProgram, block: BlockId) -> ReformHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let thread = std::thread::spawn(move || {
        let dt = REFORM_INTERVAL.as_secs_f32();
        while !flag.load(Ordering::Relaxed) {
            if let Err(err) = reform_step(&program, block, dt) {
                tracing::debug!("Layout loop for block {:?} ended: {err}", block);
                break;
            }
            std::thread::sleep(REFORM_INTERVAL);
        }
    });
    ReformHandle {
        stop,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortSpec;
    use crate::types::ValueType;

    fn distance(program: &Program, a: NodeId, b: NodeId) -> f32 {
        let (pa, pb) = (program.node(a).unwrap().position, program.node(b).unwrap().position);
        ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt()
    }

    #[test]
    fn test_connected_nodes_draw_together() {
        let mut program = Program::new();
        let root = program.root();
        let a = program
            .add_call(root, "a", Vec::new(), vec![PortSpec::unnamed(ValueType::int())])
            .unwrap();
        let b = program
            .add_call(root, "b", vec![PortSpec::unnamed(ValueType::int())], Vec::new())
            .unwrap();
        program.set_position(b, [300.0, 0.0]).unwrap();
        let (src, dst) = (
            program.node(a).unwrap().outputs[0].id,
            program.node(b).unwrap().inputs[0].id,
        );
        program.connect(src, dst).unwrap();

        let shared = share(program);
        reform_step(&shared, root, 0.033).unwrap();

        let program = shared.read();
        let d = distance(&program, a, b);
        assert!(d < 300.0);
        assert!(program.node(a).unwrap().position[0] < program.node(b).unwrap().position[0]);
    }

    #[test]
    fn test_close_nodes_repel() {
        let mut program = Program::new();
        let root = program.root();
        let a = program.add_call(root, "a", Vec::new(), Vec::new()).unwrap();
        let b = program.add_call(root, "b", Vec::new(), Vec::new()).unwrap();
        program.set_position(b, [10.0, 0.0]).unwrap();

        let shared = share(program);
        reform_step(&shared, root, 0.033).unwrap();
        assert!(distance(&shared.read(), a, b) > 10.0);
    }

    #[test]
    fn test_empty_and_missing_blocks() {
        let shared = share(Program::new());
        let root = shared.read().root();
        assert!(reform_step(&shared, root, 0.033).is_ok());
        assert!(matches!(
            reform_step(&shared, BlockId::new(), 0.033),
            Err(GraphError::BlockNotFound(_))
        ));
    }

    #[test]
    fn test_stop_survives_panicked_loop() {
        let handle = ReformHandle {
            stop: Arc::new(AtomicBool::new(false)),
            thread: Some(std::thread::spawn(|| panic!("layout failed"))),
        };
        while handle.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.stop();
    }

    #[test]
    fn test_loop_stops() {
        let shared = share(Program::new());
        let root = shared.read().root();
        let handle = spawn_reform(shared.clone(), root);
        std::thread::sleep(Duration::from_millis(50));
        assert!(handle.is_running());
        handle.stop();

        let mut program = shared.write();
        assert!(program.add_len(root).is_ok());
    }
}
