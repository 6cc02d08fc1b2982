// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flux demo - builds sample programs and prints their Go source.
//!
//! ```text
//! flux_demo [--settings codegen.ron] [--sample branch] [--layout-steps 30]
//! ```

use clap::{Parser, ValueEnum};
use flux_graph::layout;
use flux_graph::{
    Bindings, BlockId, CodegenSettings, Emitter, GraphError, LiteralValue, NodeId, NodeKind,
    PortId, PortSpec, Program, SettingsError, ValueType,
};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Sample program to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Sample {
    /// `a()` feeding `b(x)`
    Chain,
    /// A value shared by both arms of an `if`
    Branch,
    /// `len` unified from a slice producer
    Len,
    /// A value produced inside an `if` and used after it
    Escape,
    /// Every sample
    All,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a RON codegen settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Which sample to print
    #[arg(long, value_enum, default_value = "all")]
    sample: Sample,

    /// Layout steps to run on each sample before printing positions
    #[arg(long, default_value_t = 0)]
    layout_steps: usize,
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Codegen(#[from] flux_graph::CodegenError),

    #[error("Branch node has no nested blocks")]
    MissingArms,
}

fn output(program: &Program, node: NodeId, index: usize) -> Result<PortId, GraphError> {
    program
        .node(node)
        .and_then(|n| n.output(index))
        .map(|p| p.id)
        .ok_or(GraphError::NodeNotFound(node))
}

fn input(program: &Program, node: NodeId, index: usize) -> Result<PortId, GraphError> {
    program
        .node(node)
        .and_then(|n| n.input(index))
        .map(|p| p.id)
        .ok_or(GraphError::NodeNotFound(node))
}

fn wire(program: &mut Program, from: NodeId, to: NodeId, index: usize) -> Result<(), GraphError> {
    let (source, destination) = (output(program, from, 0)?, input(program, to, index)?);
    program.connect(source, destination)?;
    Ok(())
}

fn arms(program: &Program, branch: NodeId) -> Result<(BlockId, BlockId), DemoError> {
    match program.node(branch).map(|n| &n.kind) {
        Some(NodeKind::Branch {
            true_block,
            false_block,
        }) => Ok((*true_block, *false_block)),
        _ => Err(DemoError::MissingArms),
    }
}

fn int_port() -> Vec<PortSpec> {
    vec![PortSpec::unnamed(ValueType::int())]
}

fn build_chain() -> Result<Program, DemoError> {
    let mut program = Program::new();
    let root = program.root();
    let a = program.add_call(root, "a", Vec::new(), int_port())?;
    let b = program.add_call(root, "b", int_port(), Vec::new())?;
    wire(&mut program, a, b, 0)?;
    Ok(program)
}

fn build_branch() -> Result<Program, DemoError> {
    let mut program = Program::new();
    let root = program.root();
    let cond = program.add_literal(root, LiteralValue::Bool(true))?;
    let p = program.add_call(root, "p", Vec::new(), int_port())?;
    let branch = program.add_branch(root)?;
    let (yes, no) = arms(&program, branch)?;
    let c = program.add_call(yes, "c", int_port(), Vec::new())?;
    let d = program.add_call(no, "d", int_port(), Vec::new())?;
    wire(&mut program, cond, branch, 0)?;
    wire(&mut program, p, c, 0)?;
    wire(&mut program, p, d, 0)?;
    Ok(program)
}

fn build_len() -> Result<Program, DemoError> {
    let mut program = Program::new();
    let root = program.root();
    let ints = ValueType::slice(ValueType::int());
    let make = program.add_make(root, Some(ints))?;
    let size = program.add_literal(root, LiteralValue::Int(4))?;
    let len = program.add_len(root)?;
    let print = program.add_call(root, "println", int_port(), Vec::new())?;
    wire(&mut program, size, make, 0)?;
    wire(&mut program, make, len, 0)?;
    wire(&mut program, len, print, 0)?;
    Ok(program)
}

fn build_escape() -> Result<Program, DemoError> {
    let mut program = Program::new();
    let root = program.root();
    let cond = program.add_call(root, "ready", Vec::new(), vec![PortSpec::unnamed(ValueType::bool())])?;
    let branch = program.add_branch(root)?;
    let (yes, _) = arms(&program, branch)?;
    let produce = program.add_call(yes, "produce", Vec::new(), int_port())?;
    let consume = program.add_call(root, "consume", int_port(), Vec::new())?;
    wire(&mut program, cond, branch, 0)?;
    wire(&mut program, produce, consume, 0)?;
    Ok(program)
}

fn print_layout(program: Program, steps: usize) -> Result<(), DemoError> {
    let root = program.root();
    let shared = layout::share(program);
    for _ in 0..steps {
        layout::reform_step(&shared, root, layout::REFORM_INTERVAL.as_secs_f32())?;
    }
    let program = shared.read();
    for node in program.nodes().filter(|n| n.block == root) {
        println!(
            "// {:<10} at ({:.1}, {:.1})",
            node.kind.label(),
            node.position[0],
            node.position[1]
        );
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), DemoError> {
    let settings = match &cli.settings {
        Some(path) => CodegenSettings::load(path)?,
        None => CodegenSettings::default(),
    };

    let samples: [(Sample, fn() -> Result<Program, DemoError>); 4] = [
        (Sample::Chain, build_chain),
        (Sample::Branch, build_branch),
        (Sample::Len, build_len),
        (Sample::Escape, build_escape),
    ];

    for (sample, build) in samples {
        if cli.sample != Sample::All && cli.sample != sample {
            continue;
        }
        let program = build()?;
        let code = Emitter::new(&program)
            .with_settings(settings.clone())
            .code(program.root(), 0, &Bindings::new())?;
        tracing::debug!("Generated {:?} sample with {} nodes", sample, program.node_count());

        println!("// {:?}", sample);
        print!("{code}");
        if cli.layout_steps > 0 {
            print_layout(program, cli.layout_steps)?;
        }
        println!();
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("flux_demo=info,flux_graph=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Flux demo v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&cli) {
        tracing::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}
