//! Datagraph command-line runner
//!
//! Loads a workflow snapshot, runs it (or one target node and its
//! ancestors) and prints the run report, dashboard items and a preview of
//! every node's outputs.

mod render;
mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use datagraph_engine::{
    validate_workflow, EngineConfig, NodeCategory, NodeRegistry, RunReport, WorkflowEngine,
    WorkflowGraph,
};
use datagraph_nodes::builtin_registry;

use crate::render::render_snapshot;
use crate::sink::LoggingEventSink;

#[derive(Parser)]
#[command(name = "datagraph", version, about = "Run tabular data workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow snapshot
    Run {
        /// Workflow snapshot (JSON)
        snapshot: PathBuf,
        /// Run only this node and the ancestors it needs
        #[arg(long)]
        target: Option<String>,
        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Rows shown per output table
        #[arg(long, default_value_t = 10)]
        preview_rows: usize,
        /// Print the report as JSON only
        #[arg(long)]
        json: bool,
    },
    /// Check a snapshot for structural problems without running it
    Validate {
        snapshot: PathBuf,
    },
    /// List the registered node kinds
    ListNodes {
        /// Only this category (source, manipulation, statistics, scoring, visualization)
        #[arg(long)]
        category: Option<NodeCategory>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let registry = builtin_registry();
    match cli.command {
        Command::Run {
            snapshot,
            target,
            config,
            preview_rows,
            json,
        } => run(registry, &snapshot, target, config, preview_rows, json).await,
        Command::Validate { snapshot } => validate(&registry, &snapshot),
        Command::ListNodes { category } => {
            list_nodes(&registry, category);
            Ok(())
        }
    }
}

fn read_graph(path: &Path) -> anyhow::Result<WorkflowGraph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid snapshot {}", path.display()))
}

async fn run(
    registry: NodeRegistry,
    snapshot: &Path,
    target: Option<String>,
    config: Option<PathBuf>,
    preview_rows: usize,
    json: bool,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_json(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    let graph = read_graph(snapshot)?;
    log::info!(
        "Loaded workflow '{}' ({} nodes, {} edges)",
        graph.name,
        graph.nodes.len(),
        graph.edges.len()
    );

    let mut engine = WorkflowEngine::new(Arc::new(registry), Arc::new(LoggingEventSink::new()))
        .with_config(config);
    engine.load_snapshot(graph)?;

    let report = match target {
        Some(target) => engine.execute_node_with_dependencies(&target).await?,
        None => engine.execute_workflow().await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&engine, &report, preview_rows)?;
    }

    if !report.is_success() {
        bail!(
            "{} node(s) failed, {} blocked",
            report.failed.len(),
            report.blocked.len()
        );
    }
    Ok(())
}

fn print_report(engine: &WorkflowEngine, report: &RunReport, preview_rows: usize) -> anyhow::Result<()> {
    println!("Run {}", report.run_id);
    println!("  executed: {}", report.executed.join(", "));
    for failed in &report.failed {
        println!(
            "  failed:   {} ({:?}: {})",
            failed.node_id, failed.error.kind, failed.error.message
        );
    }
    if !report.blocked.is_empty() {
        println!("  blocked:  {}", report.blocked.join(", "));
    }
    if report.canceled {
        println!("  canceled");
    }

    for id in &report.executed {
        let Some(view) = engine.open_view(id)? else {
            continue;
        };
        let mut snapshot = view.render();
        for section in &mut snapshot.sections {
            section.lines.truncate(preview_rows);
        }
        print!("{}", render_snapshot(engine.node_label(id).unwrap_or(id.as_str()), &snapshot));
    }

    if !report.dashboard_items.is_empty() {
        println!("Dashboard");
        println!("{}", serde_json::to_string_pretty(&report.dashboard_items)?);
    }
    Ok(())
}

fn validate(registry: &NodeRegistry, snapshot: &Path) -> anyhow::Result<()> {
    let graph = read_graph(snapshot)?;
    let issues = validate_workflow(&graph, Some(registry));
    if issues.is_empty() {
        println!("{}: ok ({} nodes)", snapshot.display(), graph.nodes.len());
        return Ok(());
    }
    for issue in &issues {
        println!("{}", issue);
    }
    bail!("{} issue(s) found", issues.len())
}

fn list_nodes(registry: &NodeRegistry, category: Option<NodeCategory>) {
    let factories = match category {
        Some(category) => registry.factories_by_category(category),
        None => registry.all_factories(),
    };
    for factory in factories {
        let meta = factory.metadata();
        println!(
            "{:<16} {:<14} {} in / {} out  {}",
            meta.node_type,
            meta.category.as_str(),
            meta.inputs.len(),
            meta.outputs.len(),
            meta.description
        );
    }
}
