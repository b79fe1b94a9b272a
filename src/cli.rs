use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use crate::config::load_config;
use crate::coordinator::{LogSink, NotificationSink, Severity};
use crate::ir::Node;
use crate::remote::{HttpPersistenceClient, PersistenceClient};
use crate::store::GraphStore;

#[derive(Parser, Debug)]
#[command(
    name = "topodesign",
    version,
    about = "Topology design validator and layout refitter"
)]
pub struct Args {
    /// Input design (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Validate and report only; write nothing
    #[arg(long = "check")]
    pub check: bool,

    /// Config JSON file (layout overrides, worker flags, backend URL)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Backend base URL to seed with the design; overrides the config file
    #[arg(long = "backend")]
    pub backend: Option<String>,
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    if config.workers.validate_in_background || config.workers.offload_layout {
        tracing::debug!("worker flags have no effect in CLI mode");
    }

    let input = read_input(args.input.as_deref())?;
    let doc = crate::io::parse_design(&input)?;
    let mut store = GraphStore::from_design(&doc, config.layout.clone())?;
    let refit = store.refit_all();

    if args.check {
        println!(
            "ok: {} nodes, {} edges, {} containers refit",
            store.node_count(),
            store.edge_count(),
            refit
        );
        return Ok(());
    }

    if let Some(base) = args.backend.or_else(|| config.backend_url.clone()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(seed_backend(&store, &base))?;
    }

    crate::io::write_design(&store.to_design(), args.output.as_deref())?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            return Ok(buf);
        }
        return Ok(std::fs::read_to_string(path)?);
    }

    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Push a validated design to a backend, parents before children so the
/// service never sees a dangling parent reference. Per-call outcomes follow
/// the usual classification; a refused or unreachable entity is reported and
/// skipped, never retried.
async fn seed_backend(store: &GraphStore, base: &str) -> Result<()> {
    let client = HttpPersistenceClient::new(Some(base))?;
    let sink = LogSink;
    let mut saved = 0usize;
    let mut refused = 0usize;
    let mut unreachable = 0usize;

    for node in creation_order(store) {
        match client.create_node(node).await {
            Ok(_) => saved += 1,
            Err(err) if err.is_definite_rejection() => {
                refused += 1;
                sink.notify(
                    &format!("backend refused node {}: {err}", node.id),
                    Severity::Error,
                );
            }
            Err(err) => {
                unreachable += 1;
                sink.notify(
                    &format!("node {} not persisted: {err}", node.id),
                    Severity::Warn,
                );
            }
        }
    }
    for edge in store.edges() {
        match client.create_edge(edge).await {
            Ok(_) => saved += 1,
            Err(err) if err.is_definite_rejection() => {
                refused += 1;
                sink.notify(
                    &format!("backend refused edge {}: {err}", edge.id),
                    Severity::Error,
                );
            }
            Err(err) => {
                unreachable += 1;
                sink.notify(&format!("edge {} not persisted: {err}", edge.id), Severity::Warn);
            }
        }
    }

    sink.notify(
        &format!("seeded backend: {saved} saved, {refused} refused, {unreachable} unreachable"),
        Severity::Info,
    );
    Ok(())
}

fn depth_of(store: &GraphStore, node: &Node) -> usize {
    let mut depth = 0;
    let mut current = node;
    while let Some(parent_id) = current.parent_id.as_deref() {
        match store.node(parent_id) {
            Some(parent) if depth < store.node_count() => {
                depth += 1;
                current = parent;
            }
            _ => break,
        }
    }
    depth
}

fn creation_order(store: &GraphStore) -> Vec<&Node> {
    let mut nodes: Vec<&Node> = store.nodes().collect();
    nodes.sort_by(|a, b| {
        depth_of(store, a)
            .cmp(&depth_of(store, b))
            .then_with(|| a.id.cmp(&b.id))
    });
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeType;

    #[test]
    fn creation_order_puts_parents_first() {
        let mut store = GraphStore::default();
        store
            .insert_node(Node::new("z-site", NodeType::Site, "HQ"))
            .expect("site");
        store
            .insert_node(Node::new("a-bldg", NodeType::Building, "B").inside("z-site"))
            .expect("building");
        store
            .insert_node(Node::new("m-room", NodeType::Room, "R").inside("a-bldg"))
            .expect("room");

        let order: Vec<&str> = creation_order(&store).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["z-site", "a-bldg", "m-room"]);
    }
}
