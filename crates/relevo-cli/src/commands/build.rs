//! Artifact build command.
//!
//! Generates netlist text from a graph and wraps it in a loadable
//! [`DynamicArtifact`] manifest. The engine's dynamic source mode runs the
//! stored netlist as-is, so what gets written here is exactly what plays.

use std::path::PathBuf;

use clap::Args;
use relevo_compile::{ARTIFACT_ABI, DynamicArtifact};
use relevo_core::{LibraryView, NodeKind};

use super::common::load_graph;

#[derive(Args)]
pub struct BuildArgs {
    /// Graph JSON file
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Output artifact manifest (JSON)
    #[arg(value_name = "ARTIFACT")]
    output: PathBuf,

    /// Artifact name (defaults to the graph name)
    #[arg(long)]
    name: Option<String>,

    /// Restrict the artifact to these kinds (comma-separated, e.g. "gain,saturate")
    #[arg(long)]
    kinds: Option<String>,
}

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    println!("Reading {}...", args.graph.display());
    let graph = load_graph(&args.graph)?;

    let netlist = relevo_codegen::generate(&graph)
        .map_err(|e| anyhow::anyhow!("graph rejected: {}", e))?;
    println!(
        "  graph '{}': {} netlist line(s)",
        graph.name,
        netlist.lines().count()
    );

    let name = args.name.unwrap_or_else(|| graph.name.clone());
    let artifact = match &args.kinds {
        None => DynamicArtifact::new(&name, &netlist)?,
        Some(list) => {
            let mut kinds = Vec::new();
            for token in list.split(',') {
                let token = token.trim();
                let kind = NodeKind::from_token(token)
                    .ok_or_else(|| anyhow::anyhow!("unknown node kind '{}'", token))?;
                kinds.push(kind);
            }
            DynamicArtifact::with_kinds(&name, &netlist, &kinds)?
        }
    };

    artifact.save(&args.output)?;

    let supported: Vec<&str> = NodeKind::ALL
        .iter()
        .copied()
        .filter(|&k| !matches!(k, NodeKind::Input | NodeKind::Output))
        .filter(|&k| artifact.supports(k))
        .map(NodeKind::token)
        .collect();

    println!("\nWrote {}:", args.output.display());
    println!("  name:  {}", artifact.name());
    println!("  abi:   {}", ARTIFACT_ABI);
    println!("  kinds: {}", supported.join(", "));
    Ok(())
}
