//! Shared CLI helpers used across multiple commands.

use std::path::Path;

use clap::ValueEnum;
use relevo_core::{NodeGraph, RenderUnit, SourceMode};

/// Offline-buildable source modes for the `--mode` flag.
///
/// `dynamic` and `custom` are not listed: on the command line an artifact
/// is selected with `--artifact` and custom text with `--netlist`.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CliMode {
    #[default]
    Interpreted,
    Jit,
}

impl From<CliMode> for SourceMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Interpreted => SourceMode::Interpreted,
            CliMode::Jit => SourceMode::JitCompiled,
        }
    }
}

/// Load a graph from its JSON file.
pub fn load_graph(path: &Path) -> anyhow::Result<NodeGraph> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let graph: NodeGraph = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("{} is not a graph file: {}", path.display(), e))?;
    Ok(graph)
}

/// Apply the graph's bound parameter values to a freshly built unit.
///
/// Generated netlist text carries bindings but never values, so a compiled
/// unit starts at its kind defaults. The engine seeds candidates from its
/// last-known value map; offline, the graph snapshot plays that role.
pub fn seed_bound_values(unit: &mut dyn RenderUnit, graph: &NodeGraph) {
    for node in graph.nodes() {
        for param in &node.params {
            unit.set_parameter(param.slot, param.value);
        }
    }
}

/// Parse a `slot=value` string for clap's `value_parser`.
pub fn parse_slot_val(s: &str) -> Result<(u32, f32), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid override format: '{}' (expected slot=value)", s));
    }
    let slot = parts[0]
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("'{}' is not a slot index", parts[0]))?;
    let value = parts[1]
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("'{}' is not a number", parts[1]))?;
    Ok((slot, value))
}
