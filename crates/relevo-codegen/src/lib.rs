//! Deterministic netlist text generation.
//!
//! Turns a validated [`NodeGraph`] into the line-oriented netlist format the
//! build pipeline consumes:
//!
//! ```text
//! graph pedal
//! node in input
//! node drive saturate shape=tanh drive@0
//! node lp filter mode=lowpass cutoff_hz@1
//! node out output
//! route in.0 -> drive.0
//! route drive.0 -> lp.0
//! route lp.0 -> out.0
//! ```
//!
//! ## Determinism
//!
//! Structurally identical graphs produce byte-identical text, no matter the
//! order nodes and routes were inserted in. Everything that could vary is
//! pinned to a canonical choice:
//!
//! - nodes appear in [`canonical_order`] (depth-first from the output,
//!   predecessors sorted by port, then name)
//! - attributes appear in kind-table order, always all of them, with the
//!   node's override or the table default
//! - bound parameters appear in kind-table order, as `name@slot`
//! - routes appear grouped by destination in canonical order, sorted by
//!   destination port, then source name, then source port
//!
//! ## Values are not text
//!
//! A bound parameter line carries the automation slot but never the current
//! value. Tweaking a value therefore reproduces the exact same text, and the
//! mode controller compares texts to decide whether a rebuild is needed at
//! all. Current values reach a fresh unit through the compile snapshot, not
//! through the source.

use relevo_core::{AttrValue, GraphError, LibraryView, Node, NodeGraph, canonical_order, kind_spec};

/// Generates netlist text for a graph.
///
/// Validates first, so malformed graphs fail with the structural
/// [`GraphError`] instead of producing unbuildable text.
pub fn generate(graph: &NodeGraph) -> Result<String, GraphError> {
    emit(graph, None)
}

/// Generates netlist text for execution by a loaded artifact library.
///
/// Same output as [`generate`], but fails with
/// [`GraphError::MissingLibraryKind`] when the graph uses a node kind the
/// library cannot execute. Checked up front, so the failure surfaces at
/// generation time rather than at artifact load time.
pub fn generate_for_library(
    graph: &NodeGraph,
    library: &dyn LibraryView,
) -> Result<String, GraphError> {
    emit(graph, Some(library))
}

fn emit(graph: &NodeGraph, library: Option<&dyn LibraryView>) -> Result<String, GraphError> {
    graph.validate()?;
    let order = canonical_order(graph)?;

    if let Some(lib) = library {
        for node in &order {
            if !lib.supports(node.kind) {
                return Err(GraphError::MissingLibraryKind(node.kind));
            }
        }
    }

    let mut text = String::new();
    text.push_str("graph ");
    text.push_str(&graph.name);
    text.push('\n');

    for node in &order {
        emit_node(&mut text, node);
    }
    for node in &order {
        emit_incoming_routes(&mut text, graph, &node.name);
    }
    Ok(text)
}

fn emit_node(out: &mut String, node: &Node) {
    out.push_str("node ");
    out.push_str(&node.name);
    out.push(' ');
    out.push_str(node.kind.token());

    let spec = kind_spec(node.kind);
    for attr in spec.attrs {
        out.push(' ');
        out.push_str(attr.name);
        out.push('=');
        match node.attr(attr.name) {
            Some(AttrValue::Number(v)) => out.push_str(&format!("{v}")),
            Some(AttrValue::Symbol(s)) => out.push_str(s),
            None => match attr.symbol_default {
                Some(s) => out.push_str(s),
                None => out.push_str(&format!("{}", attr.number_default)),
            },
        }
    }
    for param in spec.params {
        if let Some(bound) = node.param(param.name) {
            out.push(' ');
            out.push_str(param.name);
            out.push('@');
            out.push_str(&format!("{}", bound.slot));
        }
    }
    out.push('\n');
}

fn emit_incoming_routes(out: &mut String, graph: &NodeGraph, node: &str) {
    let mut incoming: Vec<(u8, &str, u8)> = graph
        .incoming(node)
        .map(|r| (r.to.port, r.from.node.as_str(), r.from.port))
        .collect();
    incoming.sort_unstable();

    for (to_port, from, from_port) in incoming {
        out.push_str(&format!("route {from}.{from_port} -> {node}.{to_port}\n"));
    }
}
