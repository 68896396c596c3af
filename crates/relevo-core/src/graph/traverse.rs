//! Canonical graph ordering.
//!
//! Code generation must emit byte-identical text for structurally identical
//! graphs, no matter the order in which the editor inserted nodes or routes.
//! The ordering defined here is the single source of that determinism: a
//! depth-first walk from the Output node over incoming routes, visiting the
//! predecessors of each node sorted by destination port, then source node
//! name, then source port. Nodes are emitted post-order, so every node
//! appears after everything that feeds it.
//!
//! Nodes outside the output cone are never visited and never emitted.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use super::model::{GraphError, NodeGraph};
use super::node::{Node, NodeKind};

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// Returns the graph's nodes in canonical order: inputs before consumers,
/// ties broken by port and name.
///
/// Fails with [`GraphError::InvalidOutputCount`] when the graph has no
/// Output node and [`GraphError::CycleDetected`] if a route cycle survived
/// into the snapshot (possible for graphs deserialized from files, which
/// bypass the `connect`-time guard).
pub fn canonical_order(graph: &NodeGraph) -> Result<Vec<&Node>, GraphError> {
    let nodes = graph.nodes();
    let Some(output) = nodes.iter().position(|n| n.kind == NodeKind::Output) else {
        return Err(GraphError::InvalidOutputCount(0));
    };

    let mut state = vec![Visit::Unvisited; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    visit(graph, output, &mut state, &mut order)?;
    Ok(order.into_iter().map(|i| &nodes[i]).collect())
}

fn visit(
    graph: &NodeGraph,
    idx: usize,
    state: &mut Vec<Visit>,
    order: &mut Vec<usize>,
) -> Result<(), GraphError> {
    state[idx] = Visit::InProgress;

    let name = &graph.nodes()[idx].name;
    let mut preds: Vec<(u8, &str, u8)> = graph
        .incoming(name)
        .map(|r| (r.to.port, r.from.node.as_str(), r.from.port))
        .collect();
    preds.sort_unstable();

    for (_, pred, _) in preds {
        let Some(pi) = graph.nodes().iter().position(|n| n.name == pred) else {
            continue;
        };
        match state[pi] {
            Visit::Unvisited => visit(graph, pi, state, order)?,
            Visit::InProgress => return Err(GraphError::CycleDetected),
            Visit::Done => {}
        }
    }

    state[idx] = Visit::Done;
    order.push(idx);
    Ok(())
}
