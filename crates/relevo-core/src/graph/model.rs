//! Graph structure, mutation API, and structural validation.
//!
//! [`NodeGraph`] is the canonical, serializable description of the
//! processing topology. It is owned and mutated by the external editor;
//! the engine receives read-only snapshots of it per compile request.
//! Validation happens twice: cheap checks at `connect` time (existence,
//! port arity, duplicates, cycles) and a full pass in [`validate`]
//! (I/O-node counts, unconnected required inputs on the output cone)
//! before a snapshot is accepted for code generation.

#[cfg(not(feature = "std"))]
use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};

use super::node::{AttrValue, Node, NodeKind, kind_spec};

/// Errors raised by graph mutation, validation, or code generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A node with this name already exists.
    DuplicateNode(String),
    /// Node names must be identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
    InvalidNodeName(String),
    /// No node with this name exists.
    UnknownNode(String),
    /// The port index is out of range for the node's kind.
    InvalidPort(String, u8),
    /// A route between these endpoints already exists.
    DuplicateRoute(String, String),
    /// No route between these endpoints exists.
    UnknownRoute(String, String),
    /// Adding this route would create a cycle.
    CycleDetected,
    /// The graph must have exactly one Input node.
    InvalidInputCount(usize),
    /// The graph must have exactly one Output node.
    InvalidOutputCount(usize),
    /// A required input port on a node feeding the output is unconnected.
    UnconnectedInput(String, u8),
    /// The graph has no nodes.
    EmptyGraph,
    /// A node's attribute or parameter is not in the kind table.
    UnknownField(String, String),
    /// An attribute value has the wrong type or an unlisted symbol.
    InvalidAttrValue(String, String),
    /// The requested mode has no compiled equivalent for this node kind.
    MissingLibraryKind(NodeKind),
}

impl core::fmt::Display for GraphError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DuplicateNode(name) => write!(f, "node '{name}' already exists"),
            Self::InvalidNodeName(name) => {
                write!(f, "'{name}' is not a valid node name")
            }
            Self::UnknownNode(name) => write!(f, "node '{name}' not found"),
            Self::InvalidPort(name, port) => {
                write!(f, "port {port} out of range on node '{name}'")
            }
            Self::DuplicateRoute(from, to) => {
                write!(f, "route from '{from}' to '{to}' already exists")
            }
            Self::UnknownRoute(from, to) => {
                write!(f, "no route from '{from}' to '{to}'")
            }
            Self::CycleDetected => write!(f, "adding this route would create a cycle"),
            Self::InvalidInputCount(n) => write!(f, "expected 1 input node, found {n}"),
            Self::InvalidOutputCount(n) => write!(f, "expected 1 output node, found {n}"),
            Self::UnconnectedInput(name, port) => {
                write!(f, "input port {port} of node '{name}' is unconnected")
            }
            Self::EmptyGraph => write!(f, "graph has no nodes"),
            Self::UnknownField(name, field) => {
                write!(f, "node '{name}' has no attribute or parameter '{field}'")
            }
            Self::InvalidAttrValue(name, attr) => {
                write!(f, "invalid value for attribute '{attr}' of node '{name}'")
            }
            Self::MissingLibraryKind(kind) => {
                write!(f, "no compiled library equivalent for node kind '{kind}'")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GraphError {}

/// One endpoint of a route: a node name and a port index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortRef {
    /// Node name.
    pub node: String,
    /// Port index on that node (output port for sources, input port for
    /// destinations).
    #[cfg_attr(feature = "serde", serde(default))]
    pub port: u8,
}

impl PortRef {
    /// Port 0 of the named node.
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: 0,
        }
    }

    /// A specific port of the named node.
    pub fn port(node: impl Into<String>, port: u8) -> Self {
        Self {
            node: node.into(),
            port,
        }
    }
}

/// A directed connection from an output port to an input port.
///
/// Fan-out from one output port is unrestricted. Several routes arriving at
/// the same input port sum.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    /// Source output port.
    pub from: PortRef,
    /// Destination input port.
    pub to: PortRef,
}

/// The editable processing topology.
///
/// # Usage
///
/// 1. Create with [`new()`](Self::new)
/// 2. Add nodes: [`add_node()`](Self::add_node)
/// 3. Connect ports: [`connect()`](Self::connect) /
///    [`connect_ports()`](Self::connect_ports)
/// 4. Submit a clone to the engine, which runs [`validate()`](Self::validate)
///    before generating source from it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeGraph {
    /// Graph name; becomes the netlist header and identifies library
    /// artifacts in DynamicLibrary mode.
    pub name: String,
    nodes: Vec<Node>,
    routes: Vec<Route>,
}

impl NodeGraph {
    /// Creates an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            routes: Vec::new(),
        }
    }

    // --- Node mutations ---

    /// Adds a node. Fails on malformed or duplicate names and on fields
    /// not present in the kind table.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if !is_identifier(&node.name) {
            return Err(GraphError::InvalidNodeName(node.name));
        }
        if self.find(&node.name).is_some() {
            return Err(GraphError::DuplicateNode(node.name));
        }
        let spec = kind_spec(node.kind);
        for (attr, value) in &node.attrs {
            let Some(attr_spec) = spec.attr(attr) else {
                return Err(GraphError::UnknownField(node.name.clone(), attr.clone()));
            };
            if !attr_value_fits(attr_spec, value) {
                return Err(GraphError::InvalidAttrValue(
                    node.name.clone(),
                    attr.clone(),
                ));
            }
        }
        for param in &node.params {
            if spec.param(&param.name).is_none() {
                return Err(GraphError::UnknownField(
                    node.name.clone(),
                    param.name.clone(),
                ));
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: {} node '{}'", node.kind, node.name);
        self.nodes.push(node);
        Ok(())
    }

    /// Removes a node and every route touching it.
    pub fn remove_node(&mut self, name: &str) -> Result<(), GraphError> {
        let idx = self
            .find(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))?;
        self.nodes.remove(idx);
        self.routes
            .retain(|r| r.from.node != name && r.to.node != name);
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove: node '{name}'");
        Ok(())
    }

    /// Connects output port 0 of `from` to input port 0 of `to`.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        self.connect_ports(PortRef::new(from), PortRef::new(to))
    }

    /// Connects two specific ports.
    ///
    /// Fails if:
    /// - either node doesn't exist
    /// - a port index is out of range for the node's kind
    /// - an identical route already exists
    /// - the route would create a cycle
    pub fn connect_ports(&mut self, from: PortRef, to: PortRef) -> Result<(), GraphError> {
        let from_node = self
            .node(&from.node)
            .ok_or_else(|| GraphError::UnknownNode(from.node.clone()))?;
        let to_node = self
            .node(&to.node)
            .ok_or_else(|| GraphError::UnknownNode(to.node.clone()))?;

        if from.port >= kind_spec(from_node.kind).output_ports {
            return Err(GraphError::InvalidPort(from.node, from.port));
        }
        if to.port >= kind_spec(to_node.kind).input_ports {
            return Err(GraphError::InvalidPort(to.node, to.port));
        }

        if self.routes.iter().any(|r| r.from == from && r.to == to) {
            return Err(GraphError::DuplicateRoute(from.node, to.node));
        }

        // Cycle detection: would adding from→to create a cycle?
        // A cycle exists if `to` can already reach `from` via existing routes.
        if self.can_reach(&to.node, &from.node) {
            return Err(GraphError::CycleDetected);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_connect: {}.{} → {}.{}",
            from.node,
            from.port,
            to.node,
            to.port
        );
        self.routes.push(Route { from, to });
        Ok(())
    }

    /// Removes a route. Fails if no such route exists.
    pub fn disconnect(&mut self, from: &PortRef, to: &PortRef) -> Result<(), GraphError> {
        let before = self.routes.len();
        self.routes.retain(|r| !(r.from == *from && r.to == *to));
        if self.routes.len() == before {
            return Err(GraphError::UnknownRoute(
                from.node.clone(),
                to.node.clone(),
            ));
        }
        Ok(())
    }

    /// Sets or replaces an attribute override. A structural edit: the
    /// generated text changes, so regenerating modes rebuild.
    pub fn set_attr(
        &mut self,
        node: &str,
        attr: &str,
        value: AttrValue,
    ) -> Result<(), GraphError> {
        let idx = self
            .find(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;
        let n = &mut self.nodes[idx];
        let Some(attr_spec) = kind_spec(n.kind).attr(attr) else {
            return Err(GraphError::UnknownField(node.to_string(), attr.to_string()));
        };
        if !attr_value_fits(attr_spec, &value) {
            return Err(GraphError::InvalidAttrValue(
                node.to_string(),
                attr.to_string(),
            ));
        }
        if let Some(existing) = n.attrs.iter_mut().find(|(name, _)| name == attr) {
            existing.1 = value;
        } else {
            n.attrs.push((attr.to_string(), value));
        }
        Ok(())
    }

    /// Sets the current value of a bound parameter. Value-only: never
    /// changes the generated text, so it never forces a rebuild.
    pub fn set_param_value(
        &mut self,
        node: &str,
        param: &str,
        value: f32,
    ) -> Result<(), GraphError> {
        let idx = self
            .find(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;
        let n = &mut self.nodes[idx];
        let spec = kind_spec(n.kind);
        let Some(bound) = n.param_mut(param) else {
            return Err(GraphError::UnknownField(node.to_string(), param.to_string()));
        };
        // Kind table membership was checked at add_node time.
        let range = spec.param(param).map(|s| s.range);
        bound.value = range.map_or(value, |r| r.clamp(value));
        Ok(())
    }

    // --- Accessors ---

    /// Looks up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.find(name).map(|i| &self.nodes[i])
    }

    /// All nodes, in insertion order. Use [`canonical_order`] for the
    /// deterministic ordering.
    ///
    /// [`canonical_order`]: super::traverse::canonical_order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All routes, in insertion order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Routes arriving at the named node.
    pub fn incoming(&self, node: &str) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(move |r| r.to.node == node)
    }

    /// The highest automation slot bound anywhere in the graph, plus one.
    /// This is the parameter count a unit compiled from this graph declares.
    pub fn slot_count(&self) -> u32 {
        self.nodes
            .iter()
            .flat_map(|n| n.params.iter())
            .map(|p| p.slot + 1)
            .max()
            .unwrap_or(0)
    }

    // --- Validation ---

    /// Full structural validation of the graph.
    ///
    /// Checks, in order: non-empty, exactly one Input and one Output node,
    /// acyclicity, and that every input port of every node on the output
    /// cone is connected. Nodes that do not feed the output are legal (the
    /// editor may keep disconnected nodes parked) — they are simply never
    /// emitted.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let inputs = self.count_kind(NodeKind::Input);
        if inputs != 1 {
            return Err(GraphError::InvalidInputCount(inputs));
        }
        let outputs = self.count_kind(NodeKind::Output);
        if outputs != 1 {
            return Err(GraphError::InvalidOutputCount(outputs));
        }

        // Defensive re-check — the primary cycle guard is at connect() time,
        // but snapshots may arrive from deserialized files.
        self.check_acyclic()?;

        // Every input port of every node feeding the output must be driven.
        for idx in self.output_cone() {
            let node = &self.nodes[idx];
            let spec = kind_spec(node.kind);
            for port in 0..spec.input_ports {
                let driven = self
                    .routes
                    .iter()
                    .any(|r| r.to.node == node.name && r.to.port == port);
                if !driven {
                    return Err(GraphError::UnconnectedInput(node.name.clone(), port));
                }
            }
        }

        Ok(())
    }

    /// Indices of nodes that reach the Output node (including Output
    /// itself), in unspecified order.
    pub(crate) fn output_cone(&self) -> Vec<usize> {
        let Some(output) = self.nodes.iter().position(|n| n.kind == NodeKind::Output) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = Vec::new();
        stack.push(output);
        seen[output] = true;
        while let Some(idx) = stack.pop() {
            let name = &self.nodes[idx].name;
            for route in self.routes.iter().filter(|r| &r.to.node == name) {
                if let Some(src) = self.find(&route.from.node)
                    && !seen[src]
                {
                    seen[src] = true;
                    stack.push(src);
                }
            }
        }
        (0..self.nodes.len()).filter(|&i| seen[i]).collect()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    /// Whether `from` can reach `to` by following routes forward.
    fn can_reach(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let Some(start) = self.find(from) else {
            return false;
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = Vec::new();
        stack.push(start);
        seen[start] = true;
        while let Some(idx) = stack.pop() {
            let name = &self.nodes[idx].name;
            for route in self.routes.iter().filter(|r| &r.from.node == name) {
                if route.to.node == to {
                    return true;
                }
                if let Some(dst) = self.find(&route.to.node)
                    && !seen[dst]
                {
                    seen[dst] = true;
                    stack.push(dst);
                }
            }
        }
        false
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        // Kahn over the route multigraph; leftover nodes mean a cycle.
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.incoming(&n.name).count())
            .collect();
        let mut ready: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut visited = 0usize;
        while let Some(idx) = ready.pop() {
            visited += 1;
            let name = &self.nodes[idx].name;
            for route in self.routes.iter().filter(|r| &r.from.node == name) {
                if let Some(dst) = self.find(&route.to.node) {
                    in_degree[dst] -= 1;
                    if in_degree[dst] == 0 {
                        ready.push(dst);
                    }
                }
            }
        }
        if visited == self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::CycleDetected)
        }
    }
}

fn attr_value_fits(spec: &crate::param::AttrSpec, value: &AttrValue) -> bool {
    match value {
        AttrValue::Number(v) => spec.symbol_default.is_none() && v.is_finite(),
        AttrValue::Symbol(s) => spec.accepts_symbol(s),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, so names survive the netlist text format.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::AttrValue;

    fn chain() -> NodeGraph {
        let mut g = NodeGraph::new("chain");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("g1", NodeKind::Gain).with_param("gain_db", 0, -6.0))
            .unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "g1").unwrap();
        g.connect("g1", "out").unwrap();
        g
    }

    #[test]
    fn valid_chain_passes() {
        assert_eq!(chain().validate(), Ok(()));
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut g = chain();
        let err = g.add_node(Node::new("g1", NodeKind::Gain)).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("g1".into()));
    }

    #[test]
    fn unknown_field_rejected() {
        let mut g = NodeGraph::new("t");
        let err = g
            .add_node(Node::new("g", NodeKind::Gain).with_param("cutoff_hz", 0, 100.0))
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownField("g".into(), "cutoff_hz".into()));
    }

    #[test]
    fn malformed_names_rejected() {
        let mut g = NodeGraph::new("t");
        for bad in ["", "2fast", "a b", "x-y", "ünïc"] {
            assert_eq!(
                g.add_node(Node::new(bad, NodeKind::Gain)),
                Err(GraphError::InvalidNodeName(bad.into())),
                "name {bad:?} should be rejected"
            );
        }
        assert!(g.add_node(Node::new("_ok_2", NodeKind::Gain)).is_ok());
    }

    #[test]
    fn unlisted_symbol_rejected() {
        let mut g = NodeGraph::new("t");
        let err = g
            .add_node(
                Node::new("lp", NodeKind::Filter)
                    .with_attr("mode", AttrValue::Symbol("bandpass".into())),
            )
            .unwrap_err();
        assert_eq!(err, GraphError::InvalidAttrValue("lp".into(), "mode".into()));

        let err = g
            .add_node(Node::new("d", NodeKind::Delay).with_attr("time_ms", AttrValue::Symbol("long".into())))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidAttrValue("d".into(), "time_ms".into())
        );
    }

    #[test]
    fn connect_unknown_node_fails() {
        let mut g = chain();
        let err = g.connect("g1", "nope").unwrap_err();
        assert_eq!(err, GraphError::UnknownNode("nope".into()));
    }

    #[test]
    fn bad_port_rejected() {
        let mut g = chain();
        g.add_node(Node::new("m", NodeKind::Mix)).unwrap();
        // Mix has input ports 0 and 1, but only output port 0.
        assert_eq!(
            g.connect_ports(PortRef::port("g1", 1), PortRef::new("m")),
            Err(GraphError::InvalidPort("g1".into(), 1))
        );
        assert_eq!(
            g.connect_ports(PortRef::new("g1"), PortRef::port("m", 2)),
            Err(GraphError::InvalidPort("m".into(), 2))
        );
    }

    #[test]
    fn duplicate_route_rejected() {
        let mut g = chain();
        assert_eq!(
            g.connect("in", "g1"),
            Err(GraphError::DuplicateRoute("in".into(), "g1".into()))
        );
    }

    #[test]
    fn cycle_rejected_at_connect() {
        let mut g = NodeGraph::new("c");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("a", NodeKind::Gain)).unwrap();
        g.add_node(Node::new("b", NodeKind::Gain)).unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "a").unwrap();
        g.connect("a", "b").unwrap();
        g.connect("b", "out").unwrap();
        assert_eq!(g.connect("b", "a"), Err(GraphError::CycleDetected));
    }

    #[test]
    fn missing_output_detected() {
        let mut g = NodeGraph::new("n");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        assert_eq!(g.validate(), Err(GraphError::InvalidOutputCount(0)));
    }

    #[test]
    fn unconnected_mix_port_detected() {
        let mut g = NodeGraph::new("m");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("m1", NodeKind::Mix)).unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect_ports(PortRef::new("in"), PortRef::port("m1", 0))
            .unwrap();
        g.connect("m1", "out").unwrap();
        // Port 1 of the mixer is never driven.
        assert_eq!(
            g.validate(),
            Err(GraphError::UnconnectedInput("m1".into(), 1))
        );
    }

    #[test]
    fn parked_nodes_are_legal() {
        let mut g = chain();
        // A disconnected filter does not fail validation; it is simply
        // outside the output cone.
        g.add_node(Node::new("parked", NodeKind::Filter)).unwrap();
        assert_eq!(g.validate(), Ok(()));
    }

    #[test]
    fn set_param_value_clamps() {
        let mut g = chain();
        g.set_param_value("g1", "gain_db", 100.0).unwrap();
        assert_eq!(g.node("g1").unwrap().param("gain_db").unwrap().value, 24.0);
        assert_eq!(
            g.set_param_value("g1", "nope", 0.0),
            Err(GraphError::UnknownField("g1".into(), "nope".into()))
        );
    }

    #[test]
    fn set_attr_replaces_and_validates() {
        let mut g = NodeGraph::new("a");
        g.add_node(Node::new("lp", NodeKind::Filter)).unwrap();
        g.set_attr("lp", "mode", AttrValue::Symbol("highpass".into()))
            .unwrap();
        assert_eq!(
            g.node("lp").unwrap().attr("mode"),
            Some(&AttrValue::Symbol("highpass".into()))
        );
        assert_eq!(
            g.set_attr("lp", "mode", AttrValue::Symbol("shelf".into())),
            Err(GraphError::InvalidAttrValue("lp".into(), "mode".into()))
        );
        assert_eq!(
            g.set_attr("lp", "slope", AttrValue::Number(12.0)),
            Err(GraphError::UnknownField("lp".into(), "slope".into()))
        );
    }

    #[test]
    fn slot_count_spans_bound_slots() {
        let mut g = chain();
        assert_eq!(g.slot_count(), 1);
        g.add_node(Node::new("lp", NodeKind::Filter).with_param("cutoff_hz", 7, 800.0))
            .unwrap();
        assert_eq!(g.slot_count(), 8);
    }

    #[test]
    fn remove_node_drops_routes() {
        let mut g = chain();
        g.remove_node("g1").unwrap();
        assert_eq!(g.node_count(), 2);
        assert!(g.routes().is_empty());
        assert!(g.node("g1").is_none());
    }

    #[test]
    fn attr_override_survives_clone() {
        let mut g = NodeGraph::new("a");
        g.add_node(
            Node::new("lp", NodeKind::Filter)
                .with_attr("mode", AttrValue::Symbol("highpass".into())),
        )
        .unwrap();
        let snapshot = g.clone();
        assert_eq!(
            snapshot.node("lp").unwrap().attr("mode"),
            Some(&AttrValue::Symbol("highpass".into()))
        );
    }
}
