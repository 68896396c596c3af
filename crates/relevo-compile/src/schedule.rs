//! Lowering: a validated graph becomes an executable schedule.
//!
//! A [`Schedule`] is the shared plan both processing backends execute: the
//! graph's output cone flattened into topological stage order, with every
//! attribute resolved to a typed configuration, every bound parameter's
//! current value baked in as the initial state, and automation bindings
//! collected into a slot table.
//!
//! Invariants:
//!
//! - stages are topologically ordered; a [`Tap::Stage`] index always
//!   refers to an earlier stage
//! - several taps arriving at the same input port sum
//! - nodes outside the output cone are not lowered

use std::collections::HashMap;

use relevo_core::{AttrValue, GraphError, Node, NodeGraph, NodeKind, canonical_order, kind_spec};

/// Where a stage input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tap {
    /// The block input signal.
    Source,
    /// Output of an earlier stage, by index into [`Schedule::stages`].
    Stage(usize),
}

/// Filter topology selector, resolved from the `mode` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// 6 dB/oct one-pole lowpass.
    #[default]
    Lowpass,
    /// Complement of the lowpass: input minus the lowpass output.
    Highpass,
}

/// Saturation transfer curve, resolved from the `shape` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SatShape {
    /// Smooth tanh soft clipping.
    #[default]
    Tanh,
    /// Abrupt clamp at unity.
    Hard,
}

/// Resolved per-stage configuration with initial values baked in.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOp {
    /// Scale by a decibel amount.
    Gain {
        /// Initial gain in dB.
        gain_db: f32,
    },
    /// One-pole filter.
    Filter {
        /// Topology.
        mode: FilterMode,
        /// Initial cutoff in Hz.
        cutoff_hz: f32,
    },
    /// Feedback delay with wet/dry mix.
    Delay {
        /// Line length in milliseconds (structural, not automatable).
        time_ms: f32,
        /// Initial feedback amount.
        feedback: f32,
        /// Initial wet/dry mix.
        mix: f32,
    },
    /// Waveshaping drive.
    Saturate {
        /// Transfer curve.
        shape: SatShape,
        /// Initial drive factor.
        drive: f32,
    },
    /// Two-input crossfade.
    Mix {
        /// Initial balance: 0 is all port 0, 1 is all port 1.
        balance: f32,
    },
}

impl StageOp {
    /// Node kind this configuration belongs to.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Gain { .. } => NodeKind::Gain,
            Self::Filter { .. } => NodeKind::Filter,
            Self::Delay { .. } => NodeKind::Delay,
            Self::Saturate { .. } => NodeKind::Saturate,
            Self::Mix { .. } => NodeKind::Mix,
        }
    }
}

/// One executable stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Node name this stage was lowered from.
    pub name: String,
    /// Resolved configuration.
    pub op: StageOp,
    /// Taps per input port.
    pub inputs: Vec<Vec<Tap>>,
}

/// An automation binding: events on `slot` drive `knob` of `stage`.
///
/// Several bindings may share a slot; one incoming value then moves every
/// bound knob at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Automation slot.
    pub slot: u32,
    /// Stage index.
    pub stage: usize,
    /// Index into the stage kind's parameter table.
    pub knob: usize,
}

/// Executable plan lowered from a validated graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// Name of the source graph.
    pub graph_name: String,
    /// Stages in execution order.
    pub stages: Vec<Stage>,
    /// Taps summed into the block output.
    pub output: Vec<Tap>,
    /// Slot table, in stage order.
    pub bindings: Vec<Binding>,
}

impl Schedule {
    /// Validates and lowers a graph.
    pub fn from_graph(graph: &NodeGraph) -> Result<Self, GraphError> {
        graph.validate()?;
        let order = canonical_order(graph)?;

        let mut taps_by_name: HashMap<&str, Tap> = HashMap::new();
        let mut stages = Vec::new();
        let mut bindings = Vec::new();
        let mut output = Vec::new();

        for node in &order {
            match node.kind {
                NodeKind::Input => {
                    taps_by_name.insert(node.name.as_str(), Tap::Source);
                }
                NodeKind::Output => {
                    output = collect_taps(graph, &node.name, 0, &taps_by_name)?;
                }
                _ => {
                    let spec = kind_spec(node.kind);
                    let index = stages.len();
                    let mut inputs = Vec::with_capacity(spec.input_ports as usize);
                    for port in 0..spec.input_ports {
                        inputs.push(collect_taps(graph, &node.name, port, &taps_by_name)?);
                    }
                    for bound in &node.params {
                        if let Some(knob) = spec.params.iter().position(|p| p.name == bound.name)
                        {
                            bindings.push(Binding {
                                slot: bound.slot,
                                stage: index,
                                knob,
                            });
                        }
                    }
                    stages.push(Stage {
                        name: node.name.clone(),
                        op: resolve_op(node),
                        inputs,
                    });
                    taps_by_name.insert(node.name.as_str(), Tap::Stage(index));
                }
            }
        }

        Ok(Self {
            graph_name: graph.name.clone(),
            stages,
            output,
            bindings,
        })
    }

    /// Number of automation slots the plan responds to.
    pub fn slot_count(&self) -> u32 {
        self.bindings.iter().map(|b| b.slot + 1).max().unwrap_or(0)
    }
}

fn collect_taps(
    graph: &NodeGraph,
    node: &str,
    port: u8,
    taps_by_name: &HashMap<&str, Tap>,
) -> Result<Vec<Tap>, GraphError> {
    let mut sources: Vec<(&str, u8)> = graph
        .incoming(node)
        .filter(|r| r.to.port == port)
        .map(|r| (r.from.node.as_str(), r.from.port))
        .collect();
    sources.sort_unstable();
    sources
        .into_iter()
        .map(|(from, _)| {
            taps_by_name
                .get(from)
                .copied()
                .ok_or_else(|| GraphError::UnknownNode(from.to_string()))
        })
        .collect()
}

fn resolve_op(node: &Node) -> StageOp {
    match node.kind {
        NodeKind::Gain => StageOp::Gain {
            gain_db: param_value(node, "gain_db"),
        },
        NodeKind::Filter => StageOp::Filter {
            mode: match attr_symbol(node, "mode") {
                "highpass" => FilterMode::Highpass,
                _ => FilterMode::Lowpass,
            },
            cutoff_hz: param_value(node, "cutoff_hz"),
        },
        NodeKind::Delay => StageOp::Delay {
            time_ms: attr_number(node, "time_ms"),
            feedback: param_value(node, "feedback"),
            mix: param_value(node, "mix"),
        },
        NodeKind::Saturate => StageOp::Saturate {
            shape: match attr_symbol(node, "shape") {
                "hard" => SatShape::Hard,
                _ => SatShape::Tanh,
            },
            drive: param_value(node, "drive"),
        },
        NodeKind::Mix => StageOp::Mix {
            balance: param_value(node, "balance"),
        },
        // Io nodes are handled by the lowering loop, never resolved.
        NodeKind::Input | NodeKind::Output => unreachable!("io nodes are not stages"),
    }
}

fn attr_number(node: &Node, name: &str) -> f32 {
    match node.attr(name) {
        Some(AttrValue::Number(v)) => *v,
        _ => kind_spec(node.kind)
            .attr(name)
            .map_or(0.0, |a| a.number_default),
    }
}

fn attr_symbol<'a>(node: &'a Node, name: &str) -> &'a str {
    match node.attr(name) {
        Some(AttrValue::Symbol(s)) => s,
        _ => kind_spec(node.kind)
            .attr(name)
            .and_then(|a| a.symbol_default)
            .unwrap_or(""),
    }
}

/// Bound value if present, kind default otherwise, clamped either way.
fn param_value(node: &Node, name: &str) -> f32 {
    let spec = kind_spec(node.kind).param(name);
    let raw = node
        .param(name)
        .map_or_else(|| spec.map_or(0.0, |p| p.default), |b| b.value);
    spec.map_or(raw, |p| p.range.clamp(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pedal() -> NodeGraph {
        let mut g = NodeGraph::new("pedal");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(
            Node::new("drive", NodeKind::Saturate)
                .with_attr("shape", AttrValue::Symbol("hard".into()))
                .with_param("drive", 0, 3.0),
        )
        .unwrap();
        g.add_node(Node::new("lp", NodeKind::Filter).with_param("cutoff_hz", 1, 900.0))
            .unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "drive").unwrap();
        g.connect("drive", "lp").unwrap();
        g.connect("lp", "out").unwrap();
        g
    }

    #[test]
    fn lowers_chain_in_order() {
        let s = Schedule::from_graph(&pedal()).unwrap();
        assert_eq!(s.graph_name, "pedal");
        let names: Vec<&str> = s.stages.iter().map(|st| st.name.as_str()).collect();
        assert_eq!(names, ["drive", "lp"]);
        assert_eq!(s.stages[0].inputs, vec![vec![Tap::Source]]);
        assert_eq!(s.stages[1].inputs, vec![vec![Tap::Stage(0)]]);
        assert_eq!(s.output, vec![Tap::Stage(1)]);
        assert_eq!(s.slot_count(), 2);
    }

    #[test]
    fn resolves_attrs_and_initial_values() {
        let s = Schedule::from_graph(&pedal()).unwrap();
        assert_eq!(
            s.stages[0].op,
            StageOp::Saturate {
                shape: SatShape::Hard,
                drive: 3.0
            }
        );
        assert_eq!(
            s.stages[1].op,
            StageOp::Filter {
                mode: FilterMode::Lowpass,
                cutoff_hz: 900.0
            }
        );
    }

    #[test]
    fn unbound_params_take_kind_defaults() {
        let mut g = NodeGraph::new("d");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("dly", NodeKind::Delay)).unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "dly").unwrap();
        g.connect("dly", "out").unwrap();

        let s = Schedule::from_graph(&g).unwrap();
        assert_eq!(
            s.stages[0].op,
            StageOp::Delay {
                time_ms: 125.0,
                feedback: 0.3,
                mix: 0.5
            }
        );
        assert!(s.bindings.is_empty());
        assert_eq!(s.slot_count(), 0);
    }

    #[test]
    fn out_of_range_initial_values_clamped() {
        let mut g = NodeGraph::new("c");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("g", NodeKind::Gain).with_param("gain_db", 0, 500.0))
            .unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "g").unwrap();
        g.connect("g", "out").unwrap();

        let s = Schedule::from_graph(&g).unwrap();
        assert_eq!(s.stages[0].op, StageOp::Gain { gain_db: 24.0 });
    }

    #[test]
    fn fan_in_sums_at_output() {
        let mut g = NodeGraph::new("sum");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("a", NodeKind::Gain)).unwrap();
        g.add_node(Node::new("b", NodeKind::Gain)).unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "a").unwrap();
        g.connect("in", "b").unwrap();
        g.connect("a", "out").unwrap();
        g.connect("b", "out").unwrap();

        let s = Schedule::from_graph(&g).unwrap();
        assert_eq!(s.output, vec![Tap::Stage(0), Tap::Stage(1)]);
    }

    #[test]
    fn shared_slot_binds_every_knob() {
        let mut g = NodeGraph::new("macro");
        g.add_node(Node::new("in", NodeKind::Input)).unwrap();
        g.add_node(Node::new("g1", NodeKind::Gain).with_param("gain_db", 3, 0.0))
            .unwrap();
        g.add_node(Node::new("g2", NodeKind::Gain).with_param("gain_db", 3, 0.0))
            .unwrap();
        g.add_node(Node::new("out", NodeKind::Output)).unwrap();
        g.connect("in", "g1").unwrap();
        g.connect("g1", "g2").unwrap();
        g.connect("g2", "out").unwrap();

        let s = Schedule::from_graph(&g).unwrap();
        let on_slot_3: Vec<usize> = s
            .bindings
            .iter()
            .filter(|b| b.slot == 3)
            .map(|b| b.stage)
            .collect();
        assert_eq!(on_slot_3, [0, 1]);
        assert_eq!(s.slot_count(), 4);
    }

    #[test]
    fn parked_nodes_not_lowered() {
        let mut g = pedal();
        g.add_node(Node::new("parked", NodeKind::Delay).with_param("mix", 9, 1.0))
            .unwrap();
        let s = Schedule::from_graph(&g).unwrap();
        assert_eq!(s.stages.len(), 2);
        // A parked binding does not widen the slot table either.
        assert_eq!(s.slot_count(), 2);
    }

    #[test]
    fn invalid_graph_refused() {
        let g = NodeGraph::new("empty");
        assert_eq!(
            Schedule::from_graph(&g).unwrap_err(),
            GraphError::EmptyGraph
        );
    }
}
