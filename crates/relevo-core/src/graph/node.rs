//! Node kinds and per-node state for the graph model.
//!
//! [`NodeKind`] is a closed enumeration: every kind the engine can execute
//! is listed here, together with a static [`KindSpec`] describing its ports,
//! structural attributes, and bindable parameters. Backends dispatch over
//! the enum — there is no runtime type inspection anywhere in the hot path.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::param::{AttrSpec, BoundSpec, ParamRange};

/// The processing role of a node.
///
/// The set is closed: the netlist grammar, the kind table, and every
/// backend agree on exactly these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeKind {
    /// Receives external audio. Exactly one per graph.
    Input,
    /// Produces the graph's output. Exactly one per graph.
    Output,
    /// Scalar gain in decibels.
    Gain,
    /// One-pole lowpass/highpass filter.
    Filter,
    /// Feedback delay line with wet/dry mix.
    Delay,
    /// Waveshaping saturator.
    Saturate,
    /// Two-input crossfade mixer.
    Mix,
}

impl NodeKind {
    /// All kinds, in netlist-token order.
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Input,
        NodeKind::Output,
        NodeKind::Gain,
        NodeKind::Filter,
        NodeKind::Delay,
        NodeKind::Saturate,
        NodeKind::Mix,
    ];

    /// The keyword this kind uses in the netlist text.
    pub const fn token(self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Gain => "gain",
            NodeKind::Filter => "filter",
            NodeKind::Delay => "delay",
            NodeKind::Saturate => "saturate",
            NodeKind::Mix => "mix",
        }
    }

    /// Parses a netlist keyword back into a kind.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.token() == token)
    }
}

impl core::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.token())
    }
}

/// Static description of a node kind: ports, attributes, bound parameters.
#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    /// The kind this spec describes.
    pub kind: NodeKind,
    /// Number of input ports. All input ports are required: a reachable
    /// node with an unconnected input port fails validation.
    pub input_ports: u8,
    /// Number of output ports.
    pub output_ports: u8,
    /// Structural attributes (part of the generated text).
    pub attrs: &'static [AttrSpec],
    /// Bindable parameters (declared in the text, valued outside it).
    pub params: &'static [BoundSpec],
}

impl KindSpec {
    /// Finds an attribute spec by name.
    pub fn attr(&self, name: &str) -> Option<&'static AttrSpec> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Finds a bound-parameter spec by name.
    pub fn param(&self, name: &str) -> Option<&'static BoundSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

const FILTER_ATTRS: &[AttrSpec] = &[AttrSpec::symbol("mode", "lowpass", &["lowpass", "highpass"])];
const DELAY_ATTRS: &[AttrSpec] = &[AttrSpec::number("time_ms", 125.0)];
const SATURATE_ATTRS: &[AttrSpec] = &[AttrSpec::symbol("shape", "tanh", &["tanh", "hard"])];

const GAIN_PARAMS: &[BoundSpec] = &[BoundSpec {
    name: "gain_db",
    range: ParamRange::linear(-60.0, 24.0),
    default: 0.0,
}];
const FILTER_PARAMS: &[BoundSpec] = &[BoundSpec {
    name: "cutoff_hz",
    range: ParamRange::logarithmic(20.0, 20000.0),
    default: 1000.0,
}];
const DELAY_PARAMS: &[BoundSpec] = &[
    BoundSpec {
        name: "feedback",
        range: ParamRange::linear(0.0, 0.95),
        default: 0.3,
    },
    BoundSpec {
        name: "mix",
        range: ParamRange::linear(0.0, 1.0),
        default: 0.5,
    },
];
const SATURATE_PARAMS: &[BoundSpec] = &[BoundSpec {
    name: "drive",
    range: ParamRange::logarithmic(0.1, 20.0),
    default: 1.0,
}];
const MIX_PARAMS: &[BoundSpec] = &[BoundSpec {
    name: "balance",
    range: ParamRange::linear(0.0, 1.0),
    default: 0.5,
}];

const KIND_TABLE: [KindSpec; 7] = [
    KindSpec {
        kind: NodeKind::Input,
        input_ports: 0,
        output_ports: 1,
        attrs: &[],
        params: &[],
    },
    KindSpec {
        kind: NodeKind::Output,
        input_ports: 1,
        output_ports: 0,
        attrs: &[],
        params: &[],
    },
    KindSpec {
        kind: NodeKind::Gain,
        input_ports: 1,
        output_ports: 1,
        attrs: &[],
        params: GAIN_PARAMS,
    },
    KindSpec {
        kind: NodeKind::Filter,
        input_ports: 1,
        output_ports: 1,
        attrs: FILTER_ATTRS,
        params: FILTER_PARAMS,
    },
    KindSpec {
        kind: NodeKind::Delay,
        input_ports: 1,
        output_ports: 1,
        attrs: DELAY_ATTRS,
        params: DELAY_PARAMS,
    },
    KindSpec {
        kind: NodeKind::Saturate,
        input_ports: 1,
        output_ports: 1,
        attrs: SATURATE_ATTRS,
        params: SATURATE_PARAMS,
    },
    KindSpec {
        kind: NodeKind::Mix,
        input_ports: 2,
        output_ports: 1,
        attrs: &[],
        params: MIX_PARAMS,
    },
];

/// Returns the static spec for a kind.
pub fn kind_spec(kind: NodeKind) -> &'static KindSpec {
    match kind {
        NodeKind::Input => &KIND_TABLE[0],
        NodeKind::Output => &KIND_TABLE[1],
        NodeKind::Gain => &KIND_TABLE[2],
        NodeKind::Filter => &KIND_TABLE[3],
        NodeKind::Delay => &KIND_TABLE[4],
        NodeKind::Saturate => &KIND_TABLE[5],
        NodeKind::Mix => &KIND_TABLE[6],
    }
}

/// Value of a structural attribute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AttrValue {
    /// Numeric attribute (e.g. `time_ms=125`).
    Number(f32),
    /// Symbol attribute from a closed set (e.g. `mode=lowpass`).
    Symbol(String),
}

impl core::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AttrValue::Number(n) => write!(f, "{n}"),
            AttrValue::Symbol(s) => f.write_str(s),
        }
    }
}

/// A bound parameter on a node: name, automation slot, current value.
///
/// The slot is the index space used by `push_parameter` — it appears in the
/// generated text (a binding change is structural), the value does not.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundParam {
    /// Parameter name from the kind's [`BoundSpec`] table.
    pub name: String,
    /// Automation slot index, unique per graph.
    pub slot: u32,
    /// Current value (travels with the compile snapshot, not the text).
    pub value: f32,
}

/// One node of the editable graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Stable identifier assigned by the editor; referenced by routes and
    /// emitted into the netlist.
    pub name: String,
    /// The node's processing role.
    pub kind: NodeKind,
    /// Structural attribute overrides (defaults from the kind table apply
    /// for anything absent).
    #[cfg_attr(feature = "serde", serde(default))]
    pub attrs: Vec<(String, AttrValue)>,
    /// Bound parameters with their automation slots and current values.
    #[cfg_attr(feature = "serde", serde(default))]
    pub params: Vec<BoundParam>,
}

impl Node {
    /// Creates a node with no attribute overrides or parameter bindings.
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attrs: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Sets a structural attribute. Builder pattern.
    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.push((name.into(), value));
        self
    }

    /// Binds a parameter to an automation slot with an initial value.
    /// Builder pattern.
    pub fn with_param(mut self, name: impl Into<String>, slot: u32, value: f32) -> Self {
        self.params.push(BoundParam {
            name: name.into(),
            slot,
            value,
        });
        self
    }

    /// Looks up an attribute override by name.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Looks up a bound parameter by name.
    pub fn param(&self, name: &str) -> Option<&BoundParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Looks up a bound parameter by name, mutably.
    pub fn param_mut(&mut self, name: &str) -> Option<&mut BoundParam> {
        self.params.iter_mut().find(|p| p.name == name)
    }
}
