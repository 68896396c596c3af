//! Integration tests for the relevo-core graph model.
//!
//! Exercises a full editing session across modules: incremental graph
//! construction, structural validation, canonical ordering stability under
//! permuted insertion, and parameter range mapping through the kind table.

use relevo_core::{
    AttrValue, GraphError, Node, NodeGraph, NodeKind, PortRef, SourceMode, canonical_order,
    kind_spec,
};

/// A representative mono effect graph:
///
/// ```text
/// in ── drive ── lp ──┬─ mix.0 ── out
///                     └─ dly ─ mix.1
/// ```
fn pedal() -> NodeGraph {
    let mut g = NodeGraph::new("pedal");
    g.add_node(Node::new("in", NodeKind::Input)).unwrap();
    g.add_node(
        Node::new("drive", NodeKind::Saturate)
            .with_attr("shape", AttrValue::Symbol("tanh".into()))
            .with_param("drive", 0, 2.0),
    )
    .unwrap();
    g.add_node(Node::new("lp", NodeKind::Filter).with_param("cutoff_hz", 1, 2200.0))
        .unwrap();
    g.add_node(
        Node::new("dly", NodeKind::Delay)
            .with_attr("time_ms", AttrValue::Number(250.0))
            .with_param("feedback", 2, 0.35)
            .with_param("mix", 3, 1.0),
    )
    .unwrap();
    g.add_node(Node::new("mix", NodeKind::Mix).with_param("balance", 4, 0.3))
        .unwrap();
    g.add_node(Node::new("out", NodeKind::Output)).unwrap();

    g.connect("in", "drive").unwrap();
    g.connect("drive", "lp").unwrap();
    g.connect_ports(PortRef::new("lp"), PortRef::port("mix", 0))
        .unwrap();
    g.connect("lp", "dly").unwrap();
    g.connect_ports(PortRef::new("dly"), PortRef::port("mix", 1))
        .unwrap();
    g.connect("mix", "out").unwrap();
    g
}

// ============================================================================
// 1. Editing session
// ============================================================================

#[test]
fn pedal_graph_validates_and_orders() {
    let g = pedal();
    assert_eq!(g.validate(), Ok(()));

    let order: Vec<&str> = canonical_order(&g)
        .unwrap()
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(order, ["in", "drive", "lp", "dly", "mix", "out"]);
    assert_eq!(g.slot_count(), 5, "slots 0..=4 are bound");
}

#[test]
fn removing_a_mid_chain_node_breaks_validation_until_reconnected() {
    let mut g = pedal();
    g.remove_node("lp").unwrap();

    // Both mix.0 and dly lost their source.
    let err = g.validate().unwrap_err();
    assert!(
        matches!(err, GraphError::UnconnectedInput(_, _)),
        "expected an unconnected input after removal, got {err}"
    );

    // Bypass the filter and the graph is whole again.
    g.connect_ports(PortRef::new("drive"), PortRef::port("mix", 0))
        .unwrap();
    g.connect("drive", "dly").unwrap();
    assert_eq!(g.validate(), Ok(()));
}

#[test]
fn second_input_node_rejected_by_validation() {
    let mut g = pedal();
    g.add_node(Node::new("in2", NodeKind::Input)).unwrap();
    assert_eq!(g.validate(), Err(GraphError::InvalidInputCount(2)));
}

#[test]
fn value_edits_change_model_but_not_structure() {
    let mut g = pedal();
    let before: Vec<String> = canonical_order(&g)
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();

    g.set_param_value("drive", "drive", 7.5).unwrap();
    g.set_param_value("mix", "balance", 0.9).unwrap();

    let after: Vec<&str> = canonical_order(&g)
        .unwrap()
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(before, after, "value edits must not disturb ordering");
    assert_eq!(g.node("drive").unwrap().param("drive").unwrap().value, 7.5);
}

// ============================================================================
// 2. Ordering determinism
// ============================================================================

#[test]
fn canonical_order_ignores_insertion_and_route_order() {
    // Same topology as pedal(), nodes and routes inserted backwards.
    let mut g = NodeGraph::new("pedal");
    g.add_node(Node::new("out", NodeKind::Output)).unwrap();
    g.add_node(Node::new("mix", NodeKind::Mix)).unwrap();
    g.add_node(Node::new("dly", NodeKind::Delay)).unwrap();
    g.add_node(Node::new("lp", NodeKind::Filter)).unwrap();
    g.add_node(Node::new("drive", NodeKind::Saturate)).unwrap();
    g.add_node(Node::new("in", NodeKind::Input)).unwrap();

    g.connect("mix", "out").unwrap();
    g.connect_ports(PortRef::new("dly"), PortRef::port("mix", 1))
        .unwrap();
    g.connect("lp", "dly").unwrap();
    g.connect_ports(PortRef::new("lp"), PortRef::port("mix", 0))
        .unwrap();
    g.connect("drive", "lp").unwrap();
    g.connect("in", "drive").unwrap();

    let reference: Vec<String> = canonical_order(&pedal())
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    let permuted: Vec<String> = canonical_order(&g)
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    assert_eq!(reference, permuted);
}

// ============================================================================
// 3. Kind table and parameter ranges
// ============================================================================

#[test]
fn kind_table_ranges_back_set_param_value() {
    let mut g = pedal();

    // Delay feedback is capped below unity; pushing past the range clamps.
    g.set_param_value("dly", "feedback", 3.0).unwrap();
    assert_eq!(g.node("dly").unwrap().param("feedback").unwrap().value, 0.95);

    g.set_param_value("lp", "cutoff_hz", 5.0).unwrap();
    assert_eq!(g.node("lp").unwrap().param("cutoff_hz").unwrap().value, 20.0);
}

#[test]
fn filter_cutoff_normalizes_logarithmically() {
    let spec = kind_spec(NodeKind::Filter);
    let cutoff = spec.param("cutoff_hz").unwrap();

    // Geometric midpoint of 20 Hz..20 kHz is ~632 Hz; on a log curve it
    // sits at normalized 0.5.
    let mid = cutoff.range.denormalize(0.5);
    assert!(
        (mid - 632.45).abs() < 1.0,
        "log curve midpoint: expected ~632 Hz, got {mid:.1}"
    );
    let back = cutoff.range.normalize(mid);
    assert!((back - 0.5).abs() < 1e-4);
}

#[test]
fn symbol_attrs_reject_unlisted_values() {
    let spec = kind_spec(NodeKind::Filter);
    let mode = spec.attr("mode").unwrap();
    assert!(mode.accepts_symbol("lowpass"));
    assert!(mode.accepts_symbol("highpass"));
    assert!(!mode.accepts_symbol("bandpass"));
}

// ============================================================================
// 4. Source modes
// ============================================================================

#[test]
fn mode_token_table_is_total() {
    for mode in SourceMode::ALL {
        let token = mode.token();
        assert_eq!(
            SourceMode::from_token(token),
            Some(mode),
            "token '{token}' must parse back to {mode}"
        );
    }
}

// ============================================================================
// 5. Serialization (feature = "serde")
// ============================================================================

#[cfg(feature = "serde")]
#[test]
fn graph_json_round_trip_preserves_canonical_order() {
    let g = pedal();
    let json = serde_json::to_string_pretty(&g).unwrap();
    let restored: NodeGraph = serde_json::from_str(&json).unwrap();

    assert_eq!(g, restored);
    let a: Vec<String> = canonical_order(&g)
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    let b: Vec<String> = canonical_order(&restored)
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    assert_eq!(a, b);
}

#[cfg(feature = "serde")]
#[test]
fn deserialized_cycle_caught_by_validation() {
    // Files bypass connect-time guards; validate() must still catch cycles.
    let json = r#"{
        "name": "loop",
        "nodes": [
            {"name": "in", "kind": "input", "attrs": [], "params": []},
            {"name": "a", "kind": "gain", "attrs": [], "params": []},
            {"name": "b", "kind": "gain", "attrs": [], "params": []},
            {"name": "out", "kind": "output", "attrs": [], "params": []}
        ],
        "routes": [
            {"from": {"node": "in"}, "to": {"node": "a"}},
            {"from": {"node": "a"}, "to": {"node": "b"}},
            {"from": {"node": "b"}, "to": {"node": "a"}},
            {"from": {"node": "b"}, "to": {"node": "out"}}
        ]
    }"#;
    let g: NodeGraph = serde_json::from_str(json).unwrap();
    assert_eq!(g.validate(), Err(GraphError::CycleDetected));
}
