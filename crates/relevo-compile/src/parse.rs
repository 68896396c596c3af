//! Netlist text parser.
//!
//! Reads the line-oriented netlist format back into a [`NodeGraph`]:
//!
//! ```text
//! # comment
//! graph pedal
//! node drive saturate shape=tanh drive@0=2.5
//! node lp filter cutoff_hz@1
//! route drive.0 -> lp.0
//! ```
//!
//! ## Grammar
//!
//! ```text
//! netlist  ::= line*
//! line     ::= graph | node | route | comment | blank
//! graph    ::= 'graph' name
//! node     ::= 'node' name kind field*
//! field    ::= key '=' value            (attribute)
//!            | key '@' slot             (bound parameter, default value)
//!            | key '@' slot '=' value   (bound parameter, explicit value)
//! route    ::= 'route' endpoint '->' endpoint
//! endpoint ::= name ( '.' port )?
//! ```
//!
//! Generated text never carries `@slot=value`; the explicit-value form
//! exists for hand-edited custom source. Two-phase design: parsing builds
//! the graph through its mutation API (so per-line errors carry line
//! numbers), and whole-graph validation stays with the build step.

use relevo_core::{AttrValue, Node, NodeGraph, NodeKind, PortRef, kind_spec};

use crate::error::CompileError;

/// Parses netlist text into a graph.
///
/// Per-line problems (syntax, unknown kinds, unknown fields, bad routes)
/// come back as [`CompileError::Parse`] with a 1-based line number.
/// Whole-graph structural validation is left to the caller.
pub fn parse_netlist(text: &str) -> Result<NodeGraph, CompileError> {
    let mut graph: Option<NodeGraph> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().unwrap_or_default();
        match keyword {
            "graph" => {
                if graph.is_some() {
                    return Err(err(line_no, "duplicate 'graph' header"));
                }
                let name = line["graph".len()..].trim();
                if name.is_empty() {
                    return Err(err(line_no, "'graph' header needs a name"));
                }
                graph = Some(NodeGraph::new(name));
            }
            "node" => {
                let graph = graph
                    .as_mut()
                    .ok_or_else(|| err(line_no, "expected 'graph' header first"))?;
                let node = parse_node_line(line_no, &mut tokens)?;
                graph
                    .add_node(node)
                    .map_err(|e| err(line_no, &e.to_string()))?;
            }
            "route" => {
                let graph = graph
                    .as_mut()
                    .ok_or_else(|| err(line_no, "expected 'graph' header first"))?;
                let (from, to) = parse_route_line(line_no, &mut tokens)?;
                graph
                    .connect_ports(from, to)
                    .map_err(|e| err(line_no, &e.to_string()))?;
            }
            other => {
                return Err(err(line_no, &format!("unknown directive '{other}'")));
            }
        }
    }

    graph.ok_or_else(|| err(0, "empty source: missing 'graph' header"))
}

fn err(line: usize, message: &str) -> CompileError {
    CompileError::Parse {
        line,
        message: message.to_string(),
    }
}

fn parse_node_line<'a>(
    line_no: usize,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<Node, CompileError> {
    let name = tokens
        .next()
        .ok_or_else(|| err(line_no, "'node' needs a name"))?;
    let kind_token = tokens
        .next()
        .ok_or_else(|| err(line_no, "'node' needs a kind"))?;
    let kind = NodeKind::from_token(kind_token)
        .ok_or_else(|| err(line_no, &format!("unknown node kind '{kind_token}'")))?;

    let spec = kind_spec(kind);
    let mut node = Node::new(name, kind);
    let mut seen: Vec<&str> = Vec::new();
    for field in tokens {
        let (lhs, value) = match field.split_once('=') {
            Some((l, v)) => (l, Some(v)),
            None => (field, None),
        };
        let key = lhs.split('@').next().unwrap_or(lhs);
        if seen.contains(&key) {
            return Err(err(line_no, &format!("duplicate field '{key}'")));
        }
        seen.push(key);

        if let Some((key, slot)) = lhs.split_once('@') {
            // Bound parameter: key@slot or key@slot=value.
            let slot: u32 = slot
                .parse()
                .map_err(|_| err(line_no, &format!("bad slot in '{field}'")))?;
            let bound_value = match value {
                Some(v) => v
                    .parse::<f32>()
                    .map_err(|_| err(line_no, &format!("bad value in '{field}'")))?,
                None => spec.param(key).map_or(0.0, |p| p.default),
            };
            node = node.with_param(key, slot, bound_value);
        } else {
            // Attribute: key=value, value required.
            let Some(v) = value else {
                return Err(err(line_no, &format!("expected '=' in field '{field}'")));
            };
            let attr_value = match v.parse::<f32>() {
                Ok(n) => AttrValue::Number(n),
                Err(_) => AttrValue::Symbol(v.to_string()),
            };
            node = node.with_attr(lhs, attr_value);
        }
    }
    Ok(node)
}

fn parse_route_line<'a>(
    line_no: usize,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<(PortRef, PortRef), CompileError> {
    let from = tokens
        .next()
        .ok_or_else(|| err(line_no, "'route' needs a source endpoint"))?;
    let arrow = tokens.next().unwrap_or_default();
    if arrow != "->" {
        return Err(err(line_no, "expected '->' between route endpoints"));
    }
    let to = tokens
        .next()
        .ok_or_else(|| err(line_no, "'route' needs a destination endpoint"))?;
    if tokens.next().is_some() {
        return Err(err(line_no, "trailing tokens after route"));
    }
    Ok((parse_endpoint(line_no, from)?, parse_endpoint(line_no, to)?))
}

fn parse_endpoint(line_no: usize, text: &str) -> Result<PortRef, CompileError> {
    match text.split_once('.') {
        Some((name, port)) => {
            let port: u8 = port
                .parse()
                .map_err(|_| err(line_no, &format!("bad port in '{text}'")))?;
            Ok(PortRef::port(name, port))
        }
        None => Ok(PortRef::new(text)),
    }
}
