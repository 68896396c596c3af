//! Editable node graph for the relevo compile/swap engine.
//!
//! The graph module holds the canonical description of the processing
//! topology: typed nodes, structural attributes, bound parameters, and
//! directed routes between ports. The graph itself never processes audio —
//! it is the *source* that code generation serializes and the compile
//! pipeline turns into an executable unit.
//!
//! # Architecture
//!
//! The system keeps a strict mutation/execution split:
//!
//! - [`NodeGraph`] — owned by the edit/control side. Holds topology,
//!   performs mutations with connect-time validation (port arity, duplicate
//!   routes, cycle rejection), and is cloned into an immutable snapshot per
//!   compile request. NOT touched by the render thread.
//! - The compiled unit — produced downstream by the compile pipeline from
//!   the generated source text, executed by the render thread.
//!
//! # Canonical ordering
//!
//! [`canonical_order`] computes a deterministic, output-rooted traversal
//! over the graph. Code generation emits nodes in exactly this order, so
//! two structurally identical graphs always serialize to byte-identical
//! text regardless of mutation history — which is what lets the controller
//! diff generated text instead of graphs to decide whether a rebuild is
//! warranted.
//!
//! # no_std Support
//!
//! This module is `no_std` compatible with `alloc`.

pub mod model;
pub mod node;
pub mod traverse;

pub use model::{GraphError, NodeGraph, PortRef, Route};
pub use node::{AttrValue, BoundParam, KindSpec, Node, NodeKind, kind_spec};
pub use traverse::canonical_order;
