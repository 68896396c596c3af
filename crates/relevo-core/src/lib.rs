//! Core graph model and render-unit contract for the relevo engine.
//!
//! This crate defines the shared vocabulary of the compile/swap pipeline:
//!
//! - **Graph model**: [`NodeGraph`], [`Node`], [`Route`] — the editable,
//!   serializable processing topology, with structural validation (port
//!   arity, cycles, unconnected inputs) at mutation and submission time.
//! - **Node kinds**: the closed [`NodeKind`] enumeration and the static
//!   [`KindSpec`] table describing each kind's ports, attributes, and
//!   bindable parameters.
//! - **Canonical traversal**: [`canonical_order`] — the deterministic
//!   output-rooted ordering that code generation and schedule building
//!   share, so structurally identical graphs always serialize identically.
//! - **Render contract**: [`RenderUnit`], [`UnitMeta`], [`ParameterEvent`],
//!   [`SourceMode`] — the interface between compiled artifacts and the
//!   audio callback.
//! - **Parameter ranges**: [`ParamRange`] — clamping and normalized
//!   mapping for bound parameters, usable without `std` via libm.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! relevo-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Feature Flags
//!
//! - `std` (default): `std::error::Error` impls and `Display` conveniences.
//! - `serde`: serialization derives on the graph model (the interchange
//!   format consumed by the engine and the CLI tooling).
//! - `tracing`: debug-level instrumentation of graph mutations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod graph;
pub mod math;
pub mod param;
pub mod unit;

pub use graph::{
    AttrValue, BoundParam, GraphError, KindSpec, Node, NodeGraph, NodeKind, PortRef, Route,
    canonical_order, kind_spec,
};
pub use param::{AttrSpec, BoundSpec, ParamCurve, ParamRange};
pub use unit::{LibraryView, ParameterEvent, RenderUnit, SourceMode, UnitMeta};
