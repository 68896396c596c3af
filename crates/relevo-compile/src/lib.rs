//! Netlist compilation for the relevo engine.
//!
//! This crate turns netlist text into executable [`RenderUnit`]s:
//!
//! - **Parsing**: [`parse_netlist`] reads the line-oriented netlist format
//!   back into a [`NodeGraph`](relevo_core::NodeGraph).
//! - **Lowering**: [`Schedule`] flattens a validated graph into
//!   topological stage order with resolved attributes and a slot table.
//! - **Backends**: [`InterpretedUnit`] walks the schedule per frame,
//!   [`FusedUnit`] runs it as a pre-resolved straight-line op sequence,
//!   and [`LibraryUnit`] instantiates its processors from a bound
//!   [`DynamicArtifact`].
//! - **The worker**: [`CompilePipeline`] runs builds on a dedicated
//!   thread with latest-wins coalescing and a per-build deadline.
//!
//! ## Quick Start
//!
//! ```rust
//! use relevo_compile::{InterpretedUnit, Schedule, parse_netlist};
//! use relevo_core::RenderUnit;
//!
//! let text = "graph demo\n\
//!             node in input\n\
//!             node g gain gain_db@0\n\
//!             node out output\n\
//!             route in.0 -> g.0\n\
//!             route g.0 -> out.0\n";
//!
//! let graph = parse_netlist(text)?;
//! let schedule = Schedule::from_graph(&graph)?;
//! let mut unit = InterpretedUnit::new(schedule, 48000.0);
//! unit.prepare(48000.0, 256);
//!
//! let mut block = [0.5f32; 256];
//! unit.process(&mut block, &[]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`RenderUnit`]: relevo_core::RenderUnit

mod error;
mod fused;
mod interp;
mod library;
mod nodes;
mod parse;
mod pipeline;
mod schedule;

pub use error::{CompileError, DynamicLoadError};
pub use fused::FusedUnit;
pub use interp::InterpretedUnit;
pub use library::{ARTIFACT_ABI, DynamicArtifact, LibraryUnit};
pub use nodes::StageProc;
pub use parse::parse_netlist;
pub use pipeline::{BuiltUnit, CompileOutcome, CompilePipeline};
pub use schedule::{Binding, FilterMode, SatShape, Schedule, Stage, StageOp, Tap};
