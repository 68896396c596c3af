//! The render contract: compiled units, source modes, and parameter events.
//!
//! A [`RenderUnit`] is the executable form of a graph. The compile pipeline
//! builds one, the validation harness exercises it, and the render entry
//! adopts it. The trait is the seam between those three worlds.
//!
//! ## Design Decisions
//!
//! - **Mono, in-place**: units transform a single `&mut [f32]` block.
//!   Stereo is two units, or a future port-vector extension.
//!
//! - **Object-safe**: units cross thread boundaries as
//!   `Box<dyn RenderUnit>`, so every method is dispatchable through a
//!   vtable. `Send` is a supertrait because a unit is born on the compile
//!   worker, probed on the validation thread, and retired off the render
//!   thread.
//!
//! - **No allocations in `process`**: everything a unit needs is sized in
//!   [`prepare`](RenderUnit::prepare). The render thread never sees an
//!   allocator.

#[cfg(not(feature = "std"))]
use alloc::string::String;

use crate::graph::node::NodeKind;

/// How the active unit's executable form is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceMode {
    /// Walk a node schedule at runtime. Always available; the fallback
    /// for every other mode.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "interpreted"))]
    Interpreted,
    /// Fuse the schedule into a single specialized unit at build time.
    #[cfg_attr(feature = "serde", serde(rename = "jit"))]
    JitCompiled,
    /// Run a previously built artifact; graph edits do not regenerate it.
    #[cfg_attr(feature = "serde", serde(rename = "dynamic"))]
    DynamicLibrary,
    /// Run user-edited netlist text instead of generated text.
    #[cfg_attr(feature = "serde", serde(rename = "custom"))]
    CustomCode,
}

impl SourceMode {
    /// All modes, in cycling order.
    pub const ALL: [SourceMode; 4] = [
        SourceMode::Interpreted,
        SourceMode::JitCompiled,
        SourceMode::DynamicLibrary,
        SourceMode::CustomCode,
    ];

    /// Short lowercase token, used in config files and on the command line.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Interpreted => "interpreted",
            Self::JitCompiled => "jit",
            Self::DynamicLibrary => "dynamic",
            Self::CustomCode => "custom",
        }
    }

    /// Parses a mode token as produced by [`token`](Self::token).
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.token() == token)
    }

    /// Whether graph edits regenerate source in this mode.
    ///
    /// DynamicLibrary runs a fixed artifact, so edits accumulate in the
    /// model without triggering builds; every other mode regenerates.
    pub const fn regenerates_on_edit(self) -> bool {
        !matches!(self, Self::DynamicLibrary)
    }

    /// Default debounce window for coalescing edit bursts, in milliseconds.
    ///
    /// Interpreted rebuilds are cheap but frequent during interactive
    /// editing, so they get a long window. The other regenerating modes
    /// rebuild immediately.
    pub const fn default_debounce_ms(self) -> u64 {
        match self {
            Self::Interpreted => 1000,
            _ => 0,
        }
    }
}

impl core::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.token())
    }
}

/// A timestamped automation change, delivered to the active unit through
/// the realtime parameter channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterEvent {
    /// Automation slot, as bound in the graph (`param@slot`).
    pub slot: u32,
    /// New plain value. Already denormalized; the unit applies it as-is.
    pub value: f32,
    /// Frame offset within the current block at which the change lands.
    pub offset: u32,
}

impl ParameterEvent {
    /// An event applied at the start of the block.
    pub const fn new(slot: u32, value: f32) -> Self {
        Self {
            slot,
            value,
            offset: 0,
        }
    }

    /// An event applied mid-block.
    pub const fn at(slot: u32, value: f32, offset: u32) -> Self {
        Self {
            slot,
            value,
            offset,
        }
    }
}

/// Descriptive metadata published alongside the active unit.
///
/// Observers (CLI status, editors) read this through the engine without
/// touching the unit itself, which is owned by the render thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMeta {
    /// Name of the graph the unit was built from.
    pub graph: String,
    /// Mode the unit was built for.
    pub mode: SourceMode,
    /// Compile request id that produced the unit. Monotonic; later stamps
    /// supersede earlier ones.
    pub stamp: u64,
    /// Number of automation slots the unit responds to.
    pub parameter_count: u32,
}

/// An executable processing unit built from graph source.
///
/// # Lifecycle
///
/// 1. The compile pipeline constructs the unit on a worker thread.
/// 2. [`prepare`](Self::prepare) sizes internal state for the stream format.
/// 3. The validation harness drives [`process`](Self::process) with
///    synthetic blocks.
/// 4. On pass, the render thread adopts the unit and calls `process` once
///    per audio block until the unit is superseded.
///
/// # Example
///
/// ```rust
/// use relevo_core::{ParameterEvent, RenderUnit};
///
/// struct Passthrough;
///
/// impl RenderUnit for Passthrough {
///     fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {}
///
///     fn process(&mut self, _buffer: &mut [f32], _events: &[ParameterEvent]) {
///         // Samples pass unchanged.
///     }
///
///     fn set_parameter(&mut self, _slot: u32, _value: f32) {}
///
///     fn parameter_count(&self) -> u32 {
///         0
///     }
///
///     fn reset(&mut self) {}
/// }
/// ```
pub trait RenderUnit: Send {
    /// Size internal state for a stream format.
    ///
    /// Called off the render thread, before the unit processes its first
    /// block. May allocate. `max_block` is the largest slice `process`
    /// will ever receive.
    fn prepare(&mut self, sample_rate: f32, max_block: usize);

    /// Process one block in place.
    ///
    /// `events` holds this block's automation changes, sorted ascending by
    /// [`offset`](ParameterEvent::offset); every offset is less than
    /// `buffer.len()`. Units honor offsets by splitting the block at each
    /// event, so a change lands exactly on its frame.
    ///
    /// Must not allocate, lock, or block.
    fn process(&mut self, buffer: &mut [f32], events: &[ParameterEvent]);

    /// Apply an automation value outside of block processing.
    ///
    /// Used to seed current values into a freshly built unit before it
    /// goes live. Slots out of range are ignored.
    fn set_parameter(&mut self, slot: u32, value: f32);

    /// Number of automation slots this unit responds to.
    fn parameter_count(&self) -> u32;

    /// Clear internal state (delay lines, filter history) without touching
    /// parameter values.
    fn reset(&mut self);
}

/// What a loaded artifact library can execute.
///
/// Code generation consults this before emitting for DynamicLibrary mode:
/// a graph using a kind the library cannot execute fails with
/// [`GraphError::MissingLibraryKind`](crate::graph::GraphError::MissingLibraryKind)
/// instead of producing an artifact that fails at load time.
pub trait LibraryView {
    /// Whether the library has an executable equivalent for this kind.
    fn supports(&self, kind: NodeKind) -> bool;

    /// ABI revision the library was built against.
    fn abi_version(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tokens_round_trip() {
        for mode in SourceMode::ALL {
            assert_eq!(SourceMode::from_token(mode.token()), Some(mode));
        }
        assert_eq!(SourceMode::from_token("native"), None);
    }

    #[test]
    fn only_dynamic_skips_regeneration() {
        for mode in SourceMode::ALL {
            assert_eq!(
                mode.regenerates_on_edit(),
                mode != SourceMode::DynamicLibrary
            );
        }
    }

    #[test]
    fn interpreted_gets_the_long_debounce() {
        assert_eq!(SourceMode::Interpreted.default_debounce_ms(), 1000);
        assert_eq!(SourceMode::JitCompiled.default_debounce_ms(), 0);
        assert_eq!(SourceMode::CustomCode.default_debounce_ms(), 0);
    }

    #[test]
    fn event_constructors() {
        assert_eq!(ParameterEvent::new(3, 0.5).offset, 0);
        assert_eq!(ParameterEvent::at(3, 0.5, 64).offset, 64);
    }
}
