//! The live engine: compile, validate, and swap render units while audio
//! keeps running.
//!
//! [`Engine`] sits between an editor and an audio host. The editor feeds
//! it graph snapshots, custom netlist text, mode switches, and parameter
//! changes; the host drives the [`AudioRenderEntry`] from its render
//! thread. In between, every change follows the same path:
//!
//! 1. the source-mode controller decides whether the change needs a
//!    rebuild (structural edits do, value tweaks only push parameters)
//! 2. the compile pipeline builds a candidate unit off-thread
//! 3. the validation harness runs the candidate offline against a test
//!    signal, with panics quarantined
//! 4. only a passing candidate is parked for the render thread, which
//!    adopts it at a block boundary
//!
//! The render thread never waits, never allocates, and never frees: a
//! displaced unit rides back through the mailbox and is dropped by
//! [`pump`](Engine::pump). Every attempt, pass or fail, is reported on
//! the bounded event feed returned by [`Engine::new`].
//!
//! ```
//! use relevo_engine::{Engine, EngineConfig, Node, NodeGraph, NodeKind};
//!
//! let mut config = EngineConfig::default();
//! config.debounce.interpreted_ms = 0;
//! let (mut engine, _events) = Engine::new(config);
//!
//! let mut render = engine.take_render_entry().unwrap();
//! render.prepare(48_000.0, 256);
//!
//! let mut graph = NodeGraph::new("trim");
//! graph.add_node(Node::new("in", NodeKind::Input))?;
//! graph.add_node(Node::new("g", NodeKind::Gain).with_param("gain_db", 0, -6.0))?;
//! graph.add_node(Node::new("out", NodeKind::Output))?;
//! graph.connect("in", "g")?;
//! graph.connect("g", "out")?;
//! engine.submit_graph(graph);
//!
//! // Control side pumps; the host keeps processing blocks throughout.
//! let mut block = [0.25f32; 256];
//! for _ in 0..5000 {
//!     engine.pump();
//!     render.process(&mut block, &[]);
//!     if engine.active_meta().is_some() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! assert_eq!(engine.active_meta().unwrap().graph, "trim");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod controller;
mod events;
mod holder;
mod render;
mod shared;

use std::sync::mpsc::Receiver;
use std::time::Instant;

use rtrb::{Producer, RingBuffer};
use tracing::{debug, warn};

use crate::controller::{Directive, SourceModeController};
use crate::events::EventSink;
use crate::holder::GraphHolder;
use crate::shared::EngineShared;

pub use crate::events::{EngineEvent, EngineState};
pub use crate::render::AudioRenderEntry;

// The types that appear in the public API, so embedders need only this
// crate for the common path.
pub use relevo_compile::DynamicArtifact;
pub use relevo_config::EngineConfig;
pub use relevo_core::{AttrValue, Node, NodeGraph, NodeKind, ParameterEvent, SourceMode, UnitMeta};
pub use relevo_harness::{ParameterTimeline, TestRun, TestSignal};

/// Capacity of the control-to-render parameter ring. Pushes beyond it in
/// one block are dropped with a warning.
const PARAM_RING_CAPACITY: usize = 256;

/// Control-side handle: owns the policy, the compile worker, and the
/// validation step.
///
/// Drive it from one thread and call [`pump`](Engine::pump) regularly;
/// everything render-facing lives in the [`AudioRenderEntry`] taken via
/// [`take_render_entry`](Engine::take_render_entry).
pub struct Engine {
    controller: SourceModeController,
    pipeline: relevo_compile::CompilePipeline,
    holder: GraphHolder,
    shared: EngineShared,
    events: EventSink,
    params: Producer<ParameterEvent>,
    config: EngineConfig,
    test_signal: TestSignal,
    timeline: ParameterTimeline,
    last_state: EngineState,
    render: Option<AudioRenderEntry>,
}

impl Engine {
    /// Builds an engine and the receiving end of its event feed.
    ///
    /// The config is taken as already validated; [`EngineConfig::load`]
    /// rejects or clamps unusable values.
    #[must_use]
    pub fn new(config: EngineConfig) -> (Self, Receiver<EngineEvent>) {
        let (events, receiver) = EventSink::channel();
        let shared = EngineShared::new();
        let holder = GraphHolder::new();
        let (params, param_rx) = RingBuffer::new(PARAM_RING_CAPACITY);
        let render = AudioRenderEntry::new(
            holder.clone(),
            shared.clone(),
            param_rx,
            config.render.poison_after_bad_blocks,
        );
        let pipeline = relevo_compile::CompilePipeline::new(config.compile_timeout());
        let controller = SourceModeController::new(config.clone());

        let engine = Self {
            controller,
            pipeline,
            holder,
            shared,
            events,
            params,
            config,
            test_signal: TestSignal::default(),
            timeline: ParameterTimeline::default(),
            last_state: EngineState::Idle,
            render: Some(render),
        };
        (engine, receiver)
    }

    /// Hands out the render-thread entry. `None` after the first call.
    pub fn take_render_entry(&mut self) -> Option<AudioRenderEntry> {
        self.render.take()
    }

    // ── Edits ────────────────────────────────────────────────────────────

    /// Accepts a new graph snapshot from the editor.
    ///
    /// In `Interpreted` and `JitCompiled` this (re)starts the mode's
    /// debounce window; a burst of edits compiles once, from the newest
    /// snapshot. Other modes store the snapshot without rebuilding.
    pub fn submit_graph(&mut self, graph: NodeGraph) {
        self.controller.submit_graph(graph, Instant::now());
    }

    /// Switches the source mode.
    ///
    /// Re-entering the current mode does nothing. Any other transition
    /// compiles fresh, even when the generated text is unchanged, because
    /// the running unit no longer matches the requested mode. Switching
    /// to `DynamicLibrary` without a bound artifact is refused and
    /// reported.
    pub fn set_source(&mut self, mode: SourceMode) {
        let before = self.controller.mode();
        let directives = self.controller.set_source(mode, Instant::now());
        self.note_mode_change(before);
        self.apply(directives);
    }

    /// Stores custom netlist text and switches to `CustomCode`.
    ///
    /// The text compiles as-is after the custom debounce window; empty or
    /// malformed text fails in the parser and is reported like any other
    /// compile failure.
    pub fn set_custom_code(&mut self, text: impl Into<String>) {
        let before = self.controller.mode();
        self.controller.set_custom_code(text, Instant::now());
        self.note_mode_change(before);
    }

    /// Binds a loaded artifact and switches to `DynamicLibrary`, where the
    /// artifact's stored netlist runs and graph edits accumulate without
    /// rebuilding.
    ///
    /// An artifact built against a different engine ABI is refused; the
    /// failure is reported and the engine falls back to `Interpreted` with
    /// a normal rebuild of the current graph.
    pub fn load_dynamic_unit(&mut self, artifact: DynamicArtifact) {
        let before = self.controller.mode();
        match self.controller.bind_artifact(artifact) {
            Ok(directives) => {
                self.note_mode_change(before);
                self.apply(directives);
            }
            Err(e) => {
                warn!(error = %e, "artifact refused, falling back to interpreted");
                self.events.emit(EngineEvent::Recompiled {
                    mode: SourceMode::DynamicLibrary,
                    diagnostic: Some(e.to_string()),
                });
                let directives = self.controller.fall_back_to_interpreted();
                self.note_mode_change(before);
                self.apply(directives);
            }
        }
    }

    /// Queues a parameter change for the render thread and records it as
    /// the slot's last known value for future validations.
    ///
    /// Non-finite values are dropped; they cannot mean anything to a unit
    /// and would only trip the output watchdog.
    pub fn push_parameter(&mut self, slot: u32, value: f32) {
        if !value.is_finite() {
            warn!(slot, value, "ignoring non-finite parameter push");
            return;
        }
        self.controller.note_pushed(slot, value);
        if self.params.push(ParameterEvent::new(slot, value)).is_err() {
            warn!(slot, "parameter ring full, dropping push");
        }
    }

    // ── Validation inputs ────────────────────────────────────────────────

    /// Chooses the signal future validation runs render through.
    pub fn set_test_signal(&mut self, signal: TestSignal) {
        self.test_signal = signal;
    }

    /// Installs a scripted parameter timeline for future validation runs.
    pub fn set_test_timeline(&mut self, timeline: ParameterTimeline) {
        self.timeline = timeline;
    }

    // ── The pump ─────────────────────────────────────────────────────────

    /// One control-side service pass. Call this regularly (a UI timer or
    /// a dedicated control loop both work).
    ///
    /// Converts a watchdog poison into a forced rebuild, fires due
    /// debounce windows, validates finished compiles and parks the ones
    /// that pass, disposes of retired units, and reports lifecycle
    /// transitions on the event feed.
    pub fn pump(&mut self) {
        if self.shared.take_needs_recompile() {
            warn!("output watchdog tripped, forcing a rebuild");
            // Let observers see the poisoned state before the rebuild
            // moves it on to compiling.
            self.emit_state_change();
            let directives = self.controller.force_recompile();
            self.apply(directives);
        }

        let directives = self.controller.tick(Instant::now());
        self.apply(directives);

        if let Some(outcome) = self.pipeline.try_outcome() {
            self.handle_outcome(outcome);
        }

        let disposed = self.holder.dispose_retired();
        if disposed > 0 {
            debug!(disposed, "dropped retired units");
        }

        self.emit_state_change();
    }

    // ── Observers ────────────────────────────────────────────────────────

    /// Metadata of the unit the render thread currently runs, if any.
    #[must_use]
    pub fn active_meta(&self) -> Option<UnitMeta> {
        self.holder.active_meta()
    }

    /// Current source mode.
    #[must_use]
    pub fn mode(&self) -> SourceMode {
        self.controller.mode()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// The configuration this engine runs with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn apply(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Compile {
                    text,
                    mode,
                    artifact,
                } => {
                    let sample_rate = self.shared.sample_rate();
                    match self.pipeline.submit(text, mode, sample_rate, artifact) {
                        Ok(id) => {
                            debug!(id, %mode, "submitted compile request");
                            self.shared.set_state(EngineState::Compiling);
                            self.emit_state_change();
                        }
                        Err(e) => {
                            self.events.emit(EngineEvent::Recompiled {
                                mode,
                                diagnostic: Some(e.to_string()),
                            });
                            self.settle_state();
                        }
                    }
                }
                Directive::Push(changes) => {
                    for (slot, value) in changes {
                        self.push_parameter(slot, value);
                    }
                }
                Directive::Report { mode, diagnostic } => {
                    self.events.emit(EngineEvent::Recompiled {
                        mode,
                        diagnostic: Some(diagnostic),
                    });
                    self.settle_state();
                }
            }
        }
    }

    /// Validates a finished build and parks it if it passes.
    fn handle_outcome(&mut self, outcome: relevo_compile::CompileOutcome) {
        let mode = outcome.mode;
        let mut built = match outcome.result {
            Ok(built) => built,
            Err(e) => {
                self.events.emit(EngineEvent::Recompiled {
                    mode,
                    diagnostic: Some(e.to_string()),
                });
                self.settle_state();
                return;
            }
        };

        self.shared.set_state(EngineState::Validating);
        self.emit_state_change();

        // The candidate starts from the last known values, exactly like
        // the unit it would replace.
        for (&slot, &value) in self.controller.values() {
            built.unit.set_parameter(slot, value);
        }
        let vconfig = relevo_harness::ValidationConfig {
            signal: self.test_signal.clone(),
            max_blocks: self.config.validation.max_blocks,
            cpu_ceiling: self.config.validation.cpu_ceiling,
        };
        let run = relevo_harness::validate(
            built.unit.as_mut(),
            self.shared.sample_rate(),
            self.shared.block_size(),
            &self.timeline,
            &vconfig,
        );

        let verdict = run.failure.as_ref().map(ToString::to_string);
        self.events.emit(EngineEvent::TestCompleted(run));

        match verdict {
            None => {
                let meta = UnitMeta {
                    graph: built.graph,
                    mode,
                    stamp: outcome.id,
                    parameter_count: built.slots,
                };
                debug!(graph = %meta.graph, %mode, stamp = meta.stamp, "candidate passed, parking");
                self.holder.park(built.unit, meta);
                self.events.emit(EngineEvent::Recompiled {
                    mode,
                    diagnostic: None,
                });
            }
            Some(diagnostic) => {
                warn!(%mode, %diagnostic, "candidate failed validation");
                self.events.emit(EngineEvent::Recompiled {
                    mode,
                    diagnostic: Some(diagnostic),
                });
                self.settle_state();
            }
        }
    }

    /// Returns the lifecycle state to its resting value after a failed
    /// attempt. Poison is sticky until a fresh unit is adopted.
    fn settle_state(&mut self) {
        if self.shared.is_poisoned() {
            return;
        }
        let state = if self.holder.has_active() {
            EngineState::Active
        } else {
            EngineState::Idle
        };
        self.shared.set_state(state);
        self.emit_state_change();
    }

    fn note_mode_change(&mut self, before: SourceMode) {
        let after = self.controller.mode();
        if after != before {
            self.events.emit(EngineEvent::ModeChanged(after));
        }
    }

    fn emit_state_change(&mut self) {
        let state = self.shared.state();
        if state != self.last_state {
            self.last_state = state;
            self.events.emit(EngineEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn quick_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.debounce.interpreted_ms = 0;
        config.debounce.jit_ms = 0;
        config.debounce.custom_ms = 0;
        config
    }

    fn trim_graph() -> NodeGraph {
        let mut graph = NodeGraph::new("trim");
        graph.add_node(Node::new("in", NodeKind::Input)).unwrap();
        graph
            .add_node(Node::new("g", NodeKind::Gain).with_param("gain_db", 0, 0.0))
            .unwrap();
        graph.add_node(Node::new("out", NodeKind::Output)).unwrap();
        graph.connect("in", "g").unwrap();
        graph.connect("g", "out").unwrap();
        graph
    }

    /// Pumps until the predicate holds, collecting events along the way.
    fn pump_until(
        engine: &mut Engine,
        rx: &Receiver<EngineEvent>,
        log: &mut Vec<EngineEvent>,
        mut done: impl FnMut(&Engine, &[EngineEvent]) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            engine.pump();
            log.extend(rx.try_iter());
            if done(engine, log) {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "engine never reached the expected state; events: {log:?}"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn recompiled_ok(log: &[EngineEvent]) -> bool {
        log.iter().any(|event| {
            matches!(
                event,
                EngineEvent::Recompiled {
                    diagnostic: None,
                    ..
                }
            )
        })
    }

    #[test]
    fn watchdog_poison_forces_a_rebuild() {
        let (mut engine, rx) = Engine::new(quick_config());
        let mut render = engine.take_render_entry().unwrap();
        render.prepare(48_000.0, 128);
        let mut log = Vec::new();

        engine.submit_graph(trim_graph());
        pump_until(&mut engine, &rx, &mut log, |_, log| recompiled_ok(log));
        let mut block = [0.5f32; 128];
        render.process(&mut block, &[]);
        assert!(engine.active_meta().is_some());

        // Simulate the render watchdog tripping.
        engine.shared.flag_poisoned();
        log.clear();
        pump_until(&mut engine, &rx, &mut log, |_, log| recompiled_ok(log));
        assert!(
            log.iter()
                .any(|e| matches!(e, EngineEvent::StateChanged(EngineState::Poisoned))),
            "poison state was reported: {log:?}"
        );

        // The replacement is adopted and clears the poison.
        render.process(&mut block, &[]);
        assert!(!engine.shared.is_poisoned());
        assert_eq!(engine.shared.state(), EngineState::Active);
    }

    #[test]
    fn failed_compile_settles_back_to_idle() {
        let (mut engine, rx) = Engine::new(quick_config());
        let mut log = Vec::new();

        engine.set_custom_code("graph g\nnode ???\n");
        pump_until(&mut engine, &rx, &mut log, |_, log| {
            log.iter().any(|e| {
                matches!(
                    e,
                    EngineEvent::Recompiled {
                        diagnostic: Some(_),
                        ..
                    }
                )
            })
        });
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.active_meta().is_none());
    }
}
