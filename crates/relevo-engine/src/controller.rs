//! Source-mode policy: what to rebuild, when, and from which text.
//!
//! The controller owns the editable inputs (graph snapshot, custom text,
//! bound artifact) and turns edits and mode switches into
//! [`Directive`]s for the engine to execute. It never talks to the
//! pipeline or the render side itself, which keeps the policy fully
//! synchronous and testable.
//!
//! Two rules shape everything here:
//!
//! - Graph edits are debounced per mode; the window restarts on every
//!   edit and the newest snapshot wins.
//! - Generated text never contains parameter values, so the controller
//!   diffs newly generated text against the last text it submitted for
//!   the mode. Identical text means the structure is unchanged: the
//!   compile is skipped and only the changed bound values are pushed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relevo_compile::{ARTIFACT_ABI, DynamicArtifact, DynamicLoadError};
use relevo_config::EngineConfig;
use relevo_core::{LibraryView, NodeGraph, SourceMode};

/// One instruction from the controller to the engine.
#[derive(Debug)]
pub(crate) enum Directive {
    /// Submit this text to the compile pipeline.
    Compile {
        text: String,
        mode: SourceMode,
        artifact: Option<Arc<DynamicArtifact>>,
    },
    /// Push changed bound values to the active unit; no rebuild needed.
    Push(Vec<(u32, f32)>),
    /// Report a failure that never reached the pipeline.
    Report {
        mode: SourceMode,
        diagnostic: String,
    },
}

pub(crate) struct SourceModeController {
    mode: SourceMode,
    graph: Option<NodeGraph>,
    custom_text: String,
    artifact: Option<Arc<DynamicArtifact>>,
    /// Last text submitted per mode, for the structural diff.
    last_text: HashMap<SourceMode, String>,
    /// Last known value per automation slot, from graph edits and runtime
    /// pushes alike. Seeds fresh units before validation.
    values: BTreeMap<u32, f32>,
    /// Pending debounced regeneration, if any.
    deadline: Option<Instant>,
    config: EngineConfig,
}

impl SourceModeController {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            mode: SourceMode::default(),
            graph: None,
            custom_text: String::new(),
            artifact: None,
            last_text: HashMap::new(),
            values: BTreeMap::new(),
            deadline: None,
            config,
        }
    }

    pub(crate) fn mode(&self) -> SourceMode {
        self.mode
    }

    /// Last known value per slot, for seeding a fresh unit.
    pub(crate) fn values(&self) -> &BTreeMap<u32, f32> {
        &self.values
    }

    /// Records a runtime parameter push so later units start from it.
    pub(crate) fn note_pushed(&mut self, slot: u32, value: f32) {
        self.values.insert(slot, value);
    }

    /// Accepts a new graph snapshot.
    ///
    /// In the modes that regenerate on edit this (re)starts the debounce
    /// window; in the others the snapshot just accumulates.
    pub(crate) fn submit_graph(&mut self, graph: NodeGraph, now: Instant) {
        self.graph = Some(graph);
        if matches!(self.mode, SourceMode::Interpreted | SourceMode::JitCompiled) {
            self.arm(now, self.mode);
        }
    }

    /// Stores custom netlist text and moves to `CustomCode`.
    pub(crate) fn set_custom_code(&mut self, text: impl Into<String>, now: Instant) {
        self.custom_text = text.into();
        self.mode = SourceMode::CustomCode;
        self.arm(now, SourceMode::CustomCode);
    }

    /// Switches the source mode. Re-entering the current mode is a no-op;
    /// any other transition cancels pending debounce and compiles fresh.
    pub(crate) fn set_source(&mut self, mode: SourceMode, _now: Instant) -> Vec<Directive> {
        if mode == self.mode {
            return Vec::new();
        }
        if mode == SourceMode::DynamicLibrary && self.artifact.is_none() {
            return vec![Directive::Report {
                mode,
                diagnostic: "no library artifact bound".into(),
            }];
        }
        self.mode = mode;
        self.deadline = None;
        self.regenerate(true)
    }

    /// Binds a loaded artifact and switches to `DynamicLibrary`.
    ///
    /// Refuses artifacts built against a different engine ABI; the caller
    /// decides the fallback.
    pub(crate) fn bind_artifact(
        &mut self,
        artifact: DynamicArtifact,
    ) -> Result<Vec<Directive>, DynamicLoadError> {
        let found = artifact.abi_version();
        if found != ARTIFACT_ABI {
            return Err(DynamicLoadError::AbiMismatch {
                expected: ARTIFACT_ABI,
                found,
            });
        }
        self.artifact = Some(Arc::new(artifact));
        self.mode = SourceMode::DynamicLibrary;
        self.deadline = None;
        Ok(self.regenerate(true))
    }

    /// Drops back to the interpreted walker, compiling the current graph.
    pub(crate) fn fall_back_to_interpreted(&mut self) -> Vec<Directive> {
        self.mode = SourceMode::Interpreted;
        self.deadline = None;
        self.regenerate(true)
    }

    /// Unconditional rebuild of the current mode, bypassing the text diff.
    /// Used when the watchdog poisons the active unit.
    pub(crate) fn force_recompile(&mut self) -> Vec<Directive> {
        self.deadline = None;
        self.regenerate(true)
    }

    /// Fires the debounced regeneration once its window has elapsed.
    pub(crate) fn tick(&mut self, now: Instant) -> Vec<Directive> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.regenerate(false)
            }
            _ => Vec::new(),
        }
    }

    /// (Re)starts the debounce window for a mode's configured length.
    fn arm(&mut self, now: Instant, mode: SourceMode) {
        let window = Duration::from_millis(self.config.debounce_ms(mode));
        self.deadline = Some(now + window);
    }

    /// Produces the compile (or value push) for the current mode.
    ///
    /// `force` bypasses the structural text diff; mode transitions and
    /// watchdog recompiles always rebuild because the running unit does
    /// not match the requested mode anymore.
    fn regenerate(&mut self, force: bool) -> Vec<Directive> {
        let mode = self.mode;
        match mode {
            SourceMode::Interpreted | SourceMode::JitCompiled => {
                let Some(graph) = self.graph.as_ref() else {
                    return vec![Directive::Report {
                        mode,
                        diagnostic: "no graph loaded".into(),
                    }];
                };
                match relevo_codegen::generate(graph) {
                    Ok(text) => self.finish(text, None, force),
                    Err(e) => vec![Directive::Report {
                        mode,
                        diagnostic: e.to_string(),
                    }],
                }
            }
            SourceMode::CustomCode => {
                // User text compiles as-is; empty text fails in the parser
                // and is reported like any other compile failure.
                self.finish(self.custom_text.clone(), None, force)
            }
            SourceMode::DynamicLibrary => {
                let Some(artifact) = self.artifact.clone() else {
                    return vec![Directive::Report {
                        mode,
                        diagnostic: "no library artifact bound".into(),
                    }];
                };
                let text = artifact.netlist().to_string();
                self.finish(text, Some(artifact), force)
            }
        }
    }

    /// Applies the structural diff and records what was submitted.
    fn finish(
        &mut self,
        text: String,
        artifact: Option<Arc<DynamicArtifact>>,
        force: bool,
    ) -> Vec<Directive> {
        let mode = self.mode;
        if !force && self.last_text.get(&mode) == Some(&text) {
            let changed = self.changed_graph_values();
            self.absorb_graph_values();
            return if changed.is_empty() {
                tracing::debug!(%mode, "edit left text and values unchanged, skipping");
                Vec::new()
            } else {
                tracing::debug!(%mode, count = changed.len(), "value-only edit, pushing");
                vec![Directive::Push(changed)]
            };
        }
        self.last_text.insert(mode, text.clone());
        self.absorb_graph_values();
        vec![Directive::Compile {
            text,
            mode,
            artifact,
        }]
    }

    /// Slots whose graph-side value differs from the last known value.
    fn changed_graph_values(&self) -> Vec<(u32, f32)> {
        let Some(graph) = self.graph.as_ref() else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for node in graph.nodes() {
            for param in &node.params {
                if self.values.get(&param.slot) != Some(&param.value) {
                    changed.push((param.slot, param.value));
                }
            }
        }
        changed.sort_by_key(|&(slot, _)| slot);
        changed
    }

    /// Folds the graph's bound values into the last-known map.
    fn absorb_graph_values(&mut self) {
        if let Some(graph) = self.graph.as_ref() {
            for node in graph.nodes() {
                for param in &node.params {
                    self.values.insert(param.slot, param.value);
                }
            }
        }
    }
}
