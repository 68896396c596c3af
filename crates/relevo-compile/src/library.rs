//! Prebuilt dynamic artifacts.
//!
//! A [`DynamicArtifact`] is the loadable form of a compiled graph: the
//! canonical netlist it was built from, the ABI revision it targets, and a
//! factory table for the node kinds it can execute. The dynamic source
//! mode runs the artifact's own stored netlist; graph edits accumulate in
//! the model without touching it.
//!
//! On disk an artifact is a JSON manifest. Loading re-parses the stored
//! netlist and re-checks it against the declared kind set, so a manifest
//! edited by hand cannot smuggle an unexecutable graph past the build
//! pipeline.

use std::fs;
use std::path::Path;

use relevo_core::{GraphError, LibraryView, NodeKind, ParameterEvent, RenderUnit};
use serde::{Deserialize, Serialize};

use crate::error::DynamicLoadError;
use crate::interp::InterpretedUnit;
use crate::nodes::StageProc;
use crate::parse::parse_netlist;
use crate::schedule::{Schedule, StageOp};

/// ABI revision this engine build executes.
///
/// Artifacts record the revision they were built for; binding one with a
/// different revision is refused by the engine.
pub const ARTIFACT_ABI: u32 = 1;

/// Constructs a stage processor for one kind.
type StageFactory = fn(&StageOp, f32) -> StageProc;

/// One executable kind the artifact provides.
#[derive(Debug, Clone)]
struct KindEntry {
    kind: NodeKind,
    factory: StageFactory,
}

/// Resolves the built-in factory for a kind. Io kinds have no processor.
fn builtin_factory(kind: NodeKind) -> Option<StageFactory> {
    match kind {
        NodeKind::Input | NodeKind::Output => None,
        _ => Some(StageProc::from_op),
    }
}

/// On-disk manifest shape.
#[derive(Serialize, Deserialize)]
struct Manifest {
    name: String,
    abi_version: u32,
    kinds: Vec<NodeKind>,
    netlist: String,
}

/// A precompiled, loadable unit library.
#[derive(Debug, Clone)]
pub struct DynamicArtifact {
    name: String,
    abi_version: u32,
    netlist: String,
    entries: Vec<KindEntry>,
}

impl DynamicArtifact {
    /// Builds an artifact over the full built-in kind set.
    ///
    /// The netlist must parse and validate; it becomes the graph the
    /// dynamic mode executes.
    pub fn new(
        name: impl Into<String>,
        netlist: impl Into<String>,
    ) -> Result<Self, DynamicLoadError> {
        Self::with_kinds(name, netlist, &NodeKind::ALL)
    }

    /// Builds an artifact restricted to a subset of kinds.
    ///
    /// Fails with [`DynamicLoadError::UnsupportedKind`] when the netlist
    /// uses a kind outside the set. Io kinds are always supported and need
    /// not be listed.
    pub fn with_kinds(
        name: impl Into<String>,
        netlist: impl Into<String>,
        kinds: &[NodeKind],
    ) -> Result<Self, DynamicLoadError> {
        let artifact = Self {
            name: name.into(),
            abi_version: ARTIFACT_ABI,
            netlist: netlist.into(),
            entries: kinds
                .iter()
                .filter_map(|&kind| {
                    builtin_factory(kind).map(|factory| KindEntry { kind, factory })
                })
                .collect(),
        };
        artifact.check_netlist()?;
        Ok(artifact)
    }

    /// Reads an artifact manifest from disk.
    ///
    /// The stored netlist goes through the same checks as
    /// [`with_kinds`](Self::with_kinds). The recorded ABI revision is kept
    /// as-is; compatibility is enforced where the artifact is bound, not
    /// here, so old artifacts stay inspectable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DynamicLoadError> {
        let text = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        let mut artifact = Self::with_kinds(manifest.name, manifest.netlist, &manifest.kinds)?;
        artifact.abi_version = manifest.abi_version;
        Ok(artifact)
    }

    /// Writes the artifact manifest, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DynamicLoadError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let manifest = Manifest {
            name: self.name.clone(),
            abi_version: self.abi_version,
            kinds: self.entries.iter().map(|e| e.kind).collect(),
            netlist: self.netlist.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }

    /// Artifact name, as shown in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stored netlist the dynamic mode executes.
    pub fn netlist(&self) -> &str {
        &self.netlist
    }

    /// Instantiates a processor through the factory table.
    ///
    /// `None` when the op's kind is outside the artifact's set.
    pub fn instantiate(&self, op: &StageOp, sample_rate: f32) -> Option<StageProc> {
        let entry = self.entries.iter().find(|e| e.kind == op.kind())?;
        Some((entry.factory)(op, sample_rate))
    }

    fn check_netlist(&self) -> Result<(), DynamicLoadError> {
        let graph = parse_netlist(&self.netlist)?;
        graph
            .validate()
            .map_err(crate::error::CompileError::from)?;
        for node in graph.nodes() {
            if !self.supports(node.kind) {
                return Err(DynamicLoadError::UnsupportedKind(node.kind));
            }
        }
        Ok(())
    }
}

impl LibraryView for DynamicArtifact {
    fn supports(&self, kind: NodeKind) -> bool {
        matches!(kind, NodeKind::Input | NodeKind::Output)
            || self.entries.iter().any(|e| e.kind == kind)
    }

    fn abi_version(&self) -> u32 {
        self.abi_version
    }
}

/// A unit whose processors come from a bound artifact.
#[derive(Debug)]
pub struct LibraryUnit {
    inner: InterpretedUnit,
    library: String,
}

impl LibraryUnit {
    /// Instantiates every stage through the artifact's factory table.
    pub fn from_schedule(
        schedule: Schedule,
        artifact: &DynamicArtifact,
        sample_rate: f32,
    ) -> Result<Self, GraphError> {
        let procs = schedule
            .stages
            .iter()
            .map(|stage| {
                artifact
                    .instantiate(&stage.op, sample_rate)
                    .ok_or(GraphError::MissingLibraryKind(stage.op.kind()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            inner: InterpretedUnit::from_parts(schedule, procs),
            library: artifact.name().to_string(),
        })
    }

    /// Name of the artifact the processors came from.
    pub fn library(&self) -> &str {
        &self.library
    }
}

impl RenderUnit for LibraryUnit {
    fn prepare(&mut self, sample_rate: f32, max_block: usize) {
        self.inner.prepare(sample_rate, max_block);
    }

    fn process(&mut self, buffer: &mut [f32], events: &[ParameterEvent]) {
        self.inner.process(buffer, events);
    }

    fn set_parameter(&mut self, slot: u32, value: f32) {
        self.inner.set_parameter(slot, value);
    }

    fn parameter_count(&self) -> u32 {
        self.inner.parameter_count()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}
