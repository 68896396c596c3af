//! Error types for parsing, building, and artifact loading.

use relevo_core::{GraphError, NodeKind};

/// Errors from netlist parsing, graph checks, or the compile worker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Syntax or per-line semantic error in netlist text.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number in the source text.
        line: usize,
        /// Description of what went wrong on that line.
        message: String,
    },
    /// The parsed graph failed structural validation.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The build missed its deadline.
    #[error("compile {id} timed out after {timeout_ms} ms")]
    Timeout {
        /// Request id of the abandoned build.
        id: u64,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },
    /// The compile worker shut down while a request was in flight.
    #[error("compile worker is gone")]
    WorkerGone,
}

/// Errors from loading a previously built artifact.
#[derive(Debug, thiserror::Error)]
pub enum DynamicLoadError {
    /// The artifact was built against a different engine ABI.
    #[error("artifact abi {found} does not match engine abi {expected}")]
    AbiMismatch {
        /// ABI revision this engine executes.
        expected: u32,
        /// ABI revision recorded in the artifact.
        found: u32,
    },
    /// The artifact references a node kind this build cannot execute.
    #[error("artifact uses unsupported node kind '{0}'")]
    UnsupportedKind(NodeKind),
    /// The artifact file was missing or unreadable.
    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
    /// The artifact manifest was not valid JSON.
    #[error("malformed artifact manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    /// The netlist stored in the manifest failed to parse or build.
    #[error("artifact netlist rejected: {0}")]
    Netlist(#[from] CompileError),
}
