//! Configuration for the relevo engine.
//!
//! One [`EngineConfig`] struct carries every tunable the engine consults
//! at runtime, persisted as TOML:
//!
//! - **Compile budget**: per-request timeout checked between pipeline phases
//! - **Validation bounds**: block count and CPU ceiling for offline runs
//! - **Debounce windows**: per-mode edit coalescing
//! - **Render watchdog**: the poison threshold for non-finite output
//!
//! # Example
//!
//! ```rust,no_run
//! use relevo_config::EngineConfig;
//!
//! // Start from defaults, tighten the compile budget.
//! let mut config = EngineConfig::default();
//! config.compile.timeout_ms = 2000;
//! config.save("relevo.toml").unwrap();
//!
//! // Later: load validates and clamps, so the result is always runnable.
//! let config = EngineConfig::load("relevo.toml").unwrap();
//! assert_eq!(config.compile.timeout_ms, 2000);
//! ```

mod engine_config;
mod error;

/// Tunable validation: rejection and clamping rules.
pub mod validation;

pub use engine_config::{
    CompileSettings, DebounceSettings, EngineConfig, RenderSettings, ValidationSettings,
};
pub use error::ConfigError;
pub use validation::ValidationError;
