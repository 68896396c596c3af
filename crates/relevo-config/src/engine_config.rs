//! The engine's tunables, persisted as TOML.
//!
//! Every threshold the engine consults at runtime lives here: the compile
//! budget, the validation bounds, the per-mode debounce windows, and the
//! render watchdog. Sections deserialize independently with
//! `#[serde(default)]`, so a config file only needs the values it changes.

use std::path::Path;
use std::time::Duration;

use relevo_core::SourceMode;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{
    MAX_CPU_CEILING, MAX_DEBOUNCE_MS, MAX_TIMEOUT_MS, MAX_VALIDATION_BLOCKS, ValidationError,
    collect,
};

/// Compile pipeline budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSettings {
    /// Per-request budget in milliseconds. The worker checks the deadline
    /// between pipeline phases.
    pub timeout_ms: u64,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

/// Offline validation bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Blocks rendered per validation run.
    pub max_blocks: usize,
    /// Highest acceptable ratio of processing time to rendered time.
    pub cpu_ceiling: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_blocks: 64,
            cpu_ceiling: 0.9,
        }
    }
}

/// Edit-coalescing windows for the regenerating modes, in milliseconds.
///
/// DynamicLibrary has no entry: it never regenerates on edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
    /// Window for Interpreted mode.
    pub interpreted_ms: u64,
    /// Window for JitCompiled mode.
    pub jit_ms: u64,
    /// Window for CustomCode mode.
    pub custom_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            interpreted_ms: SourceMode::Interpreted.default_debounce_ms(),
            jit_ms: SourceMode::JitCompiled.default_debounce_ms(),
            custom_ms: SourceMode::CustomCode.default_debounce_ms(),
        }
    }
}

/// Render-side watchdog thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Consecutive non-finite output blocks from the active unit before
    /// the engine poisons itself and falls back to silence.
    pub poison_after_bad_blocks: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            poison_after_bad_blocks: 2,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compile pipeline budget.
    pub compile: CompileSettings,
    /// Offline validation bounds.
    pub validation: ValidationSettings,
    /// Per-mode edit-coalescing windows.
    pub debounce: DebounceSettings,
    /// Render-side watchdog thresholds.
    pub render: RenderSettings,
}

impl EngineConfig {
    /// Load a config from a TOML file.
    ///
    /// Rejects unusable values and clamps excessive ones, so the returned
    /// config is always runnable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config.clamped())
    }

    /// Parse a config from a TOML string, without validating.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the config to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.compile.timeout_ms == 0 {
            errors.push(ValidationError::MustBePositive {
                field: "compile.timeout_ms",
            });
        }
        if self.validation.max_blocks == 0 {
            errors.push(ValidationError::MustBePositive {
                field: "validation.max_blocks",
            });
        }
        if !self.validation.cpu_ceiling.is_finite() || self.validation.cpu_ceiling <= 0.0 {
            errors.push(ValidationError::OutOfRange {
                field: "validation.cpu_ceiling",
                value: self.validation.cpu_ceiling,
                min: 0.0,
                max: MAX_CPU_CEILING,
            });
        }
        if self.render.poison_after_bad_blocks == 0 {
            errors.push(ValidationError::MustBePositive {
                field: "render.poison_after_bad_blocks",
            });
        }
        collect(errors)?;
        Ok(())
    }

    /// Clamp excessive values to their usable maxima.
    pub fn clamped(mut self) -> Self {
        self.compile.timeout_ms = self.compile.timeout_ms.min(MAX_TIMEOUT_MS);
        self.validation.max_blocks = self.validation.max_blocks.min(MAX_VALIDATION_BLOCKS);
        self.validation.cpu_ceiling = self.validation.cpu_ceiling.min(MAX_CPU_CEILING);
        self.debounce.interpreted_ms = self.debounce.interpreted_ms.min(MAX_DEBOUNCE_MS);
        self.debounce.jit_ms = self.debounce.jit_ms.min(MAX_DEBOUNCE_MS);
        self.debounce.custom_ms = self.debounce.custom_ms.min(MAX_DEBOUNCE_MS);
        self
    }

    /// Compile budget as a [`Duration`].
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile.timeout_ms)
    }

    /// Debounce window for a mode. DynamicLibrary never regenerates, so
    /// its window is zero.
    pub fn debounce_ms(&self, mode: SourceMode) -> u64 {
        match mode {
            SourceMode::Interpreted => self.debounce.interpreted_ms,
            SourceMode::JitCompiled => self.debounce.jit_ms,
            SourceMode::CustomCode => self.debounce.custom_ms,
            SourceMode::DynamicLibrary => 0,
        }
    }
}
