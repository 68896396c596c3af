//! Offline validation for freshly compiled units.
//!
//! Between "the pipeline built a unit" and "the render thread runs it"
//! sits this crate: every candidate is exercised with synthetic audio and
//! scripted automation before it is allowed anywhere near the audio
//! callback.
//!
//! - **Test signals**: [`TestSignal`] catalogue from silence to swept
//!   sines, noise, and WAV files
//! - **Automation scripts**: [`ParameterTimeline`] with sample-accurate,
//!   block-rebased delivery
//! - **The gate**: [`validate`] runs the unit quarantined and produces a
//!   [`TestRun`] verdict
//!
//! ## Quick Start
//!
//! ```rust
//! use relevo_core::{ParameterEvent, RenderUnit};
//! use relevo_harness::{ParameterTimeline, TestSignal, ValidationConfig, validate};
//!
//! struct HalfGain;
//!
//! impl RenderUnit for HalfGain {
//!     fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {}
//!     fn process(&mut self, buffer: &mut [f32], _events: &[ParameterEvent]) {
//!         for s in buffer {
//!             *s *= 0.5;
//!         }
//!     }
//!     fn set_parameter(&mut self, _slot: u32, _value: f32) {}
//!     fn parameter_count(&self) -> u32 {
//!         0
//!     }
//!     fn reset(&mut self) {}
//! }
//!
//! let mut unit = HalfGain;
//! let config = ValidationConfig {
//!     signal: TestSignal::Dc,
//!     ..ValidationConfig::default()
//! };
//! let run = validate(&mut unit, 48000.0, 256, &ParameterTimeline::new(), &config);
//! assert!(run.passed());
//! assert!((run.peak - 0.5).abs() < 1e-6);
//! ```

mod run;
mod signal;
mod timeline;

pub use run::{TestFailure, TestRun, ValidationConfig, validate};
pub use signal::TestSignal;
pub use timeline::{ParameterTimeline, TimedEvent};

/// Error raised while preparing a validation input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// A WAV input held no samples.
    #[error("no samples in {}", .path.display())]
    EmptySignal {
        /// Offending file.
        path: std::path::PathBuf,
    },

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for validation inputs.
pub type Result<T> = std::result::Result<T, Error>;
