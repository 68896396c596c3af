//! The validation run: exercise a candidate unit before it may go live.
//!
//! [`validate`] is the gate between the compile pipeline and the render
//! thread. It drives a freshly built unit through a bounded number of
//! synthetic blocks and reports whether the unit is safe to swap in. The
//! unit runs quarantined: a panic is caught here, on the validation
//! thread, where it can never take the audio callback down with it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use relevo_core::RenderUnit;

use crate::signal::TestSignal;
use crate::timeline::ParameterTimeline;

/// Bounds for a validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Input signal driven through the unit.
    pub signal: TestSignal,
    /// Number of blocks to render.
    pub max_blocks: usize,
    /// Highest acceptable ratio of processing time to rendered time.
    pub cpu_ceiling: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            signal: TestSignal::default(),
            max_blocks: 64,
            cpu_ceiling: 0.9,
        }
    }
}

/// Why a validation run rejected the unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TestFailure {
    /// The run could not complete. A panic inside the unit lands here with
    /// the payload text, as does an unavailable input signal.
    #[error("unit fault: {message}")]
    Fault {
        /// Panic payload or abort reason.
        message: String,
    },
    /// The unit produced NaN or infinite samples.
    #[error("non-finite output in block {block} ({count} of its samples)")]
    NonFinite {
        /// Index of the offending block.
        block: usize,
        /// How many samples in that block were non-finite.
        count: usize,
    },
    /// Processing took too large a share of the rendered duration.
    #[error("cpu fraction {fraction:.3} exceeds ceiling {ceiling:.3}")]
    CpuOverrun {
        /// Measured processing-time share.
        fraction: f64,
        /// Configured limit.
        ceiling: f64,
    },
}

/// Outcome of a validation run.
///
/// `failure == None` means the unit may be swapped in.
#[derive(Debug, Clone)]
pub struct TestRun {
    /// Blocks that finished processing.
    pub blocks: usize,
    /// Samples rendered across those blocks.
    pub samples: usize,
    /// Processing wall time divided by rendered duration.
    pub cpu_fraction: f64,
    /// Largest absolute output sample over the clean blocks.
    pub peak: f32,
    /// Root-mean-square level over the clean blocks.
    pub rms: f32,
    /// First check that rejected the unit, if any.
    pub failure: Option<TestFailure>,
}

impl TestRun {
    /// Whether the unit passed every check.
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    fn aborted(message: String) -> Self {
        Self {
            blocks: 0,
            samples: 0,
            cpu_fraction: 0.0,
            peak: 0.0,
            rms: 0.0,
            failure: Some(TestFailure::Fault { message }),
        }
    }
}

/// Runs a candidate unit offline and reports whether it is fit to go live.
///
/// Prepares the unit for `sample_rate`/`block_size`, then renders
/// [`ValidationConfig::max_blocks`] blocks of the configured signal while
/// feeding the scripted `timeline`, rebased per block. Checks, in order:
///
/// 1. no panic escapes `prepare` or `process`
/// 2. every output sample is finite
/// 3. the processing-time share stays under the CPU ceiling
///
/// A passing unit has been prepared with exactly these stream parameters,
/// so the render thread can adopt it without further setup.
pub fn validate(
    unit: &mut dyn RenderUnit,
    sample_rate: f32,
    block_size: usize,
    timeline: &ParameterTimeline,
    config: &ValidationConfig,
) -> TestRun {
    let total = config.max_blocks * block_size;
    let source = match config.signal.render(sample_rate, total) {
        Ok(samples) => samples,
        Err(err) => {
            tracing::warn!(error = %err, "validation aborted, test signal unavailable");
            return TestRun::aborted(format!("test signal unavailable: {err}"));
        }
    };

    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| unit.prepare(sample_rate, block_size))) {
        return TestRun::aborted(format!("panic in prepare: {}", panic_text(&*payload)));
    }

    let mut buffer = vec![0.0f32; block_size];
    let mut busy = Duration::ZERO;
    let mut completed = 0usize;
    let mut clean_samples = 0usize;
    let mut peak = 0.0f32;
    let mut sum_sq = 0.0f64;
    let mut failure = None;

    for block in 0..config.max_blocks {
        let start = block * block_size;
        buffer.copy_from_slice(&source[start..start + block_size]);
        let events = timeline.events_in(start as u64, block_size);

        let began = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| unit.process(&mut buffer, &events)));
        busy += began.elapsed();

        if let Err(payload) = outcome {
            failure = Some(TestFailure::Fault {
                message: panic_text(&*payload),
            });
            break;
        }
        completed += 1;

        let bad = buffer.iter().filter(|s| !s.is_finite()).count();
        if bad > 0 {
            failure = Some(TestFailure::NonFinite { block, count: bad });
            break;
        }

        clean_samples += block_size;
        for &sample in &buffer {
            peak = peak.max(sample.abs());
            sum_sq += f64::from(sample) * f64::from(sample);
        }
    }

    let samples = completed * block_size;
    let rendered_secs = samples as f64 / f64::from(sample_rate);
    let cpu_fraction = if rendered_secs > 0.0 {
        busy.as_secs_f64() / rendered_secs
    } else {
        0.0
    };
    if failure.is_none() && cpu_fraction > config.cpu_ceiling {
        failure = Some(TestFailure::CpuOverrun {
            fraction: cpu_fraction,
            ceiling: config.cpu_ceiling,
        });
    }

    let rms = if clean_samples > 0 {
        (sum_sq / clean_samples as f64).sqrt() as f32
    } else {
        0.0
    };

    match &failure {
        Some(f) => tracing::warn!(blocks = completed, error = %f, "validation failed"),
        None => tracing::debug!(blocks = completed, cpu_fraction, "validation passed"),
    }

    TestRun {
        blocks: completed,
        samples,
        cpu_fraction,
        peak,
        rms,
        failure,
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("opaque panic payload")
    }
}
