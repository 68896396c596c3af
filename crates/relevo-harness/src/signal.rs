//! Synthetic test signals.
//!
//! Every signal renders deterministically from its parameters, so a
//! validation run is reproducible: same unit, same signal, same output.
//! Lengths are exact; a signal never decides how long the run is.

use std::f32::consts::TAU;
use std::path::PathBuf;

use hound::{SampleFormat, WavReader};

use crate::{Error, Result};

/// Catalogue of input signals for offline validation.
#[derive(Debug, Clone, PartialEq)]
pub enum TestSignal {
    /// All zeros. Exposes units that generate output from nothing.
    Silence,
    /// Unit DC. Steady-state response and denormal behavior.
    Dc,
    /// One linear ramp from 0 toward 1 over the whole run.
    Ramp,
    /// The ramp wrapped 32 times. Sharp discontinuities every wrap.
    FastRamp,
    /// Single unit sample at frame 0, silence after.
    Impulse,
    /// Fixed-frequency sine.
    Sine {
        /// Oscillator frequency in Hz.
        freq_hz: f32,
    },
    /// Naive sawtooth, rising from -1 to 1 each cycle.
    Saw {
        /// Oscillator frequency in Hz.
        freq_hz: f32,
    },
    /// Sine with linearly swept frequency across the run.
    Sweep {
        /// Frequency at the first frame.
        start_hz: f32,
        /// Frequency at the last frame.
        end_hz: f32,
    },
    /// Uniform noise in [-1, 1) from a seeded generator.
    Noise {
        /// Generator seed. Equal seeds produce equal runs.
        seed: u64,
    },
    /// A WAV file mixed down to mono, truncated or zero-padded to length.
    WavFile(PathBuf),
}

impl Default for TestSignal {
    fn default() -> Self {
        Self::Sine { freq_hz: 1000.0 }
    }
}

impl TestSignal {
    /// Renders `len` samples of this signal at `sample_rate`.
    ///
    /// Only [`TestSignal::WavFile`] can fail; the synthetic variants always
    /// succeed.
    pub fn render(&self, sample_rate: f32, len: usize) -> Result<Vec<f32>> {
        let mut out = vec![0.0f32; len];
        match self {
            Self::Silence => {}
            Self::Dc => out.fill(1.0),
            Self::Ramp | Self::FastRamp => {
                let mut delta = 1.0 / len.max(1) as f32;
                if matches!(self, Self::FastRamp) {
                    delta *= 32.0;
                }
                for (i, sample) in out.iter_mut().enumerate() {
                    *sample = (delta * i as f32).fract();
                }
            }
            Self::Impulse => {
                if let Some(first) = out.first_mut() {
                    *first = 1.0;
                }
            }
            Self::Sine { freq_hz } => {
                for (i, sample) in out.iter_mut().enumerate() {
                    *sample = (TAU * freq_hz * i as f32 / sample_rate).sin();
                }
            }
            Self::Saw { freq_hz } => {
                for (i, sample) in out.iter_mut().enumerate() {
                    let phase = (freq_hz * i as f32 / sample_rate).fract();
                    *sample = 2.0 * phase - 1.0;
                }
            }
            Self::Sweep { start_hz, end_hz } => {
                // Phase accumulation, so the sweep stays click-free even
                // over large frequency spans.
                let mut phase = 0.0f32;
                let span = end_hz - start_hz;
                for (i, sample) in out.iter_mut().enumerate() {
                    let t = i as f32 / len.max(1) as f32;
                    let freq = start_hz + span * t;
                    *sample = (TAU * phase).sin();
                    phase = (phase + freq / sample_rate).fract();
                }
            }
            Self::Noise { seed } => {
                let mut state = seed.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
                for sample in &mut out {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    // Top 24 bits, mapped to [-1, 1).
                    let unit = (state >> 40) as f32 / (1u32 << 24) as f32;
                    *sample = unit * 2.0 - 1.0;
                }
            }
            Self::WavFile(path) => {
                let samples = read_mono(path)?;
                if samples.is_empty() {
                    return Err(Error::EmptySignal { path: path.clone() });
                }
                let copy = samples.len().min(len);
                out[..copy].copy_from_slice(&samples[..copy]);
            }
        }
        Ok(out)
    }
}

/// Reads a WAV file mixed down to mono: floats pass through, integers
/// scale by their bit depth, channels average.
fn read_mono(path: &PathBuf) -> Result<Vec<f32>> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    if channels == 1 {
        return Ok(samples);
    }
    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}
