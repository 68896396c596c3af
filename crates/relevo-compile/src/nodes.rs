//! Per-stage processors.
//!
//! One processor per node kind, each a small single-sample state machine.
//! Both backends drive the same [`StageProc`] enum; they differ only in how
//! they walk the schedule around it. Ticks are allocation-free; anything
//! that sizes state (the delay line) happens in construction or
//! [`set_sample_rate`](StageProc::set_sample_rate), which run off the
//! render thread.

use libm::{expf, tanhf};
use relevo_core::NodeKind;
use relevo_core::math::{db_to_linear, flush_denormal, ms_to_samples};
use relevo_core::kind_spec;

use crate::schedule::{FilterMode, SatShape, StageOp};

/// Delay line length ceiling, in milliseconds.
const MAX_DELAY_MS: f32 = 10_000.0;

/// Scale by a decibel amount.
#[derive(Debug, Clone)]
pub struct GainProc {
    gain_db: f32,
    gain: f32,
}

impl GainProc {
    fn new(gain_db: f32) -> Self {
        Self {
            gain_db,
            gain: db_to_linear(gain_db),
        }
    }

    fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
        self.gain = db_to_linear(gain_db);
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        input * self.gain
    }
}

/// One-pole filter: 6 dB/oct lowpass, or its complement as a highpass.
///
/// `y[n] = x[n] + coeff * (y[n-1] - x[n])` with
/// `coeff = exp(-2π * cutoff / sample_rate)`. State is flushed below
/// 1e-20 to keep feedback tails off the denormal slow path.
#[derive(Debug, Clone)]
pub struct FilterProc {
    mode: FilterMode,
    cutoff_hz: f32,
    sample_rate: f32,
    coeff: f32,
    state: f32,
}

impl FilterProc {
    fn new(mode: FilterMode, cutoff_hz: f32, sample_rate: f32) -> Self {
        let mut p = Self {
            mode,
            cutoff_hz,
            sample_rate,
            coeff: 0.0,
            state: 0.0,
        };
        p.recalculate();
        p
    }

    fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff_hz = cutoff_hz;
        self.recalculate();
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate();
    }

    fn recalculate(&mut self) {
        self.coeff = expf(-core::f32::consts::TAU * self.cutoff_hz / self.sample_rate);
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        self.state = flush_denormal(input + self.coeff * (self.state - input));
        match self.mode {
            FilterMode::Lowpass => self.state,
            FilterMode::Highpass => input - self.state,
        }
    }

    fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Fixed-time feedback delay with a wet/dry mix.
///
/// The line length comes from the structural `time_ms` attribute, so it is
/// sized once per sample rate; `feedback` and `mix` are the automatable
/// knobs.
#[derive(Debug, Clone)]
pub struct DelayProc {
    time_ms: f32,
    feedback: f32,
    mix: f32,
    buffer: Vec<f32>,
    write: usize,
}

impl DelayProc {
    fn new(time_ms: f32, feedback: f32, mix: f32, sample_rate: f32) -> Self {
        let mut p = Self {
            time_ms: time_ms.clamp(1.0, MAX_DELAY_MS),
            feedback,
            mix,
            buffer: Vec::new(),
            write: 0,
        };
        p.resize(sample_rate);
        p
    }

    fn resize(&mut self, sample_rate: f32) {
        let len = ms_to_samples(self.time_ms, sample_rate).max(1);
        self.buffer.clear();
        self.buffer.resize(len, 0.0);
        self.write = 0;
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        // Read head sits exactly one line length behind the write head.
        let delayed = self.buffer[self.write];
        self.buffer[self.write] = flush_denormal(input + delayed * self.feedback);
        self.write += 1;
        if self.write == self.buffer.len() {
            self.write = 0;
        }
        input * (1.0 - self.mix) + delayed * self.mix
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

/// Waveshaping drive.
#[derive(Debug, Clone)]
pub struct SaturateProc {
    shape: SatShape,
    drive: f32,
}

impl SaturateProc {
    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        match self.shape {
            SatShape::Tanh => tanhf(input * self.drive),
            SatShape::Hard => (input * self.drive).clamp(-1.0, 1.0),
        }
    }
}

/// Two-input crossfade: 0 is all port 0, 1 is all port 1.
#[derive(Debug, Clone)]
pub struct MixProc {
    balance: f32,
}

impl MixProc {
    #[inline]
    fn tick(&mut self, a: f32, b: f32) -> f32 {
        a * (1.0 - self.balance) + b * self.balance
    }
}

/// A stage's processor, dispatched by kind.
#[derive(Debug, Clone)]
pub enum StageProc {
    /// Gain stage.
    Gain(GainProc),
    /// One-pole filter stage.
    Filter(FilterProc),
    /// Feedback delay stage.
    Delay(DelayProc),
    /// Waveshaper stage.
    Saturate(SaturateProc),
    /// Crossfade stage.
    Mix(MixProc),
}

impl StageProc {
    /// Builds a processor from a resolved stage configuration.
    pub fn from_op(op: &StageOp, sample_rate: f32) -> Self {
        match *op {
            StageOp::Gain { gain_db } => Self::Gain(GainProc::new(gain_db)),
            StageOp::Filter { mode, cutoff_hz } => {
                Self::Filter(FilterProc::new(mode, cutoff_hz, sample_rate))
            }
            StageOp::Delay {
                time_ms,
                feedback,
                mix,
            } => Self::Delay(DelayProc::new(time_ms, feedback, mix, sample_rate)),
            StageOp::Saturate { shape, drive } => Self::Saturate(SaturateProc { shape, drive }),
            StageOp::Mix { balance } => Self::Mix(MixProc { balance }),
        }
    }

    /// Node kind this processor executes.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Gain(_) => NodeKind::Gain,
            Self::Filter(_) => NodeKind::Filter,
            Self::Delay(_) => NodeKind::Delay,
            Self::Saturate(_) => NodeKind::Saturate,
            Self::Mix(_) => NodeKind::Mix,
        }
    }

    /// Process one frame. `b` is only read by two-input stages.
    #[inline]
    pub fn tick(&mut self, a: f32, b: f32) -> f32 {
        match self {
            Self::Gain(p) => p.tick(a),
            Self::Filter(p) => p.tick(a),
            Self::Delay(p) => p.tick(a),
            Self::Saturate(p) => p.tick(a),
            Self::Mix(p) => p.tick(a, b),
        }
    }

    /// Applies an automation value to a knob.
    ///
    /// `knob` indexes the kind's parameter table; the value is clamped to
    /// the table range, so automation can never push a stage outside its
    /// stable region. Out-of-range knob indices are ignored.
    pub fn set_knob(&mut self, knob: usize, value: f32) {
        let Some(param) = kind_spec(self.kind()).params.get(knob) else {
            return;
        };
        let value = param.range.clamp(value);
        match (self, knob) {
            (Self::Gain(p), 0) => p.set_gain_db(value),
            (Self::Filter(p), 0) => p.set_cutoff(value),
            (Self::Delay(p), 0) => p.feedback = value,
            (Self::Delay(p), 1) => p.mix = value,
            (Self::Saturate(p), 0) => p.drive = value,
            (Self::Mix(p), 0) => p.balance = value,
            _ => {}
        }
    }

    /// Update the sample rate, recomputing coefficients and resizing the
    /// delay line. Not realtime-safe.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        match self {
            Self::Filter(p) => p.set_sample_rate(sample_rate),
            Self::Delay(p) => p.resize(sample_rate),
            Self::Gain(_) | Self::Saturate(_) | Self::Mix(_) => {}
        }
    }

    /// Clear internal state without touching knob values.
    pub fn reset(&mut self) {
        match self {
            Self::Filter(p) => p.reset(),
            Self::Delay(p) => p.reset(),
            Self::Gain(_) | Self::Saturate(_) | Self::Mix(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_scales_by_db() {
        let mut p = StageProc::from_op(&StageOp::Gain { gain_db: -6.02 }, 48000.0);
        let out = p.tick(1.0, 0.0);
        assert!((out - 0.5).abs() < 0.01, "expected ~0.5, got {out}");
    }

    #[test]
    fn lowpass_passes_dc_and_kills_nyquist() {
        let mut p = StageProc::from_op(
            &StageOp::Filter {
                mode: FilterMode::Lowpass,
                cutoff_hz: 100.0,
            },
            48000.0,
        );
        let mut out = 0.0;
        for _ in 0..48000 {
            out = p.tick(1.0, 0.0);
        }
        assert!((out - 1.0).abs() < 1e-3, "DC should pass, got {out}");

        let mut sum = 0.0f32;
        for i in 0..4800 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            sum += p.tick(x, 0.0).abs();
        }
        assert!(sum / 4800.0 < 0.1, "Nyquist should be attenuated");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut p = StageProc::from_op(
            &StageOp::Filter {
                mode: FilterMode::Highpass,
                cutoff_hz: 1000.0,
            },
            48000.0,
        );
        let mut out = 1.0;
        for _ in 0..48000 {
            out = p.tick(1.0, 0.0);
        }
        assert!(out.abs() < 1e-3, "DC should be blocked, got {out}");
    }

    #[test]
    fn delay_echoes_after_line_length() {
        let sr = 48000.0;
        let mut p = StageProc::from_op(
            &StageOp::Delay {
                time_ms: 10.0,
                feedback: 0.0,
                mix: 1.0,
            },
            sr,
        );
        let delay_samples = ms_to_samples(10.0, sr);

        // Impulse, then silence. The echo lands one line length later.
        let first = p.tick(1.0, 0.0);
        assert_eq!(first, 0.0, "fully wet output starts silent");
        for n in 1..delay_samples {
            assert_eq!(p.tick(0.0, 0.0), 0.0, "early echo at sample {n}");
        }
        assert_eq!(p.tick(0.0, 0.0), 1.0, "echo expected at line length");
    }

    #[test]
    fn delay_feedback_decays() {
        let sr = 1000.0;
        let mut p = StageProc::from_op(
            &StageOp::Delay {
                time_ms: 10.0,
                feedback: 0.5,
                mix: 1.0,
            },
            sr,
        );
        let line = ms_to_samples(10.0, sr);
        p.tick(1.0, 0.0);
        let mut echoes = Vec::new();
        for _ in 0..(line * 4) {
            let out = p.tick(0.0, 0.0);
            if out != 0.0 {
                echoes.push(out);
            }
        }
        assert_eq!(echoes, [1.0, 0.5, 0.25, 0.125]);
    }

    #[test]
    fn saturate_output_bounded() {
        for shape in [SatShape::Tanh, SatShape::Hard] {
            let mut p = StageProc::from_op(
                &StageOp::Saturate { shape, drive: 20.0 },
                48000.0,
            );
            for x in [-100.0, -1.0, 0.0, 1.0, 100.0] {
                let out = p.tick(x, 0.0);
                assert!(
                    (-1.0..=1.0).contains(&out),
                    "{shape:?} drive 20 at {x}: {out}"
                );
            }
        }
    }

    #[test]
    fn mix_crossfades() {
        let mut p = StageProc::from_op(&StageOp::Mix { balance: 0.25 }, 48000.0);
        let out = p.tick(1.0, -1.0);
        assert!((out - 0.5).abs() < 1e-6, "0.75*1 + 0.25*-1 = 0.5, got {out}");
    }

    #[test]
    fn set_knob_clamps_to_table_range() {
        let mut p = StageProc::from_op(
            &StageOp::Delay {
                time_ms: 100.0,
                feedback: 0.0,
                mix: 0.5,
            },
            48000.0,
        );
        p.set_knob(0, 2.0);
        if let StageProc::Delay(d) = &p {
            assert_eq!(d.feedback, 0.95, "feedback caps below unity");
        } else {
            unreachable!();
        }
        // Unknown knob indices are ignored.
        p.set_knob(7, 1.0);
    }

    #[test]
    fn reset_clears_state_keeps_knobs() {
        let mut p = StageProc::from_op(
            &StageOp::Filter {
                mode: FilterMode::Lowpass,
                cutoff_hz: 500.0,
            },
            48000.0,
        );
        for _ in 0..100 {
            p.tick(1.0, 0.0);
        }
        p.reset();
        assert_eq!(p.tick(0.0, 0.0), 0.0);
    }
}
