//! Math helpers shared by unit implementations.
//!
//! Allocation-free, `no_std`-friendly conversions used by the processing
//! backends and the validation harness.

use libm::{expf, logf};

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use relevo_core::math::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels. Input is floored at 1e-10, so silence
/// maps to -200 dB instead of -inf.
///
/// # Example
/// ```rust
/// use relevo_core::math::linear_to_db;
///
/// assert!((linear_to_db(0.5) - (-6.02)).abs() < 0.01);
/// ```
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Flush denormal-range values to zero.
///
/// Feedback paths decay into the denormal range, where some CPUs fall off
/// the fast path by orders of magnitude. Applied to filter and delay state
/// after every update.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

/// Convert a duration in milliseconds to whole samples, rounding to nearest.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> usize {
    let samples = ms * sample_rate / 1000.0;
    if samples <= 0.0 { 0 } else { (samples + 0.5) as usize }
}
