//! Tunable validation: reject unusable values, clamp excessive ones.
//!
//! A config file edited by hand can carry values the engine cannot run
//! with (a zero compile budget never finishes) or values that are merely
//! unreasonable (a ten-minute debounce window). The first kind is
//! rejected with a [`ValidationError`]; the second kind is clamped by
//! [`EngineConfig::clamped`](crate::EngineConfig::clamped) with the limits
//! defined here.

use thiserror::Error;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A tunable is zero where the engine needs a positive value.
    #[error("'{field}' must be positive")]
    MustBePositive {
        /// Name of the offending tunable.
        field: &'static str,
    },

    /// A tunable is outside its usable range.
    #[error("'{field}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the offending tunable.
        field: &'static str,
        /// The value found in the config.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Upper clamp for compile budgets, 10 minutes.
pub(crate) const MAX_TIMEOUT_MS: u64 = 600_000;
/// Upper clamp for debounce windows, 1 minute.
pub(crate) const MAX_DEBOUNCE_MS: u64 = 60_000;
/// Upper clamp for validation run length.
pub(crate) const MAX_VALIDATION_BLOCKS: usize = 4096;
/// Upper clamp for the CPU ceiling. Above real time by a wide margin,
/// useful when validating on a loaded machine.
pub(crate) const MAX_CPU_CEILING: f64 = 8.0;

/// Collects `errors` into a single result.
pub(crate) fn collect(mut errors: Vec<ValidationError>) -> Result<(), ValidationError> {
    if errors.len() == 1 {
        if let Some(err) = errors.pop() {
            return Err(err);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Multiple(errors))
    }
}
