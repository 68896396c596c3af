//! Parameter range mapping for bound node parameters.
//!
//! Every bindable parameter in the kind table carries a [`ParamRange`]
//! describing its valid span and normalization curve. Ranges are used when
//! resolving initial values at compile time and when mapping normalized
//! automation input onto plain values.

/// Normalization curve for a parameter range.
///
/// - **Linear**: `normalized = (value - min) / (max - min)`
/// - **Logarithmic**: `normalized = ln(value/min) / ln(max/min)` — requires
///   `min > 0`, suited to frequency-like parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamCurve {
    /// Equal resolution across the range.
    #[default]
    Linear,
    /// More resolution at low values (frequencies, drive amounts).
    Logarithmic,
}

/// Valid span and mapping curve for one bindable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    /// Minimum allowed plain value.
    pub min: f32,
    /// Maximum allowed plain value.
    pub max: f32,
    /// Curve used by [`normalize`](Self::normalize)/[`denormalize`](Self::denormalize).
    pub curve: ParamCurve,
}

impl ParamRange {
    /// Linear range from `min` to `max`.
    pub const fn linear(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            curve: ParamCurve::Linear,
        }
    }

    /// Logarithmic range from `min` to `max`. `min` must be positive.
    pub const fn logarithmic(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            curve: ParamCurve::Logarithmic,
        }
    }

    /// Clamps a plain value into the range.
    ///
    /// ```rust
    /// use relevo_core::ParamRange;
    ///
    /// let r = ParamRange::linear(-60.0, 24.0);
    /// assert_eq!(r.clamp(0.0), 0.0);
    /// assert_eq!(r.clamp(-100.0), -60.0);
    /// assert_eq!(r.clamp(100.0), 24.0);
    /// ```
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Converts a plain value to normalized \[0.0, 1.0\] per the curve.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span == 0.0 {
            return 0.0;
        }
        match self.curve {
            ParamCurve::Linear => (value - self.min) / span,
            ParamCurve::Logarithmic => {
                if self.min <= 0.0 || value <= 0.0 {
                    return 0.0;
                }
                libm::logf(value / self.min) / libm::logf(self.max / self.min)
            }
        }
    }

    /// Converts a normalized value back to the plain range. Inverse of
    /// [`normalize`](Self::normalize).
    #[inline]
    pub fn denormalize(&self, normalized: f32) -> f32 {
        match self.curve {
            ParamCurve::Linear => self.min + normalized * (self.max - self.min),
            ParamCurve::Logarithmic => {
                if self.min <= 0.0 {
                    return self.min;
                }
                self.min * libm::powf(self.max / self.min, normalized)
            }
        }
    }
}

/// Static description of one bindable parameter of a node kind.
#[derive(Debug, Clone, Copy)]
pub struct BoundSpec {
    /// Parameter name as written in the netlist (e.g. `cutoff_hz`).
    pub name: &'static str,
    /// Valid span and mapping curve.
    pub range: ParamRange,
    /// Value used when neither the graph snapshot nor the source text
    /// supplies one.
    pub default: f32,
}

/// Static description of one structural attribute of a node kind.
///
/// Attributes are part of the topology text (changing one forces a rebuild),
/// unlike bound parameters, whose values travel outside the generated source.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    /// Attribute name as written in the netlist (e.g. `mode`).
    pub name: &'static str,
    /// Default symbol value, or `None` for numeric attributes.
    pub symbol_default: Option<&'static str>,
    /// Default numeric value for numeric attributes.
    pub number_default: f32,
    /// Accepted symbols for symbol attributes (empty for numeric ones).
    pub symbols: &'static [&'static str],
}

impl AttrSpec {
    /// Numeric attribute with a default value.
    pub const fn number(name: &'static str, default: f32) -> Self {
        Self {
            name,
            symbol_default: None,
            number_default: default,
            symbols: &[],
        }
    }

    /// Symbol attribute choosing among a closed set of identifiers.
    pub const fn symbol(
        name: &'static str,
        default: &'static str,
        symbols: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            symbol_default: Some(default),
            number_default: 0.0,
            symbols,
        }
    }

    /// Returns `true` if `value` is accepted for a symbol attribute.
    pub fn accepts_symbol(&self, value: &str) -> bool {
        self.symbols.iter().any(|s| *s == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_mapping_round_trip() {
        let r = ParamRange::linear(0.0, 100.0);
        assert_eq!(r.normalize(0.0), 0.0);
        assert_eq!(r.normalize(50.0), 0.5);
        assert_eq!(r.normalize(100.0), 1.0);
        assert_eq!(r.denormalize(0.5), 50.0);

        let original = 73.0;
        let rt = r.denormalize(r.normalize(original));
        assert!((rt - original).abs() < 0.001);
    }

    #[test]
    fn log_mapping_round_trip() {
        let r = ParamRange::logarithmic(20.0, 20000.0);
        assert!((r.normalize(20.0)).abs() < 1e-6);
        assert!((r.normalize(20000.0) - 1.0).abs() < 1e-6);

        // Midpoint in log space: sqrt(20 * 20000) ≈ 632.5
        let mid = r.denormalize(0.5);
        let expected = libm::sqrtf(20.0 * 20000.0);
        assert!((mid - expected).abs() < 1.0, "expected ~{expected}, got {mid}");

        for &val in &[20.0, 100.0, 1000.0, 5000.0, 20000.0] {
            let rt = r.denormalize(r.normalize(val));
            assert!((rt - val).abs() / val < 1e-4, "round-trip failed for {val}: {rt}");
        }
    }

    #[test]
    fn zero_span_normalizes_to_zero() {
        let r = ParamRange::linear(42.0, 42.0);
        assert_eq!(r.normalize(42.0), 0.0);
    }

    #[test]
    fn clamp_bounds() {
        let r = ParamRange::linear(0.1, 20.0);
        assert_eq!(r.clamp(0.0), 0.1);
        assert_eq!(r.clamp(25.0), 20.0);
        assert_eq!(r.clamp(5.0), 5.0);
    }

    #[test]
    fn symbol_attr_accepts_only_listed() {
        let spec = AttrSpec::symbol("mode", "lowpass", &["lowpass", "highpass"]);
        assert!(spec.accepts_symbol("lowpass"));
        assert!(spec.accepts_symbol("highpass"));
        assert!(!spec.accepts_symbol("bandpass"));
    }
}
