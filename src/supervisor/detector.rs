//! Residual detector: deviation between expected and sensed plant state.

use crate::error::ConfigError;

/// One cycle's residual evaluation. Not retained beyond the cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualSample {
    pub expected: f64,
    pub measured: f64,
    /// Always >= 0.
    pub residual: f64,
    pub threshold: f64,
    pub is_attack: bool,
}

/// Threshold-based anomaly detector.
///
/// The threshold is checked once here; `evaluate` itself cannot fail.
#[derive(Debug, Clone, Copy)]
pub struct ResidualDetector {
    threshold: f64,
}

impl ResidualDetector {
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        if !(threshold > 0.0) || !threshold.is_finite() {
            return Err(ConfigError::NonPositiveThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `residual = |expected - measured|`, flagged when strictly above threshold.
    #[inline]
    pub fn evaluate(&self, expected: f64, measured: f64) -> ResidualSample {
        let residual = (expected - measured).abs();
        ResidualSample {
            expected,
            measured,
            residual,
            threshold: self.threshold,
            is_attack: residual > self.threshold,
        }
    }
}
