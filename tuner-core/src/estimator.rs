//! Common shape of the fundamental-frequency estimators.

/// Result of one estimator run over a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F0Estimate {
    /// Fundamental in Hz; `<= 0` means no estimate.
    pub frequency: f32,
    /// Raw score of the winning hypothesis.
    pub score: f64,
    /// Margin over the runner-up, always within `[0, 1]`.
    pub confidence: f64,
    /// Spectral peak the hypothesis was derived from (0 when not peak based).
    pub from_peak_hz: f32,
    /// Sub-harmonic divisor applied to that peak.
    pub divisor: u32,
}

impl F0Estimate {
    /// The "no estimate" value.
    pub fn none() -> Self {
        Self {
            frequency: 0.0,
            score: 0.0,
            confidence: 0.0,
            from_peak_hz: 0.0,
            divisor: 0,
        }
    }

    /// Wraps a bare frequency with the given confidence.
    pub fn from_frequency(frequency: f32, confidence: f64) -> Self {
        Self {
            frequency,
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            ..Self::none()
        }
    }

    pub fn is_some(&self) -> bool {
        self.frequency > 0.0 && self.frequency.is_finite()
    }

    /// The frequency, if this is a real estimate.
    pub fn frequency(&self) -> Option<f32> {
        self.is_some().then_some(self.frequency)
    }
}

impl Default for F0Estimate {
    fn default() -> Self {
        Self::none()
    }
}

/// A strategy that turns a frame into an [`F0Estimate`].
///
/// `hint` is the last stable frequency the caller tracked, if any.
/// Implementations may keep scratch buffers between calls but must not carry
/// pitch memory of their own.
pub trait FrequencyEstimator {
    fn estimate(&mut self, frame: &[i16], sample_rate: u32, hint: Option<f32>) -> F0Estimate;
}

/// Normalized margin `(best - runner_up) / (best + ε)`, clamped to `[0, 1]`.
pub fn margin_confidence(best: f64, runner_up: f64) -> f64 {
    if !(best > 0.0) {
        return 0.0;
    }
    ((best - runner_up) / (best + 1e-9)).clamp(0.0, 1.0)
}
