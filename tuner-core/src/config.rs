//! # Configuration
//!
//! All tunables of the pipeline in one serde document. Every section and
//! field has a default, so a JSON file only needs the values it changes:
//!
//! ```json
//! { "engine": { "rms_threshold": 450 }, "autocorrelation": { "rescue_ratio": 1.05 } }
//! ```

use crate::engine::EngineConfig;
use crate::error::TunerError;
use crate::harmonic_peaks::HarmonicPeakConfig;
use crate::pitch::AutocorrelationConfig;
use crate::preprocess::PreprocessConfig;
use crate::smoothing::SmoothingConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub preprocess: PreprocessConfig,
    pub autocorrelation: AutocorrelationConfig,
    pub harmonic_peaks: HarmonicPeakConfig,
    pub smoothing: SmoothingConfig,
    pub engine: EngineConfig,
}

impl TunerConfig {
    /// Parses a (possibly partial) JSON document and validates the result.
    pub fn from_json(json: &str) -> Result<Self, TunerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TunerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TunerError> {
        serde_json::to_string_pretty(self).map_err(|e| TunerError::InvalidConfig(e.to_string()))
    }

    /// Rejects values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), TunerError> {
        let p = &self.preprocess;
        band("preprocess", p.low_hz, p.high_hz)?;
        positive("preprocess.target_rms", p.target_rms)?;

        let a = &self.autocorrelation;
        band("autocorrelation", a.min_hz, a.max_hz)?;
        band("autocorrelation hint", a.hint_min_hz, a.hint_max_hz)?;
        band("autocorrelation valid", a.valid_min_hz, a.valid_max_hz)?;
        positive("autocorrelation.collapse_divisor", a.collapse_divisor)?;
        if a.min_frame_len < 4 {
            return Err(invalid("autocorrelation.min_frame_len must be at least 4"));
        }

        let h = &self.harmonic_peaks;
        band("harmonic_peaks", h.min_hz, h.max_hz)?;
        if h.bins < 3 || h.top_n == 0 || h.max_divisor == 0 || h.harmonics == 0 {
            return Err(invalid(
                "harmonic_peaks needs bins >= 3 and non-zero top_n, max_divisor, harmonics",
            ));
        }

        let s = &self.smoothing;
        if s.median_capacity == 0 {
            return Err(invalid("smoothing.median_capacity must be non-zero"));
        }
        if s.stick_out_cents < s.stick_in_cents {
            return Err(invalid("smoothing.stick_out_cents must not be below stick_in_cents"));
        }
        positive("smoothing.collapse_divisor", s.collapse_divisor)?;

        let e = &self.engine;
        band("engine peak", e.peak_min_hz, e.peak_max_hz)?;
        band("engine valid", e.valid_min_hz, e.valid_max_hz)?;
        if e.invalid_hide_frames == 0 {
            return Err(invalid("engine.invalid_hide_frames must be non-zero"));
        }
        if !(0.0..=1.0).contains(&e.peak_min_confidence) {
            return Err(invalid("engine.peak_min_confidence must lie in [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> TunerError {
    TunerError::InvalidConfig(reason.to_string())
}

fn positive(name: &str, value: f32) -> Result<(), TunerError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TunerError::InvalidConfig(format!("{name} must be positive, got {value}")))
    }
}

fn band(name: &str, low: f32, high: f32) -> Result<(), TunerError> {
    positive(name, low)?;
    positive(name, high)?;
    if low < high {
        Ok(())
    } else {
        Err(TunerError::InvalidConfig(format!(
            "{name} band is empty: {low} Hz .. {high} Hz"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TunerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = TunerConfig::from_json(
            r#"{ "engine": { "rms_threshold": 450 }, "autocorrelation": { "rescue_ratio": 1.05 } }"#,
        )
        .unwrap();
        assert_eq!(config.engine.rms_threshold, 450.0);
        assert_eq!(config.engine.invalid_hide_frames, 2);
        assert_eq!(config.autocorrelation.rescue_ratio, 1.05);
        assert_eq!(config.harmonic_peaks, HarmonicPeakConfig::default());
        assert_eq!(TunerConfig::from_json("{}").unwrap(), TunerConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let mut config = TunerConfig::default();
        config.smoothing.median_capacity = 7;
        let json = config.to_json().unwrap();
        assert_eq!(TunerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn bad_values_are_rejected() {
        let bad = [
            r#"{ "preprocess": { "low_hz": 1300 } }"#,
            r#"{ "harmonic_peaks": { "bins": 2 } }"#,
            r#"{ "smoothing": { "median_capacity": 0 } }"#,
            r#"{ "smoothing": { "stick_in_cents": 6 } }"#,
            r#"{ "engine": { "peak_min_confidence": 1.5 } }"#,
            r#"{ "engine": { "invalid_hide_frames": 0 } }"#,
            r#"{ "engine": "loud" }"#,
            "not json",
        ];
        for doc in bad {
            assert!(
                matches!(TunerConfig::from_json(doc), Err(TunerError::InvalidConfig(_))),
                "accepted {doc}"
            );
        }
    }
}
