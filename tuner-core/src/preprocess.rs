//! # Frame Preprocessing Module
//!
//! Conditions raw 16-bit frames before pitch analysis: a biquad band-pass
//! that keeps the guitar range, RMS levelling, and a Hann window. Every
//! stage returns a new frame and saturates to the `i16` range with
//! round-to-nearest. A one-pole low-pass and an in-place gain are exposed
//! as standalone primitives for capture front-ends.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Parameters for [`preprocess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Lower band-pass cutoff in Hz.
    pub low_hz: f32,
    /// Upper band-pass cutoff in Hz.
    pub high_hz: f32,
    /// RMS a levelled frame is scaled to.
    pub target_rms: f32,
    /// Frames quieter than this are not boosted.
    pub min_rms: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            low_hz: 60.0,
            high_hz: 1200.0,
            target_rms: 1200.0,
            min_rms: 200.0,
        }
    }
}

/// Rounds to the nearest integer and clips to the `i16` range.
#[inline]
pub fn saturate(value: f64) -> i16 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Root-mean-square level of a frame, `0.0` for an empty one.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Second-order IIR section run in direct form II transposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Band-pass between `low_hz` and `high_hz`.
    ///
    /// Coefficients come from the bilinear transform with both edges
    /// pre-warped (`tan(πf/fs)`), centred on their geometric mean.
    pub fn band_pass(low_hz: f32, high_hz: f32, sample_rate: u32) -> Self {
        let fs = sample_rate as f64;
        let tan_low = (PI * low_hz as f64 / fs).tan();
        let tan_high = (PI * high_hz as f64 / fs).tan();

        let bw = tan_high - tan_low;
        let w0_sq = tan_low * tan_high;
        let norm = 1.0 / (1.0 + bw + w0_sq);

        Self {
            b0: bw * norm,
            b1: 0.0,
            b2: -bw * norm,
            a1: 2.0 * (w0_sq - 1.0) * norm,
            a2: (1.0 - bw + w0_sq) * norm,
        }
    }

    /// Filters a whole frame from a zero state, returning a new frame.
    pub fn apply(&self, input: &[i16]) -> Vec<i16> {
        let (mut z1, mut z2) = (0.0_f64, 0.0_f64);
        input
            .iter()
            .map(|&s| {
                let x = s as f64;
                let y = self.b0 * x + z1;
                z1 = self.b1 * x - self.a1 * y + z2;
                z2 = self.b2 * x - self.a2 * y;
                saturate(y)
            })
            .collect()
    }
}

/// Band-pass filters a frame. An empty frame comes back unchanged.
pub fn band_pass(input: &[i16], sample_rate: u32, low_hz: f32, high_hz: f32) -> Vec<i16> {
    if input.is_empty() {
        return Vec::new();
    }
    Biquad::band_pass(low_hz, high_hz, sample_rate).apply(input)
}

/// Scales a frame so its RMS becomes `target_rms`.
///
/// Frames below `min_rms` are returned as an unscaled copy so near-silence
/// is never amplified into noise.
pub fn normalize_rms(input: &[i16], target_rms: f32, min_rms: f32) -> Vec<i16> {
    let level = rms(input);
    if level < min_rms || level <= 0.0 {
        return input.to_vec();
    }
    let gain = target_rms as f64 / level as f64;
    input.iter().map(|&s| saturate(s as f64 * gain)).collect()
}

/// One-pole low-pass, `alpha = dt / (rc + dt)` with `rc = 1 / (2π·cutoff)`.
///
/// A non-positive cutoff or sample rate returns an unfiltered copy.
pub fn low_pass(input: &[i16], cutoff_hz: f32, sample_rate: u32) -> Vec<i16> {
    if !(cutoff_hz > 0.0) || sample_rate == 0 {
        return input.to_vec();
    }
    let rc = 1.0 / (2.0 * PI * cutoff_hz as f64);
    let dt = 1.0 / sample_rate as f64;
    let alpha = dt / (rc + dt);

    let mut prev = 0.0_f64;
    input
        .iter()
        .map(|&s| {
            prev += alpha * (s as f64 - prev);
            saturate(prev)
        })
        .collect()
}

/// Multiplies a caller-owned buffer by `factor`, saturating in place.
pub fn amplify_in_place(samples: &mut [i16], factor: f32) {
    for sample in samples.iter_mut() {
        *sample = saturate(*sample as f64 * factor as f64);
    }
}

/// Applies a Hann window, `0.5·(1 − cos(2πi/(N−1)))`, returning a new frame.
///
/// Frames shorter than two samples have no defined window and are copied.
pub fn hann_window(samples: &[i16]) -> Vec<i16> {
    let n = samples.len();
    if n < 2 {
        return samples.to_vec();
    }
    let n_minus_1 = (n - 1) as f64;
    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let multiplier = 0.5 * (1.0 - (2.0 * PI * i as f64 / n_minus_1).cos());
            saturate(s as f64 * multiplier)
        })
        .collect()
}

/// Full conditioning chain: band-pass, RMS levelling, then Hann window.
pub fn preprocess(frame: &[i16], sample_rate: u32, config: &PreprocessConfig) -> Vec<i16> {
    let banded = band_pass(frame, sample_rate, config.low_hz, config.high_hz);
    let levelled = normalize_rms(&banded, config.target_rms, config.min_rms);
    hann_window(&levelled)
}
