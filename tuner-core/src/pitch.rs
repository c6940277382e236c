//! # Pitch Detection Module
//!
//! Autocorrelation pitch detector tuned for plucked strings. It searches a
//! band-limited lag window, picks the first convincing period, and then runs
//! a chain of octave guards before refining the lag to sub-sample precision.
//!
//! ## Features
//! - Lag window narrowed around the last stable pitch, wider upwards on trebles
//! - Lag scoring that penalises periods whose multiples or halves are stronger
//! - Octave-up, triple-lag and treble-collapse guards (never octave-down)
//! - Parabolic interpolation on the raw autocorrelation
//! - Goertzel harmonic check that can promote the result to `2f`

use crate::estimator::{F0Estimate, FrequencyEstimator};
use crate::fft::Autocorrelator;
use crate::goertzel::harmonic_sum;
use log::trace;
use serde::{Deserialize, Serialize};

/// Tunables of the autocorrelation detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutocorrelationConfig {
    /// Shorter frames produce no estimate.
    pub min_frame_len: usize,
    /// Lowest frequency of the global search window.
    pub min_hz: f32,
    /// Highest frequency of the global search window.
    pub max_hz: f32,
    /// Hints at or above this use the asymmetric treble window.
    pub treble_hint_hz: f32,
    /// Semitones searched (below, above) a treble hint.
    pub treble_window_semitones: (f32, f32),
    /// Semitones searched (below, above) any other hint.
    pub bass_window_semitones: (f32, f32),
    /// Frequency limits of a hint-narrowed window.
    pub hint_min_hz: f32,
    pub hint_max_hz: f32,
    /// A narrowed window must span at least this many lags to be used.
    pub min_window_lags: usize,
    /// Absolute normalized-autocorrelation threshold for a candidate peak.
    pub abs_threshold: f64,
    /// Threshold relative to the strongest normalized value in the window.
    pub rel_threshold: f64,
    /// Minimum lag score for the first-strong-peak pass.
    pub min_lag_score: f64,
    /// Penalty weight for stronger energy at 2× or 3× the lag.
    pub multiple_penalty: f64,
    /// Penalty weight for energy at half the lag.
    pub half_penalty: f64,
    /// Per-lag bias towards shorter periods.
    pub short_lag_bias: f64,
    /// Switch to the half lag when it holds this share of the chosen value.
    pub octave_up_ratio: f64,
    /// Lags below this are checked against 3× the lag.
    pub triple_lag_max: usize,
    pub triple_ratio: f64,
    /// Candidate below `hint / collapse_divisor` counts as a treble collapse.
    pub collapse_divisor: f32,
    pub collapse_half_ratio: f64,
    /// Accepted result range before disambiguation.
    pub valid_min_hz: f32,
    pub valid_max_hz: f32,
    /// Harmonics summed by the `f` versus `2f` check.
    pub disambiguation_harmonics: usize,
    /// `2f` wins when its harmonic sum exceeds the fundamental's by this factor.
    pub double_ratio: f64,
    /// Doubling never goes above this frequency.
    pub double_max_hz: f32,
    /// Without a hint, results below this get a second chance to double.
    pub rescue_below_hz: f32,
    /// Factor the rescue check requires of the doubled harmonic sum.
    pub rescue_ratio: f64,
}

impl Default for AutocorrelationConfig {
    fn default() -> Self {
        Self {
            min_frame_len: 256,
            min_hz: 60.0,
            max_hz: 1000.0,
            treble_hint_hz: 250.0,
            treble_window_semitones: (2.0, 5.0),
            bass_window_semitones: (4.0, 4.0),
            hint_min_hz: 40.0,
            hint_max_hz: 2000.0,
            min_window_lags: 6,
            abs_threshold: 0.30,
            rel_threshold: 0.60,
            min_lag_score: 0.02,
            multiple_penalty: 0.90,
            half_penalty: 0.60,
            short_lag_bias: 0.002,
            octave_up_ratio: 0.92,
            triple_lag_max: 140,
            triple_ratio: 0.98,
            collapse_divisor: 1.8,
            collapse_half_ratio: 0.90,
            valid_min_hz: 20.0,
            valid_max_hz: 1000.0,
            disambiguation_harmonics: 4,
            double_ratio: 1.04,
            double_max_hz: 1200.0,
            rescue_below_hz: 220.0,
            rescue_ratio: 1.02,
        }
    }
}

/// Inclusive lag range searched for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagWindow {
    pub min: usize,
    pub max: usize,
}

/// A detected pitch together with the normalized autocorrelation at its lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcfPitch {
    pub frequency: f32,
    pub clarity: f64,
}

/// Autocorrelation-based [`FrequencyEstimator`].
pub struct AutocorrelationEstimator {
    config: AutocorrelationConfig,
    autocorrelator: Autocorrelator,
}

impl AutocorrelationEstimator {
    pub fn new(config: AutocorrelationConfig) -> Self {
        Self {
            config,
            autocorrelator: Autocorrelator::new(),
        }
    }

    pub fn config(&self) -> &AutocorrelationConfig {
        &self.config
    }

    /// Detects the pitch of a (preprocessed) frame.
    ///
    /// # Arguments
    /// * `frame` - Conditioned 16-bit samples
    /// * `sample_rate` - Sample rate in Hz
    /// * `hint` - Last stable frequency, narrows the search window
    ///
    /// # Returns
    /// * `Some(frequency)` - Detected frequency in Hz
    /// * `None` - Frame too short, silent, or no usable period
    pub fn detect(&mut self, frame: &[i16], sample_rate: u32, hint: Option<f32>) -> Option<f32> {
        self.analyze(frame, sample_rate, hint).map(|pitch| pitch.frequency)
    }

    /// Like [`detect`](Self::detect), also returning the clarity of the chosen lag.
    pub fn analyze(&mut self, frame: &[i16], sample_rate: u32, hint: Option<f32>) -> Option<AcfPitch> {
        let cfg = &self.config;
        let hint = hint.filter(|h| h.is_finite() && *h > 0.0);
        let window = lag_window(cfg, frame.len(), sample_rate, hint)?;

        // --- Unnormalized and normalized autocorrelation ---
        let r = self.autocorrelator.compute(frame, window.max);
        let max_corr = r[window.min..=window.max]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if !(max_corr > 0.0) {
            return None;
        }
        let r0 = r[0].max(1e-9);
        let rn: Vec<f64> = r.iter().map(|&c| c / r0).collect();

        // --- Peak selection ---
        let best = select_lag(&rn, window, cfg)?;

        // --- Guards ---
        let mut tau = octave_up_guard(&rn, best, window.min, cfg.octave_up_ratio);
        tau = triple_lag_guard(&rn, tau, window.max, cfg);
        if let Some(h) = hint {
            tau = treble_collapse_guard(&rn, tau, window.min, sample_rate, h, cfg);
        }

        // --- Parabolic interpolation ---
        let l0 = tau.saturating_sub(1).max(window.min);
        let l2 = (tau + 1).min(window.max);
        let delta = parabolic_offset(r[l0], r[tau], r[l2]);
        let tau_interp = (tau as f64 + delta).clamp(window.min as f64, window.max as f64);
        let mut f = (sample_rate as f64 / tau_interp) as f32;
        trace!(
            "[ACF] lags {}..{} pick {} -> tau {} ({:.3}) f {:.1} Hz",
            window.min, window.max, best, tau, tau_interp, f
        );

        if !f.is_finite() || f < cfg.valid_min_hz || f > cfg.valid_max_hz {
            return None;
        }

        // --- Harmonic disambiguation ---
        let harmonics = cfg.disambiguation_harmonics;
        let s_fund = harmonic_sum(frame, sample_rate, f as f64, harmonics);
        let s_double = harmonic_sum(frame, sample_rate, 2.0 * f as f64, harmonics);
        if s_double > s_fund * cfg.double_ratio && 2.0 * f <= cfg.double_max_hz {
            f *= 2.0;
            trace!("[ACF] doubled to {:.1} Hz", f);
        }
        if hint.is_none() && f < cfg.rescue_below_hz {
            let s_back = harmonic_sum(frame, sample_rate, 2.0 * f as f64, harmonics);
            if s_back >= s_fund * cfg.rescue_ratio {
                f *= 2.0;
                trace!("[ACF] rescue doubled to {:.1} Hz", f);
            }
        }

        Some(AcfPitch {
            frequency: f,
            clarity: rn[tau].clamp(0.0, 1.0),
        })
    }
}

impl Default for AutocorrelationEstimator {
    fn default() -> Self {
        Self::new(AutocorrelationConfig::default())
    }
}

impl FrequencyEstimator for AutocorrelationEstimator {
    fn estimate(&mut self, frame: &[i16], sample_rate: u32, hint: Option<f32>) -> F0Estimate {
        match self.analyze(frame, sample_rate, hint) {
            Some(pitch) => F0Estimate::from_frequency(pitch.frequency, pitch.clarity),
            None => F0Estimate::none(),
        }
    }
}

/// Computes the lag search window for a frame.
///
/// The global window covers `min_hz..max_hz`. A hint narrows it to a few
/// semitones around the hint, unless that leaves fewer than
/// `min_window_lags` lags.
pub fn lag_window(
    cfg: &AutocorrelationConfig,
    frame_len: usize,
    sample_rate: u32,
    hint: Option<f32>,
) -> Option<LagWindow> {
    if frame_len < cfg.min_frame_len || sample_rate == 0 {
        return None;
    }
    let sr = sample_rate as f32;
    let mut min_lag = ((sr / cfg.max_hz) as usize).max(2);
    let mut max_lag = ((sr / cfg.min_hz) as usize).min((frame_len / 2).saturating_sub(2));

    if let Some(h) = hint.filter(|h| *h > 0.0) {
        let (down, up) = if h >= cfg.treble_hint_hz {
            cfg.treble_window_semitones
        } else {
            cfg.bass_window_semitones
        };
        let f_min = (h / 2f32.powf(down / 12.0)).max(cfg.hint_min_hz);
        let f_max = (h * 2f32.powf(up / 12.0)).min(cfg.hint_max_hz);
        let b_min = ((sr / f_max) as usize).max(min_lag);
        let b_max = ((sr / f_min) as usize).min(max_lag);
        if b_max >= b_min + cfg.min_window_lags {
            min_lag = b_min;
            max_lag = b_max;
        }
    }

    // Local maxima need a neighbour on each side.
    (max_lag >= min_lag + 2).then_some(LagWindow {
        min: min_lag,
        max: max_lag,
    })
}

fn score_lag(rn: &[f64], lag: usize, window: LagWindow, cfg: &AutocorrelationConfig) -> f64 {
    let at = |l: usize| rn.get(l).copied().unwrap_or(0.0);
    let h2 = if lag * 2 <= window.max { at(lag * 2) } else { 0.0 };
    let h3 = if lag * 3 <= window.max { at(lag * 3) } else { 0.0 };
    let h05 = if lag / 2 >= window.min { at(lag / 2) } else { 0.0 };
    let penalty = cfg.multiple_penalty * h2.max(h3) + cfg.half_penalty * h05;
    rn[lag] - penalty + cfg.short_lag_bias * (window.max - lag) as f64
}

fn is_local_max(rn: &[f64], lag: usize) -> bool {
    rn[lag] >= rn[lag - 1] && rn[lag] >= rn[lag + 1]
}

/// Picks the period lag from a normalized autocorrelation.
///
/// The first local maximum that clears both thresholds and scores at least
/// `min_lag_score` wins. Otherwise the best-scoring local maximum, and
/// failing that the global maximum of the window.
pub fn select_lag(rn: &[f64], window: LagWindow, cfg: &AutocorrelationConfig) -> Option<usize> {
    if window.max >= rn.len() || window.max < window.min + 2 {
        return None;
    }
    let max_rn = rn[window.min..=window.max]
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    let rel_threshold = cfg.rel_threshold * max_rn;
    let inner = (window.min + 1)..window.max;

    let first_strong = inner.clone().find(|&lag| {
        is_local_max(rn, lag)
            && rn[lag] >= cfg.abs_threshold
            && rn[lag] >= rel_threshold
            && score_lag(rn, lag, window, cfg) >= cfg.min_lag_score
    });
    if first_strong.is_some() {
        return first_strong;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in inner.filter(|&lag| is_local_max(rn, lag)) {
        let score = score_lag(rn, lag, window, cfg);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((lag, score));
        }
    }
    if let Some((lag, _)) = best {
        return Some(lag);
    }

    let mut global: Option<(usize, f64)> = None;
    for lag in window.min..=window.max {
        if global.is_none_or(|(_, v)| rn[lag] > v) {
            global = Some((lag, rn[lag]));
        }
    }
    global.map(|(lag, _)| lag)
}

/// Moves to the half lag (one octave up) when it is nearly as strong.
///
/// Only ever shortens the period, so it cannot cause an octave-down error.
pub(crate) fn octave_up_guard(rn: &[f64], lag: usize, min_lag: usize, ratio: f64) -> usize {
    let half = lag / 2;
    if half >= min_lag && rn[half] >= rn[lag] * ratio {
        half
    } else {
        lag
    }
}

/// Moves to 3× the lag when a short period looks like a third-harmonic lock.
fn triple_lag_guard(rn: &[f64], lag: usize, max_lag: usize, cfg: &AutocorrelationConfig) -> usize {
    let three = lag * 3;
    if three <= max_lag && lag < cfg.triple_lag_max && rn[three] >= rn[lag] * cfg.triple_ratio {
        three
    } else {
        lag
    }
}

/// Undoes a collapse well below a treble hint by taking the half lag.
fn treble_collapse_guard(
    rn: &[f64],
    lag: usize,
    min_lag: usize,
    sample_rate: u32,
    hint: f32,
    cfg: &AutocorrelationConfig,
) -> usize {
    if hint < cfg.treble_hint_hz {
        return lag;
    }
    let f_now = sample_rate as f32 / lag as f32;
    let half = lag / 2;
    if f_now < hint / cfg.collapse_divisor
        && half >= min_lag
        && rn[half] >= rn[lag] * cfg.collapse_half_ratio
    {
        half
    } else {
        lag
    }
}

/// Vertex offset of the parabola through three equally spaced samples.
pub fn parabolic_offset(c0: f64, c1: f64, c2: f64) -> f64 {
    let denom = c0 - 2.0 * c1 + c2;
    if denom.abs() < 1e-9 {
        0.0
    } else {
        0.5 * (c0 - c2) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{PreprocessConfig, preprocess};
    use std::f64::consts::PI;

    fn tone(partials: &[(f64, f64)], len: usize, sample_rate: u32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                partials
                    .iter()
                    .map(|&(f, a)| a * (2.0 * PI * f * t).sin())
                    .sum::<f64>()
                    .round() as i16
            })
            .collect()
    }

    #[test]
    fn detects_a_pure_110_hz_sine() {
        let frame = tone(&[(110.0, 8000.0)], 2048, 44100);
        let mut acf = AutocorrelationEstimator::default();
        let f = acf.detect(&frame, 44100, None).expect("pitch");
        assert!((f - 110.0).abs() < 1.0, "got {f}");
    }

    #[test]
    fn octave_up_guard_selects_220_over_110_subharmonic() {
        // Raw, the 110 Hz component skews the interpolation sharp; the
        // conditioned frame is what the engine actually analyses.
        let raw = tone(&[(220.0, 8000.0), (110.0, 4000.0)], 2048, 44100);
        let frame = preprocess(&raw, 44100, &PreprocessConfig::default());
        let mut acf = AutocorrelationEstimator::default();
        let f = acf.detect(&frame, 44100, None).expect("pitch");
        assert!((f - 220.0).abs() < 1.0, "got {f}");
    }

    #[test]
    fn triple_lag_guard_needs_a_short_lag_and_a_strong_triple() {
        let cfg = AutocorrelationConfig::default();
        let mut rn = vec![0.0; 736];
        rn[100] = 0.80;
        rn[300] = 0.79;
        assert_eq!(triple_lag_guard(&rn, 100, 735, &cfg), 300);
        // Triple outside the window.
        assert_eq!(triple_lag_guard(&rn, 100, 299, &cfg), 100);
        // Below 0.98 of the current value.
        rn[300] = 0.78;
        assert_eq!(triple_lag_guard(&rn, 100, 735, &cfg), 100);
        // Long lags are never tripled.
        rn[150] = 0.80;
        rn[450] = 0.80;
        assert_eq!(triple_lag_guard(&rn, 150, 735, &cfg), 150);
    }

    #[test]
    fn treble_collapse_guard_needs_a_treble_hint_and_a_deep_drop() {
        let cfg = AutocorrelationConfig::default();
        let mut rn = vec![0.0; 736];
        // Lag 400 is ~110 Hz, well below 330 / 1.8.
        rn[400] = 0.80;
        rn[200] = 0.75;
        assert_eq!(treble_collapse_guard(&rn, 400, 44, 44100, 330.0, &cfg), 200);
        // A bass hint leaves the lag alone.
        assert_eq!(treble_collapse_guard(&rn, 400, 44, 44100, 200.0, &cfg), 400);
        // ~220 Hz is not a collapse from 330 Hz.
        rn[100] = 0.80;
        assert_eq!(treble_collapse_guard(&rn, 200, 44, 44100, 330.0, &cfg), 200);
        // Half lag too weak.
        rn[200] = 0.70;
        assert_eq!(treble_collapse_guard(&rn, 400, 44, 44100, 330.0, &cfg), 400);
        // Half lag outside the window.
        rn[200] = 0.75;
        assert_eq!(treble_collapse_guard(&rn, 400, 201, 44100, 330.0, &cfg), 400);
    }

    /// 110 Hz with a 2nd harmonic: 2f scores ~0.37 of f.
    fn strong_second_harmonic() -> Vec<i16> {
        tone(&[(110.0, 8000.0), (220.0, 6000.0)], 2048, 44100)
    }

    #[test]
    fn doubling_follows_the_configured_ratios() {
        let frame = strong_second_harmonic();
        let f = AutocorrelationEstimator::default().detect(&frame, 44100, None).unwrap();
        assert!((f - 110.0).abs() < 1.0, "got {f}");

        let lenient = AutocorrelationConfig {
            double_ratio: 0.3,
            ..AutocorrelationConfig::default()
        };
        let f = AutocorrelationEstimator::new(lenient).detect(&frame, 44100, None).unwrap();
        assert!((f - 220.0).abs() < 2.0, "got {f}");
    }

    #[test]
    fn rescue_only_applies_without_a_hint() {
        let frame = strong_second_harmonic();
        let rescue = |ratio: f64, hint: Option<f32>| {
            let cfg = AutocorrelationConfig {
                rescue_ratio: ratio,
                ..AutocorrelationConfig::default()
            };
            AutocorrelationEstimator::new(cfg).detect(&frame, 44100, hint).unwrap()
        };
        assert!((rescue(0.3, None) - 220.0).abs() < 2.0);
        assert!((rescue(0.5, None) - 110.0).abs() < 1.0);
        assert!((rescue(0.3, Some(110.0)) - 110.0).abs() < 1.0);
    }

    #[test]
    fn octave_up_guard_only_halves_the_lag() {
        let mut rn = vec![0.0; 500];
        rn[400] = 0.80;
        rn[200] = 0.75;
        assert_eq!(octave_up_guard(&rn, 400, 40, 0.92), 200);
        rn[200] = 0.70;
        assert_eq!(octave_up_guard(&rn, 400, 40, 0.92), 400);
        // Half lag outside the window is never taken.
        rn[200] = 0.95;
        assert_eq!(octave_up_guard(&rn, 400, 201, 0.92), 400);
    }

    #[test]
    fn window_narrows_around_hint() {
        let cfg = AutocorrelationConfig::default();
        let global = lag_window(&cfg, 2048, 44100, None).unwrap();
        assert_eq!(global, LagWindow { min: 44, max: 735 });

        let bass = lag_window(&cfg, 2048, 44100, Some(110.0)).unwrap();
        assert!(bass.min > global.min && bass.max < global.max);
        assert!(44100.0 / (bass.min as f32) > 110.0 * 1.25);
        assert!(44100.0 / (bass.max as f32) < 110.0 / 1.25);

        // Treble hints allow five semitones up but only two down.
        let treble = lag_window(&cfg, 2048, 44100, Some(330.0)).unwrap();
        let up = 44100.0 / (treble.min as f32) / 330.0;
        let down = 330.0 / (44100.0 / (treble.max as f32));
        assert!(up > down);

        assert_eq!(lag_window(&cfg, 255, 44100, None), None);
    }

    #[test]
    fn narrow_window_is_rejected_when_too_small() {
        let cfg = AutocorrelationConfig::default();
        // Near the top of the range only a handful of lags remain.
        let window = lag_window(&cfg, 2048, 8000, Some(1900.0)).unwrap();
        assert_eq!(window, lag_window(&cfg, 2048, 8000, None).unwrap());
    }

    #[test]
    fn lag_selection_falls_back_to_best_score() {
        let cfg = AutocorrelationConfig::default();
        let window = LagWindow { min: 10, max: 60 };
        let mut rn = vec![0.0; 61];
        // A weak local maximum: below the absolute threshold.
        rn[30] = 0.2;
        assert_eq!(select_lag(&rn, window, &cfg), Some(30));
        // A strong one earlier wins the first pass.
        rn[20] = 0.5;
        assert_eq!(select_lag(&rn, window, &cfg), Some(20));
    }

    #[test]
    fn silence_and_short_frames_have_no_pitch() {
        let mut acf = AutocorrelationEstimator::default();
        assert_eq!(acf.detect(&vec![0; 2048], 44100, None), None);
        assert_eq!(acf.detect(&vec![1000; 128], 44100, None), None);
        let est = acf.estimate(&vec![0; 2048], 44100, Some(110.0));
        assert!(!est.is_some());
    }

    #[test]
    fn parabola_vertex() {
        assert_eq!(parabolic_offset(1.0, 2.0, 1.0), 0.0);
        assert!((parabolic_offset(1.0, 2.0, 1.5) - 0.1666).abs() < 1e-3);
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
    }
}
