//! # Harmonic Peak Estimator
//!
//! Estimates the fundamental from the strongest spectral peaks of a frame.
//! A Goertzel sweep finds candidate peaks, every peak proposes sub-harmonic
//! hypotheses `peak / k`, and a 1/h-weighted harmonic comb decides between
//! them. Confidence is the margin of the winner over the best distinct
//! runner-up, so a clear harmonic series scores high even when its partials
//! propose the same fundamental many times.

use crate::estimator::{F0Estimate, FrequencyEstimator, margin_confidence};
use crate::goertzel::{comb_score, goertzel_power};
use log::trace;
use serde::{Deserialize, Serialize};

/// Tunables of the harmonic peak estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicPeakConfig {
    /// Lower edge of the sweep and of accepted hypotheses.
    pub min_hz: f32,
    /// Upper edge of the sweep and of accepted hypotheses.
    pub max_hz: f32,
    /// Number of linearly spaced sweep frequencies.
    pub bins: usize,
    /// Peaks kept after non-maximum suppression.
    pub top_n: usize,
    /// Half-width of the suppression neighbourhood in Hz.
    pub nms_hz: f32,
    /// Largest sub-harmonic divisor tried per peak.
    pub max_divisor: u32,
    /// Harmonics summed by the comb.
    pub harmonics: usize,
    /// Shorter frames produce no estimate.
    pub min_frame_len: usize,
    /// Peaks below this fraction of the strongest one are ignored.
    pub peak_floor_ratio: f64,
    /// Hypotheses closer than this (in cents) are the same fundamental.
    pub duplicate_cents: f32,
}

impl Default for HarmonicPeakConfig {
    fn default() -> Self {
        Self {
            min_hz: 60.0,
            max_hz: 1200.0,
            bins: 640,
            top_n: 5,
            nms_hz: 18.0,
            max_divisor: 5,
            harmonics: 6,
            min_frame_len: 256,
            peak_floor_ratio: 0.1,
            duplicate_cents: 50.0,
        }
    }
}

/// A peak of the Goertzel sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Interpolated peak frequency in Hz.
    pub frequency: f32,
    /// Sweep power at the grid point the peak was found on.
    pub power: f64,
}

#[derive(Debug, Clone, Copy)]
struct Hypothesis {
    f0: f64,
    score: f64,
    from_peak_hz: f64,
    divisor: u32,
}

/// Goertzel-sweep [`FrequencyEstimator`].
#[derive(Debug, Clone, Default)]
pub struct HarmonicPeakEstimator {
    config: HarmonicPeakConfig,
}

impl HarmonicPeakEstimator {
    pub fn new(config: HarmonicPeakConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarmonicPeakConfig {
        &self.config
    }

    /// Finds up to `top_n` well separated spectral peaks, sorted by frequency.
    pub fn peaks(&self, frame: &[i16], sample_rate: u32) -> Vec<SpectralPeak> {
        let cfg = &self.config;
        if frame.len() < cfg.min_frame_len || cfg.bins < 3 || sample_rate == 0 {
            return Vec::new();
        }
        let lo = (cfg.min_hz as f64).max(1.0);
        let hi = (cfg.max_hz as f64).min(sample_rate as f64 / 2.0 - 1.0);
        if hi <= lo {
            return Vec::new();
        }
        let step = (hi - lo) / (cfg.bins - 1) as f64;
        let grid: Vec<f64> = (0..cfg.bins).map(|i| lo + step * i as f64).collect();
        let power: Vec<f64> = grid
            .iter()
            .map(|&f| goertzel_power(frame, sample_rate, f))
            .collect();

        // Candidates are local maxima of the sweep, strongest first.
        let last = cfg.bins - 1;
        let mut candidates: Vec<usize> = (0..cfg.bins)
            .filter(|&i| {
                (i == 0 || power[i] >= power[i - 1]) && (i == last || power[i] >= power[i + 1])
            })
            .collect();
        candidates.sort_by(|&a, &b| power[b].total_cmp(&power[a]));

        let Some(&strongest) = candidates.first() else {
            return Vec::new();
        };
        let top = power[strongest];
        if !(top > 0.0) {
            return Vec::new();
        }

        // --- Non-maximum suppression ---
        let floor = top * cfg.peak_floor_ratio;
        let mut suppressed = vec![false; cfg.bins];
        let mut kept: Vec<usize> = Vec::with_capacity(cfg.top_n);
        for &i in &candidates {
            if suppressed[i] {
                continue;
            }
            if power[i] < floor || kept.len() >= cfg.top_n {
                break;
            }
            kept.push(i);
            for &j in &candidates {
                if (grid[j] - grid[i]).abs() <= cfg.nms_hz as f64 {
                    suppressed[j] = true;
                }
            }
        }
        kept.sort_unstable();

        kept.into_iter()
            .map(|i| SpectralPeak {
                frequency: refine_peak(&grid, &power, i, step) as f32,
                power: power[i],
            })
            .collect()
    }

    /// Estimates the fundamental of a (preprocessed) frame.
    pub fn estimate_f0(&self, frame: &[i16], sample_rate: u32) -> F0Estimate {
        let cfg = &self.config;
        if frame.len() < cfg.min_frame_len {
            return F0Estimate::none();
        }
        let peaks = self.peaks(frame, sample_rate);
        let bin_hz = sample_rate as f64 / frame.len() as f64;
        let (f_min, f_max) = (cfg.min_hz as f64, cfg.max_hz as f64);

        let mut hypotheses: Vec<Hypothesis> = Vec::new();
        for peak in &peaks {
            let fp = peak.frequency as f64;
            for k in 1..=cfg.max_divisor {
                let f0 = fp / k as f64;
                if (f_min..=f_max).contains(&f0) {
                    hypotheses.push(Hypothesis {
                        f0,
                        score: comb_score(frame, sample_rate, f0, cfg.harmonics, Some(bin_hz)),
                        from_peak_hz: fp,
                        divisor: k,
                    });
                }
            }
        }
        hypotheses.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Collapse hypotheses that describe the same fundamental.
        let mut distinct: Vec<Hypothesis> = Vec::with_capacity(hypotheses.len());
        for hyp in hypotheses {
            let duplicate = distinct
                .iter()
                .any(|d| (1200.0 * (hyp.f0 / d.f0).log2()).abs() <= cfg.duplicate_cents as f64);
            if !duplicate {
                distinct.push(hyp);
            }
        }

        let Some(best) = distinct.first() else {
            return F0Estimate::none();
        };
        let runner_up = distinct.get(1).map_or(0.0, |h| h.score);
        let confidence = margin_confidence(best.score, runner_up);
        trace!(
            "[PEAKS] {} peaks, best {:.2} Hz (peak {:.1}/{}) conf {:.2}",
            peaks.len(),
            best.f0,
            best.from_peak_hz,
            best.divisor,
            confidence
        );

        F0Estimate {
            frequency: best.f0 as f32,
            score: best.score,
            confidence,
            from_peak_hz: best.from_peak_hz as f32,
            divisor: best.divisor,
        }
    }
}

impl FrequencyEstimator for HarmonicPeakEstimator {
    fn estimate(&mut self, frame: &[i16], sample_rate: u32, _hint: Option<f32>) -> F0Estimate {
        self.estimate_f0(frame, sample_rate)
    }
}

/// Refines a sweep peak with a parabola through the log-power of its
/// neighbours, moving it at most half a grid step.
fn refine_peak(grid: &[f64], power: &[f64], i: usize, step: f64) -> f64 {
    if i == 0 || i + 1 >= grid.len() {
        return grid[i];
    }
    let (p1, p2, p3) = (power[i - 1], power[i], power[i + 1]);
    if p1 <= 0.0 || p2 <= 0.0 || p3 <= 0.0 {
        return grid[i];
    }
    let (y1, y2, y3) = (p1.ln(), p2.ln(), p3.ln());
    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-12 {
        return grid[i];
    }
    let shift = ((y3 - y1) / (2.0 * denominator)).clamp(-0.5, 0.5);
    grid[i] + shift * step
}
