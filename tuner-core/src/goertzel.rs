//! Single-frequency spectral power via the Goertzel recursion, and the
//! harmonic comb scores built on it.

use std::f64::consts::PI;

/// Power of `frame` at `freq` Hz (magnitude squared of one DFT term).
///
/// The frequency is used as-is, not rounded to an integer bin, so the
/// result varies smoothly with `freq`.
pub fn goertzel_power(frame: &[i16], sample_rate: u32, freq: f64) -> f64 {
    if frame.is_empty() || !(freq > 0.0) || sample_rate == 0 {
        return 0.0;
    }
    let omega = 2.0 * PI * freq / sample_rate as f64;
    let (sin, cos) = omega.sin_cos();
    let coeff = 2.0 * cos;

    let (mut s1, mut s2) = (0.0_f64, 0.0_f64);
    for &x in frame {
        let s0 = x as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let re = s1 - s2 * cos;
    let im = s2 * sin;
    re * re + im * im
}

/// Goertzel power at `freq` plus its neighbours one resolution bin away.
///
/// Tolerates a partial that sits slightly off the requested frequency.
pub fn local_power(frame: &[i16], sample_rate: u32, freq: f64, bin_hz: f64) -> f64 {
    if freq <= 1.0 {
        return 0.0;
    }
    goertzel_power(frame, sample_rate, (freq - bin_hz).max(1.0))
        + goertzel_power(frame, sample_rate, freq)
        + goertzel_power(frame, sample_rate, freq + bin_hz)
}

/// Weighted harmonic comb: `Σ (1/h)·P(h·f0)` for `h = 1..=harmonics`.
///
/// Stops at the first harmonic at or above Nyquist. With `bin_hz` set,
/// each term uses [`local_power`] instead of a single Goertzel evaluation.
pub fn comb_score(
    frame: &[i16],
    sample_rate: u32,
    f0: f64,
    harmonics: usize,
    bin_hz: Option<f64>,
) -> f64 {
    let nyquist = sample_rate as f64 / 2.0;
    let mut total = 0.0;
    for h in 1..=harmonics {
        let freq = f0 * h as f64;
        if freq >= nyquist {
            break;
        }
        let power = match bin_hz {
            Some(bin) => local_power(frame, sample_rate, freq, bin),
            None => goertzel_power(frame, sample_rate, freq),
        };
        total += power / h as f64;
    }
    total
}

/// Unweighted harmonic energy `Σ P(h·f)` for `h = 1..=harmonics`, stopping
/// before Nyquist.
pub fn harmonic_sum(frame: &[i16], sample_rate: u32, freq: f64, harmonics: usize) -> f64 {
    let nyquist = sample_rate as f64 / 2.0;
    (1..=harmonics)
        .map(|h| freq * h as f64)
        .take_while(|&f| f < nyquist)
        .map(|f| goertzel_power(frame, sample_rate, f))
        .sum()
}
