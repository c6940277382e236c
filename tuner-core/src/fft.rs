//! # Fast Fourier Transform (FFT) Module
//!
//! Unnormalized autocorrelation of 16-bit frames, computed through the
//! power spectrum with RustFFT. The frame is zero-padded far enough that
//! the circular correlation equals the linear one for every requested lag.
//!
//! ## Features
//! - Cached FFT plans and scratch buffer across frames
//! - Exact linear autocorrelation up to a requested lag

use rustfft::{FftPlanner, num_complex::Complex};

/// FFT length needed for `max_lag` lags of an `len`-sample signal
/// without circular wrap-around.
pub fn autocorr_fft_size(len: usize, max_lag: usize) -> usize {
    (len + max_lag + 1).next_power_of_two()
}

/// Computes `r[lag] = Σ x[i]·x[i+lag]` for lags `0..=max_lag`.
///
/// Plans are cached inside the planner, so one `Autocorrelator` should be
/// kept per estimator rather than created per frame.
pub struct Autocorrelator {
    planner: FftPlanner<f64>,
    buffer: Vec<Complex<f64>>,
}

impl Autocorrelator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            buffer: Vec::new(),
        }
    }

    /// Returns `max_lag + 1` autocorrelation values, lag 0 first.
    ///
    /// Lags at or beyond the signal length are zero. An empty signal yields
    /// all zeros.
    pub fn compute(&mut self, signal: &[i16], max_lag: usize) -> Vec<f64> {
        let mut result = vec![0.0; max_lag + 1];
        if signal.is_empty() {
            return result;
        }

        let fft_size = autocorr_fft_size(signal.len(), max_lag);
        self.buffer.clear();
        self.buffer
            .extend(signal.iter().map(|&s| Complex { re: s as f64, im: 0.0 }));
        self.buffer.resize(fft_size, Complex { re: 0.0, im: 0.0 });

        let forward = self.planner.plan_fft_forward(fft_size);
        forward.process(&mut self.buffer);

        // Power spectral density; its inverse transform is the autocorrelation.
        for value in self.buffer.iter_mut() {
            *value = Complex {
                re: value.norm_sqr(),
                im: 0.0,
            };
        }

        let inverse = self.planner.plan_fft_inverse(fft_size);
        inverse.process(&mut self.buffer);

        let scale = 1.0 / fft_size as f64;
        let lags = (max_lag + 1).min(signal.len());
        for (slot, value) in result.iter_mut().zip(self.buffer.iter()).take(lags) {
            *slot = value.re * scale;
        }
        result
    }
}

impl Default for Autocorrelator {
    fn default() -> Self {
        Self::new()
    }
}
