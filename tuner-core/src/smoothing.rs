//! # Smoothing & Hysteresis
//!
//! Turns jittery per-frame pitch into a value steady enough for a needle:
//! a rolling median, a deadband around 0 cents, an exponential moving
//! average whose speed follows the size of the change, and a stable
//! frequency memory that refuses sudden treble-to-bass collapses until they
//! persist for a few frames.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tunables of the smoothing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Frames held by the median filter.
    pub median_capacity: usize,
    /// |cents| below this snaps to 0 and sticks.
    pub stick_in_cents: f32,
    /// |cents| above this releases a stuck needle.
    pub stick_out_cents: f32,
    /// Collapses are only suspected below stable pitches at or above this.
    pub collapse_min_hz: f32,
    /// A drop below `stable / collapse_divisor` is suspect.
    pub collapse_divisor: f32,
    /// Consecutive suspect frames needed before a collapse is accepted.
    pub collapse_confirm_frames: u32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            median_capacity: 5,
            stick_in_cents: 3.0,
            stick_out_cents: 5.0,
            collapse_min_hz: 250.0,
            collapse_divisor: 1.8,
            collapse_confirm_frames: 3,
        }
    }
}

/// Rolling median over the last `capacity` values.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    capacity: usize,
    window: VecDeque<f32>,
}

impl MedianFilter {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Pushes a value, evicting the oldest when full, and returns the
    /// median of the window (upper median for an even count).
    pub fn push(&mut self, value: f32) -> f32 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);

        let mut sorted: Vec<f32> = self.window.iter().copied().collect();
        sorted.sort_by(f32::total_cmp);
        sorted[sorted.len() / 2]
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Deadband around 0 cents.
#[derive(Debug, Clone)]
pub struct CentsStickiness {
    in_cents: f32,
    out_cents: f32,
    stuck: bool,
}

impl CentsStickiness {
    pub fn new(in_cents: f32, out_cents: f32) -> Self {
        Self {
            in_cents,
            out_cents,
            stuck: false,
        }
    }

    /// While stuck, passes 0 until `|cents|` exceeds the release threshold.
    /// While free, snaps anything under the entry threshold to 0 and sticks.
    pub fn apply(&mut self, cents: f32) -> f32 {
        if self.stuck {
            if cents.abs() > self.out_cents {
                self.stuck = false;
                cents
            } else {
                0.0
            }
        } else if cents.abs() < self.in_cents {
            self.stuck = true;
            0.0
        } else {
            cents
        }
    }

    pub fn is_stuck(&self) -> bool {
        self.stuck
    }

    pub fn reset(&mut self) {
        self.stuck = false;
    }
}

impl Default for CentsStickiness {
    fn default() -> Self {
        Self::new(3.0, 5.0)
    }
}

/// EMA factor for a step from `previous` to `current` cents.
///
/// Bigger jumps move faster. Without a previous value the factor is 0.22.
pub fn adaptive_alpha(previous: Option<f32>, current: f32) -> f32 {
    let Some(previous) = previous else {
        return 0.22;
    };
    match (current - previous).abs() {
        d if d > 20.0 => 0.28,
        d if d > 10.0 => 0.22,
        d if d > 5.0 => 0.20,
        _ => 0.16,
    }
}

/// Exponential moving average of the cents offset.
#[derive(Debug, Clone, Default)]
pub struct CentsEma {
    value: Option<f32>,
}

impl CentsEma {
    /// Folds in a new offset and returns the smoothed one. The first value
    /// is taken as-is.
    pub fn update(&mut self, cents: f32) -> f32 {
        let next = match self.value {
            None => cents,
            Some(prev) => {
                let alpha = adaptive_alpha(Some(prev), cents);
                alpha * cents + (1.0 - alpha) * prev
            }
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Last stable frequency, guarded against treble-to-bass octave collapses.
#[derive(Debug, Clone)]
pub struct StableFrequency {
    min_hz: f32,
    divisor: f32,
    confirm_frames: u32,
    stable: Option<f32>,
    suspect_frames: u32,
}

impl StableFrequency {
    pub fn new(config: &SmoothingConfig) -> Self {
        Self {
            min_hz: config.collapse_min_hz,
            divisor: config.collapse_divisor,
            confirm_frames: config.collapse_confirm_frames,
            stable: None,
            suspect_frames: 0,
        }
    }

    /// Offers a newly smoothed frequency and returns the stable one.
    ///
    /// A drop from at least `min_hz` to below `stable / divisor` is held
    /// back until it has been seen `confirm_frames` times in a row. Any
    /// other value is accepted immediately.
    pub fn update(&mut self, hz: f32) -> f32 {
        match self.stable {
            Some(was) if was >= self.min_hz && hz < was / self.divisor => {
                self.suspect_frames += 1;
                if self.suspect_frames >= self.confirm_frames {
                    self.stable = Some(hz);
                    self.suspect_frames = 0;
                }
            }
            _ => {
                self.stable = Some(hz);
                self.suspect_frames = 0;
            }
        }
        self.stable.unwrap_or(hz)
    }

    pub fn get(&self) -> Option<f32> {
        self.stable
    }

    pub fn suspect_frames(&self) -> u32 {
        self.suspect_frames
    }

    pub fn reset(&mut self) {
        self.stable = None;
        self.suspect_frames = 0;
    }
}

impl Default for StableFrequency {
    fn default() -> Self {
        Self::new(&SmoothingConfig::default())
    }
}
