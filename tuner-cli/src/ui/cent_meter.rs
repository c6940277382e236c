//! # Cent Meter
//!
//! Text rendition of the tuning needle. The bar spans -50 to +50 cents with
//! the target in the middle; the needle character reflects how close the
//! pitch is.

/// Maximum cent deviation shown by the meter.
pub const METER_RANGE: f32 = 50.0;

/// Accuracy band of a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    InTune,
    Close,
    Off,
}

impl Zone {
    pub fn for_cents(cents: f32) -> Self {
        let c = cents.abs();
        if c < 5.0 {
            Zone::InTune
        } else if c < 20.0 {
            Zone::Close
        } else {
            Zone::Off
        }
    }

    fn needle(self) -> char {
        match self {
            Zone::InTune => '#',
            Zone::Close => '+',
            Zone::Off => '!',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Zone::InTune => "in tune",
            Zone::Close => "close",
            Zone::Off => "off",
        }
    }
}

/// Deviation meter for one rendering state.
pub struct CentMeter {
    /// Current cent deviation (None if no pitch detected)
    cents: Option<f32>,
}

impl CentMeter {
    pub fn new(cents: Option<f32>) -> Self {
        Self { cents }
    }

    /// Zone of the current deviation, if any.
    pub fn zone(&self) -> Option<Zone> {
        self.cents.filter(|c| c.is_finite()).map(Zone::for_cents)
    }

    /// Draws the meter as `[----|----]`, `width` cells between the brackets.
    ///
    /// Deviations beyond the range pin the needle to the edge.
    pub fn render(&self, width: usize) -> String {
        let width = width.max(3);
        let center = width / 2;
        let mut cells = vec!['-'; width];
        cells[center] = '|';

        if let (Some(c), Some(zone)) = (self.cents, self.zone()) {
            let clamped = c.clamp(-METER_RANGE, METER_RANGE);
            let pos = (clamped + METER_RANGE) / (2.0 * METER_RANGE) * (width - 1) as f32;
            let idx = (pos.round() as usize).min(width - 1);
            cells[idx] = zone.needle();
        }

        let mut out = String::with_capacity(width + 2);
        out.push('[');
        out.extend(cells);
        out.push(']');
        out
    }
}
