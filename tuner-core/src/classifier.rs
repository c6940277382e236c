//! Frame-level note classifier.
//!
//! Scores each target note of a tuning by how well its harmonic series
//! explains the frame. Every note is tried at its reference frequency, one
//! octave up and one octave down, with a slight bias towards the nominal
//! octave so neighbouring strings do not pull each other across octaves.

use crate::error::TunerError;
use crate::estimator::{F0Estimate, FrequencyEstimator, margin_confidence};
use crate::goertzel::comb_score;
use crate::tuning::Note;

/// Harmonics summed per variant.
const HARMONICS: usize = 6;

/// Bias applied to the (nominal, double, half) variants of each note.
const VARIANT_BIAS: [(f32, f64); 3] = [(1.0, 1.00), (2.0, 0.95), (0.5, 0.90)];

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The best-matching target note.
    pub note: Note,
    /// Margin of the winner over the runner-up note, in `[0, 1]`.
    pub confidence: f64,
    /// Frequency of the winning octave variant (`f`, `2f` or `f/2`).
    pub variant_hz: f32,
    /// Biased score per target note, in tuning order.
    pub scores: Vec<(String, f64)>,
}

/// Scores a note by its best biased octave variant.
///
/// On equal scores the nominal octave wins, then the double.
fn score_note(frame: &[i16], sample_rate: u32, base_hz: f32) -> (f64, f32) {
    let mut best = (f64::NEG_INFINITY, base_hz);
    for (factor, bias) in VARIANT_BIAS {
        let hz = base_hz * factor;
        let score = comb_score(frame, sample_rate, hz as f64, HARMONICS, None) * bias;
        if score > best.0 {
            best = (score, hz);
        }
    }
    best
}

/// Classifies a frame against a set of target notes.
///
/// Fails with [`TunerError::EmptyTuning`] when `targets` is empty.
pub fn classify(
    frame: &[i16],
    sample_rate: u32,
    targets: &[Note],
) -> Result<Classification, TunerError> {
    let first = targets.first().ok_or(TunerError::EmptyTuning)?;

    let mut scores = Vec::with_capacity(targets.len());
    let mut best = (first, f64::NEG_INFINITY, first.frequency);
    for note in targets {
        let (score, variant_hz) = score_note(frame, sample_rate, note.frequency);
        scores.push((note.name.clone(), score));
        if score > best.1 {
            best = (note, score, variant_hz);
        }
    }

    let mut ranked: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
    ranked.sort_by(|a, b| b.total_cmp(a));
    let top = ranked.first().copied().unwrap_or(0.0);
    let runner_up = ranked.get(1).copied().unwrap_or(0.0);

    Ok(Classification {
        note: best.0.clone(),
        confidence: margin_confidence(top, runner_up),
        variant_hz: best.2,
        scores,
    })
}

/// [`classify`] bound to a fixed set of targets, usable as a
/// [`FrequencyEstimator`]. The estimated frequency is the winning variant.
#[derive(Debug, Clone)]
pub struct NoteClassifier {
    targets: Vec<Note>,
}

impl NoteClassifier {
    pub fn new(targets: &[Note]) -> Result<Self, TunerError> {
        if targets.is_empty() {
            return Err(TunerError::EmptyTuning);
        }
        Ok(Self {
            targets: targets.to_vec(),
        })
    }

    pub fn targets(&self) -> &[Note] {
        &self.targets
    }

    pub fn classify(&self, frame: &[i16], sample_rate: u32) -> Result<Classification, TunerError> {
        classify(frame, sample_rate, &self.targets)
    }
}

impl FrequencyEstimator for NoteClassifier {
    fn estimate(&mut self, frame: &[i16], sample_rate: u32, _hint: Option<f32>) -> F0Estimate {
        match self.classify(frame, sample_rate) {
            Ok(result) if result.scores.iter().any(|(_, s)| *s > 0.0) => {
                F0Estimate::from_frequency(result.variant_hz, result.confidence)
            }
            _ => F0Estimate::none(),
        }
    }
}
