//! # Musical Tuning Module
//!
//! This module provides the note catalog and tuning definitions for a six-string
//! instrument, plus the cent conversions used by the smoothing layer.
//!
//! ## Features
//! - Equal-tempered note table from C1 to B4 (A4 = 440 Hz)
//! - Six-string tunings with validated reference frequencies
//! - Alternate note suggestions around a given string's note
//! - Nearest target note lookup
//! - NaN-free Hz <-> cents conversions

use crate::error::TunerError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of strings in a tuning.
pub const STRING_COUNT: usize = 6;

/// Semitones offered above and below a string's current note.
pub const DEFAULT_OPTION_RANGE: usize = 4;

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note name (e.g., "E2", "C#3")
    pub name: String,
    /// Reference frequency in Hz
    pub frequency: f32,
}

impl Note {
    pub fn new(name: impl Into<String>, frequency: f32) -> Self {
        Self {
            name: name.into(),
            frequency,
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2} Hz)", self.name, self.frequency)
    }
}

/// Statically computed notes from C1 to B4, sorted by pitch.
///
/// Frequencies follow equal temperament with A4 = 440 Hz and are rounded
/// to 0.01 Hz, so E2 reads as 82.41 Hz and A2 as exactly 110 Hz.
static NOTE_TABLE: Lazy<Vec<Note>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    // MIDI 24 is C1, MIDI 71 is B4.
    (24..=71)
        .map(|midi: i32| {
            let exact = 440.0_f64 * 2.0_f64.powf((midi - 69) as f64 / 12.0);
            let frequency = ((exact * 100.0).round() / 100.0) as f32;
            let octave = midi / 12 - 1;
            let name = format!("{}{}", NOTE_NAMES[(midi % 12) as usize], octave);
            Note { name, frequency }
        })
        .collect()
});

/// Returns the full note catalog, sorted by ascending pitch.
pub fn note_table() -> &'static [Note] {
    &NOTE_TABLE
}

/// Looks up a note in the catalog by its name.
pub fn find_note(name: &str) -> Option<&'static Note> {
    NOTE_TABLE.iter().find(|note| note.name == name)
}

/// Returns the catalog notes within `range` semitones of `note`.
///
/// This is what a string's note picker offers. If `note` is not part of the
/// catalog, the only option is the note itself.
///
/// # Arguments
/// * `note` - The string's current note
/// * `range` - Semitones to offer below and above
pub fn tuning_options_for(note: &Note, range: usize) -> Vec<Note> {
    match NOTE_TABLE.iter().position(|n| n.name == note.name) {
        Some(index) => {
            let start = index.saturating_sub(range);
            let end = (index + range).min(NOTE_TABLE.len() - 1);
            NOTE_TABLE[start..=end].to_vec()
        }
        None => vec![note.clone()],
    }
}

/// Finds the target note whose reference frequency is closest to `freq`.
///
/// Distance is the absolute difference in Hz. On a tie the earlier note
/// wins. Returns `None` only for an empty target list.
pub fn nearest_target(freq: f32, targets: &[Note]) -> Option<&Note> {
    let mut best: Option<(&Note, f32)> = None;
    for note in targets {
        let diff = (note.frequency - freq).abs();
        match best {
            Some((_, smallest)) if diff >= smallest => {}
            _ => best = Some((note, diff)),
        }
    }
    best.map(|(note, _)| note)
}

/// Converts a frequency to its cent offset from a reference frequency.
///
/// Cents are a logarithmic unit of pitch measurement where:
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
///
/// Returns exactly `0.0` when either frequency is non-positive, so callers
/// never see NaN or infinity.
pub fn hz_to_cents_safe(freq: f32, reference_hz: f32) -> f32 {
    if !(freq > 0.0) || !(reference_hz > 0.0) {
        return 0.0;
    }
    (1200.0 * (freq as f64 / reference_hz as f64).log2()) as f32
}

/// Converts a cent offset back to an absolute frequency relative to `reference_hz`.
pub fn cents_to_hz(cents: f32, reference_hz: f32) -> f32 {
    (reference_hz as f64 * 2.0_f64.powf(cents as f64 / 1200.0)) as f32
}

/// An ordered set of six target notes, one per string (lowest string first).
///
/// Every string always carries a positive, finite reference frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Note>", into = "Vec<Note>")]
pub struct Tuning {
    strings: [Note; STRING_COUNT],
}

impl Tuning {
    /// Standard guitar tuning: E2 A2 D3 G3 B3 E4.
    pub fn standard() -> Self {
        Self {
            strings: [
                Note::new("E2", 82.41),
                Note::new("A2", 110.00),
                Note::new("D3", 146.83),
                Note::new("G3", 196.00),
                Note::new("B3", 246.94),
                Note::new("E4", 329.63),
            ],
        }
    }

    /// Builds a tuning from six notes, rejecting unusable reference frequencies.
    pub fn new(strings: [Note; STRING_COUNT]) -> Result<Self, TunerError> {
        for note in &strings {
            validate_note(note)?;
        }
        Ok(Self { strings })
    }

    /// Builds a tuning from six catalog note names, e.g. `["D2", "A2", ...]`.
    pub fn from_names(names: &[&str]) -> Result<Self, TunerError> {
        let notes = names
            .iter()
            .map(|name| {
                find_note(name)
                    .cloned()
                    .ok_or_else(|| TunerError::UnknownNote(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_from(notes)
    }

    /// The target notes, lowest string first.
    pub fn notes(&self) -> &[Note] {
        &self.strings
    }

    /// Reassigns the note of one string.
    ///
    /// # Arguments
    /// * `index` - String index (0 = lowest string)
    /// * `note` - The new target note
    pub fn set_string(&mut self, index: usize, note: Note) -> Result<(), TunerError> {
        validate_note(&note)?;
        let slot = self
            .strings
            .get_mut(index)
            .ok_or(TunerError::StringOutOfRange(index))?;
        *slot = note;
        Ok(())
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<Note>> for Tuning {
    type Error = TunerError;

    fn try_from(notes: Vec<Note>) -> Result<Self, Self::Error> {
        let got = notes.len();
        let strings: [Note; STRING_COUNT] = notes
            .try_into()
            .map_err(|_| TunerError::WrongStringCount {
                expected: STRING_COUNT,
                got,
            })?;
        Self::new(strings)
    }
}

impl From<Tuning> for Vec<Note> {
    fn from(tuning: Tuning) -> Self {
        tuning.strings.into()
    }
}

impl FromStr for Tuning {
    type Err = TunerError;

    /// Parses a comma separated list of note names, e.g. `"D2,A2,D3,G3,B3,E4"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        Self::from_names(&names)
    }
}

impl fmt::Display for Tuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.strings.iter().map(|n| n.name.as_str()).collect();
        write!(f, "{}", names.join(" "))
    }
}

fn validate_note(note: &Note) -> Result<(), TunerError> {
    if note.name.trim().is_empty() {
        return Err(TunerError::InvalidConfig("note name is empty".to_string()));
    }
    if !note.frequency.is_finite() || note.frequency <= 0.0 {
        return Err(TunerError::InvalidConfig(format!(
            "note {} has no usable reference frequency ({})",
            note.name, note.frequency
        )));
    }
    Ok(())
}
