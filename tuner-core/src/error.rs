//! # Error Module
//!
//! Errors surfaced by the public API of the tuner core. Signal-processing
//! paths never fail: a frame without enough evidence simply yields no
//! estimate. Only contract violations (an empty tuning handed to the
//! classifier, unknown note names, unusable configuration) end up here.

use thiserror::Error;

/// Errors returned by tuning construction, classification and configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunerError {
    /// The classifier was asked to score an empty list of target notes.
    #[error("tuning must contain at least one target note")]
    EmptyTuning,
    /// A note name is not present in the note table.
    #[error("unknown note name: {0}")]
    UnknownNote(String),
    /// A tuning was built from the wrong number of strings.
    #[error("a tuning needs exactly {expected} strings, got {got}")]
    WrongStringCount { expected: usize, got: usize },
    /// A string index outside the tuning was addressed.
    #[error("string index {0} is out of range")]
    StringOutOfRange(usize),
    /// A configuration value breaks an invariant.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
