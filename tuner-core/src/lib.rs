// tuner-core/src/lib.rs

//! The core logic for the guitar tuner.
//! This crate is responsible for audio capture, frame conditioning, pitch
//! estimation and the smoothing state machine that drives a tuning needle.
//! It is completely headless and contains no terminal or GUI code.

pub mod audio;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod fft;
pub mod goertzel;
pub mod harmonic_peaks;
pub mod pitch;
pub mod preprocess;
pub mod session;
pub mod smoothing;
pub mod tuning;

pub use config::TunerConfig;
pub use engine::{EngineOutput, FrameObserver, FrameReport, LogObserver, NoopObserver, TunerEngine};
pub use error::TunerError;
pub use estimator::{F0Estimate, FrequencyEstimator};
pub use session::{RenderSink, SessionInputs, SessionStats, run_session, spawn_engine_worker};
pub use tuning::{Note, Tuning};

/// What the display should show for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// Name of the nearest target note.
    pub note_name: String,
    /// Reference frequency of that note in Hz.
    pub note_hz: f32,
    /// Smoothed detected frequency in Hz.
    pub detected_hz: f32,
}

impl RenderState {
    /// Deviation of the detected pitch from the note, in cents.
    pub fn cents_deviation(&self) -> f32 {
        tuning::hz_to_cents_safe(self.detected_hz, self.note_hz)
    }
}
