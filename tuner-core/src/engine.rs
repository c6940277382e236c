//! # Tuner Engine
//!
//! The per-frame state machine. It owns all cross-frame pitch memory and
//! turns each raw frame into exactly one [`EngineOutput`]:
//!
//! 1. **Silence**: RMS at or below the gate clears all memory and hides.
//! 2. **Preprocess**: band-pass, level, window.
//! 3. **Estimate**: the primary (harmonic peak) estimator is trusted when
//!    its result is in band and confident enough; otherwise the fallback
//!    (autocorrelation) runs with the last stable pitch as a hint.
//! 4. **Invalid**: an unusable pitch grows the invalid streak. The first
//!    frames only freeze the display; once the streak reaches the limit the
//!    memory is cleared and the display hidden.
//! 5. **Valid**: median, nearest note, cents deadband, adaptive EMA and the
//!    stable-frequency memory are updated in that order.
//!
//! Diagnostics leave the engine only through an injected [`FrameObserver`].

use crate::RenderState;
use crate::config::TunerConfig;
use crate::estimator::{F0Estimate, FrequencyEstimator};
use crate::harmonic_peaks::HarmonicPeakEstimator;
use crate::pitch::AutocorrelationEstimator;
use crate::preprocess::{PreprocessConfig, preprocess, rms};
use crate::smoothing::{CentsEma, CentsStickiness, MedianFilter, SmoothingConfig, StableFrequency};
use crate::tuning::{Tuning, cents_to_hz, hz_to_cents_safe, nearest_target};
use log::debug;
use serde::{Deserialize, Serialize};

/// Gating and selection parameters of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames with RMS at or below this are silence.
    pub rms_threshold: f32,
    /// Consecutive invalid frames before the display is hidden.
    pub invalid_hide_frames: u32,
    /// Band in which the primary estimate is trusted.
    pub peak_min_hz: f32,
    pub peak_max_hz: f32,
    /// Minimum confidence for the primary estimate to be trusted.
    pub peak_min_confidence: f64,
    /// Pitches outside this band are invalid.
    pub valid_min_hz: f32,
    pub valid_max_hz: f32,
    /// `LogObserver` summarises every n-th frame.
    pub log_every_n_frames: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 300.0,
            invalid_hide_frames: 2,
            peak_min_hz: 60.0,
            peak_max_hz: 1000.0,
            peak_min_confidence: 0.10,
            valid_min_hz: 20.0,
            valid_max_hz: 2000.0,
            log_every_n_frames: 3,
        }
    }
}

/// What the display should do after a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// No valid pitch: hide the needle.
    Hide,
    /// Brief dropout: keep whatever is shown.
    NoChange,
    /// A fresh rendering state.
    Show(RenderState),
}

/// Which estimator supplied a frame's pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchSource {
    Primary,
    Fallback,
}

/// Per-frame diagnostics handed to a [`FrameObserver`].
#[derive(Debug)]
pub struct FrameReport<'a> {
    /// Frames processed since construction or the last reset.
    pub frame_index: u64,
    /// RMS of the raw frame.
    pub rms: f32,
    /// The primary estimator's result (none for silent frames).
    pub primary: &'a F0Estimate,
    /// Estimator whose pitch was used, if any ran.
    pub source: Option<PitchSource>,
    /// The pitch fed into validation.
    pub pitch: Option<f32>,
    /// What the engine emitted.
    pub output: &'a EngineOutput,
}

/// Receives a report for every processed frame.
pub trait FrameObserver: Send {
    fn on_frame(&mut self, report: &FrameReport<'_>);
}

/// Writes a `debug!` summary of every n-th frame.
pub struct LogObserver {
    every_n: u64,
}

impl LogObserver {
    pub fn new(every_n: u64) -> Self {
        Self {
            every_n: every_n.max(1),
        }
    }
}

impl FrameObserver for LogObserver {
    fn on_frame(&mut self, report: &FrameReport<'_>) {
        if report.frame_index % self.every_n != 0 {
            return;
        }
        let output = match report.output {
            EngineOutput::Hide => "hide".to_string(),
            EngineOutput::NoChange => "no change".to_string(),
            EngineOutput::Show(state) => {
                format!("{} {:.2} Hz", state.note_name, state.detected_hz)
            }
        };
        debug!(
            "[ENGINE] #{} rms={:.0} peaks={:.1}Hz (conf={:.2}, from={:.1}/k={}) src={:?} pitch={:?} -> {}",
            report.frame_index,
            report.rms,
            report.primary.frequency,
            report.primary.confidence,
            report.primary.from_peak_hz,
            report.primary.divisor,
            report.source,
            report.pitch,
            output
        );
    }
}

/// Discards all reports.
pub struct NoopObserver;

impl FrameObserver for NoopObserver {
    fn on_frame(&mut self, _report: &FrameReport<'_>) {}
}

/// Cross-frame pitch memory.
struct PitchMemory {
    median: MedianFilter,
    stickiness: CentsStickiness,
    ema: CentsEma,
    stable: StableFrequency,
    last_reference_hz: Option<f32>,
    invalid_streak: u32,
}

impl PitchMemory {
    fn new(config: &SmoothingConfig) -> Self {
        Self {
            median: MedianFilter::new(config.median_capacity),
            stickiness: CentsStickiness::new(config.stick_in_cents, config.stick_out_cents),
            ema: CentsEma::default(),
            stable: StableFrequency::new(config),
            last_reference_hz: None,
            invalid_streak: 0,
        }
    }

    fn reset(&mut self) {
        self.clear_tracking();
        self.invalid_streak = 0;
    }

    /// Forgets everything about the tracked pitch but keeps the invalid streak.
    fn clear_tracking(&mut self) {
        self.median.clear();
        self.stickiness.reset();
        self.ema.reset();
        self.stable.reset();
        self.last_reference_hz = None;
    }

    /// Folds a valid pitch into the memory and builds the rendering state.
    fn update(&mut self, pitch: f32, tuning: &Tuning) -> Option<RenderState> {
        self.invalid_streak = 0;
        let median_hz = self.median.push(pitch);

        let note = nearest_target(median_hz, tuning.notes())?;
        let reference = note.frequency;

        let cents = self.stickiness.apply(hz_to_cents_safe(median_hz, reference));
        let smoothed_cents = self.ema.update(cents);
        let smoothed_hz = cents_to_hz(smoothed_cents, reference);

        self.last_reference_hz = Some(reference);
        self.stable.update(smoothed_hz);

        Some(RenderState {
            note_name: note.name.clone(),
            note_hz: reference,
            detected_hz: smoothed_hz,
        })
    }
}

/// Stateful per-session pitch tracker.
pub struct TunerEngine {
    config: EngineConfig,
    preprocess: PreprocessConfig,
    primary: Box<dyn FrequencyEstimator + Send>,
    fallback: Box<dyn FrequencyEstimator + Send>,
    observer: Box<dyn FrameObserver>,
    memory: PitchMemory,
    frame_index: u64,
}

impl TunerEngine {
    /// Engine with the default estimators, reporting through [`LogObserver`].
    pub fn new(config: TunerConfig) -> Self {
        let observer = Box::new(LogObserver::new(config.engine.log_every_n_frames));
        Self::with_observer(config, observer)
    }

    pub fn with_observer(config: TunerConfig, observer: Box<dyn FrameObserver>) -> Self {
        let primary = Box::new(HarmonicPeakEstimator::new(config.harmonic_peaks.clone()));
        let fallback = Box::new(AutocorrelationEstimator::new(config.autocorrelation.clone()));
        Self::with_estimators(config, primary, fallback, observer)
    }

    /// Engine with explicit estimators, for alternative strategies and tests.
    pub fn with_estimators(
        config: TunerConfig,
        primary: Box<dyn FrequencyEstimator + Send>,
        fallback: Box<dyn FrequencyEstimator + Send>,
        observer: Box<dyn FrameObserver>,
    ) -> Self {
        Self {
            memory: PitchMemory::new(&config.smoothing),
            config: config.engine,
            preprocess: config.preprocess,
            primary,
            fallback,
            observer,
            frame_index: 0,
        }
    }

    /// Drops all pitch memory, as if silence had been seen.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.frame_index = 0;
    }

    /// Processes one raw frame and returns what the display should do.
    ///
    /// Frames must be fed in arrival order; each call reads the memory the
    /// previous one left behind.
    pub fn process_frame(&mut self, frame: &[i16], sample_rate: u32, tuning: &Tuning) -> EngineOutput {
        self.frame_index += 1;
        let level = rms(frame);

        if level <= self.config.rms_threshold {
            self.memory.reset();
            let output = EngineOutput::Hide;
            self.report(level, &F0Estimate::none(), None, None, &output);
            return output;
        }

        let conditioned = preprocess(frame, sample_rate, &self.preprocess);
        let hint = self.memory.stable.get();

        let primary = self.primary.estimate(&conditioned, sample_rate, hint);
        let (source, chosen) = if self.trust_primary(&primary) {
            (PitchSource::Primary, primary)
        } else {
            (
                PitchSource::Fallback,
                self.fallback.estimate(&conditioned, sample_rate, hint),
            )
        };
        let pitch = chosen.frequency;

        let output = if self.is_valid(pitch) {
            match self.memory.update(pitch, tuning) {
                Some(state) => EngineOutput::Show(state),
                None => EngineOutput::NoChange,
            }
        } else {
            self.memory.invalid_streak += 1;
            if self.memory.invalid_streak >= self.config.invalid_hide_frames {
                debug!(
                    "[ENGINE] {} invalid frames in a row, hiding",
                    self.memory.invalid_streak
                );
                self.memory.clear_tracking();
                EngineOutput::Hide
            } else {
                EngineOutput::NoChange
            }
        };

        self.report(level, &primary, Some(source), Some(pitch), &output);
        output
    }

    fn trust_primary(&self, estimate: &F0Estimate) -> bool {
        (self.config.peak_min_hz..=self.config.peak_max_hz).contains(&estimate.frequency)
            && estimate.confidence >= self.config.peak_min_confidence
    }

    fn is_valid(&self, pitch: f32) -> bool {
        pitch.is_finite() && (self.config.valid_min_hz..=self.config.valid_max_hz).contains(&pitch)
    }

    fn report(
        &mut self,
        rms: f32,
        primary: &F0Estimate,
        source: Option<PitchSource>,
        pitch: Option<f32>,
        output: &EngineOutput,
    ) {
        let report = FrameReport {
            frame_index: self.frame_index,
            rms,
            primary,
            source,
            pitch,
            output,
        };
        self.observer.on_frame(&report);
    }

    /// Last stable smoothed frequency, the fallback estimator's hint.
    pub fn last_stable_hz(&self) -> Option<f32> {
        self.memory.stable.get()
    }

    /// Reference frequency of the note matched on the last valid frame.
    pub fn last_reference_hz(&self) -> Option<f32> {
        self.memory.last_reference_hz
    }

    pub fn invalid_streak(&self) -> u32 {
        self.memory.invalid_streak
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for TunerEngine {
    fn default() -> Self {
        Self::new(TunerConfig::default())
    }
}
