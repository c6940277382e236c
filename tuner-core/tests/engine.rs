use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use tuner_core::engine::{EngineOutput, NoopObserver, TunerEngine};
use tuner_core::estimator::{F0Estimate, FrequencyEstimator};
use tuner_core::preprocess::saturate;
use tuner_core::{TunerConfig, Tuning};

const SR: u32 = 44100;
const N: usize = 2048;

/// Sine frame `index` of a continuous tone with the given RMS.
fn sine_frame(freq: f64, rms: f64, index: usize) -> Vec<i16> {
    let amplitude = rms * 2f64.sqrt();
    (0..N)
        .map(|i| {
            let t = (i + index * N) as f64 / SR as f64;
            saturate(amplitude * (2.0 * PI * freq * t).sin())
        })
        .collect()
}

/// A loud frame whose content does not matter to scripted estimators.
fn loud_frame() -> Vec<i16> {
    sine_frame(200.0, 2000.0, 0)
}

/// Never trusted: forces the engine onto the fallback estimator.
struct Distrusted;

impl FrequencyEstimator for Distrusted {
    fn estimate(&mut self, _frame: &[i16], _sr: u32, _hint: Option<f32>) -> F0Estimate {
        F0Estimate::none()
    }
}

/// Replays a list of pitches and records the hints it was given.
struct Scripted {
    pitches: VecDeque<f32>,
    hints: Arc<Mutex<Vec<Option<f32>>>>,
}

impl Scripted {
    fn new(pitches: &[f32]) -> (Self, Arc<Mutex<Vec<Option<f32>>>>) {
        let hints = Arc::new(Mutex::new(Vec::new()));
        let scripted = Self {
            pitches: pitches.iter().copied().collect(),
            hints: hints.clone(),
        };
        (scripted, hints)
    }
}

impl FrequencyEstimator for Scripted {
    fn estimate(&mut self, _frame: &[i16], _sr: u32, hint: Option<f32>) -> F0Estimate {
        self.hints.lock().unwrap().push(hint);
        match self.pitches.pop_front() {
            Some(f) if f > 0.0 => F0Estimate::from_frequency(f, 0.5),
            _ => F0Estimate::none(),
        }
    }
}

fn scripted_engine(pitches: &[f32]) -> (TunerEngine, Arc<Mutex<Vec<Option<f32>>>>) {
    let (fallback, hints) = Scripted::new(pitches);
    let engine = TunerEngine::with_estimators(
        TunerConfig::default(),
        Box::new(Distrusted),
        Box::new(fallback),
        Box::new(NoopObserver),
    );
    (engine, hints)
}

fn shown(output: &EngineOutput) -> (String, f32) {
    match output {
        EngineOutput::Show(state) => (state.note_name.clone(), state.detected_hz),
        other => panic!("expected a rendering state, got {other:?}"),
    }
}

#[test]
fn e2_ramp_becomes_visible_and_converges() {
    let tuning = Tuning::standard();
    let mut engine = TunerEngine::default();
    let outputs: Vec<EngineOutput> = [100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0]
        .iter()
        .enumerate()
        .map(|(k, &rms)| engine.process_frame(&sine_frame(82.41, rms, k), SR, &tuning))
        .collect();

    assert_eq!(outputs[0], EngineOutput::Hide);
    assert_eq!(outputs[1], EngineOutput::Hide);
    let first_visible = outputs
        .iter()
        .position(|o| matches!(o, EngineOutput::Show(_)))
        .expect("tone never became visible");
    // Visible no later than the invalid-hide budget after crossing the gate.
    assert!(first_visible <= 2 + 2, "first visible at frame {first_visible}");

    let (note, hz) = shown(&outputs[5]);
    assert_eq!(note, "E2");
    assert!((hz - 82.41).abs() < 0.5, "converged to {hz}");
}

#[test]
fn harmonic_tones_are_tracked_to_their_string() {
    let amps = [1.0, 0.6, 0.4, 0.25, 0.15];
    let tuning = Tuning::standard();
    for (name, f0) in [("A2", 110.0), ("D3", 146.83), ("G3", 196.0), ("E4", 329.63)] {
        let mut engine = TunerEngine::default();
        let mut last = EngineOutput::NoChange;
        for k in 0..4 {
            let frame: Vec<i16> = (0..N)
                .map(|i| {
                    let t = (i + k * N) as f64 / SR as f64;
                    let v: f64 = amps
                        .iter()
                        .enumerate()
                        .map(|(h, a)| 3000.0 * a * (2.0 * PI * f0 * (h + 1) as f64 * t).sin())
                        .sum();
                    saturate(v)
                })
                .collect();
            last = engine.process_frame(&frame, SR, &tuning);
        }
        let (note, hz) = shown(&last);
        assert_eq!(note, name);
        assert!((hz as f64 - f0).abs() < 1.0, "{name}: {hz}");
    }
}

#[test]
fn silence_clears_memory_and_the_next_hint() {
    let tuning = Tuning::standard();
    let (mut engine, hints) = scripted_engine(&[333.0, 333.0, 82.41]);

    shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    assert!(engine.last_stable_hz().is_some());

    assert_eq!(engine.process_frame(&vec![0; N], SR, &tuning), EngineOutput::Hide);
    assert_eq!(engine.last_stable_hz(), None);
    assert_eq!(engine.last_reference_hz(), None);
    assert_eq!(engine.invalid_streak(), 0);

    let (note, _) = shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    assert_eq!(note, "E2");

    let hints = hints.lock().unwrap();
    assert_eq!(hints.len(), 3);
    assert_eq!(hints[0], None);
    assert!((hints[1].unwrap() - 333.0).abs() < 0.01);
    // The silent frame wiped the hint.
    assert_eq!(hints[2], None);
}

#[test]
fn rms_exactly_at_threshold_is_silence() {
    let tuning = Tuning::standard();
    let (mut engine, hints) = scripted_engine(&[110.0]);
    let gate = TunerConfig::default().engine.rms_threshold as i16;
    let frame: Vec<i16> = (0..N).map(|i| if i % 2 == 0 { gate } else { -gate }).collect();
    assert_eq!(engine.process_frame(&frame, SR, &tuning), EngineOutput::Hide);
    assert!(hints.lock().unwrap().is_empty());
}

#[test]
fn invalid_streak_freezes_then_hides() {
    let tuning = Tuning::standard();
    let (mut engine, hints) = scripted_engine(&[333.0, 333.0, 333.0, 0.0, 0.0, 82.41, 82.41]);

    for _ in 0..3 {
        shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    }
    assert_eq!(engine.process_frame(&loud_frame(), SR, &tuning), EngineOutput::NoChange);
    assert_eq!(engine.invalid_streak(), 1);
    assert!(engine.last_stable_hz().is_some());

    assert_eq!(engine.process_frame(&loud_frame(), SR, &tuning), EngineOutput::Hide);
    assert_eq!(engine.invalid_streak(), 2);
    assert_eq!(engine.last_stable_hz(), None);

    // A fresh low string is picked up without a stale treble hint.
    let (note, hz) = shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    assert_eq!(note, "E2");
    assert!((hz - 82.41).abs() < 0.01);
    assert_eq!(engine.invalid_streak(), 0);
    assert_eq!(hints.lock().unwrap()[5], None);
}

#[test]
fn out_of_range_pitch_is_invalid() {
    let tuning = Tuning::standard();
    let (mut engine, _) = scripted_engine(&[2500.0, 15.0]);
    assert_eq!(engine.process_frame(&loud_frame(), SR, &tuning), EngineOutput::NoChange);
    assert_eq!(engine.process_frame(&loud_frame(), SR, &tuning), EngineOutput::Hide);
}

#[test]
fn short_frames_never_produce_a_pitch() {
    let tuning = Tuning::standard();
    let mut engine = TunerEngine::default();
    let frame: Vec<i16> = sine_frame(110.0, 2000.0, 0)[..128].to_vec();
    assert_eq!(engine.process_frame(&frame, SR, &tuning), EngineOutput::NoChange);
    assert_eq!(engine.process_frame(&frame, SR, &tuning), EngineOutput::Hide);
}

#[test]
fn treble_collapse_is_held_back_for_three_frames() {
    let tuning = Tuning::standard();
    let mut script = vec![330.0; 5];
    script.extend([110.0; 5]);
    let (mut engine, _) = scripted_engine(&script);

    for _ in 0..5 {
        let (note, _) = shown(&engine.process_frame(&loud_frame(), SR, &tuning));
        assert_eq!(note, "E4");
    }
    // The median needs three low values before the display moves at all.
    for _ in 0..2 {
        let (note, _) = shown(&engine.process_frame(&loud_frame(), SR, &tuning));
        assert_eq!(note, "E4");
    }
    // Two suspect frames: shown as A2, but the stable memory stays high.
    for _ in 0..2 {
        let (note, hz) = shown(&engine.process_frame(&loud_frame(), SR, &tuning));
        assert_eq!(note, "A2");
        assert!((hz - 110.0).abs() < 0.01);
        assert!(engine.last_stable_hz().unwrap() > 300.0);
    }
    // The third confirms the drop.
    shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    assert!((engine.last_stable_hz().unwrap() - 110.0).abs() < 0.01);
}

#[test]
fn reset_forgets_everything() {
    let tuning = Tuning::standard();
    let (mut engine, hints) = scripted_engine(&[196.0, 196.0]);
    shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    engine.reset();
    assert_eq!(engine.last_stable_hz(), None);
    shown(&engine.process_frame(&loud_frame(), SR, &tuning));
    assert_eq!(hints.lock().unwrap()[1], None);
}
