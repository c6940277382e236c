use std::f64::consts::PI;

use crossbeam_channel::{bounded, unbounded};
use tuner_core::audio::Frame;
use tuner_core::engine::EngineOutput;
use tuner_core::preprocess::saturate;
use tuner_core::session::{SessionInputs, run_session, spawn_engine_worker};
use tuner_core::{RenderSink, RenderState, TunerEngine, Tuning};

const SR: u32 = 44100;
const N: usize = 2048;

fn tone_frame(freq: f64, index: usize) -> Frame {
    let amplitude = 2000.0 * 2f64.sqrt();
    let samples = (0..N)
        .map(|i| {
            let t = (i + index * N) as f64 / SR as f64;
            saturate(amplitude * (2.0 * PI * freq * t).sin())
        })
        .collect();
    Frame {
        samples,
        sample_rate: SR,
    }
}

#[derive(Default)]
struct Recording {
    events: Vec<Option<RenderState>>,
}

impl RenderSink for Recording {
    fn show(&mut self, state: &RenderState) {
        self.events.push(Some(state.clone()));
    }

    fn hide(&mut self) {
        self.events.push(None);
    }
}

#[test]
fn queued_retune_applies_before_the_next_frame() {
    let (frame_tx, frame_rx) = unbounded();
    let (retune_tx, retune_rx) = unbounded();
    let (_shutdown_tx, shutdown_rx) = bounded(1);

    let drop_d: Tuning = "D2,A2,D3,G3,B3,E4".parse().unwrap();
    retune_tx.send(drop_d).unwrap();
    for k in 0..4 {
        frame_tx.send(tone_frame(73.42, k)).unwrap();
    }
    drop(frame_tx);

    let mut engine = TunerEngine::default();
    let mut sink = Recording::default();
    let inputs = SessionInputs {
        frames: frame_rx,
        retune: retune_rx,
        shutdown: shutdown_rx,
    };
    let stats = run_session(&mut engine, Tuning::standard(), inputs, &mut sink);

    assert_eq!(stats.processed, 4);
    assert_eq!(stats.retunes, 1);
    let last = sink.events.last().cloned().flatten().expect("a rendering state");
    assert_eq!(last.note_name, "D2");
    assert!((last.detected_hz - 73.42).abs() < 0.5);
}

#[test]
fn pending_shutdown_wins_over_frames() {
    let (frame_tx, frame_rx) = unbounded();
    let (_retune_tx, retune_rx) = unbounded::<Tuning>();
    let (shutdown_tx, shutdown_rx) = bounded(1);
    frame_tx.send(tone_frame(110.0, 0)).unwrap();
    shutdown_tx.send(()).unwrap();

    let mut engine = TunerEngine::default();
    let mut sink = Recording::default();
    let inputs = SessionInputs {
        frames: frame_rx,
        retune: retune_rx,
        shutdown: shutdown_rx,
    };
    let stats = run_session(&mut engine, Tuning::standard(), inputs, &mut sink);
    assert_eq!(stats.processed, 0);
    assert!(sink.events.is_empty());
}

#[test]
fn worker_forwards_outputs_in_order() {
    let (frame_tx, frame_rx) = bounded(8);
    let (_retune_tx, retune_rx) = unbounded::<Tuning>();
    let (_shutdown_tx, shutdown_rx) = bounded(1);
    let (output_tx, output_rx) = unbounded();

    let inputs = SessionInputs {
        frames: frame_rx,
        retune: retune_rx,
        shutdown: shutdown_rx,
    };
    let worker = spawn_engine_worker(TunerEngine::default, Tuning::standard(), inputs, output_tx)
        .expect("spawn worker");

    frame_tx
        .send(Frame {
            samples: vec![0; N],
            sample_rate: SR,
        })
        .unwrap();
    for k in 0..3 {
        frame_tx.send(tone_frame(110.0, k)).unwrap();
    }
    drop(frame_tx);

    let stats = worker.join().expect("worker panicked");
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.hidden, 1);
    assert_eq!(stats.shown, 3);

    let outputs: Vec<EngineOutput> = output_rx.try_iter().collect();
    assert_eq!(outputs.len(), 4);
    assert_eq!(outputs[0], EngineOutput::Hide);
    for output in &outputs[1..] {
        match output {
            EngineOutput::Show(state) => assert_eq!(state.note_name, "A2"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn worker_stops_once_outputs_are_dropped() {
    let (frame_tx, frame_rx) = unbounded();
    let (_retune_tx, retune_rx) = unbounded::<Tuning>();
    let (_shutdown_tx, shutdown_rx) = bounded(1);
    let (output_tx, output_rx) = unbounded();
    drop(output_rx);

    for _ in 0..3 {
        frame_tx
            .send(Frame {
                samples: vec![0; N],
                sample_rate: SR,
            })
            .unwrap();
    }

    let inputs = SessionInputs {
        frames: frame_rx,
        retune: retune_rx,
        shutdown: shutdown_rx,
    };
    let worker = spawn_engine_worker(TunerEngine::default, Tuning::standard(), inputs, output_tx)
        .expect("spawn worker");

    // The frame source stays open; only the lost consumer ends the session.
    let stats = worker.join().expect("worker panicked");
    assert_eq!(stats.processed, 1);
    drop(frame_tx);
}
