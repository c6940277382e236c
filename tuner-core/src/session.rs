//! # Session Driver
//!
//! Feeds frames to a [`TunerEngine`] strictly in arrival order and hands
//! each result to a [`RenderSink`]. The loop also accepts tuning changes
//! and a shutdown signal between frames, never in the middle of one.
//! Control messages already waiting when a frame arrives are handled first.
//!
//! [`spawn_engine_worker`] runs the same loop on its own thread. Only the
//! immutable [`EngineOutput`] values leave that thread; the engine and its
//! pitch memory stay behind.

use crate::RenderState;
use crate::audio::Frame;
use crate::engine::{EngineOutput, TunerEngine};
use crate::tuning::Tuning;
use crossbeam_channel::{Receiver, Sender, TryRecvError, never, select};
use log::{debug, info};
use std::io;
use std::thread::{self, JoinHandle};

/// Receives the display decisions of the engine.
pub trait RenderSink {
    fn show(&mut self, state: &RenderState);
    fn hide(&mut self);

    /// A closed sink ends the session after the current frame.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Routes one engine output to a sink. `NoChange` touches nothing.
pub fn dispatch<S: RenderSink + ?Sized>(output: &EngineOutput, sink: &mut S) {
    match output {
        EngineOutput::Show(state) => sink.show(state),
        EngineOutput::Hide => sink.hide(),
        EngineOutput::NoChange => {}
    }
}

/// Forwards shown and hidden states over a channel.
///
/// The sink closes once the receiving side has been dropped.
pub struct ChannelSink {
    sender: Sender<EngineOutput>,
    closed: bool,
}

impl ChannelSink {
    pub fn new(sender: Sender<EngineOutput>) -> Self {
        Self {
            sender,
            closed: false,
        }
    }

    fn forward(&mut self, output: EngineOutput) {
        if self.sender.send(output).is_err() {
            if !self.closed {
                debug!("[SESSION] Output consumer disconnected");
            }
            self.closed = true;
        }
    }
}

impl RenderSink for ChannelSink {
    fn show(&mut self, state: &RenderState) {
        self.forward(EngineOutput::Show(state.clone()));
    }

    fn hide(&mut self) {
        self.forward(EngineOutput::Hide);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Channels a session listens on.
pub struct SessionInputs {
    /// Frames to analyse. The session ends when this disconnects.
    pub frames: Receiver<Frame>,
    /// Tuning reassignments, applied before the next frame.
    pub retune: Receiver<Tuning>,
    /// Any message or a disconnect ends the session.
    pub shutdown: Receiver<()>,
}

/// Counters returned when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub processed: u64,
    pub shown: u64,
    pub hidden: u64,
    pub unchanged: u64,
    pub retunes: u64,
}

/// Runs the engine over incoming frames until shutdown or end of input.
pub fn run_session<S: RenderSink + ?Sized>(
    engine: &mut TunerEngine,
    mut tuning: Tuning,
    inputs: SessionInputs,
    sink: &mut S,
) -> SessionStats {
    let mut stats = SessionStats::default();
    let closed_retune = never::<Tuning>();
    let mut retune_open = true;
    info!("[SESSION] Started with tuning {tuning}");

    loop {
        let retune_rx = if retune_open { &inputs.retune } else { &closed_retune };
        select! {
            recv(inputs.frames) -> msg => match msg {
                Ok(frame) => {
                    if shutdown_requested(&inputs.shutdown) {
                        info!("[SESSION] Received shutdown signal");
                        break;
                    }
                    if retune_open {
                        retune_open = apply_pending_retunes(&inputs.retune, &mut tuning, &mut stats);
                    }
                    let output = engine.process_frame(&frame.samples, frame.sample_rate, &tuning);
                    stats.processed += 1;
                    match &output {
                        EngineOutput::Show(_) => stats.shown += 1,
                        EngineOutput::Hide => stats.hidden += 1,
                        EngineOutput::NoChange => stats.unchanged += 1,
                    }
                    dispatch(&output, sink);
                    if sink.is_closed() {
                        info!("[SESSION] Render sink closed");
                        break;
                    }
                }
                Err(_) => {
                    info!("[SESSION] Frame source closed");
                    break;
                }
            },
            recv(retune_rx) -> msg => match msg {
                Ok(next) => retune(&mut tuning, next, &mut stats),
                Err(_) => {
                    debug!("[SESSION] Retune channel closed");
                    retune_open = false;
                }
            },
            recv(inputs.shutdown) -> _ => {
                info!("[SESSION] Received shutdown signal");
                break;
            },
        }
    }

    info!(
        "[SESSION] Finished: {} frames, {} shown, {} hidden, {} unchanged",
        stats.processed, stats.shown, stats.hidden, stats.unchanged
    );
    stats
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

fn retune(tuning: &mut Tuning, next: Tuning, stats: &mut SessionStats) {
    info!("[SESSION] Retuned to {next}");
    *tuning = next;
    stats.retunes += 1;
}

/// Applies every queued tuning change. Returns `false` once the channel is closed.
fn apply_pending_retunes(
    retunes: &Receiver<Tuning>,
    tuning: &mut Tuning,
    stats: &mut SessionStats,
) -> bool {
    loop {
        match retunes.try_recv() {
            Ok(next) => retune(tuning, next, stats),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Runs a session on a dedicated `tuner-engine` thread.
///
/// The engine is built on the worker thread by `build_engine`. Shown and
/// hidden states are sent to `outputs`; the thread returns the session's
/// [`SessionStats`] when joined.
pub fn spawn_engine_worker<F>(
    build_engine: F,
    tuning: Tuning,
    inputs: SessionInputs,
    outputs: Sender<EngineOutput>,
) -> io::Result<JoinHandle<SessionStats>>
where
    F: FnOnce() -> TunerEngine + Send + 'static,
{
    thread::Builder::new()
        .name("tuner-engine".to_string())
        .spawn(move || {
            let mut engine = build_engine();
            let mut sink = ChannelSink::new(outputs);
            run_session(&mut engine, tuning, inputs, &mut sink)
        })
}
