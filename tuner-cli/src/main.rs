// tuner-cli/src/main.rs

//! Live guitar tuner in the terminal.
//!
//! Three threads cooperate: the cpal capture callback produces frames, the
//! `tuner-engine` worker turns them into display decisions, and the main
//! thread renders those decisions. An optional conditioning thread sits
//! between capture and engine when `--gain` or `--lowpass` is given.

mod ui;

use std::fs;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command, value_parser};
use crossbeam_channel::{Receiver, TrySendError, after, bounded, never, select, unbounded};
use log::{info, warn};
use tuner_core::audio::{Frame, start_audio_capture};
use tuner_core::preprocess::{amplify_in_place, low_pass};
use tuner_core::session::{SessionInputs, dispatch, spawn_engine_worker};
use tuner_core::tuning::{DEFAULT_OPTION_RANGE, find_note, tuning_options_for};
use tuner_core::{LogObserver, TunerConfig, TunerEngine, TunerError, Tuning};

use ui::TerminalSink;

/// Frames buffered between capture and engine before capture starts dropping.
const FRAME_QUEUE: usize = 8;

fn cli() -> Command {
    Command::new("tuner")
        .about("Guitar tuner reading the default input device")
        .arg(
            Arg::new("tuning")
                .long("tuning")
                .value_name("NOTES")
                .default_value("E2,A2,D3,G3,B3,E4")
                .help("Six comma-separated target notes, low string first"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON file overriding pipeline settings"),
        )
        .arg(
            Arg::new("gain")
                .long("gain")
                .value_name("F")
                .value_parser(value_parser!(f32))
                .help("Amplify captured frames by this factor"),
        )
        .arg(
            Arg::new("lowpass")
                .long("lowpass")
                .value_name("HZ")
                .value_parser(value_parser!(f32))
                .help("Low-pass captured frames at this cutoff"),
        )
        .arg(
            Arg::new("seconds")
                .long("seconds")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Stop after N seconds instead of running until interrupted"),
        )
        .arg(
            Arg::new("options")
                .long("options")
                .value_name("NOTE")
                .help("List the notes a string tuned to NOTE can be retuned to, then exit"),
        )
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = cli().get_matches();

    if let Some(name) = matches.get_one::<String>("options") {
        return print_options(name);
    }

    let tuning: Tuning = matches
        .get_one::<String>("tuning")
        .map(String::as_str)
        .unwrap_or_default()
        .parse()
        .context("parsing --tuning")?;
    let config = load_config(&matches)?;
    info!("[MAIN] Tuning: {tuning}");

    run(&matches, tuning, config)
}

fn print_options(name: &str) -> Result<()> {
    let note = find_note(name).ok_or_else(|| TunerError::UnknownNote(name.to_string()))?;
    let options = tuning_options_for(note, DEFAULT_OPTION_RANGE);
    for option in options {
        println!("{:<3} {:>7.2} Hz", option.name, option.frequency);
    }
    Ok(())
}

fn load_config(matches: &ArgMatches) -> Result<TunerConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            let config =
                TunerConfig::from_json(&text).with_context(|| format!("loading config {path}"))?;
            info!("[MAIN] Loaded configuration from {path}");
            Ok(config)
        }
        None => Ok(TunerConfig::default()),
    }
}

fn run(matches: &ArgMatches, tuning: Tuning, config: TunerConfig) -> Result<()> {
    let (raw_tx, raw_rx) = bounded::<Frame>(FRAME_QUEUE);
    let (stream, capture) = start_audio_capture(raw_tx).context("starting audio capture")?;
    info!(
        "[MAIN] Capturing from {} at {} Hz, {} samples per frame",
        capture.device_name, capture.sample_rate, capture.frame_len
    );

    let gain = matches.get_one::<f32>("gain").copied();
    let lowpass = matches.get_one::<f32>("lowpass").copied();
    let (frames, conditioner) = if gain.is_some() || lowpass.is_some() {
        let (rx, handle) = spawn_conditioner(raw_rx, gain, lowpass)?;
        (rx, Some(handle))
    } else {
        (raw_rx, None)
    };

    // Tunings are fixed for a CLI run; the sender only keeps the channel open.
    let (_retune_tx, retune_rx) = unbounded::<Tuning>();
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let (output_tx, output_rx) = unbounded();

    let every_n = config.engine.log_every_n_frames;
    let inputs = SessionInputs {
        frames,
        retune: retune_rx,
        shutdown: shutdown_rx,
    };
    let worker = spawn_engine_worker(
        move || TunerEngine::with_observer(config, Box::new(LogObserver::new(every_n))),
        tuning,
        inputs,
        output_tx,
    )
    .context("spawning the engine worker")?;

    let deadline = match matches.get_one::<u64>("seconds") {
        Some(&secs) => after(Duration::from_secs(secs)),
        None => never(),
    };

    let mut sink = TerminalSink::stdout();
    loop {
        select! {
            recv(output_rx) -> msg => match msg {
                Ok(output) => dispatch(&output, &mut sink),
                Err(_) => {
                    warn!("[MAIN] Engine worker stopped");
                    break;
                }
            },
            recv(deadline) -> _ => {
                info!("[MAIN] Run time elapsed - shutting down");
                break;
            },
        }
    }
    sink.finish();

    // The worker may already be gone; a failed send is fine.
    let _ = shutdown_tx.send(());
    let stats = worker
        .join()
        .map_err(|_| anyhow!("engine worker panicked"))?;
    info!(
        "[MAIN] {} frames processed, {} shown, {} hidden",
        stats.processed, stats.shown, stats.hidden
    );

    // Dropping the stream closes the frame channel for the conditioner.
    drop(stream);
    if let Some(handle) = conditioner {
        if handle.join().is_err() {
            warn!("[MAIN] Conditioning thread panicked");
        }
    }
    Ok(())
}

/// Applies `--gain` and `--lowpass` to captured frames on a separate thread.
fn spawn_conditioner(
    raw: Receiver<Frame>,
    gain: Option<f32>,
    lowpass: Option<f32>,
) -> Result<(Receiver<Frame>, JoinHandle<()>)> {
    let (tx, rx) = bounded::<Frame>(FRAME_QUEUE);
    let handle = thread::Builder::new()
        .name("tuner-condition".to_string())
        .spawn(move || {
            for mut frame in raw {
                if let Some(cutoff) = lowpass {
                    frame.samples = low_pass(&frame.samples, cutoff, frame.sample_rate);
                }
                if let Some(factor) = gain {
                    amplify_in_place(&mut frame.samples, factor);
                }
                match tx.try_send(frame) {
                    Ok(()) => {}
                    // The engine is behind; drop the frame as capture does.
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        })
        .context("spawning the conditioning thread")?;
    Ok((rx, handle))
}
