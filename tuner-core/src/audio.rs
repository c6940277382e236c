//! # Audio Capture Module
//!
//! This module turns the default input device into a stream of fixed-size
//! mono 16-bit [`Frame`]s for the tuner engine.
//!
//! ## Features
//! - Sample-rate probing over a list of standard rates
//! - Power-of-two frame length covering about 46 ms
//! - `i16` and `f32` devices, first channel only
//! - Non-blocking hand-off: frames are dropped rather than queued when the
//!   consumer falls behind

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedBufferSize};
use crossbeam_channel::Sender;
use log::{error, info, warn};

/// Rates tried in order; the first one the device accepts is used.
pub const CANDIDATE_SAMPLE_RATES: [u32; 7] = [48_000, 44_100, 32_000, 22_050, 16_000, 11_025, 8_000];

/// Rate used when the device accepts none of the candidates.
pub const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Target duration of one frame in seconds.
pub const FRAME_SECONDS: f64 = 0.046;

/// A block of mono samples at a known rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// What [`start_audio_capture`] settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub device_name: String,
    pub sample_rate: u32,
    pub frame_len: usize,
    pub channels: u16,
}

/// Picks the first candidate rate `accepts` approves, or 44.1 kHz.
pub fn choose_sample_rate(accepts: impl Fn(u32) -> bool) -> u32 {
    CANDIDATE_SAMPLE_RATES
        .iter()
        .copied()
        .find(|&rate| accepts(rate))
        .unwrap_or(FALLBACK_SAMPLE_RATE)
}

/// Frame length for a rate: the power of two covering ~46 ms, but never
/// below the device's minimum buffer.
pub fn frame_len_for(sample_rate: u32, device_min_frames: Option<u32>) -> usize {
    let target = ((sample_rate as f64 * FRAME_SECONDS) as usize)
        .max(1)
        .next_power_of_two();
    target.max(device_min_frames.unwrap_or(0) as usize)
}

/// Re-blocks an arbitrary sample stream into frames of a fixed length.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl FrameAssembler {
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            sample_rate,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Appends samples and returns every frame completed by them.
    pub fn push(&mut self, samples: impl IntoIterator<Item = i16>) -> Vec<Frame> {
        self.pending.extend(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let samples: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            frames.push(Frame {
                samples,
                sample_rate: self.sample_rate,
            });
        }
        frames
    }

    /// Samples waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Starts audio capture from the default input device.
///
/// # Arguments
/// * `sender` - Channel receiving completed frames
///
/// # Returns
/// * `Ok((stream, config))` - The running stream (capture stops when it is
///   dropped) and the chosen configuration
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_audio_capture(sender: Sender<Frame>) -> Result<(cpal::Stream, CaptureConfig)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    info!("[AUDIO] Using input device: {device_name}");

    let ranges: Vec<_> = device
        .supported_input_configs()
        .context("querying input configurations")?
        .filter(|c| matches!(c.sample_format(), cpal::SampleFormat::I16 | cpal::SampleFormat::F32))
        .collect();

    let rate = choose_sample_rate(|rate| {
        ranges
            .iter()
            .any(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0)
    });

    let supported = match ranges
        .iter()
        .filter(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.channels())
    {
        Some(range) => range.clone().with_sample_rate(cpal::SampleRate(rate)),
        None => device
            .default_input_config()
            .context("no supported rate, and no default input configuration")?,
    };

    let min_frames = match supported.buffer_size() {
        SupportedBufferSize::Range { min, .. } => Some(*min),
        SupportedBufferSize::Unknown => None,
    };
    let sample_rate = supported.sample_rate().0;
    let frame_len = frame_len_for(sample_rate, min_frames);
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    info!(
        "[AUDIO] {} Hz, {} channel(s), {:?}, {} samples per frame",
        sample_rate, stream_config.channels, sample_format, frame_len
    );

    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, frame_len, sender)?,
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, frame_len, sender)?,
        other => bail!("Unsupported sample format {other:?}"),
    };
    stream.play().context("starting the input stream")?;

    let config = CaptureConfig {
        device_name,
        sample_rate,
        frame_len,
        channels: stream_config.channels,
    };
    Ok((stream, config))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frame_len: usize,
    sender: Sender<Frame>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let mut assembler = FrameAssembler::new(frame_len, config.sample_rate.0);
    let mut dropped: u64 = 0;

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono = data.chunks(channels).map(|c| i16::from_sample(c[0]));
            for frame in assembler.push(mono) {
                // A full channel means the engine is behind; drop the frame.
                if sender.try_send(frame).is_err() {
                    dropped += 1;
                    if dropped.is_power_of_two() {
                        warn!("[AUDIO] {dropped} frames dropped so far");
                    }
                }
            }
        },
        |err| error!("[AUDIO] Stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
