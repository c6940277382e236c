//! # Main Display
//!
//! Single-line terminal view of the tuner. Each shown state rewrites the
//! line in place; a hide blanks it.

use std::io::{self, Write};

use log::warn;
use tuner_core::{RenderSink, RenderState};

use super::cent_meter::CentMeter;

/// Cells between the meter brackets.
const METER_WIDTH: usize = 41;

/// Formats one rendering state as a status line.
pub fn status_line(state: &RenderState) -> String {
    let cents = state.cents_deviation();
    let meter = CentMeter::new(Some(cents));
    let zone = meter.zone().map_or("", |z| z.label());
    format!(
        "{:<3} {:>7.2} Hz | {:>7.2} Hz {:>+6.1} ct {} {}",
        state.note_name,
        state.note_hz,
        state.detected_hz,
        cents,
        meter.render(METER_WIDTH),
        zone
    )
}

/// Renders engine outputs to a terminal, one rewritten line.
pub struct TerminalSink<W: Write> {
    out: W,
    last_len: usize,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, last_len: 0 }
    }

    /// Moves past the status line so later output starts on a fresh line.
    pub fn finish(&mut self) {
        if self.last_len > 0 {
            self.write_raw("\n");
            self.last_len = 0;
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        // Pad over leftovers of a longer previous line.
        let pad = self.last_len.saturating_sub(line.chars().count());
        let text = format!("\r{line}{}", " ".repeat(pad));
        self.write_raw(&text);
        self.last_len = line.chars().count();
    }

    fn write_raw(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("[VIEW] Terminal write failed: {e}");
        }
    }
}

impl<W: Write> RenderSink for TerminalSink<W> {
    fn show(&mut self, state: &RenderState) {
        let line = status_line(state);
        self.write_line(&line);
    }

    fn hide(&mut self) {
        if self.last_len > 0 {
            let blank = " ".repeat(self.last_len);
            self.write_raw(&format!("\r{blank}\r"));
            self.last_len = 0;
        }
    }
}
