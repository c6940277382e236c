//! Terminal rendering for the tuner.

pub mod cent_meter;
pub mod main_display;

pub use main_display::TerminalSink;
