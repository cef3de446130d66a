//! Progress and result reporting.
//!
//! Steps talk to a [`ProgressSink`] (a spinner-style line that can be
//! updated); the runner talks to a [`Reporter`], which is also a sink so the
//! running step's updates land in the same place.

use std::io::Write;

use crate::step::{StepMetadata, StepState};

/// Receives progress messages from a running step.
pub trait ProgressSink {
    fn update(&mut self, message: &str);
}

/// Receives step lifecycle events from the runner.
pub trait Reporter: ProgressSink {
    fn scenario_started(&mut self, _description: &str) {}

    fn step_started(&mut self, metadata: &StepMetadata);

    fn step_finished(&mut self, metadata: &StepMetadata, state: &StepState);

    fn scenario_finished(&mut self, _description: &str, _state: &StepState) {}
}

/// Status label used for result lines, e.g. `[OK]`.
pub fn status_label(state: &StepState) -> String {
    format!("[{}]", state.label())
}

/// Writes one line per step to a terminal or any other writer.
pub struct ConsoleReporter<W: Write> {
    out: W,
    width: usize,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub const DEFAULT_WIDTH: usize = 80;

    pub fn new(out: W) -> Self {
        Self {
            out,
            width: Self::DEFAULT_WIDTH,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // Reporting is best effort; a closed stdout must not fail the run.
        let _ = writeln!(self.out, "{}", text);
    }

    fn padded(&self, left: &str, right: &str) -> String {
        let used = left.chars().count() + right.chars().count();
        let pad = self.width.saturating_sub(used).max(1);
        format!("{}{}{}", left, " ".repeat(pad), right)
    }
}

impl<W: Write> ProgressSink for ConsoleReporter<W> {
    fn update(&mut self, message: &str) {
        self.line(&format!("  \\ {}", message));
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn scenario_started(&mut self, description: &str) {
        self.line(&format!("Running {}", description));
        self.line(&"=".repeat(self.width));
    }

    fn step_started(&mut self, metadata: &StepMetadata) {
        self.line(&format!("{}:", metadata.description));
    }

    fn step_finished(&mut self, metadata: &StepMetadata, state: &StepState) {
        let line = self.padded(&metadata.description, &status_label(state));
        self.line(&line);
        if let Some(message) = state.message() {
            self.line(message);
        }
        self.line(&"-".repeat(self.width));
    }

    fn scenario_finished(&mut self, description: &str, state: &StepState) {
        let line = self.padded(description, &status_label(state));
        self.line(&line);
    }
}

/// Discards everything. Used where progress has no audience.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&mut self, _message: &str) {}
}
