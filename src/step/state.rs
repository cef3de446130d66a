//! Per-step execution state machine.
//!
//! ```text
//! Pending ──start──▶ Running ──finish──▶ Success | Failed | Skipped | Warning
//!    │
//!    └────skip────▶ Skipped
//! ```
//!
//! Terminal states are final: a step is executed at most once and never
//! re-entered.

use std::fmt;
use std::time::Instant;
use thiserror::Error;

use super::{Completion, StepError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Success,
    Failed(String),
    Skipped(String),
    Warning(String),
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Short status label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "OK",
            Self::Failed(_) => "FAIL",
            Self::Skipped(_) => "SKIPPED",
            Self::Warning(_) => "WARNING",
        }
    }

    /// Message attached to a failed, skipped or warning state
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed(m) | Self::Skipped(m) | Self::Warning(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {}", self.label(), message),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Errors that can occur during step state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepTransitionError {
    #[error("Step '{label}' cannot start from state {state}")]
    NotPending { label: String, state: String },

    #[error("Step '{label}' cannot finish from state {state}")]
    NotRunning { label: String, state: String },
}

/// Tracks one step through its lifecycle.
#[derive(Debug, Clone)]
pub struct StepExecution {
    label: String,
    description: String,
    /// Label of the step this one was run in preparation for
    preparation_for: Option<String>,
    state: StepState,
    started: Option<Instant>,
    elapsed_ms: Option<u128>,
}

impl StepExecution {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            preparation_for: None,
            state: StepState::Pending,
            started: None,
            elapsed_ms: None,
        }
    }

    pub fn preparing(mut self, parent: impl Into<String>) -> Self {
        self.preparation_for = Some(parent.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn preparation_for(&self) -> Option<&str> {
        self.preparation_for.as_deref()
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    /// Wall time spent running, once finished
    pub fn elapsed_ms(&self) -> Option<u128> {
        self.elapsed_ms
    }

    /// Pending -> Running
    pub fn start(&mut self) -> Result<(), StepTransitionError> {
        if self.state != StepState::Pending {
            return Err(StepTransitionError::NotPending {
                label: self.label.clone(),
                state: self.state.to_string(),
            });
        }
        self.state = StepState::Running;
        self.started = Some(Instant::now());
        Ok(())
    }

    /// Running -> terminal state derived from the step result
    pub fn finish(
        &mut self,
        result: Result<Completion, StepError>,
    ) -> Result<&StepState, StepTransitionError> {
        if self.state != StepState::Running {
            return Err(StepTransitionError::NotRunning {
                label: self.label.clone(),
                state: self.state.to_string(),
            });
        }
        self.state = match result {
            Ok(Completion::Done) => StepState::Success,
            Ok(Completion::Skipped(reason)) => StepState::Skipped(reason),
            Ok(Completion::Warning(message)) => StepState::Warning(message),
            Err(err) => StepState::Failed(err.to_string()),
        };
        self.elapsed_ms = self.started.map(|s| s.elapsed().as_millis());
        Ok(&self.state)
    }

    /// Pending -> Skipped, for steps never run
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), StepTransitionError> {
        if self.state != StepState::Pending {
            return Err(StepTransitionError::NotPending {
                label: self.label.clone(),
                state: self.state.to_string(),
            });
        }
        self.state = StepState::Skipped(reason.into());
        Ok(())
    }
}
