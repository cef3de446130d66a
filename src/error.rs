//! Error handling module for upkeep
//!
//! Provides the crate-level error type. Each subsystem keeps its own narrow
//! error enum (composition, service control, step execution) and converts into
//! `UpkeepError` at the boundary.

use thiserror::Error;

use crate::scenario::CompositionError;
use crate::service::ServiceError;
use crate::step::StepTransitionError;
use crate::version::VersionError;

/// Main error type for upkeep
#[derive(Error, Debug)]
pub enum UpkeepError {
    /// IO errors (state files, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario could not be built
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    /// Service lifecycle errors raised before any host mutation
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Illegal step state transition
    #[error("Step state error: {0}")]
    Step(#[from] StepTransitionError),

    /// Host interaction errors (spawning commands, reading output)
    #[error("Host error: {0}")]
    Host(String),

    /// Persisted upgrade state errors
    #[error("State error: {0}")]
    State(String),

    /// Version strings that could not be parsed
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors
    #[error("{0}")]
    General(String),
}

/// Result type alias for upkeep operations
pub type Result<T> = std::result::Result<T, UpkeepError>;

impl UpkeepError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a host error
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}

impl From<anyhow::Error> for UpkeepError {
    fn from(err: anyhow::Error) -> Self {
        Self::Host(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UpkeepError::config("service_manager must not be empty");
        assert_eq!(
            err.to_string(),
            "Configuration error: service_manager must not be empty"
        );

        let err = UpkeepError::state("corrupt upgrade state");
        assert_eq!(err.to_string(), "State error: corrupt upgrade state");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: UpkeepError = io_err.into();
        assert!(matches!(err, UpkeepError::Io(_)));
    }

    #[test]
    fn test_anyhow_conversion_keeps_context_chain() {
        let err = anyhow::anyhow!("exit 127").context("Failed to spawn rpm");
        let err: UpkeepError = err.into();
        assert!(matches!(err, UpkeepError::Host(_)));
        let msg = err.to_string();
        assert!(msg.contains("Failed to spawn rpm"));
        assert!(msg.contains("exit 127"));
    }

    #[test]
    fn test_service_error_conversion() {
        let err: UpkeepError = ServiceError::UnsupportedAction("reload".into()).into();
        assert!(matches!(err, UpkeepError::Service(_)));
        assert!(err.to_string().contains("reload"));
    }
}
