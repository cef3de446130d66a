//! Verify, remediate once, verify again.
//!
//! Validation checks use [`verify_remediate`] to give the host one chance to
//! fix itself: the probe lists what is missing, a single corrective action
//! runs if anything is, and the probe runs exactly once more. There is no
//! loop and no retry of the corrective action.

use thiserror::Error;
use tracing::{info, warn};

use crate::progress::ProgressSink;

#[derive(Error, Debug)]
pub enum RemediationError {
    #[error("{message}: {} (before remediation: {})", .after.join(", "), .before.join(", "))]
    StillUnsatisfied {
        message: String,
        /// Violations found before remediation
        before: Vec<String>,
        /// Violations remaining after remediation
        after: Vec<String>,
    },

    #[error("Readiness probe failed: {0:#}")]
    Probe(anyhow::Error),
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Nothing was missing
    Satisfied,
    /// The corrective action fixed these items
    Remediated { initial: Vec<String> },
}

/// What to run and how to describe it.
pub struct Remediation<'m> {
    /// Shown while the corrective action runs
    pub progress_message: &'m str,
    /// Prefix of the failure message when violations remain
    pub failure_message: &'m str,
}

/// Run `probe`; if it reports violations, run `remedy` once and re-probe.
///
/// A failing `remedy` is logged and the re-probe still decides the outcome.
pub fn verify_remediate<P, R, T>(
    progress: &mut dyn ProgressSink,
    remediation: Remediation<'_>,
    mut probe: P,
    remedy: R,
) -> Result<Verification, RemediationError>
where
    P: FnMut() -> anyhow::Result<Vec<String>>,
    R: FnOnce() -> anyhow::Result<T>,
{
    let before = probe().map_err(RemediationError::Probe)?;
    if before.is_empty() {
        return Ok(Verification::Satisfied);
    }

    info!(violations = ?before, "attempting remediation");
    progress.update(remediation.progress_message);
    if let Err(err) = remedy() {
        warn!("Remediation command failed: {:#}", err);
    }

    let after = probe().map_err(RemediationError::Probe)?;
    if after.is_empty() {
        Ok(Verification::Remediated { initial: before })
    } else {
        Err(RemediationError::StillUnsatisfied {
            message: remediation.failure_message.to_string(),
            before,
            after,
        })
    }
}
