//! Procedures: steps that change the host.

mod packages;
mod service;
mod system;

pub use packages::{
    PackagesCleanCache, PackagesInstall, PackagesLockVersions, PackagesUnlockVersions,
    PackagesUpdate,
};
pub use service::{perform_service_action, ServiceProcedure};
pub use system::{ApipieCache, InstallerUpgrade, RepositoriesSetup};

use crate::host::CommandOutput;
use crate::step::{Completion, StepError, StepResult};

/// Turn a finished host command into a step result, carrying its output on
/// failure.
pub(crate) fn command_result(what: &str, output: CommandOutput) -> StepResult {
    if output.success() {
        Ok(Completion::Done)
    } else {
        Err(StepError::failed(format!(
            "{} failed (exit code {}):\n{}",
            what,
            output.status_code(),
            output.combined()
        )))
    }
}
