//! Package transactions.

use super::command_result;
use crate::package_manager::PackageManager;
use crate::step::{Completion, ParamSpec, Params, Step, StepContext, StepMetadata, StepResult};

macro_rules! step_accessors {
    () => {
        fn metadata(&self) -> &StepMetadata {
            &self.metadata
        }

        fn params(&self) -> &Params {
            &self.params
        }
    };
}

/// Install packages; with no `packages` parameter, the host information
/// package from the configuration.
pub struct PackagesInstall {
    metadata: StepMetadata,
    params: Params,
}

impl PackagesInstall {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure("packages-install", "Install packages")
                .param(ParamSpec::optional(
                    "packages",
                    "Comma-separated packages to install",
                )),
            params,
        }
    }
}

impl Step for PackagesInstall {
    step_accessors!();

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let mut packages = self.params.list("packages");
        if packages.is_empty() {
            packages.push(ctx.config().info_package.clone());
        }
        let manager = PackageManager::new(ctx.host(), ctx.config());

        let mut missing = Vec::new();
        for package in packages {
            if !manager.is_installed(&package)? {
                missing.push(package);
            }
        }
        if missing.is_empty() {
            return Ok(Completion::skip("Packages already installed"));
        }

        ctx.update(&format!("Installing {}", missing.join(", ")));
        command_result("Package installation", manager.install(&missing)?)
    }
}

pub struct PackagesUpdate {
    metadata: StepMetadata,
    params: Params,
}

impl PackagesUpdate {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure("packages-update", "Update packages").param(
                ParamSpec::optional("assumeyes", "Answer yes to all package manager questions"),
            ),
            params,
        }
    }
}

impl Step for PackagesUpdate {
    step_accessors!();

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        ctx.update("Updating packages");
        let manager = PackageManager::new(ctx.host(), ctx.config());
        command_result("Package update", manager.update(self.params.flag("assumeyes"))?)
    }
}

pub struct PackagesCleanCache {
    metadata: StepMetadata,
    params: Params,
}

impl PackagesCleanCache {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure("packages-clean-cache", "Clean package manager cache")
                .tags(&["pre_migrations"]),
            params,
        }
    }
}

impl Step for PackagesCleanCache {
    step_accessors!();

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let manager = PackageManager::new(ctx.host(), ctx.config());
        command_result("Cleaning package cache", manager.clean_cache()?)
    }
}

pub struct PackagesUnlockVersions {
    metadata: StepMetadata,
    params: Params,
}

impl PackagesUnlockVersions {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure(
                "packages-unlock-versions",
                "Unlock packages to allow upgrading",
            ),
            params,
        }
    }
}

impl Step for PackagesUnlockVersions {
    step_accessors!();

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let manager = PackageManager::new(ctx.host(), ctx.config());
        command_result("Unlocking packages", manager.unlock_versions()?)
    }
}

pub struct PackagesLockVersions {
    metadata: StepMetadata,
    params: Params,
}

impl PackagesLockVersions {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure(
                "packages-lock-versions",
                "Lock packages to prevent accidental upgrades",
            )
            .tags(&["post_migrations"]),
            params,
        }
    }
}

impl Step for PackagesLockVersions {
    step_accessors!();

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let manager = PackageManager::new(ctx.host(), ctx.config());
        command_result("Locking packages", manager.lock_versions()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::features::{CapabilityRegistry, FeatureSnapshot};
    use crate::host::{CommandOutput, ScriptedHost};
    use crate::progress::NullProgress;

    #[test]
    fn test_install_defaults_to_info_package() {
        let host = ScriptedHost::new();
        host.respond("rpm -q facter", CommandOutput::with_status(1, "not installed"));
        let config = EngineConfig::default();
        let registry = CapabilityRegistry::new(&host, &config);
        let features = FeatureSnapshot::default();
        let mut progress = NullProgress;
        let mut ctx = StepContext::new(&registry, &features, &mut progress);

        let result = PackagesInstall::new(Params::new()).run(&mut ctx);
        assert!(matches!(result, Ok(Completion::Done)));
        assert_eq!(host.count("yum install -y facter"), 1);
    }

    #[test]
    fn test_install_skips_present_packages() {
        let host = ScriptedHost::new();
        let config = EngineConfig::default();
        let registry = CapabilityRegistry::new(&host, &config);
        let features = FeatureSnapshot::default();
        let mut progress = NullProgress;
        let mut ctx = StepContext::new(&registry, &features, &mut progress);

        let step = PackagesInstall::new(Params::new().with("packages", "ruby"));
        assert!(matches!(step.run(&mut ctx), Ok(Completion::Skipped(_))));
        assert!(host.commands_starting_with("yum").is_empty());
    }

    #[test]
    fn test_update_failure_carries_output() {
        let host = ScriptedHost::new();
        host.respond(
            "yum update -y",
            CommandOutput::with_status(1, "Error: Package conflicts"),
        );
        let config = EngineConfig::default();
        let registry = CapabilityRegistry::new(&host, &config);
        let features = FeatureSnapshot::default();
        let mut progress = NullProgress;
        let mut ctx = StepContext::new(&registry, &features, &mut progress);

        let step = PackagesUpdate::new(Params::new().with("assumeyes", "true"));
        let err = step.run(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("Package conflicts"));
    }
}
