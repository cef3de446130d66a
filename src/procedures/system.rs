use anyhow::Context;
use tracing::info;

use super::command_result;
use crate::features::{Confine, UpstreamRepositories};
use crate::host::HostCommand;
use crate::package_manager::PackageManager;
use crate::step::{ParamSpec, Params, Step, StepContext, StepMetadata, StepResult};

/// Enable the repositories for the target version.
pub struct RepositoriesSetup {
    metadata: StepMetadata,
    params: Params,
}

impl RepositoriesSetup {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure(
                "repositories-setup",
                "Setup repositories for the target version",
            )
            .param(ParamSpec::required(
                "version",
                "Version for which repositories need to be set up",
            )),
            params,
        }
    }
}

impl Step for RepositoriesSetup {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let version = self.params.require("version")?;
        ctx.update(&format!("Configuring repositories for {}", version));

        let Some(downstream) = &ctx.features().downstream else {
            let release = format!(
                "{}katello-repos-latest.rpm",
                UpstreamRepositories::repository_url(version)
            );
            let manager = PackageManager::new(ctx.host(), ctx.config());
            return command_result("Repository setup", manager.install(&[release])?);
        };

        let repos = downstream.required_repositories(ctx.config(), version);
        info!(version, ?repos, "enabling repositories");
        let mut args = vec!["repos".to_string(), "--disable".to_string(), "*".to_string()];
        for repo in repos {
            args.push("--enable".to_string());
            args.push(repo);
        }
        let output = ctx
            .host()
            .run(&HostCommand::action(&ctx.config().subscription_manager, args))
            .context("Failed to configure repositories")?;
        command_result("Repository setup", output)
    }
}

/// Run the product installer in upgrade mode.
pub struct InstallerUpgrade {
    metadata: StepMetadata,
    params: Params,
}

impl InstallerUpgrade {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure("installer-upgrade", "Run installer upgrade"),
            params,
        }
    }
}

impl Step for InstallerUpgrade {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let config = ctx.config();
        let command = match ctx.features().identity() {
            Some(identity) => HostCommand::action(
                config
                    .installer_command
                    .as_deref()
                    .unwrap_or("satellite-installer"),
                ["--scenario", identity.installer_scenario(), "--upgrade"],
            ),
            None => HostCommand::action(
                config.installer_command.as_deref().unwrap_or("foreman-installer"),
                ["--upgrade"],
            ),
        };
        ctx.update(&format!("Running {}", command));
        let output = ctx
            .host()
            .run(&command)
            .with_context(|| format!("Failed to run {}", command))?;
        command_result("Installer upgrade", output)
    }
}

/// Regenerate the API documentation cache.
pub struct ApipieCache {
    metadata: StepMetadata,
    params: Params,
}

impl ApipieCache {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::procedure("apipie-cache", "Regenerate Apipie cache")
                .confine(Confine::ForemanServer),
            params,
        }
    }
}

impl Step for ApipieCache {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let output = ctx
            .host()
            .run(&HostCommand::action("foreman-rake", ["apipie:cache:index"]))
            .context("Failed to regenerate the Apipie cache")?;
        command_result("Apipie cache regeneration", output)
    }
}
