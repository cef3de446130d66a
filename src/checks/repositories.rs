//! Repository validation ahead of an upgrade.

use anyhow::Context;
use tracing::info;

use crate::features::{Confine, FeatureSnapshot, UpstreamRepositories};
use crate::host::HostCommand;
use crate::procedures::PackagesInstall;
use crate::remediation::{verify_remediate, Remediation, Verification};
use crate::step::{
    Completion, ParamSpec, Params, Step, StepContext, StepError, StepMetadata, StepResult,
};

/// Repositories required for the target version are available.
///
/// Downstream hosts get one `subscription-manager refresh` if anything is
/// missing; upstream hosts probe the community repository.
pub struct ValidateRepositories {
    metadata: StepMetadata,
    params: Params,
}

impl ValidateRepositories {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::check(
                "validate-repositories",
                "Validate availability of repositories",
            )
            .tags(&["pre_upgrade"])
            .param(ParamSpec::required(
                "version",
                "Version for which repositories need to be validated",
            ))
            .manual_detection(),
            params,
        }
    }
}

impl Step for ValidateRepositories {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn preparation_steps(&self, features: &FeatureSnapshot) -> Vec<Box<dyn Step>> {
        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        if features.is_downstream() {
            steps.push(Box::new(NonRedHatRepository::new(Params::new())));
        }
        // No explicit packages: installs the host information package.
        steps.push(Box::new(PackagesInstall::new(Params::new())));
        steps
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let version = self.params.require("version")?;
        let features = ctx.features();

        let Some(downstream) = &features.downstream else {
            let upstream = features.upstream_repositories().unwrap_or(UpstreamRepositories);
            ctx.update(&format!("Checking upstream repositories for {}", version));
            if upstream.available(ctx.host(), ctx.config(), version)? {
                return Ok(Completion::Done);
            }
            return Err(StepError::failed(format!(
                "Upstream repositories for version {} are not available",
                version
            )));
        };

        if downstream.activation_key {
            return Ok(Completion::skip(
                "Your system is subscribed using a custom activation key",
            ));
        }

        ctx.update(&format!("Validating availability of repositories for {}", version));
        let host = ctx.host();
        let config = ctx.config();
        let verification = verify_remediate(
            ctx.progress(),
            Remediation {
                progress_message: "Some repositories missing, calling `subscription-manager refresh`",
                failure_message: "Following repositories are not available on your system",
            },
            || downstream.absent_repos(host, config, version),
            || downstream.refresh(host, config),
        )?;

        match verification {
            Verification::Satisfied => Ok(Completion::Done),
            Verification::Remediated { initial } => {
                info!(repositories = ?initial, "repositories available after refresh");
                Ok(Completion::Done)
            }
        }
    }
}

/// No non-Red Hat repositories are enabled on a downstream host.
pub struct NonRedHatRepository {
    metadata: StepMetadata,
    params: Params,
}

impl NonRedHatRepository {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::check(
                "non-rh-repositories",
                "Check whether system has any non Red Hat repositories enabled",
            )
            .tags(&["pre_upgrade"])
            .confine(Confine::Downstream)
            .manual_detection(),
            params,
        }
    }
}

impl Step for NonRedHatRepository {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        ctx.update("Checking enabled repositories");
        let output = ctx
            .host()
            .run(&HostCommand::query(
                &ctx.config().package_manager,
                ["repolist", "enabled", "-v"],
            ))
            .context("Failed to list enabled repositories")?;
        output.ensure_success("Listing enabled repositories")?;

        let foreign = non_red_hat_repositories(&output.stdout);
        if foreign.is_empty() {
            Ok(Completion::Done)
        } else {
            Err(StepError::failed(format!(
                "System has following non Red Hat repositories enabled: {}",
                foreign.join(", ")
            )))
        }
    }
}

/// Repo ids whose base URL is not served by Red Hat.
fn non_red_hat_repositories(repolist: &str) -> Vec<String> {
    let mut foreign = Vec::new();
    let mut current: Option<String> = None;
    for line in repolist.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Repo-id" => {
                // `yum` prints "id/arch"; keep the id
                let id = value.trim();
                current = Some(id.split('/').next().unwrap_or(id).to_string());
            }
            "Repo-baseurl" => {
                if let Some(id) = current.take() {
                    if !value.contains("redhat.com") && !value.contains("cdn.redhat") {
                        foreign.push(id);
                    }
                }
            }
            _ => {}
        }
    }
    foreign
}
