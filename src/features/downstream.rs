//! Subscribed-product capabilities: repository availability and refresh.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::ProductIdentity;
use crate::config::EngineConfig;
use crate::host::{CommandOutput, Host, HostCommand};
use crate::version::Version;

/// Facts about a downstream (subscribed) installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downstream {
    pub identity: ProductIdentity,
    /// Installed product version; None if the package reports garbage
    pub version: Option<Version>,
    /// Registered through an external organization activation key
    pub activation_key: bool,
}

impl Downstream {
    /// True if the installed product is older than `version`.
    pub fn less_than_version(&self, version: &str) -> bool {
        self.version.as_ref().is_some_and(|v| v.less_than(version))
    }

    /// Repository ids that must be available to upgrade to `version`.
    pub fn required_repositories(&self, config: &EngineConfig, version: &str) -> Vec<String> {
        let bare = version.trim_end_matches(".z");
        if let Some(repos) = config
            .repositories
            .get(version)
            .or_else(|| config.repositories.get(bare))
        {
            return repos.clone();
        }

        let product_repo = match self.identity {
            ProductIdentity::Server => format!("rhel-7-server-satellite-{}-rpms", bare),
            ProductIdentity::Capsule => format!("rhel-7-server-satellite-capsule-{}-rpms", bare),
        };
        vec![
            "rhel-7-server-rpms".to_string(),
            "rhel-server-rhscl-7-rpms".to_string(),
            product_repo,
            "rhel-7-server-satellite-maintenance-6-rpms".to_string(),
        ]
    }

    /// Repository ids the subscription currently makes available.
    pub fn available_repositories(
        &self,
        host: &dyn Host,
        config: &EngineConfig,
    ) -> Result<Vec<String>> {
        let output = host
            .run(&HostCommand::query(
                &config.subscription_manager,
                ["repos", "--list"],
            ))
            .context("Failed to list subscription repositories")?;
        output.ensure_success("Listing subscription repositories")?;
        Ok(parse_repo_ids(&output.stdout))
    }

    /// Required repositories for `version` that are not available, in
    /// requirement order.
    pub fn absent_repos(
        &self,
        host: &dyn Host,
        config: &EngineConfig,
        version: &str,
    ) -> Result<Vec<String>> {
        let available = self.available_repositories(host, config)?;
        let absent: Vec<String> = self
            .required_repositories(config, version)
            .into_iter()
            .filter(|repo| !available.contains(repo))
            .collect();
        debug!(version, ?absent, "absent repositories");
        Ok(absent)
    }

    /// Ask the subscription service to refresh entitlements.
    pub fn refresh(&self, host: &dyn Host, config: &EngineConfig) -> Result<CommandOutput> {
        info!("Refreshing subscription data");
        host.run(&HostCommand::action(&config.subscription_manager, ["refresh"]))
            .context("Failed to refresh subscription data")
    }
}

/// Availability of community repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamRepositories;

impl UpstreamRepositories {
    pub const BASE_URL: &'static str = "https://yum.theforeman.org/katello";

    pub fn repository_url(version: &str) -> String {
        format!("{}/{}/katello/el7/x86_64/", Self::BASE_URL, version)
    }

    /// Whether the repository for `version` answers.
    pub fn available(&self, host: &dyn Host, config: &EngineConfig, version: &str) -> Result<bool> {
        let url = Self::repository_url(version);
        let output = host
            .run(&HostCommand::query(
                &config.http_client,
                ["--silent", "--head", "--fail", "--max-time", "30", url.as_str()],
            ))
            .with_context(|| format!("Failed to probe {}", url))?;
        Ok(output.success())
    }
}

/// Extract `Repo ID:` values from `subscription-manager repos` output.
pub(crate) fn parse_repo_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Repo ID:"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}
