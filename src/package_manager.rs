//! Package database queries and package transactions.
//!
//! Queries go through the configured package query tool (`rpm`), mutations
//! through the configured package manager (`yum`). Every mutation runs
//! non-interactively.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::host::{CommandOutput, Host, HostCommand};
use crate::version::Version;

/// Package manager bound to a host.
pub struct PackageManager<'a> {
    host: &'a dyn Host,
    query_tool: &'a str,
    manager: &'a str,
}

impl<'a> PackageManager<'a> {
    pub fn new(host: &'a dyn Host, config: &'a EngineConfig) -> Self {
        Self {
            host,
            query_tool: &config.package_query,
            manager: &config.package_manager,
        }
    }

    /// Whether `name` is installed.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        let output = self
            .host
            .run(&HostCommand::query(self.query_tool, ["-q", name]))
            .with_context(|| format!("Failed to query package {}", name))?;
        debug!(package = name, installed = output.success(), "package query");
        Ok(output.success())
    }

    /// Installed version of `name`, or None when it is not installed.
    pub fn version_of(&self, name: &str) -> Result<Option<Version>> {
        let output = self
            .host
            .run(&HostCommand::query(
                self.query_tool,
                ["-q", "--queryformat", "%{VERSION}", name],
            ))
            .with_context(|| format!("Failed to query version of {}", name))?;
        if !output.success() {
            return Ok(None);
        }
        let raw = output.stdout.trim();
        match Version::parse(raw) {
            Ok(version) => Ok(Some(version)),
            Err(e) => {
                warn!(package = name, output = raw, "unparsable package version: {}", e);
                Ok(None)
            }
        }
    }

    /// Install packages, answering yes to all prompts.
    pub fn install(&self, packages: &[String]) -> Result<CommandOutput> {
        if packages.is_empty() {
            warn!("install called with empty package list");
            return Ok(CommandOutput::ok(""));
        }
        info!("Installing packages: {:?}", packages);
        let mut args = vec!["install".to_string(), "-y".to_string()];
        args.extend(packages.iter().cloned());
        self.transaction(HostCommand::action(self.manager, args))
    }

    /// Update all packages.
    pub fn update(&self, assumeyes: bool) -> Result<CommandOutput> {
        let mut args = vec!["update".to_string()];
        if assumeyes {
            args.push("-y".to_string());
        }
        self.transaction(HostCommand::action(self.manager, args))
    }

    pub fn clean_cache(&self) -> Result<CommandOutput> {
        self.transaction(HostCommand::action(self.manager, ["clean", "all"]))
    }

    /// Pin installed product packages to their current versions.
    pub fn lock_versions(&self) -> Result<CommandOutput> {
        self.transaction(HostCommand::action(
            self.manager,
            ["versionlock", "add", "*"],
        ))
    }

    pub fn unlock_versions(&self) -> Result<CommandOutput> {
        self.transaction(HostCommand::action(self.manager, ["versionlock", "clear"]))
    }

    fn transaction(&self, command: HostCommand) -> Result<CommandOutput> {
        let output = self
            .host
            .run(&command)
            .with_context(|| format!("Failed to run {}", command))?;
        if output.success() {
            info!("Package transaction finished: {}", command);
        } else {
            warn!(
                "Package transaction failed (exit code {}): {}",
                output.status_code(),
                command
            );
        }
        Ok(output)
    }
}
