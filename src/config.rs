//! Engine configuration file handling.
//!
//! Configuration is a JSON document. Every field has a default, so an empty
//! object (`{}`) is a valid configuration and running without `--config`
//! behaves exactly like loading one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// An additional managed service declared by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub priority: u32,
    /// Companion socket unit, e.g. `foreman.socket`
    #[serde(default)]
    pub socket: Option<String>,
}

/// Engine configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding persisted upgrade state
    pub state_dir: PathBuf,

    // Host tooling
    pub service_manager: String,
    pub package_query: String,
    pub package_manager: String,
    pub subscription_manager: String,
    pub legacy_service_command: String,
    /// HTTP client used to probe community repositories
    pub http_client: String,
    /// Installer used for the upgrade step; derived from the product when unset
    pub installer_command: Option<String>,

    /// Package providing host facts, installed ahead of repository validation
    pub info_package: String,

    /// Minimum free space under /var for the disk-space check
    pub min_free_space_mb: u64,

    /// Services managed in addition to the built-in catalog
    pub services: Vec<ServiceSpec>,

    /// Required repository ids per target version, overriding the defaults
    pub repositories: BTreeMap<String, Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/upkeep"),
            service_manager: "systemctl".to_string(),
            package_query: "rpm".to_string(),
            package_manager: "yum".to_string(),
            subscription_manager: "subscription-manager".to_string(),
            legacy_service_command: "katello-service".to_string(),
            http_client: "curl".to_string(),
            installer_command: None,
            info_package: "facter".to_string(),
            min_free_space_mb: 2048,
            services: Vec::new(),
            repositories: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults; validates either way.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let commands = [
            ("service_manager", &self.service_manager),
            ("package_query", &self.package_query),
            ("package_manager", &self.package_manager),
            ("subscription_manager", &self.subscription_manager),
            ("legacy_service_command", &self.legacy_service_command),
            ("http_client", &self.http_client),
        ];
        for (field, value) in commands {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", field);
            }
        }

        if let Some(installer) = &self.installer_command {
            if installer.trim().is_empty() {
                anyhow::bail!("installer_command must not be empty when set");
            }
        }

        if self.info_package.trim().is_empty() {
            anyhow::bail!("info_package must not be empty");
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            let name = service.name.trim();
            if name.is_empty() {
                anyhow::bail!("Service names must not be empty");
            }
            if name.contains(char::is_whitespace) {
                anyhow::bail!("Service name '{}' must not contain whitespace", name);
            }
            if !seen.insert(name) {
                anyhow::bail!("Service '{}' is declared more than once", name);
            }
        }

        for (version, repos) in &self.repositories {
            if repos.is_empty() {
                anyhow::bail!("Repository list for version {} must not be empty", version);
            }
        }

        Ok(())
    }

    /// Path of the persisted upgrade state file
    pub fn upgrade_state_path(&self) -> PathBuf {
        self.state_dir.join("upgrade_state.json")
    }
}
