//! Version to upgrade-scenario mapping.
//!
//! Populated once from the detected product identity and read-only after
//! that. A host with neither product installed gets an empty registry, so no
//! upgrade scenario is selectable.

use anyhow::Result;
use tracing::{debug, info};

use crate::features::ProductIdentity;
use crate::package_manager::PackageManager;

pub const SATELLITE_MAPPINGS: &[(&str, &str)] = &[
    ("6.2", "upgrade_to_satellite_6_2"),
    ("6.2.z", "upgrade_to_satellite_6_2_z"),
    ("6.3", "upgrade_to_satellite_6_3"),
    ("6.3.z", "upgrade_to_satellite_6_3_z"),
    ("6.4", "upgrade_to_satellite_6_4"),
    ("6.4.z", "upgrade_to_satellite_6_4_z"),
    ("6.5", "upgrade_to_satellite_6_5"),
    ("6.5.z", "upgrade_to_satellite_6_5_z"),
    ("6.6", "upgrade_to_satellite_6_6"),
    ("6.6.z", "upgrade_to_satellite_6_6_z"),
];

pub const CAPSULE_MAPPINGS: &[(&str, &str)] = &[
    ("6.7", "upgrade_to_capsule_6_7"),
    ("6.7.z", "upgrade_to_capsule_6_7_z"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRegistry {
    identity: Option<ProductIdentity>,
    entries: Vec<(&'static str, &'static str)>,
}

impl VersionRegistry {
    /// Registry for an already known identity.
    pub fn for_identity(identity: Option<ProductIdentity>) -> Self {
        let entries = match identity {
            Some(ProductIdentity::Server) => SATELLITE_MAPPINGS.to_vec(),
            Some(ProductIdentity::Capsule) => CAPSULE_MAPPINGS.to_vec(),
            None => Vec::new(),
        };
        debug!(?identity, versions = entries.len(), "version registry populated");
        Self { identity, entries }
    }

    /// Detect the installed product and register its versions.
    pub fn detect(packages: &PackageManager<'_>) -> Result<Self> {
        let identity = ProductIdentity::detect(packages)?;
        match identity {
            Some(identity) => info!(product = %identity, "detected managed product"),
            None => info!("no managed product detected; no upgrade versions registered"),
        }
        Ok(Self::for_identity(identity))
    }

    pub fn identity(&self) -> Option<ProductIdentity> {
        self.identity
    }

    /// Scenario tag registered for `version`.
    pub fn tag_for(&self, version: &str) -> Option<&'static str> {
        let version = version.trim();
        self.entries
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, tag)| *tag)
    }

    /// Registered versions, in registration order.
    pub fn versions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(v, _)| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
