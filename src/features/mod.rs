//! Capability registry
//!
//! Features are facts about the managed host (which product is installed,
//! at which version, how it is subscribed) plus the capabilities that come
//! with them. The registry detects each feature on first use and caches the
//! result for the rest of the process; a cached feature is never re-detected.
//!
//! Confinement never talks to the registry directly. It evaluates against a
//! [`FeatureSnapshot`], the fully resolved view taken once before
//! composition.

mod confine;
mod downstream;

pub use confine::Confine;
pub use downstream::{Downstream, UpstreamRepositories};

use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::debug;

use crate::config::EngineConfig;
use crate::host::Host;
use crate::package_manager::PackageManager;
use crate::version::Version;

/// Environment variables marking a host registered with a custom activation key.
pub const ACTIVATION_KEY_ENV: (&str, &str) = ("EXTERNAL_SAT_ORG", "EXTERNAL_SAT_ACTIVATION_KEY");

/// Managed product identity, detected from installed packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ProductIdentity {
    #[strum(serialize = "satellite")]
    Server,
    #[strum(serialize = "satellite-capsule")]
    Capsule,
}

impl ProductIdentity {
    /// Package whose presence identifies the product
    pub fn package(self) -> &'static str {
        match self {
            Self::Server => "satellite",
            Self::Capsule => "satellite-capsule",
        }
    }

    /// Installer scenario used for in-place upgrades of this product
    pub fn installer_scenario(self) -> &'static str {
        match self {
            Self::Server => "satellite",
            Self::Capsule => "capsule",
        }
    }

    /// Detect the installed product. Server takes precedence when both
    /// packages are somehow present.
    pub fn detect(packages: &PackageManager<'_>) -> Result<Option<Self>> {
        for identity in [Self::Server, Self::Capsule] {
            if packages.is_installed(identity.package())? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }
}

/// Stable identifiers of the closed feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum FeatureId {
    Instance,
    Downstream,
    ForemanServer,
    Katello,
    UpstreamRepositories,
}

/// Kind of installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instance {
    /// None for upstream installations
    pub identity: Option<ProductIdentity>,
}

impl Instance {
    pub fn is_downstream(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Katello {
    pub version: Option<Version>,
}

/// A resolved feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    Instance(Instance),
    Downstream(Downstream),
    ForemanServer,
    Katello(Katello),
    UpstreamRepositories(UpstreamRepositories),
}

/// Resolved view of every feature, evaluated by [`Confine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSnapshot {
    pub instance: Instance,
    pub downstream: Option<Downstream>,
    pub foreman_server: bool,
    pub katello: Option<Katello>,
    /// Target of a persisted, unfinished upgrade
    pub upgrade_in_progress: Option<String>,
}

impl FeatureSnapshot {
    pub fn is_downstream(&self) -> bool {
        self.instance.is_downstream()
    }

    pub fn identity(&self) -> Option<ProductIdentity> {
        self.instance.identity
    }

    /// Product version used for upgrade-path matching: the subscribed
    /// product's version downstream, Katello's upstream.
    pub fn product_version(&self) -> Option<&Version> {
        match &self.downstream {
            Some(downstream) => downstream.version.as_ref(),
            None => self.katello.as_ref().and_then(|k| k.version.as_ref()),
        }
    }

    pub fn upstream_repositories(&self) -> Option<UpstreamRepositories> {
        (!self.is_downstream() && self.katello.is_some()).then_some(UpstreamRepositories)
    }
}

/// Lazily detects and caches features, one instance per id.
pub struct CapabilityRegistry<'a> {
    host: &'a dyn Host,
    config: &'a EngineConfig,
    cache: RefCell<HashMap<FeatureId, Option<Feature>>>,
    upgrade_in_progress: Option<String>,
}

impl<'a> CapabilityRegistry<'a> {
    pub fn new(host: &'a dyn Host, config: &'a EngineConfig) -> Self {
        Self {
            host,
            config,
            cache: RefCell::new(HashMap::new()),
            upgrade_in_progress: None,
        }
    }

    /// Record the target of an unfinished upgrade for confinement.
    pub fn with_upgrade_in_progress(mut self, target: Option<String>) -> Self {
        self.upgrade_in_progress = target;
        self
    }

    /// Seed the cache with a known value. A feature already resolved keeps
    /// its first value.
    pub fn preload(&self, id: FeatureId, feature: Option<Feature>) {
        self.cache.borrow_mut().entry(id).or_insert(feature);
    }

    /// The feature for `id`, detecting it on first access.
    pub fn feature(&self, id: FeatureId) -> Result<Option<Feature>> {
        if let Some(cached) = self.cache.borrow().get(&id) {
            return Ok(cached.clone());
        }
        let detected = self.detect(id)?;
        debug!(feature = %id, present = detected.is_some(), "feature detected");
        Ok(self
            .cache
            .borrow_mut()
            .entry(id)
            .or_insert(detected)
            .clone())
    }

    /// Resolve every feature.
    pub fn snapshot(&self) -> Result<FeatureSnapshot> {
        let mut snapshot = FeatureSnapshot {
            upgrade_in_progress: self.upgrade_in_progress.clone(),
            ..FeatureSnapshot::default()
        };
        for id in FeatureId::iter() {
            match self.feature(id)? {
                Some(Feature::Instance(instance)) => snapshot.instance = instance,
                Some(Feature::Downstream(downstream)) => snapshot.downstream = Some(downstream),
                Some(Feature::ForemanServer) => snapshot.foreman_server = true,
                Some(Feature::Katello(katello)) => snapshot.katello = Some(katello),
                Some(Feature::UpstreamRepositories(_)) | None => {}
            }
        }
        Ok(snapshot)
    }

    pub fn host(&self) -> &'a dyn Host {
        self.host
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    fn detect(&self, id: FeatureId) -> Result<Option<Feature>> {
        let packages = PackageManager::new(self.host, self.config);
        let feature = match id {
            FeatureId::Instance => Some(Feature::Instance(Instance {
                identity: ProductIdentity::detect(&packages)?,
            })),
            FeatureId::Downstream => match self.instance()?.identity {
                Some(identity) => Some(Feature::Downstream(Downstream {
                    identity,
                    version: packages.version_of(identity.package())?,
                    activation_key: activation_key_from_env(),
                })),
                None => None,
            },
            FeatureId::ForemanServer => packages
                .is_installed("foreman")?
                .then_some(Feature::ForemanServer),
            FeatureId::Katello => packages
                .is_installed("katello")?
                .then(|| packages.version_of("katello"))
                .transpose()?
                .map(|version| Feature::Katello(Katello { version })),
            FeatureId::UpstreamRepositories => {
                let downstream = self.instance()?.is_downstream();
                let katello = self.feature(FeatureId::Katello)?.is_some();
                (!downstream && katello).then_some(Feature::UpstreamRepositories(UpstreamRepositories))
            }
        };
        Ok(feature)
    }

    fn instance(&self) -> Result<Instance> {
        match self.feature(FeatureId::Instance)? {
            Some(Feature::Instance(instance)) => Ok(instance),
            _ => Ok(Instance::default()),
        }
    }
}

fn activation_key_from_env() -> bool {
    let (org, key) = ACTIVATION_KEY_ENV;
    let set = |name: &str| std::env::var(name).is_ok_and(|v| !v.trim().is_empty());
    set(org) && set(key)
}
