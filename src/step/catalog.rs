//! Statically registered step catalog.
//!
//! Lookups are pure: they construct step values but never run them. The
//! catalog is built once and passed explicitly to composition, so tests can
//! assemble their own.

use super::{DetectionMode, Params, Step, StepKind, StepMetadata};
use crate::checks;
use crate::procedures;
use crate::service::ServiceAction;

/// Builds a step instance bound to the given parameters.
pub type StepFactory = fn(Params) -> Box<dyn Step>;

struct CatalogEntry {
    metadata: StepMetadata,
    factory: StepFactory,
}

/// Registry of every known step, in registration order.
#[derive(Default)]
pub struct StepCatalog {
    entries: Vec<CatalogEntry>,
}

impl StepCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step. Its metadata is captured from an unparameterised
    /// instance; a label registered twice keeps the first entry.
    pub fn register(&mut self, factory: StepFactory) -> &mut Self {
        let metadata = factory(Params::new()).metadata().clone();
        if self.entry(metadata.label).is_none() {
            self.entries.push(CatalogEntry { metadata, factory });
        }
        self
    }

    /// Every built-in check and procedure.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .register(|p| Box::new(checks::ServicesRunning::new(p)))
            .register(|p| Box::new(checks::AvailableSpace::new(p)))
            .register(|p| Box::new(checks::ValidateRepositories::new(p)))
            .register(|p| Box::new(checks::NonRedHatRepository::new(p)))
            .register(|p| Box::new(procedures::ServiceProcedure::new(ServiceAction::Start, p)))
            .register(|p| Box::new(procedures::ServiceProcedure::new(ServiceAction::Stop, p)))
            .register(|p| Box::new(procedures::ServiceProcedure::new(ServiceAction::Restart, p)))
            .register(|p| Box::new(procedures::ServiceProcedure::new(ServiceAction::Status, p)))
            .register(|p| Box::new(procedures::ServiceProcedure::new(ServiceAction::Enable, p)))
            .register(|p| Box::new(procedures::ServiceProcedure::new(ServiceAction::Disable, p)))
            .register(|p| Box::new(procedures::PackagesInstall::new(p)))
            .register(|p| Box::new(procedures::PackagesUpdate::new(p)))
            .register(|p| Box::new(procedures::PackagesCleanCache::new(p)))
            .register(|p| Box::new(procedures::PackagesUnlockVersions::new(p)))
            .register(|p| Box::new(procedures::PackagesLockVersions::new(p)))
            .register(|p| Box::new(procedures::RepositoriesSetup::new(p)))
            .register(|p| Box::new(procedures::InstallerUpgrade::new(p)))
            .register(|p| Box::new(procedures::ApipieCache::new(p)));
        catalog
    }

    /// Auto-detected checks carrying `tag`, in registration order.
    pub fn find_checks(&self, tag: &str) -> Vec<Box<dyn Step>> {
        self.find(StepKind::Check, tag)
    }

    /// Auto-detected procedures carrying `tag`, in registration order.
    pub fn find_procedures(&self, tag: &str) -> Vec<Box<dyn Step>> {
        self.find(StepKind::Procedure, tag)
    }

    /// Instantiate a step by label, manual-detection steps included.
    pub fn create(&self, label: &str, params: Params) -> Option<Box<dyn Step>> {
        self.entry(label).map(|entry| (entry.factory)(params))
    }

    pub fn metadata(&self, label: &str) -> Option<&StepMetadata> {
        self.entry(label).map(|entry| &entry.metadata)
    }

    /// Metadata of every registered step.
    pub fn all(&self) -> impl Iterator<Item = &StepMetadata> {
        self.entries.iter().map(|entry| &entry.metadata)
    }

    fn find(&self, kind: StepKind, tag: &str) -> Vec<Box<dyn Step>> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.metadata.kind == kind
                    && entry.metadata.detection == DetectionMode::Auto
                    && entry.metadata.has_tag(tag)
            })
            .map(|entry| (entry.factory)(Params::new()))
            .collect()
    }

    fn entry(&self, label: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.metadata.label == label)
    }
}
