//! Upgrade runner
//!
//! An upgrade is five scenarios run in a fixed order, one per phase:
//!
//! ```text
//! PreUpgradeChecks → PreMigrations → Migrations → PostMigrations → PostUpgradeChecks
//! ```
//!
//! Progress is persisted after every completed phase so an interrupted or
//! failed upgrade resumes where it stopped. Phases only move forward; the
//! state file is removed once the last phase completes.

mod families;
mod registry;

pub use families::{by_tag, upstream_families, PhaseScenario, UpgradeFamily, FAMILIES};
pub use registry::{VersionRegistry, CAPSULE_MAPPINGS, SATELLITE_MAPPINGS};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use strum::{EnumIter, EnumString};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{Result, UpkeepError};
use crate::features::{CapabilityRegistry, FeatureSnapshot};
use crate::progress::Reporter;
use crate::runner::{Runner, ScenarioReport};
use crate::scenario::{compose, CompositionError};
use crate::step::StepCatalog;

/// Upgrade phases in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum UpgradePhase {
    PreUpgradeChecks = 1,
    PreMigrations = 2,
    Migrations = 3,
    PostMigrations = 4,
    PostUpgradeChecks = 5,
}

impl UpgradePhase {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    pub const fn first() -> Self {
        Self::PreUpgradeChecks
    }

    /// The following phase, None after the last one
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::PreUpgradeChecks => Some(Self::PreMigrations),
            Self::PreMigrations => Some(Self::Migrations),
            Self::Migrations => Some(Self::PostMigrations),
            Self::PostMigrations => Some(Self::PostUpgradeChecks),
            Self::PostUpgradeChecks => None,
        }
    }

    /// Tag-style name, e.g. `pre_upgrade_checks`
    pub const fn label(self) -> &'static str {
        match self {
            Self::PreUpgradeChecks => "pre_upgrade_checks",
            Self::PreMigrations => "pre_migrations",
            Self::Migrations => "migrations",
            Self::PostMigrations => "post_migrations",
            Self::PostUpgradeChecks => "post_upgrade_checks",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::PreUpgradeChecks => "Pre-upgrade checks",
            Self::PreMigrations => "Pre-migration procedures",
            Self::Migrations => "Migrations",
            Self::PostMigrations => "Post-migration procedures",
            Self::PostUpgradeChecks => "Post-upgrade checks",
        }
    }

    pub const fn all_phases() -> &'static [Self] {
        &[
            Self::PreUpgradeChecks,
            Self::PreMigrations,
            Self::Migrations,
            Self::PostMigrations,
            Self::PostUpgradeChecks,
        ]
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during phase transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransitionError {
    #[error("Cannot complete {attempted} before {expected}")]
    OutOfOrder {
        expected: UpgradePhase,
        attempted: UpgradePhase,
    },

    #[error("Upgrade to {0} has already completed every phase")]
    AlreadyComplete(String),
}

impl From<PhaseTransitionError> for UpkeepError {
    fn from(err: PhaseTransitionError) -> Self {
        UpkeepError::state(err.to_string())
    }
}

/// Persisted progress of an unfinished upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeState {
    pub target_version: String,
    pub last_completed: Option<UpgradePhase>,
}

impl UpgradeState {
    pub fn new(target_version: impl Into<String>) -> Self {
        Self {
            target_version: target_version.into(),
            last_completed: None,
        }
    }

    /// The phase to run next, None when all phases are done
    pub fn next_phase(&self) -> Option<UpgradePhase> {
        match self.last_completed {
            None => Some(UpgradePhase::first()),
            Some(phase) => phase.next(),
        }
    }

    /// Record `phase` as completed. Only the next phase may complete.
    pub fn complete(&mut self, phase: UpgradePhase) -> std::result::Result<(), PhaseTransitionError> {
        let expected = self
            .next_phase()
            .ok_or_else(|| PhaseTransitionError::AlreadyComplete(self.target_version.clone()))?;
        if phase != expected {
            return Err(PhaseTransitionError::OutOfOrder {
                expected,
                attempted: phase,
            });
        }
        self.last_completed = Some(phase);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.next_phase().is_none()
    }

    /// Load persisted state; None when no upgrade is in progress.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let state = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn clear(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Result of an upgrade run.
#[derive(Debug, Clone)]
pub struct UpgradeOutcome {
    pub target_version: String,
    pub phases: Vec<(UpgradePhase, ScenarioReport)>,
    /// Every phase completed and the persisted state was cleared
    pub finished: bool,
}

impl UpgradeOutcome {
    pub fn passed(&self) -> bool {
        self.phases.iter().all(|(_, report)| report.passed())
    }
}

/// Selects and runs upgrade scenarios.
pub struct UpgradeRunner<'a> {
    registry: &'a CapabilityRegistry<'a>,
    features: &'a FeatureSnapshot,
    catalog: &'a StepCatalog,
    versions: &'a VersionRegistry,
}

impl<'a> UpgradeRunner<'a> {
    pub fn new(
        registry: &'a CapabilityRegistry<'a>,
        features: &'a FeatureSnapshot,
        catalog: &'a StepCatalog,
        versions: &'a VersionRegistry,
    ) -> Self {
        Self {
            registry,
            features,
            catalog,
            versions,
        }
    }

    /// Target versions whose scenario applies to this host.
    ///
    /// Downstream paths come from the version registry; community paths
    /// are offered whenever their confinement holds.
    pub fn available_versions(&self) -> Vec<&'static str> {
        let registered = self.versions.versions().filter(|version| {
            self.versions
                .tag_for(version)
                .and_then(by_tag)
                .is_some_and(|family| family.confine().evaluate(self.features))
        });
        let upstream = upstream_families()
            .filter(|family| family.confine().evaluate(self.features))
            .map(|family| family.target_version);
        registered.chain(upstream).collect()
    }

    /// The upgrade family for `target`, if registered and applicable.
    pub fn family(&self, target: &str) -> std::result::Result<&'static UpgradeFamily, CompositionError> {
        let family = self
            .versions
            .tag_for(target)
            .and_then(by_tag)
            .or_else(|| {
                upstream_families().find(|family| family.target_version == target.trim())
            })
            .ok_or_else(|| CompositionError::UnknownTarget(target.to_string()))?;
        if !family.confine().evaluate(self.features) {
            return Err(CompositionError::Unconfined {
                step: family.tag.to_string(),
            });
        }
        Ok(family)
    }

    /// Run a single phase without touching persisted state.
    pub fn run_phase<R: Reporter>(
        &self,
        target: &str,
        phase: UpgradePhase,
        reporter: &mut R,
    ) -> Result<ScenarioReport> {
        let family = self.family(target)?;
        let scenario = compose(&family.phase(phase), self.features, self.catalog)?
            .ok_or_else(|| CompositionError::Unconfined {
                step: family.tag.to_string(),
            })?;
        Runner::new(self.registry, self.features).run(&scenario, reporter)
    }

    /// Run every remaining phase up to and including `until`.
    ///
    /// `until` naming a phase that already completed is an error and runs
    /// nothing. A failed phase stops the upgrade with the state file kept, so the next
    /// run retries that phase.
    pub fn run<R: Reporter>(
        &self,
        target: &str,
        state_path: &Path,
        until: Option<UpgradePhase>,
        reporter: &mut R,
    ) -> Result<UpgradeOutcome> {
        let mut state = match UpgradeState::load(state_path)? {
            Some(state) if state.target_version != target => {
                return Err(UpkeepError::state(format!(
                    "An upgrade to {} is already in progress",
                    state.target_version
                )));
            }
            Some(state) => {
                info!(target, last_completed = ?state.last_completed, "resuming upgrade");
                state
            }
            None => UpgradeState::new(target),
        };

        if let (Some(until), Some(next)) = (until, state.next_phase()) {
            if until < next {
                return Err(UpkeepError::state(format!(
                    "Phase '{}' of the upgrade to {} has already completed; next phase is '{}'",
                    until.label(),
                    target,
                    next.label()
                )));
            }
        }

        let mut outcome = UpgradeOutcome {
            target_version: target.to_string(),
            phases: Vec::new(),
            finished: false,
        };

        while let Some(phase) = state.next_phase() {
            info!(target, phase = phase.label(), "starting upgrade phase");
            let report = self.run_phase(target, phase, reporter)?;
            let passed = report.passed();
            outcome.phases.push((phase, report));

            if !passed {
                warn!(target, phase = phase.label(), "upgrade phase failed");
                state.save(state_path)?;
                return Ok(outcome);
            }

            state.complete(phase)?;
            state.save(state_path)?;
            if until == Some(phase) {
                return Ok(outcome);
            }
        }

        UpgradeState::clear(state_path)?;
        info!(target, "upgrade finished");
        outcome.finished = true;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_phase_order() {
        let mut phase = UpgradePhase::first();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next.order() > phase.order());
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen, UpgradePhase::all_phases());
        assert_eq!(
            "post-migrations".parse::<UpgradePhase>().unwrap(),
            UpgradePhase::PostMigrations
        );
    }

    #[test]
    fn test_state_transitions_are_forward_only() {
        let mut state = UpgradeState::new("6.7");
        assert!(matches!(
            state.complete(UpgradePhase::Migrations),
            Err(PhaseTransitionError::OutOfOrder { .. })
        ));
        for phase in UpgradePhase::all_phases() {
            state.complete(*phase).unwrap();
        }
        assert!(state.is_finished());
        assert!(matches!(
            state.complete(UpgradePhase::PreUpgradeChecks),
            Err(PhaseTransitionError::AlreadyComplete(_))
        ));
    }

    #[test]
    fn test_state_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("upgrade_state.json");
        assert_eq!(UpgradeState::load(&path).unwrap(), None);

        let mut state = UpgradeState::new("6.6.z");
        state.complete(UpgradePhase::PreUpgradeChecks).unwrap();
        state.save(&path).unwrap();

        let loaded = UpgradeState::load(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.next_phase(), Some(UpgradePhase::PreMigrations));

        UpgradeState::clear(&path).unwrap();
        assert!(!path.exists());
    }
}
