//! Upgrade scenario families and their per-phase composition.

use super::UpgradePhase;
use crate::features::{Confine, ProductIdentity};
use crate::scenario::{Composer, CompositionError, ScenarioDefinition, ScenarioMetadata};
use crate::step::{Params, RunStrategy};

/// One upgrade path: from a `major.minor` to a target version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeFamily {
    pub tag: &'static str,
    pub target_version: &'static str,
    /// Installed `major.minor` this path starts from
    pub from: &'static str,
    /// Downstream product, None for the community (Katello) path
    pub identity: Option<ProductIdentity>,
}

const fn satellite(tag: &'static str, target_version: &'static str, from: &'static str) -> UpgradeFamily {
    UpgradeFamily {
        tag,
        target_version,
        from,
        identity: Some(ProductIdentity::Server),
    }
}

const fn capsule(tag: &'static str, target_version: &'static str, from: &'static str) -> UpgradeFamily {
    UpgradeFamily {
        tag,
        target_version,
        from,
        identity: Some(ProductIdentity::Capsule),
    }
}

const fn katello(tag: &'static str, target_version: &'static str, from: &'static str) -> UpgradeFamily {
    UpgradeFamily {
        tag,
        target_version,
        from,
        identity: None,
    }
}

pub const FAMILIES: &[UpgradeFamily] = &[
    satellite("upgrade_to_satellite_6_2", "6.2", "6.1"),
    satellite("upgrade_to_satellite_6_2_z", "6.2.z", "6.2"),
    satellite("upgrade_to_satellite_6_3", "6.3", "6.2"),
    satellite("upgrade_to_satellite_6_3_z", "6.3.z", "6.3"),
    satellite("upgrade_to_satellite_6_4", "6.4", "6.3"),
    satellite("upgrade_to_satellite_6_4_z", "6.4.z", "6.4"),
    satellite("upgrade_to_satellite_6_5", "6.5", "6.4"),
    satellite("upgrade_to_satellite_6_5_z", "6.5.z", "6.5"),
    satellite("upgrade_to_satellite_6_6", "6.6", "6.5"),
    satellite("upgrade_to_satellite_6_6_z", "6.6.z", "6.6"),
    capsule("upgrade_to_capsule_6_7", "6.7", "6.6"),
    capsule("upgrade_to_capsule_6_7_z", "6.7.z", "6.7"),
    katello("upgrade_to_katello_3_14", "3.14", "3.13"),
    katello("upgrade_to_katello_3_15_z", "3.15.z", "3.15"),
];

pub fn by_tag(tag: &str) -> Option<&'static UpgradeFamily> {
    FAMILIES.iter().find(|family| family.tag == tag)
}

/// Community upgrade paths. These are not in the version registry and are
/// selected by confinement alone.
pub fn upstream_families() -> impl Iterator<Item = &'static UpgradeFamily> {
    FAMILIES.iter().filter(|family| family.identity.is_none())
}

impl UpgradeFamily {
    pub fn product_name(&self) -> &'static str {
        match self.identity {
            Some(ProductIdentity::Server) => "Satellite",
            Some(ProductIdentity::Capsule) => "Capsule",
            None => "Katello",
        }
    }

    /// Applies on the matching product at the starting version, or while an
    /// upgrade to this target is in progress.
    pub fn confine(&self) -> Confine {
        let identity = match self.identity {
            Some(ProductIdentity::Server) => Confine::Server,
            Some(ProductIdentity::Capsule) => Confine::Capsule,
            None => Confine::Upstream
                .and(Confine::ForemanServer)
                .and(Confine::Katello),
        };
        identity.and(
            Confine::ProductVersion(self.from.to_string())
                .or(Confine::UpgradeInProgress(self.target_version.to_string())),
        )
    }

    /// Version used for repository lookups (`6.6.z` -> `6.6`).
    pub fn repository_version(&self) -> &'static str {
        self.target_version
            .strip_suffix(".z")
            .unwrap_or(self.target_version)
    }

    pub fn phase(&self, phase: UpgradePhase) -> PhaseScenario {
        PhaseScenario {
            family: *self,
            phase,
        }
    }
}

/// One phase of an upgrade family as a scenario.
pub struct PhaseScenario {
    family: UpgradeFamily,
    phase: UpgradePhase,
}

impl ScenarioDefinition for PhaseScenario {
    fn metadata(&self) -> ScenarioMetadata {
        let target = format!("{} {}", self.family.product_name(), self.family.target_version);
        let description = match self.phase {
            UpgradePhase::PreUpgradeChecks => format!("Checks before upgrading to {}", target),
            UpgradePhase::PreMigrations => format!("Procedures before migrating to {}", target),
            UpgradePhase::Migrations => format!("Migration scripts to {}", target),
            UpgradePhase::PostMigrations => format!("Procedures after migrating to {}", target),
            UpgradePhase::PostUpgradeChecks => format!("Checks after upgrading to {}", target),
        };
        let strategy = match self.phase {
            UpgradePhase::PreUpgradeChecks | UpgradePhase::PostUpgradeChecks => {
                RunStrategy::FailSlow
            }
            _ => RunStrategy::FailFast,
        };
        ScenarioMetadata::new(format!("{}:{}", self.family.tag, self.phase.label()), description)
            .tag("upgrade_scenario")
            .tag(self.phase.label())
            .confine(self.family.confine())
            .run_strategy(strategy)
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        let version = Params::new().with("version", self.family.repository_version());
        match self.phase {
            UpgradePhase::PreUpgradeChecks => {
                composer.add_steps(composer.find_checks("default"))?;
                composer.add_steps(composer.find_checks("pre_upgrade"))?;
                composer.add_labeled("validate-repositories", version)?;
            }
            UpgradePhase::PreMigrations => {
                composer.add_steps(composer.find_procedures("pre_migrations"))?;
                composer.add_labeled("service-stop", Params::new())?;
            }
            UpgradePhase::Migrations => {
                composer
                    .add_labeled("repositories-setup", version)?
                    .add_labeled("packages-unlock-versions", Params::new())?
                    .add_labeled("packages-update", Params::new().with("assumeyes", "true"))?
                    .add_labeled("installer-upgrade", Params::new())?;
            }
            UpgradePhase::PostMigrations => {
                composer
                    .add_labeled("apipie-cache", Params::new())?
                    .add_labeled("service-start", Params::new())?;
                composer.add_steps(composer.find_procedures("post_migrations"))?;
            }
            UpgradePhase::PostUpgradeChecks => {
                composer.add_steps(composer.find_checks("default"))?;
                composer.add_steps(composer.find_checks("post_upgrade"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSnapshot;
    use crate::step::StepCatalog;
    use crate::upgrade::registry::{CAPSULE_MAPPINGS, SATELLITE_MAPPINGS};

    #[test]
    fn test_every_registered_tag_has_a_family() {
        for (version, tag) in SATELLITE_MAPPINGS.iter().chain(CAPSULE_MAPPINGS) {
            let family = by_tag(tag).unwrap();
            assert_eq!(family.target_version, *version);
        }
    }

    #[test]
    fn test_repository_version() {
        assert_eq!(by_tag("upgrade_to_satellite_6_6_z").unwrap().repository_version(), "6.6");
        assert_eq!(by_tag("upgrade_to_capsule_6_7").unwrap().repository_version(), "6.7");
    }

    #[test]
    fn test_katello_family_confinement() {
        use crate::features::Katello;
        use crate::version::Version;

        let katello = |version: &str| FeatureSnapshot {
            foreman_server: true,
            katello: Some(Katello {
                version: Version::parse(version).ok(),
            }),
            ..FeatureSnapshot::default()
        };
        let to_314 = by_tag("upgrade_to_katello_3_14").unwrap();
        let to_315z = by_tag("upgrade_to_katello_3_15_z").unwrap();

        assert!(to_314.confine().evaluate(&katello("3.13.2")));
        assert!(!to_315z.confine().evaluate(&katello("3.13.2")));
        assert!(to_315z.confine().evaluate(&katello("3.15.1")));

        // Not a Foreman server
        let proxy = FeatureSnapshot {
            foreman_server: false,
            ..katello("3.13.2")
        };
        assert!(!to_314.confine().evaluate(&proxy));

        let in_progress = FeatureSnapshot {
            upgrade_in_progress: Some("3.15.z".to_string()),
            ..katello("3.16.0")
        };
        assert!(to_315z.confine().evaluate(&in_progress));
        assert_eq!(to_315z.repository_version(), "3.15");
        assert_eq!(
            upstream_families().map(|f| f.tag).collect::<Vec<_>>(),
            vec!["upgrade_to_katello_3_14", "upgrade_to_katello_3_15_z"]
        );
    }

    #[test]
    fn test_all_phases_compose() {
        let catalog = StepCatalog::builtin();
        let features = FeatureSnapshot::default();
        for family in FAMILIES {
            for phase in UpgradePhase::all_phases() {
                let mut composer = Composer::new(&features, &catalog);
                assert!(family.phase(*phase).compose(&mut composer).is_ok());
            }
        }
    }
}
