//! Upgrade selection and phase persistence tests
//!
//! A Capsule 6.6 host is scripted well enough for every phase of the 6.7
//! upgrade to pass; individual tests then break one command to exercise
//! failure and resume.

use tempfile::TempDir;

use upkeep::features::{Downstream, Instance, Katello};
use upkeep::{
    compose, CapabilityRegistry, CommandOutput, ConsoleReporter, EngineConfig, FeatureSnapshot,
    PackageManager, ProductIdentity, ScriptedHost, StepCatalog, UpgradePhase, UpgradeRunner,
    UpgradeState, UpkeepError, Version, VersionRegistry,
};

const INSTALLER: &str = "satellite-installer --scenario capsule --upgrade";
const DF: &str = "df --output=avail -BM /var";

const CAPSULE_REPOS: &str = "\
Repo ID:   rhel-7-server-rpms
Repo ID:   rhel-server-rhscl-7-rpms
Repo ID:   rhel-7-server-satellite-capsule-6.7-rpms
Repo ID:   rhel-7-server-satellite-maintenance-6-rpms
";

fn capsule_host() -> ScriptedHost {
    let host = ScriptedHost::new();
    host.respond("systemctl is-enabled httpd", CommandOutput::ok("enabled"));
    host.respond(DF, CommandOutput::ok("Avail\n 40960M\n"));
    host.respond(
        "subscription-manager repos --list",
        CommandOutput::ok(CAPSULE_REPOS),
    );
    host
}

fn capsule_features(version: &str) -> FeatureSnapshot {
    FeatureSnapshot {
        instance: Instance {
            identity: Some(ProductIdentity::Capsule),
        },
        downstream: Some(Downstream {
            identity: ProductIdentity::Capsule,
            version: Version::parse(version).ok(),
            activation_key: false,
        }),
        ..FeatureSnapshot::default()
    }
}

fn config_in(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        state_dir: dir.path().join("state"),
        ..EngineConfig::default()
    }
}

#[test]
fn test_no_versions_without_product() {
    let host = ScriptedHost::new();
    host.respond("rpm -q satellite", CommandOutput::with_status(1, ""));
    host.respond("rpm -q satellite-capsule", CommandOutput::with_status(1, ""));
    let config = EngineConfig::default();

    let versions = VersionRegistry::detect(&PackageManager::new(&host, &config)).unwrap();
    assert!(versions.is_empty());

    let registry = CapabilityRegistry::new(&host, &config);
    let features = FeatureSnapshot::default();
    let catalog = StepCatalog::builtin();
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    assert!(upgrades.available_versions().is_empty());

    let mut reporter = ConsoleReporter::new(Vec::new());
    let err = upgrades
        .run_phase("6.7", UpgradePhase::PreUpgradeChecks, &mut reporter)
        .unwrap_err();
    assert!(matches!(err, UpkeepError::Composition(_)));
}

#[test]
fn test_available_versions_follow_installed_version() {
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));

    let on_66 = capsule_features("6.6.3");
    let upgrades = UpgradeRunner::new(&registry, &on_66, &catalog, &versions);
    assert_eq!(upgrades.available_versions(), vec!["6.7"]);

    let on_67 = capsule_features("6.7.1");
    let upgrades = UpgradeRunner::new(&registry, &on_67, &catalog, &versions);
    assert_eq!(upgrades.available_versions(), vec!["6.7.z"]);
}

#[test]
fn test_in_progress_upgrade_stays_selectable() {
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));

    // Packages already report the new version mid-upgrade.
    let features = FeatureSnapshot {
        upgrade_in_progress: Some("6.7".to_string()),
        ..capsule_features("6.7.0")
    };
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    assert!(upgrades.family("6.7").is_ok());
}

#[test]
fn test_full_upgrade_clears_state() {
    let dir = TempDir::new().unwrap();
    let host = capsule_host();
    let config = config_in(&dir);
    let registry = CapabilityRegistry::new(&host, &config);
    let features = capsule_features("6.6.3");
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);

    let mut reporter = ConsoleReporter::new(Vec::new());
    let outcome = upgrades
        .run("6.7", &config.upgrade_state_path(), None, &mut reporter)
        .unwrap();

    assert!(outcome.finished, "phases: {:#?}", outcome.phases);
    assert!(outcome.passed());
    let phases: Vec<UpgradePhase> = outcome.phases.iter().map(|(p, _)| *p).collect();
    assert_eq!(phases, UpgradePhase::all_phases());
    assert_eq!(host.count(INSTALLER), 1);
    assert_eq!(host.count("systemctl stop httpd"), 1);
    assert_eq!(host.count("systemctl start httpd"), 1);
    assert!(!config.upgrade_state_path().exists());
}

#[test]
fn test_failed_phase_resumes_where_it_stopped() {
    let dir = TempDir::new().unwrap();
    let host = capsule_host();
    host.respond_sequence(
        INSTALLER,
        vec![
            CommandOutput::with_status(1, "installer failed"),
            CommandOutput::ok(""),
        ],
    );
    let config = config_in(&dir);
    let state_path = config.upgrade_state_path();
    let registry = CapabilityRegistry::new(&host, &config);
    let features = capsule_features("6.6.3");
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    let mut reporter = ConsoleReporter::new(Vec::new());

    let first = upgrades.run("6.7", &state_path, None, &mut reporter).unwrap();
    assert!(!first.finished);
    assert!(!first.passed());
    let (failed_phase, report) = first.phases.last().unwrap();
    assert_eq!(*failed_phase, UpgradePhase::Migrations);
    assert_eq!(report.failed_steps(), vec!["installer-upgrade"]);

    let state = UpgradeState::load(&state_path).unwrap().unwrap();
    assert_eq!(state.last_completed, Some(UpgradePhase::PreMigrations));

    let second = upgrades.run("6.7", &state_path, None, &mut reporter).unwrap();
    assert!(second.finished);
    assert_eq!(second.phases[0].0, UpgradePhase::Migrations);
    // Checks from the completed phase are not repeated.
    assert_eq!(host.count(DF), 1);
    assert_eq!(host.count(INSTALLER), 2);
}

#[test]
fn test_run_stops_after_requested_phase() {
    let dir = TempDir::new().unwrap();
    let host = capsule_host();
    let config = config_in(&dir);
    let state_path = config.upgrade_state_path();
    let registry = CapabilityRegistry::new(&host, &config);
    let features = capsule_features("6.6.3");
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    let mut reporter = ConsoleReporter::new(Vec::new());

    let outcome = upgrades
        .run("6.7", &state_path, Some(UpgradePhase::PreMigrations), &mut reporter)
        .unwrap();

    assert!(!outcome.finished);
    assert!(outcome.passed());
    assert_eq!(outcome.phases.len(), 2);
    assert_eq!(host.count(INSTALLER), 0);
    let state = UpgradeState::load(&state_path).unwrap().unwrap();
    assert_eq!(state.next_phase(), Some(UpgradePhase::Migrations));
}

#[test]
fn test_other_target_in_progress_is_refused() {
    let dir = TempDir::new().unwrap();
    let host = capsule_host();
    let config = config_in(&dir);
    let state_path = config.upgrade_state_path();
    UpgradeState::new("6.7.z").save(&state_path).unwrap();

    let registry = CapabilityRegistry::new(&host, &config);
    let features = capsule_features("6.6.3");
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    let mut reporter = ConsoleReporter::new(Vec::new());

    let err = upgrades
        .run("6.7", &state_path, None, &mut reporter)
        .unwrap_err();
    assert!(matches!(err, UpkeepError::State(_)));
    assert!(host.commands().is_empty());
}

#[test]
fn test_until_an_already_completed_phase_is_refused() {
    let dir = TempDir::new().unwrap();
    let host = capsule_host();
    let config = config_in(&dir);
    let state_path = config.upgrade_state_path();
    let mut state = UpgradeState::new("6.7");
    for phase in [
        UpgradePhase::PreUpgradeChecks,
        UpgradePhase::PreMigrations,
        UpgradePhase::Migrations,
    ] {
        state.complete(phase).unwrap();
    }
    state.save(&state_path).unwrap();

    let registry = CapabilityRegistry::new(&host, &config);
    let features = FeatureSnapshot {
        upgrade_in_progress: Some("6.7".to_string()),
        ..capsule_features("6.7.0")
    };
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    let mut reporter = ConsoleReporter::new(Vec::new());

    let err = upgrades
        .run("6.7", &state_path, Some(UpgradePhase::PreMigrations), &mut reporter)
        .unwrap_err();

    assert!(matches!(err, UpkeepError::State(_)));
    assert!(host.commands().is_empty());
    assert_eq!(UpgradeState::load(&state_path).unwrap(), Some(state));
}

fn katello_features(version: &str) -> FeatureSnapshot {
    FeatureSnapshot {
        foreman_server: true,
        katello: Some(Katello {
            version: Version::parse(version).ok(),
        }),
        ..FeatureSnapshot::default()
    }
}

#[test]
fn test_upstream_paths_are_selected_by_confinement() {
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(None);

    let on_313 = katello_features("3.13.4");
    let upgrades = UpgradeRunner::new(&registry, &on_313, &catalog, &versions);
    assert_eq!(upgrades.available_versions(), vec!["3.14"]);
    assert_eq!(upgrades.family("3.14").unwrap().tag, "upgrade_to_katello_3_14");
    assert!(upgrades.family("3.15.z").is_err());

    let on_315 = katello_features("3.15.0");
    let upgrades = UpgradeRunner::new(&registry, &on_315, &catalog, &versions);
    assert_eq!(upgrades.available_versions(), vec!["3.15.z"]);

    let family = upgrades.family("3.15.z").unwrap();
    let migrations = compose(&family.phase(UpgradePhase::Migrations), &on_315, &catalog)
        .unwrap()
        .unwrap();
    assert_eq!(
        migrations.plan(&on_315)[0],
        "repositories-setup[version=3.15]"
    );
}

#[test]
fn test_upstream_paths_skip_downstream_hosts() {
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let catalog = StepCatalog::builtin();
    let versions = VersionRegistry::for_identity(Some(ProductIdentity::Capsule));
    let features = FeatureSnapshot {
        foreman_server: true,
        katello: Some(Katello {
            version: Version::parse("3.13.0").ok(),
        }),
        ..capsule_features("6.6.3")
    };

    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    assert_eq!(upgrades.available_versions(), vec!["6.7"]);
    assert!(upgrades.family("3.14").is_err());
}
