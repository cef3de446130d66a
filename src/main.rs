//! upkeep - main entry point

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use upkeep::cli::{
    parse_params, Cli, Commands, HealthCommands, ServiceArgs, ServiceCommands, UpgradeCommands,
};
use upkeep::step::StepKind;
use upkeep::{
    compose, CapabilityRegistry, ConsoleReporter, DryRunHost, EngineConfig, Host, PackageManager,
    Params, ServiceAction, ServiceCatalog, ServiceControl, ServiceOptions, ServiceOrchestrator,
    StepCatalog, SystemHost, TaggedScenario, UpgradePhase, UpgradeRunner, UpgradeState,
    VersionRegistry,
};

/// Initialize tracing; stdout stays reserved for reports
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the requested operation succeeded.
fn run(cli: Cli) -> Result<bool> {
    if let Commands::ValidateConfig { path } = &cli.command {
        return validate_config(path);
    }

    let config = EngineConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let host: Box<dyn Host> = if cli.dry_run {
        info!("Dry-run mode: mutating commands will be skipped");
        Box::new(DryRunHost::new(SystemHost))
    } else {
        Box::new(SystemHost)
    };
    let host = host.as_ref();

    if needs_preflight(&cli.command) {
        if let Err(message) = upkeep::sanity::run_preflight_checks(host, cli.dry_run) {
            eprintln!("{}", message);
            return Ok(false);
        }
    }

    match cli.command {
        Commands::Upgrade { action } => run_upgrade(host, &config, action),
        Commands::Health { action } => run_health(host, &config, action),
        Commands::Service { action } => run_service(host, &config, action),
        Commands::ValidateConfig { .. } => Ok(true),
    }
}

fn needs_preflight(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::ValidateConfig { .. }
            | Commands::Upgrade {
                action: UpgradeCommands::ListVersions
            }
            | Commands::Health {
                action: HealthCommands::List { .. }
            }
            | Commands::Service {
                action: ServiceCommands::List
            }
    )
}

fn validate_config(path: &std::path::Path) -> Result<bool> {
    info!("Validating configuration file: {:?}", path);
    let config = EngineConfig::load_from_file(path)?;
    match config.validate() {
        Ok(()) => {
            println!("✓ Configuration file is valid: {}", path.display());
            Ok(true)
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed: {}", e);
            Ok(false)
        }
    }
}

fn run_upgrade(host: &dyn Host, config: &EngineConfig, action: UpgradeCommands) -> Result<bool> {
    let state_path = config.upgrade_state_path();
    let in_progress = UpgradeState::load(&state_path)?.map(|state| state.target_version);

    let registry = CapabilityRegistry::new(host, config).with_upgrade_in_progress(in_progress);
    let features = registry.snapshot()?;
    let versions = VersionRegistry::detect(&PackageManager::new(host, config))?;
    let catalog = StepCatalog::builtin();
    let upgrades = UpgradeRunner::new(&registry, &features, &catalog, &versions);
    let mut reporter = ConsoleReporter::stdout();

    match action {
        UpgradeCommands::ListVersions => {
            let available = upgrades.available_versions();
            if available.is_empty() {
                println!("No upgrade versions available for this host");
            }
            for version in available {
                println!("{}", version);
            }
            Ok(true)
        }
        UpgradeCommands::Check { target_version } => {
            let report =
                upgrades.run_phase(&target_version, UpgradePhase::PreUpgradeChecks, &mut reporter)?;
            Ok(report.passed())
        }
        UpgradeCommands::Run {
            target_version,
            phase,
        } => {
            let until = phase
                .map(|p| {
                    p.parse::<UpgradePhase>()
                        .map_err(|_| anyhow::anyhow!("Unknown upgrade phase '{}'", p))
                })
                .transpose()?;
            let outcome = upgrades.run(&target_version, &state_path, until, &mut reporter)?;
            if outcome.finished {
                println!("Upgrade to {} finished", outcome.target_version);
            } else if !outcome.passed() {
                println!(
                    "Upgrade to {} stopped; rerun the same command to resume",
                    outcome.target_version
                );
            }
            Ok(outcome.passed())
        }
    }
}

fn run_health(host: &dyn Host, config: &EngineConfig, action: HealthCommands) -> Result<bool> {
    let catalog = StepCatalog::builtin();

    match action {
        HealthCommands::List { tags } => {
            for metadata in catalog.all().filter(|m| m.kind == StepKind::Check) {
                if !tags.is_empty() && !tags.iter().any(|tag| metadata.has_tag(tag)) {
                    continue;
                }
                println!(
                    "{:<28} [{}] {}",
                    metadata.label,
                    metadata.tags.join(","),
                    metadata.description
                );
            }
            Ok(true)
        }
        HealthCommands::Check {
            tags,
            label,
            params,
        } => {
            let tags = if tags.is_empty() && label.is_none() {
                vec!["default".to_string()]
            } else {
                tags
            };
            let mut definition = TaggedScenario::health_checks(tags);
            if let Some(label) = label {
                let params = parse_params(&params)
                    .map_err(anyhow::Error::msg)?
                    .into_iter()
                    .fold(Params::new(), |acc, (k, v)| acc.with(k, v));
                definition = definition.with_step(label, params);
            }

            let registry = CapabilityRegistry::new(host, config);
            let features = registry.snapshot()?;
            let Some(scenario) = compose(&definition, &features, &catalog)? else {
                println!("No checks apply to this host");
                return Ok(true);
            };
            if scenario.is_empty() {
                println!("No checks apply to this host");
                return Ok(true);
            }
            let mut reporter = ConsoleReporter::stdout();
            let report = upkeep::Runner::new(&registry, &features).run(&scenario, &mut reporter)?;
            Ok(report.passed())
        }
    }
}

fn run_service(host: &dyn Host, config: &EngineConfig, action: ServiceCommands) -> Result<bool> {
    let registry = CapabilityRegistry::new(host, config);
    let features = registry.snapshot()?;
    let catalog = ServiceCatalog::for_host(&features, config);

    let (action, args) = match action {
        ServiceCommands::List => {
            let mut groups: BTreeMap<u32, Vec<String>> = BTreeMap::new();
            for service in catalog.existing(host, config)? {
                groups.entry(service.priority).or_default().push(service.name);
            }
            for (priority, names) in groups {
                println!("{:>3}: {}", priority, names.join(" "));
            }
            return Ok(true);
        }
        ServiceCommands::Start(args) => (ServiceAction::Start, args),
        ServiceCommands::Stop(args) => (ServiceAction::Stop, args),
        ServiceCommands::Restart(args) => (ServiceAction::Restart, args),
        ServiceCommands::Status(args) => (ServiceAction::Status, args),
        ServiceCommands::Enable(args) => (ServiceAction::Enable, args),
        ServiceCommands::Disable(args) => (ServiceAction::Disable, args),
    };

    let orchestrator = ServiceOrchestrator::new(host, config, ServiceControl::detect(&features));
    let mut reporter = ConsoleReporter::stdout();
    let report = orchestrator.perform(action, &catalog, &service_options(args), &mut reporter)?;
    for line in &report.lines {
        println!("{}", line);
    }
    if !report.success() {
        eprintln!("✗ {}", report.failure_message());
    }
    Ok(report.success())
}

fn service_options(args: ServiceArgs) -> ServiceOptions {
    ServiceOptions {
        include_sockets: args.include_sockets,
        brief: args.brief,
        failing: args.failing,
        ..ServiceOptions::default()
    }
    .only(args.only)
    .exclude(args.exclude)
    .include(args.include)
}
