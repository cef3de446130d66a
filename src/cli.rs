use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// upkeep - maintenance and upgrade automation for managed servers
#[derive(Parser)]
#[command(name = "upkeep")]
#[command(about = "Runs health checks, service actions and upgrades on a managed server")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Read-only host queries (package and service state) still run so the
    /// preview is realistic; every mutating command is skipped and logged.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upgrade the managed product
    Upgrade {
        #[command(subcommand)]
        action: UpgradeCommands,
    },
    /// Health checks
    Health {
        #[command(subcommand)]
        action: HealthCommands,
    },
    /// Control managed services
    Service {
        #[command(subcommand)]
        action: ServiceCommands,
    },
    /// Validate a configuration file
    ValidateConfig {
        /// Path to configuration file to validate
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum UpgradeCommands {
    /// List versions this host can upgrade to
    ListVersions,
    /// Run the pre-upgrade checks only
    Check {
        /// Target version, as shown by list-versions
        #[arg(long)]
        target_version: String,
    },
    /// Run (or resume) an upgrade
    Run {
        /// Target version, as shown by list-versions
        #[arg(long)]
        target_version: String,
        /// Stop after this phase (e.g. pre-migrations)
        #[arg(long)]
        phase: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum HealthCommands {
    /// List known checks
    List {
        /// Only checks carrying one of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Run checks
    Check {
        /// Tags to select checks by (default: "default")
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Additionally run this check by label
        #[arg(long)]
        label: Option<String>,
        /// Parameter for --label, as key=value
        #[arg(long = "param", requires = "label")]
        params: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// List managed services by priority
    List,
    /// Start services
    Start(ServiceArgs),
    /// Stop services
    Stop(ServiceArgs),
    /// Restart services
    Restart(ServiceArgs),
    /// Show service status
    Status(ServiceArgs),
    /// Enable services at boot
    Enable(ServiceArgs),
    /// Disable services at boot
    Disable(ServiceArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServiceArgs {
    /// Act only on these services (wildcards allowed)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
    /// Leave these services alone
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    /// Add these services even if not managed by default
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,
    /// Also act on companion socket units
    #[arg(long)]
    pub include_sockets: bool,
    /// One status line per service
    #[arg(long)]
    pub brief: bool,
    /// Only show services that failed
    #[arg(long)]
    pub failing: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Split `key=value` parameters.
pub fn parse_params(raw: &[String]) -> Result<Vec<(String, String)>, String> {
    raw.iter()
        .map(|param| {
            param
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| format!("Invalid parameter '{}', expected key=value", param))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_service_args_parse() {
        let cli = Cli::try_parse_from([
            "upkeep",
            "--dry-run",
            "service",
            "stop",
            "--exclude",
            "httpd,foreman",
            "--brief",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Commands::Service {
                action: ServiceCommands::Stop(args),
            } => {
                assert_eq!(args.exclude, vec!["httpd", "foreman"]);
                assert!(args.brief);
            }
            _ => panic!("expected service stop"),
        }
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(&["version=6.7".to_string()]).unwrap();
        assert_eq!(params, vec![("version".to_string(), "6.7".to_string())]);
        assert!(parse_params(&["version".to_string()]).is_err());
        assert!(parse_params(&["=6.7".to_string()]).is_err());
    }
}
