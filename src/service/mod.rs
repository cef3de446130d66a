//! Service lifecycle orchestration.
//!
//! Managed daemons are acted on in priority groups: lower priorities start
//! first and stop last. Each group is one batch command to the host service
//! manager; a failing batch is narrowed down to the failing members with
//! per-service probes, and later groups are still attempted.
//!
//! Old product generations have no per-service control; there every action
//! is delegated to the legacy service command instead (see [`legacy`]).

mod catalog;
mod legacy;
mod orchestrator;

pub use catalog::ServiceCatalog;
pub use orchestrator::{ServiceControl, ServiceOrchestrator};

use anyhow::Context;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::host::{CommandOutput, Host, HostCommand};

/// Priority given to services named on the command line but unknown to the
/// catalog.
pub const DEFAULT_PRIORITY: u32 = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Unsupported service action '{0}'")]
    UnsupportedAction(String),

    #[error("Service {action} is only supported on product version {minimum} and later")]
    ToggleUnsupported {
        action: ServiceAction,
        minimum: &'static str,
    },

    #[error("No service found matching your parameter '{0}'")]
    NoMatchingService(String),

    #[error("No services found matching your parameters")]
    NoServicesSelected,

    #[error("Service '{0}' is not handled by the legacy service command")]
    UnknownLegacyService(String),

    #[error("Host error: {0}")]
    Host(String),
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Host(format!("{:#}", err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Status,
    Enable,
    Disable,
}

impl FromStr for ServiceAction {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "status" => Ok(Self::Status),
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            other => Err(ServiceError::UnsupportedAction(other.to_string())),
        }
    }
}

impl ServiceAction {
    /// Actions that only make sense for services enabled at boot.
    pub fn needs_enabled(self) -> bool {
        matches!(self, Self::Start | Self::Stop | Self::Restart | Self::Status)
    }

    pub fn is_toggle(self) -> bool {
        matches!(self, Self::Enable | Self::Disable)
    }

    /// "starting", "displaying", ...
    pub fn noun(self) -> &'static str {
        match self {
            Self::Start => "starting",
            Self::Stop => "stopping",
            Self::Restart => "restarting",
            Self::Status => "displaying",
            Self::Enable => "enabling",
            Self::Disable => "disabling",
        }
    }

    /// "started", "displayed", ...
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
            Self::Restart => "restarted",
            Self::Status => "displayed",
            Self::Enable => "enabled",
            Self::Disable => "disabled",
        }
    }
}

/// A systemd unit managed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SystemService {
    pub name: String,
    pub priority: u32,
    /// Companion socket unit
    pub socket: Option<String>,
}

/// `systemctl is-enabled` answers for units that exist.
const KNOWN_UNIT_STATES: &[&str] = &[
    "enabled",
    "enabled-runtime",
    "disabled",
    "static",
    "indirect",
    "generated",
    "linked",
    "linked-runtime",
];

impl SystemService {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            socket: None,
        }
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Exact name or `*` wildcard match.
    pub fn matches(&self, pattern: &str) -> bool {
        wildcard_match(pattern, &self.name)
    }

    /// The companion socket as a service of the same priority.
    pub fn socket_service(&self) -> Option<SystemService> {
        self.socket
            .as_ref()
            .map(|socket| SystemService::new(socket.clone(), self.priority))
    }

    pub fn exists(&self, host: &dyn Host, config: &EngineConfig) -> anyhow::Result<bool> {
        let output = self.query(host, config, "is-enabled")?;
        let state = output.stdout.lines().last().unwrap_or("").trim();
        Ok(KNOWN_UNIT_STATES.contains(&state))
    }

    pub fn is_enabled(&self, host: &dyn Host, config: &EngineConfig) -> anyhow::Result<bool> {
        Ok(self.query(host, config, "is-enabled")?.success())
    }

    pub fn is_running(&self, host: &dyn Host, config: &EngineConfig) -> anyhow::Result<bool> {
        Ok(self.query(host, config, "is-active")?.success())
    }

    /// Full status output; exit code 0 when the unit is active.
    pub fn status(&self, host: &dyn Host, config: &EngineConfig) -> anyhow::Result<CommandOutput> {
        self.query(host, config, "status")
    }

    fn query(
        &self,
        host: &dyn Host,
        config: &EngineConfig,
        verb: &str,
    ) -> anyhow::Result<CommandOutput> {
        host.run(&HostCommand::query(
            &config.service_manager,
            [verb, self.name.as_str()],
        ))
        .with_context(|| format!("Failed to query {} of {}", verb, self.name))
    }
}

impl fmt::Display for SystemService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Minimal glob: `*` matches any run of characters.
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = name.strip_prefix(first) else {
        return false;
    };
    let last = rest[rest.len() - 1];
    for middle in &rest[..rest.len() - 1] {
        match remaining.find(middle) {
            Some(idx) => remaining = &remaining[idx + middle.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

/// A service named by the caller, or one constructed directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSelector {
    Name(String),
    Service(SystemService),
}

impl ServiceSelector {
    pub fn matches(&self, service: &SystemService) -> bool {
        match self {
            Self::Name(pattern) => service.matches(pattern),
            Self::Service(wanted) => wanted.name == service.name,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Service(service) => &service.name,
        }
    }

    /// The service this selector stands for when it is not in the catalog.
    fn construct(&self) -> SystemService {
        match self {
            Self::Name(name) => SystemService::new(name.clone(), DEFAULT_PRIORITY),
            Self::Service(service) => service.clone(),
        }
    }
}

impl From<&str> for ServiceSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ServiceSelector {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<SystemService> for ServiceSelector {
    fn from(service: SystemService) -> Self {
        Self::Service(service)
    }
}

/// Selection and rendering options for one orchestrator call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Restrict to these services
    pub only: Vec<ServiceSelector>,
    /// Drop these services
    pub exclude: Vec<String>,
    /// Add these services even if the catalog does not list them
    pub include: Vec<ServiceSelector>,
    /// Also act on companion socket units
    pub include_sockets: bool,
    /// One `[OK]`/`[FAIL]` line per service
    pub brief: bool,
    /// Only render services that failed
    pub failing: bool,
    /// Walk priority groups highest first; always on for stop
    pub reverse: bool,
}

impl ServiceOptions {
    pub fn only<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServiceSelector>,
    {
        self.only = services.into_iter().map(Into::into).collect();
        self
    }

    /// Drop services by exact name; wildcards are not expanded here.
    pub fn exclude<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn include<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServiceSelector>,
    {
        self.include = services.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-service result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutcome {
    pub service: String,
    pub exit_code: i32,
    pub output: String,
}

/// Aggregated result of an orchestrator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub action: ServiceAction,
    /// 0 when every group succeeded
    pub status: i32,
    pub failed_services: Vec<String>,
    /// Services per priority group, in the order the groups ran
    pub groups: Vec<(u32, Vec<String>)>,
    pub outcomes: Vec<ServiceOutcome>,
    /// Lines to show the operator
    pub lines: Vec<String>,
}

impl ServiceReport {
    pub(crate) fn new(action: ServiceAction) -> Self {
        Self {
            action,
            status: 0,
            failed_services: Vec::new(),
            groups: Vec::new(),
            outcomes: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0 && self.failed_services.is_empty()
    }

    /// Operator-facing summary of a failed call.
    pub fn failure_message(&self) -> String {
        let failed = self.failed_services.join(", ");
        match self.action {
            ServiceAction::Status => format!("Some services are not running ({})", failed),
            action if failed.is_empty() => format!(
                "Services could not be {} (exit code {})",
                action.past_tense(),
                self.status
            ),
            action => format!("Some services could not be {} ({})", action.past_tense(), failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptedHost;

    #[test]
    fn test_action_parse() {
        assert_eq!("stop".parse::<ServiceAction>().unwrap(), ServiceAction::Stop);
        assert_eq!(
            "reload".parse::<ServiceAction>().unwrap_err(),
            ServiceError::UnsupportedAction("reload".into())
        );
        assert_eq!(ServiceAction::Disable.to_string(), "disable");
    }

    #[test]
    fn test_action_words() {
        assert_eq!(ServiceAction::Stop.noun(), "stopping");
        assert_eq!(ServiceAction::Status.past_tense(), "displayed");
        assert_eq!(ServiceAction::Enable.past_tense(), "enabled");
    }

    #[test]
    fn test_wildcard_match() {
        let svc = SystemService::new("pulp_resource_manager", 20);
        assert!(svc.matches("pulp_resource_manager"));
        assert!(svc.matches("pulp*"));
        assert!(svc.matches("*manager"));
        assert!(svc.matches("pulp*source*"));
        assert!(!svc.matches("pulp"));
        assert!(!svc.matches("httpd*"));
        assert!(wildcard_match("a*a", "aa"));
        assert!(!wildcard_match("ab*ba", "aba"));
    }

    #[test]
    fn test_exists_reads_unit_state() {
        let host = ScriptedHost::new();
        host.respond(
            "systemctl is-enabled httpd",
            CommandOutput::with_status(1, "disabled\n"),
        );
        host.respond(
            "systemctl is-enabled nope",
            CommandOutput::with_status(1, "Failed to get unit file state for nope.service: No such file or directory\n"),
        );
        let config = EngineConfig::default();
        assert!(SystemService::new("httpd", 30).exists(&host, &config).unwrap());
        assert!(!SystemService::new("httpd", 30).is_enabled(&host, &config).unwrap());
        assert!(!SystemService::new("nope", 30).exists(&host, &config).unwrap());
    }

    #[test]
    fn test_failure_message() {
        let mut report = ServiceReport::new(ServiceAction::Status);
        report.status = 3;
        report.failed_services = vec!["httpd".into(), "foreman".into()];
        assert_eq!(
            report.failure_message(),
            "Some services are not running (httpd, foreman)"
        );
        assert!(!report.success());
    }
}
