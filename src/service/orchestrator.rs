use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{
    legacy, ServiceAction, ServiceCatalog, ServiceError, ServiceOptions, ServiceOutcome,
    ServiceReport, ServiceSelector, SystemService,
};
use crate::config::EngineConfig;
use crate::features::FeatureSnapshot;
use crate::host::{Host, HostCommand};
use crate::progress::{status_label, ProgressSink};
use crate::step::StepState;

/// Width used to align brief status labels.
const BRIEF_WIDTH: usize = 50;

/// How services are controlled on the managed product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceControl {
    /// Per-service control through the host service manager
    Systemd,
    /// Delegated to the legacy service command
    Legacy,
    /// Legacy command without `--only` support
    LegacyNoOnly,
}

impl ServiceControl {
    pub fn detect(features: &FeatureSnapshot) -> Self {
        match &features.downstream {
            Some(ds) if ds.less_than_version("6.2") => Self::LegacyNoOnly,
            Some(ds) if ds.less_than_version("6.3") => Self::Legacy,
            _ => Self::Systemd,
        }
    }

    pub fn is_legacy(self) -> bool {
        !matches!(self, Self::Systemd)
    }
}

/// Fans a service action out across the selected services.
pub struct ServiceOrchestrator<'a> {
    host: &'a dyn Host,
    config: &'a EngineConfig,
    control: ServiceControl,
}

impl<'a> ServiceOrchestrator<'a> {
    pub fn new(host: &'a dyn Host, config: &'a EngineConfig, control: ServiceControl) -> Self {
        Self {
            host,
            config,
            control,
        }
    }

    pub fn control(&self) -> ServiceControl {
        self.control
    }

    /// Perform `action` on the services selected from `catalog`.
    ///
    /// Groups run in priority order (reversed for stop). A failed group is
    /// recorded and the next group still runs.
    pub fn perform(
        &self,
        action: ServiceAction,
        catalog: &ServiceCatalog,
        options: &ServiceOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<ServiceReport, ServiceError> {
        if self.control.is_legacy() {
            return legacy::perform(self, action, catalog, options);
        }

        let reverse = options.reverse || action == ServiceAction::Stop;
        let groups = self.grouped_services(action, catalog, options)?;
        let ordered: Vec<(u32, Vec<SystemService>)> = if reverse {
            groups.into_iter().rev().collect()
        } else {
            groups.into_iter().collect()
        };

        let mut report = ServiceReport::new(action);
        for (priority, group) in ordered {
            let names: Vec<&str> = group.iter().map(|s| s.name.as_str()).collect();
            info!(%action, priority, services = ?names, "acting on service group");
            let output = self.host.run(&HostCommand::action(
                &self.config.service_manager,
                std::iter::once(action.to_string()).chain(names.iter().map(|n| n.to_string())),
            ))?;

            self.render_group(action, &group, options, progress, &mut report)?;

            if !output.success() {
                warn!(%action, priority, exit_code = output.status_code(), "service group failed");
                report.status = output.status_code();
                for failed in self.failed_members(action, &group, progress)? {
                    if !report.failed_services.contains(&failed) {
                        report.failed_services.push(failed);
                    }
                }
            }
            report
                .groups
                .push((priority, names.into_iter().map(String::from).collect()));
        }

        if report.success() {
            progress.update(&format!("All services {}", action.past_tense()));
            if action == ServiceAction::Status {
                progress.update("All services are running");
            }
        }
        Ok(report)
    }

    /// Selected services keyed by priority.
    pub fn grouped_services(
        &self,
        action: ServiceAction,
        catalog: &ServiceCatalog,
        options: &ServiceOptions,
    ) -> Result<BTreeMap<u32, Vec<SystemService>>, ServiceError> {
        let selected = self.select(catalog, options)?;

        let mut services = Vec::with_capacity(selected.len());
        for service in selected {
            if action.needs_enabled() && !service.is_enabled(self.host, self.config)? {
                debug!(service = %service, "skipping disabled service");
                continue;
            }
            services.push(service);
        }
        if services.is_empty() {
            return Err(ServiceError::NoServicesSelected);
        }

        let mut groups: BTreeMap<u32, Vec<SystemService>> = BTreeMap::new();
        for service in services {
            groups.entry(service.priority).or_default().push(service);
        }
        Ok(groups)
    }

    /// Apply include, only and exclude (in that order), then add sockets.
    pub(super) fn select(
        &self,
        catalog: &ServiceCatalog,
        options: &ServiceOptions,
    ) -> Result<Vec<SystemService>, ServiceError> {
        let existing = catalog.existing(self.host, self.config)?;
        let mut services = self.include_unregistered(existing, &options.include)?;

        if !options.only.is_empty() {
            services.retain(|service| options.only.iter().any(|sel| sel.matches(service)));
            services = self.include_unregistered(services, &options.only)?;
        }

        if !options.exclude.is_empty() {
            services.retain(|service| !options.exclude.contains(&service.name));
        }

        if options.include_sockets {
            let mut sockets = Vec::new();
            for socket in services.iter().filter_map(SystemService::socket_service) {
                if socket.exists(self.host, self.config)? {
                    sockets.push(socket);
                }
            }
            services.extend(sockets);
        }
        Ok(services)
    }

    /// Add selectors that match nothing in `services`, each of which must
    /// exist on the host.
    fn include_unregistered(
        &self,
        mut services: Vec<SystemService>,
        selectors: &[ServiceSelector],
    ) -> Result<Vec<SystemService>, ServiceError> {
        let missing: Vec<&ServiceSelector> = selectors
            .iter()
            .filter(|sel| !services.iter().any(|service| sel.matches(service)))
            .collect();

        for selector in missing {
            let service = selector.construct();
            if !service.exists(self.host, self.config)? {
                return Err(ServiceError::NoMatchingService(selector.name().to_string()));
            }
            services.push(service);
        }
        Ok(services)
    }

    /// Members of a failed group that did not reach the requested state.
    fn failed_members(
        &self,
        action: ServiceAction,
        group: &[SystemService],
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<String>, ServiceError> {
        let mut failed = Vec::new();
        for service in group {
            progress.update(&format!("{} {}", action.noun(), service));
            let ok = match action {
                ServiceAction::Stop => !service.is_running(self.host, self.config)?,
                ServiceAction::Enable => service.is_enabled(self.host, self.config)?,
                ServiceAction::Disable => !service.is_enabled(self.host, self.config)?,
                _ => service.is_running(self.host, self.config)?,
            };
            if !ok {
                failed.push(service.name.clone());
            }
        }
        Ok(failed)
    }

    fn render_group(
        &self,
        action: ServiceAction,
        group: &[SystemService],
        options: &ServiceOptions,
        progress: &mut dyn ProgressSink,
        report: &mut ServiceReport,
    ) -> Result<(), ServiceError> {
        for service in group {
            progress.update(&format!("{} {}", action.noun(), service));
            let status = service.status(self.host, self.config)?;
            let outcome = ServiceOutcome {
                service: service.name.clone(),
                exit_code: status.status_code(),
                output: status.combined(),
            };
            if let Some(line) = format_status(action, &outcome, options) {
                report.lines.push(line);
            }
            report.outcomes.push(outcome);
        }
        Ok(())
    }

    pub(super) fn host(&self) -> &'a dyn Host {
        self.host
    }

    pub(super) fn config(&self) -> &'a EngineConfig {
        self.config
    }
}

/// Whether full status output is worth showing.
fn include_output(action: ServiceAction, exit_code: i32) -> bool {
    (action == ServiceAction::Start && exit_code != 0) || action == ServiceAction::Status
}

/// Operator line for one service, if any.
fn format_status(
    action: ServiceAction,
    outcome: &ServiceOutcome,
    options: &ServiceOptions,
) -> Option<String> {
    if options.failing && outcome.exit_code == 0 {
        return None;
    }
    if options.brief {
        let state = if outcome.exit_code == 0 {
            StepState::Success
        } else {
            StepState::Failed(String::new())
        };
        let label = status_label(&state);
        let pad = BRIEF_WIDTH.saturating_sub(outcome.service.chars().count()).max(1);
        return Some(format!("{}{}{}", outcome.service, " ".repeat(pad), label));
    }
    if include_output(action, outcome.exit_code) && !outcome.output.is_empty() {
        return Some(outcome.output.clone());
    }
    None
}
