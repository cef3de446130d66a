//! Delegation to the legacy service command on old product generations.
//!
//! The legacy command takes `--exclude` and, except on the oldest
//! generation, `--only`. Where `--only` is missing it is emulated by
//! excluding every existing service that was not selected.

use tracing::info;

use super::orchestrator::{ServiceControl, ServiceOrchestrator};
use super::{ServiceAction, ServiceCatalog, ServiceError, ServiceOptions, ServiceReport};
use crate::host::HostCommand;

const MINIMUM_TOGGLE_VERSION: &str = "6.3";

pub(super) fn perform(
    orchestrator: &ServiceOrchestrator<'_>,
    action: ServiceAction,
    catalog: &ServiceCatalog,
    options: &ServiceOptions,
) -> Result<ServiceReport, ServiceError> {
    if action.is_toggle() {
        return Err(ServiceError::ToggleUnsupported {
            action,
            minimum: MINIMUM_TOGGLE_VERSION,
        });
    }

    let args = match orchestrator.control() {
        ServiceControl::LegacyNoOnly => emulated_only_args(orchestrator, action, catalog, options)?,
        _ => filter_args(action, options),
    };
    let command = HostCommand::action(&orchestrator.config().legacy_service_command, args);

    let mut report = ServiceReport::new(action);
    report.lines.push(format!(
        "Services are handled by {} on this product version; --brief and --failing are ignored.",
        orchestrator.config().legacy_service_command
    ));
    report.lines.push(format!("Redirecting to: {}", command));

    info!(%command, "delegating to legacy service command");
    let output = orchestrator.host().run(&command)?;
    let text = output.combined();
    if !text.is_empty() {
        report.lines.push(text);
    }
    report.status = output.status_code();
    Ok(report)
}

fn filter_args(action: ServiceAction, options: &ServiceOptions) -> Vec<String> {
    let mut args = vec![action.to_string()];
    if !options.exclude.is_empty() {
        args.push("--exclude".to_string());
        args.push(options.exclude.join(","));
    }
    if !options.only.is_empty() {
        args.push("--only".to_string());
        args.push(
            options
                .only
                .iter()
                .map(|sel| sel.name())
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    args
}

/// `--exclude` listing every existing service outside the selection.
fn emulated_only_args(
    orchestrator: &ServiceOrchestrator<'_>,
    action: ServiceAction,
    catalog: &ServiceCatalog,
    options: &ServiceOptions,
) -> Result<Vec<String>, ServiceError> {
    let existing = catalog.existing(orchestrator.host(), orchestrator.config())?;

    // The legacy command can only act on services it knows about.
    if let Some(unknown) = options
        .only
        .iter()
        .find(|sel| !existing.iter().any(|service| sel.matches(service)))
    {
        return Err(ServiceError::UnknownLegacyService(unknown.name().to_string()));
    }

    let selected = orchestrator.select(catalog, options)?;
    let excluded: Vec<&str> = existing
        .iter()
        .filter(|service| !selected.iter().any(|s| s.name == service.name))
        .map(|service| service.name.as_str())
        .collect();

    let mut args = vec![action.to_string()];
    if !excluded.is_empty() {
        args.push("--exclude".to_string());
        args.push(excluded.join(","));
    }
    Ok(args)
}
