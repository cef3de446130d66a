use crate::service::{
    ServiceAction, ServiceCatalog, ServiceControl, ServiceOptions, ServiceOrchestrator,
};
use crate::step::{
    Completion, ParamSpec, Params, Step, StepContext, StepError, StepMetadata, StepResult,
};

/// Run a service action through the orchestrator and judge the report.
pub fn perform_service_action(
    ctx: &mut StepContext<'_>,
    action: ServiceAction,
    options: &ServiceOptions,
) -> StepResult {
    let features = ctx.features();
    let catalog = ServiceCatalog::for_host(features, ctx.config());
    let orchestrator =
        ServiceOrchestrator::new(ctx.host(), ctx.config(), ServiceControl::detect(features));

    let report = orchestrator.perform(action, &catalog, options, ctx.progress())?;
    for line in &report.lines {
        ctx.update(line);
    }
    if report.success() {
        Ok(Completion::Done)
    } else {
        Err(StepError::failed(report.failure_message()))
    }
}

/// One service action as a procedure (`service-start`, `service-stop`, ...).
pub struct ServiceProcedure {
    action: ServiceAction,
    metadata: StepMetadata,
    params: Params,
}

impl ServiceProcedure {
    pub fn new(action: ServiceAction, params: Params) -> Self {
        let label = match action {
            ServiceAction::Start => "service-start",
            ServiceAction::Stop => "service-stop",
            ServiceAction::Restart => "service-restart",
            ServiceAction::Status => "service-status",
            ServiceAction::Enable => "service-enable",
            ServiceAction::Disable => "service-disable",
        };
        let verb = action.noun();
        let mut chars = verb.chars();
        let capitalized: String = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .into_iter()
            .chain(chars)
            .collect();
        let metadata = StepMetadata::procedure(label, format!("{} applicable services", capitalized))
            .param(ParamSpec::optional("only", "Comma-separated services to act on"))
            .param(ParamSpec::optional("exclude", "Comma-separated services to leave alone"))
            .param(ParamSpec::optional("include", "Comma-separated services to add"))
            .param(ParamSpec::optional("include_sockets", "Also act on socket units"))
            .param(ParamSpec::optional("brief", "Brief status output"))
            .param(ParamSpec::optional("failing", "Only show failing services"));
        Self {
            action,
            metadata,
            params,
        }
    }

    pub fn action(&self) -> ServiceAction {
        self.action
    }

    fn options(&self) -> ServiceOptions {
        ServiceOptions {
            only: self.params.list("only").into_iter().map(Into::into).collect(),
            exclude: self.params.list("exclude"),
            include: self.params.list("include").into_iter().map(Into::into).collect(),
            include_sockets: self.params.flag("include_sockets"),
            brief: self.params.flag("brief"),
            failing: self.params.flag("failing"),
            reverse: false,
        }
    }
}

impl Step for ServiceProcedure {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        perform_service_action(ctx, self.action, &self.options())
    }
}
