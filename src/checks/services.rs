use crate::procedures::perform_service_action;
use crate::service::{ServiceAction, ServiceOptions};
use crate::step::{Params, Step, StepContext, StepMetadata, StepResult};

/// Every enabled managed service is running.
pub struct ServicesRunning {
    metadata: StepMetadata,
    params: Params,
}

impl ServicesRunning {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::check("services-running", "Check whether all services are running")
                .tags(&["default"]),
            params,
        }
    }
}

impl Step for ServicesRunning {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let options = ServiceOptions {
            brief: true,
            failing: true,
            ..ServiceOptions::default()
        };
        perform_service_action(ctx, ServiceAction::Status, &options)
    }
}
