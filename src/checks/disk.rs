use anyhow::Context;
use tracing::debug;

use crate::host::HostCommand;
use crate::step::{Completion, Params, Step, StepContext, StepError, StepMetadata, StepResult};

const MOUNT_POINT: &str = "/var";

/// Enough free space under /var for package downloads and migrations.
pub struct AvailableSpace {
    metadata: StepMetadata,
    params: Params,
}

impl AvailableSpace {
    pub fn new(params: Params) -> Self {
        Self {
            metadata: StepMetadata::check("disk-space", "Check for free disk space")
                .tags(&["pre_upgrade"]),
            params,
        }
    }
}

impl Step for AvailableSpace {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        let required = ctx.config().min_free_space_mb;
        ctx.update(&format!("Measuring free space in {}", MOUNT_POINT));

        let output = ctx
            .host()
            .run(&HostCommand::query(
                "df",
                ["--output=avail", "-BM", MOUNT_POINT],
            ))
            .context("Failed to measure free disk space")?;
        output.ensure_success("df")?;

        let available = parse_available_mb(&output.stdout).ok_or_else(|| {
            StepError::failed(format!("Could not read free space from: {}", output.stdout.trim()))
        })?;
        debug!(available, required, "free space in {}", MOUNT_POINT);

        if available < required {
            return Err(StepError::failed(format!(
                "Only {} MB free in {}, at least {} MB required",
                available, MOUNT_POINT, required
            )));
        }
        Ok(Completion::Done)
    }
}

/// Last line of `df --output=avail -BM`, e.g. `  10240M`.
fn parse_available_mb(output: &str) -> Option<u64> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()?
        .trim_end_matches('M')
        .parse()
        .ok()
}
