//! Scenario execution.
//!
//! Steps run one at a time in scenario order. Before each step its
//! preparation steps run, recursively, under the same rules. A step that
//! already ran in this scenario (same label and parameters) is never run
//! again; later requests see its recorded outcome.
//!
//! # Run strategy
//!
//! Each step runs under its own strategy if it declares one, otherwise the
//! scenario's. Under `fail_fast` the first failure aborts the scenario and
//! every step not yet run is marked skipped, naming the failed step. Under
//! `fail_slow` the failure is recorded and execution continues. Warnings and
//! skips never abort.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::features::{CapabilityRegistry, FeatureSnapshot};
use crate::progress::Reporter;
use crate::scenario::Scenario;
use crate::step::{RunStrategy, Step, StepContext, StepExecution, StepState};

/// Everything that happened during one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub label: String,
    pub description: String,
    /// One entry per step, in execution order, preparation steps included
    pub executions: Vec<StepExecution>,
    pub overall: StepState,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        !self.overall.is_failed()
    }

    pub fn failed_steps(&self) -> Vec<&str> {
        self.executions
            .iter()
            .filter(|e| e.state().is_failed())
            .map(|e| e.label())
            .collect()
    }

    pub fn state_of(&self, label: &str) -> Option<&StepState> {
        self.executions
            .iter()
            .find(|e| e.label() == label)
            .map(|e| e.state())
    }
}

#[derive(Default)]
struct RunState {
    executions: Vec<StepExecution>,
    outcomes: HashMap<String, StepState>,
    aborted_by: Option<String>,
}

/// Runs composed scenarios against the host behind a capability registry.
pub struct Runner<'a> {
    registry: &'a CapabilityRegistry<'a>,
    features: &'a FeatureSnapshot,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a CapabilityRegistry<'a>, features: &'a FeatureSnapshot) -> Self {
        Self { registry, features }
    }

    pub fn run<R: Reporter>(&self, scenario: &Scenario, reporter: &mut R) -> Result<ScenarioReport> {
        let metadata = &scenario.metadata;
        info!(scenario = %metadata.label, strategy = %metadata.run_strategy, "running scenario");
        reporter.scenario_started(&metadata.description);

        let mut run = RunState::default();
        for step in scenario.steps() {
            self.run_step(step.as_ref(), None, metadata.run_strategy, &mut run, reporter)?;
        }

        let overall = overall_state(&run.executions, metadata.escalate_skips);
        reporter.scenario_finished(&metadata.description, &overall);
        info!(scenario = %metadata.label, result = %overall, "scenario finished");

        Ok(ScenarioReport {
            label: metadata.label.clone(),
            description: metadata.description.clone(),
            executions: run.executions,
            overall,
        })
    }

    fn run_step<R: Reporter>(
        &self,
        step: &dyn Step,
        parent: Option<&str>,
        inherited: RunStrategy,
        run: &mut RunState,
        reporter: &mut R,
    ) -> Result<StepState> {
        let identity = step.identity();
        if let Some(state) = run.outcomes.get(&identity) {
            return Ok(state.clone());
        }

        let metadata = step.metadata();
        let strategy = metadata.run_strategy.unwrap_or(inherited);
        let mut execution = StepExecution::new(metadata.label, metadata.description.as_str());
        if let Some(parent) = parent {
            execution = execution.preparing(parent);
        }

        let mut blocked_by = None;
        if run.aborted_by.is_none() {
            for prep in applicable_preparations(step, self.features) {
                let state = self.run_step(prep.as_ref(), Some(metadata.label), strategy, run, reporter)?;
                if state.is_failed() {
                    blocked_by = Some(prep.metadata().label);
                    break;
                }
            }
        }

        if let Some(aborter) = &run.aborted_by {
            execution.skip(format!("aborted after failure of {}", aborter))?;
        } else if let Some(prep) = blocked_by {
            execution.skip(format!("preparation step {} failed", prep))?;
        } else {
            execution.start()?;
            reporter.step_started(metadata);
            let result = {
                let mut ctx = StepContext::new(self.registry, self.features, &mut *reporter);
                step.run(&mut ctx)
            };
            let state = execution.finish(result)?;
            if state.is_failed() {
                warn!(step = metadata.label, %state, "step failed");
                if strategy == RunStrategy::FailFast {
                    run.aborted_by = Some(metadata.label.to_string());
                }
            } else {
                info!(step = metadata.label, %state, "step finished");
            }
        }

        let state = execution.state().clone();
        reporter.step_finished(metadata, &state);
        run.outcomes.insert(identity, state.clone());
        run.executions.push(execution);
        Ok(state)
    }
}

/// Preparation steps whose confinement holds; the rest are never run or listed.
pub(crate) fn applicable_preparations(
    step: &dyn Step,
    features: &FeatureSnapshot,
) -> Vec<Box<dyn Step>> {
    step.preparation_steps(features)
        .into_iter()
        .filter(|prep| {
            let applies = prep.metadata().confine.evaluate(features);
            if !applies {
                debug!(step = prep.metadata().label, "preparation step confined out");
            }
            applies
        })
        .collect()
}

fn overall_state(executions: &[StepExecution], escalate_skips: bool) -> StepState {
    let failed: Vec<&str> = executions
        .iter()
        .filter(|e| e.state().is_failed())
        .map(|e| e.label())
        .collect();
    if !failed.is_empty() {
        return StepState::Failed(format!("Failed steps: {}", failed.join(", ")));
    }

    if escalate_skips {
        let skipped: Vec<&str> = executions
            .iter()
            .filter(|e| matches!(e.state(), StepState::Skipped(_)))
            .map(|e| e.label())
            .collect();
        if !skipped.is_empty() {
            return StepState::Failed(format!("Skipped steps: {}", skipped.join(", ")));
        }
    }

    if executions
        .iter()
        .any(|e| matches!(e.state(), StepState::Warning(_)))
    {
        return StepState::Warning("Completed with warnings".to_string());
    }
    StepState::Success
}
