//! Scenario composition.
//!
//! A scenario is a fixed, ordered list of steps. It is built by a
//! [`ScenarioDefinition`] through a [`Composer`], which applies confinement
//! and parameter validation as steps are added. Composition never touches
//! the host: it sees features only through a resolved [`FeatureSnapshot`].

use thiserror::Error;
use tracing::debug;

use crate::features::{Confine, FeatureSnapshot};
use crate::runner::applicable_preparations;
use crate::step::{Params, RunStrategy, Step, StepCatalog, StepKind, StepMetadata};

/// Errors raised while building a scenario. Fatal; nothing has run yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("Step '{step}' requires parameter '{param}'")]
    MissingParameter { step: String, param: String },

    #[error("Step '{step}' does not accept parameter '{param}'")]
    UnknownParameter { step: String, param: String },

    #[error("Step '{step}' does not apply to this host")]
    Unconfined { step: String },

    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error("No upgrade scenario available for target version {0}")]
    UnknownTarget(String),
}

/// Scenario-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioMetadata {
    pub label: String,
    pub description: String,
    pub tags: Vec<String>,
    pub confine: Confine,
    pub run_strategy: RunStrategy,
    /// Count skipped steps as failures when deciding the overall result
    pub escalate_skips: bool,
}

impl ScenarioMetadata {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            tags: Vec::new(),
            confine: Confine::Always,
            run_strategy: RunStrategy::FailFast,
            escalate_skips: false,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn confine(mut self, confine: Confine) -> Self {
        self.confine = confine;
        self
    }

    pub fn run_strategy(mut self, strategy: RunStrategy) -> Self {
        self.run_strategy = strategy;
        self
    }

    pub fn escalate_skips(mut self) -> Self {
        self.escalate_skips = true;
        self
    }
}

/// A composed, ready-to-run plan.
pub struct Scenario {
    pub metadata: ScenarioMetadata,
    steps: Vec<Box<dyn Step>>,
}

impl Scenario {
    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Planned step labels with preparation steps expanded ahead of their
    /// parent, in the order the runner would execute them.
    pub fn plan(&self, features: &FeatureSnapshot) -> Vec<String> {
        let mut plan = Vec::new();
        for step in &self.steps {
            expand_plan(step.as_ref(), features, &mut plan);
        }
        plan
    }
}

fn expand_plan(step: &dyn Step, features: &FeatureSnapshot, plan: &mut Vec<String>) {
    for prep in applicable_preparations(step, features) {
        expand_plan(prep.as_ref(), features, plan);
    }
    let identity = step.identity();
    if !plan.contains(&identity) {
        plan.push(identity);
    }
}

/// Builds a scenario's step list.
pub struct Composer<'a> {
    features: &'a FeatureSnapshot,
    catalog: &'a StepCatalog,
    steps: Vec<Box<dyn Step>>,
}

impl<'a> Composer<'a> {
    pub fn new(features: &'a FeatureSnapshot, catalog: &'a StepCatalog) -> Self {
        Self {
            features,
            catalog,
            steps: Vec::new(),
        }
    }

    pub fn features(&self) -> &'a FeatureSnapshot {
        self.features
    }

    /// Append a step. A step whose confinement is false is left out.
    pub fn add_step(&mut self, step: Box<dyn Step>) -> Result<&mut Self, CompositionError> {
        validate_params(step.metadata(), step.params())?;
        if step.metadata().confine.evaluate(self.features) {
            self.steps.push(step);
        } else {
            debug!(step = step.metadata().label, "step confined out");
        }
        Ok(self)
    }

    /// Append a step that must apply; confinement failing is an error.
    pub fn add_required_step(
        &mut self,
        step: Box<dyn Step>,
    ) -> Result<&mut Self, CompositionError> {
        if !step.metadata().confine.evaluate(self.features) {
            return Err(CompositionError::Unconfined {
                step: step.metadata().label.to_string(),
            });
        }
        self.add_step(step)
    }

    pub fn add_steps(
        &mut self,
        steps: Vec<Box<dyn Step>>,
    ) -> Result<&mut Self, CompositionError> {
        for step in steps {
            self.add_step(step)?;
        }
        Ok(self)
    }

    /// Append a catalog step by label with the given parameters.
    pub fn add_labeled(
        &mut self,
        label: &str,
        params: Params,
    ) -> Result<&mut Self, CompositionError> {
        let step = self
            .catalog
            .create(label, params)
            .ok_or_else(|| CompositionError::UnknownStep(label.to_string()))?;
        self.add_step(step)
    }

    pub fn find_checks(&self, tag: &str) -> Vec<Box<dyn Step>> {
        self.catalog.find_checks(tag)
    }

    pub fn find_procedures(&self, tag: &str) -> Vec<Box<dyn Step>> {
        self.catalog.find_procedures(tag)
    }

    fn finish(self, metadata: ScenarioMetadata) -> Scenario {
        Scenario {
            metadata,
            steps: self.steps,
        }
    }
}

fn validate_params(metadata: &StepMetadata, params: &Params) -> Result<(), CompositionError> {
    for spec in metadata.params.iter().filter(|spec| spec.required) {
        if params.get(spec.name).is_none() {
            return Err(CompositionError::MissingParameter {
                step: metadata.label.to_string(),
                param: spec.name.to_string(),
            });
        }
    }
    for name in params.names() {
        if !metadata.params.iter().any(|spec| spec.name == name) {
            return Err(CompositionError::UnknownParameter {
                step: metadata.label.to_string(),
                param: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Static description of a scenario: its metadata and composition rules.
pub trait ScenarioDefinition {
    fn metadata(&self) -> ScenarioMetadata;

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError>;
}

/// Build a scenario. `Ok(None)` when the scenario itself does not apply.
pub fn compose(
    definition: &dyn ScenarioDefinition,
    features: &FeatureSnapshot,
    catalog: &StepCatalog,
) -> Result<Option<Scenario>, CompositionError> {
    let metadata = definition.metadata();
    if !metadata.confine.evaluate(features) {
        debug!(scenario = %metadata.label, "scenario confined out");
        return Ok(None);
    }
    let mut composer = Composer::new(features, catalog);
    definition.compose(&mut composer)?;
    let scenario = composer.finish(metadata);
    debug!(
        scenario = %scenario.metadata.label,
        steps = scenario.steps.len(),
        "scenario composed"
    );
    Ok(Some(scenario))
}

/// Ad-hoc scenario: checks (or procedures) carrying any of `tags`, plus
/// explicitly requested steps.
pub struct TaggedScenario {
    pub label: String,
    pub description: String,
    pub kind: StepKind,
    pub tags: Vec<String>,
    pub explicit: Vec<(String, Params)>,
    pub run_strategy: RunStrategy,
}

impl TaggedScenario {
    /// Health checks by tag; fail_slow so every check reports.
    pub fn health_checks(tags: Vec<String>) -> Self {
        Self {
            label: "health-check".to_string(),
            description: "health checks".to_string(),
            kind: StepKind::Check,
            tags,
            explicit: Vec::new(),
            run_strategy: RunStrategy::FailSlow,
        }
    }

    pub fn with_step(mut self, label: impl Into<String>, params: Params) -> Self {
        self.explicit.push((label.into(), params));
        self
    }
}

impl ScenarioDefinition for TaggedScenario {
    fn metadata(&self) -> ScenarioMetadata {
        let mut metadata = ScenarioMetadata::new(&self.label, &self.description)
            .run_strategy(self.run_strategy);
        metadata.tags = self.tags.clone();
        metadata
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        let mut added: Vec<&'static str> = Vec::new();
        for tag in &self.tags {
            let found = match self.kind {
                StepKind::Check => composer.find_checks(tag),
                StepKind::Procedure => composer.find_procedures(tag),
            };
            for step in found {
                // A step carrying several requested tags is added once.
                if !added.contains(&step.metadata().label) {
                    added.push(step.metadata().label);
                    composer.add_step(step)?;
                }
            }
        }
        for (label, params) in &self.explicit {
            composer.add_labeled(label, params.clone())?;
        }
        Ok(())
    }
}
