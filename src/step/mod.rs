//! Steps: the atomic units of maintenance work.
//!
//! A step is either a *check* (read-only validation) or a *procedure*
//! (mutates the host). Each step carries [`StepMetadata`] describing what it
//! needs and when it applies; the runner only ever sees the [`Step`] trait.

mod catalog;
mod state;

pub use catalog::{StepCatalog, StepFactory};
pub use state::{StepExecution, StepState, StepTransitionError};

use std::collections::BTreeMap;
use std::fmt;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::features::{CapabilityRegistry, Confine, FeatureSnapshot};
use crate::host::Host;
use crate::progress::ProgressSink;
use crate::remediation::RemediationError;
use crate::service::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    Check,
    Procedure,
}

/// Whether a failed step stops the rest of the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunStrategy {
    /// The first failure skips every remaining step
    #[default]
    FailFast,
    /// Failures are recorded and execution continues
    FailSlow,
}

/// How a step gets into a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMode {
    /// Picked up by tag lookups in the catalog
    #[default]
    Auto,
    /// Only ever added explicitly
    Manual,
}

/// Declared step parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            required: false,
        }
    }
}

/// Parameter values bound to a step instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

static NO_PARAMS: Params = Params(BTreeMap::new());

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Value of a required parameter.
    pub fn require(&self, name: &str) -> Result<&str, StepError> {
        self.get(name)
            .ok_or_else(|| StepError::failed(format!("Missing parameter '{}'", name)))
    }

    /// Boolean parameter (`true`, `yes`, `1`), false when absent.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1"))
    }

    /// Comma-separated list parameter.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// Static description of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMetadata {
    pub label: &'static str,
    pub description: String,
    pub kind: StepKind,
    pub tags: Vec<&'static str>,
    pub params: Vec<ParamSpec>,
    pub confine: Confine,
    /// None inherits the scenario's strategy
    pub run_strategy: Option<RunStrategy>,
    pub detection: DetectionMode,
}

impl StepMetadata {
    pub fn check(label: &'static str, description: impl Into<String>) -> Self {
        Self::new(label, description, StepKind::Check)
    }

    pub fn procedure(label: &'static str, description: impl Into<String>) -> Self {
        Self::new(label, description, StepKind::Procedure)
    }

    fn new(label: &'static str, description: impl Into<String>, kind: StepKind) -> Self {
        Self {
            label,
            description: description.into(),
            kind,
            tags: Vec::new(),
            params: Vec::new(),
            confine: Confine::Always,
            run_strategy: None,
            detection: DetectionMode::Auto,
        }
    }

    pub fn tags(mut self, tags: &[&'static str]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn confine(mut self, confine: Confine) -> Self {
        self.confine = confine;
        self
    }

    pub fn run_strategy(mut self, strategy: RunStrategy) -> Self {
        self.run_strategy = Some(strategy);
        self
    }

    pub fn manual_detection(mut self) -> Self {
        self.detection = DetectionMode::Manual;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| *t == tag)
    }
}

/// How a step finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Done,
    /// Deliberately not applicable; neutral for the scenario result
    Skipped(String),
    /// Succeeded with a caveat; never aborts a scenario
    Warning(String),
}

impl Completion {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }
}

/// A step failure.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Remediation(#[from] RemediationError),

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl StepError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

pub type StepResult = Result<Completion, StepError>;

/// What a running step can reach.
pub struct StepContext<'a> {
    registry: &'a CapabilityRegistry<'a>,
    snapshot: &'a FeatureSnapshot,
    progress: &'a mut dyn ProgressSink,
}

impl<'a> StepContext<'a> {
    pub fn new(
        registry: &'a CapabilityRegistry<'a>,
        snapshot: &'a FeatureSnapshot,
        progress: &'a mut dyn ProgressSink,
    ) -> Self {
        Self {
            registry,
            snapshot,
            progress,
        }
    }

    pub fn host(&self) -> &'a dyn Host {
        self.registry.host()
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.registry.config()
    }

    pub fn features(&self) -> &'a FeatureSnapshot {
        self.snapshot
    }

    pub fn progress(&mut self) -> &mut (dyn ProgressSink + 'a) {
        &mut *self.progress
    }

    pub fn update(&mut self, message: &str) {
        self.progress.update(message);
    }
}

/// A unit of work.
pub trait Step {
    fn metadata(&self) -> &StepMetadata;

    fn params(&self) -> &Params {
        &NO_PARAMS
    }

    /// Steps that must run, in order, immediately before this one.
    ///
    /// Must be pure: the answer may depend on features, never on the host.
    fn preparation_steps(&self, _features: &FeatureSnapshot) -> Vec<Box<dyn Step>> {
        Vec::new()
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult;

    /// Label plus bound parameters; two steps with the same identity do the
    /// same work.
    fn identity(&self) -> String {
        let params = self.params();
        if params.is_empty() {
            self.metadata().label.to_string()
        } else {
            format!("{}[{}]", self.metadata().label, params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = StepMetadata::check("validate-repositories", "Validate repositories")
            .param(ParamSpec::required("version", "Target version"))
            .tags(&["pre_upgrade"])
            .manual_detection()
            .run_strategy(RunStrategy::FailSlow);
        assert_eq!(meta.kind, StepKind::Check);
        assert!(meta.has_tag("pre_upgrade"));
        assert!(!meta.has_tag("default"));
        assert_eq!(meta.detection, DetectionMode::Manual);
        assert_eq!(meta.run_strategy, Some(RunStrategy::FailSlow));
        assert!(meta.params[0].required);
    }

    #[test]
    fn test_params_helpers() {
        let params = Params::new()
            .with("packages", "facter, ruby ,")
            .with("assumeyes", "Yes");
        assert_eq!(params.list("packages"), vec!["facter", "ruby"]);
        assert!(params.flag("assumeyes"));
        assert!(!params.flag("missing"));
        assert!(params.require("missing").is_err());
        assert_eq!(params.to_string(), "assumeyes=Yes,packages=facter, ruby ,");
    }

    #[test]
    fn test_run_strategy_names() {
        assert_eq!(RunStrategy::default(), RunStrategy::FailFast);
        assert_eq!(RunStrategy::FailSlow.to_string(), "fail_slow");
        assert_eq!(
            "fail_fast".parse::<RunStrategy>().unwrap(),
            RunStrategy::FailFast
        );
    }
}
