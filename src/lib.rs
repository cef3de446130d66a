//! upkeep library
//!
//! Maintenance automation for managed server installations: confinable
//! checks and procedures composed into scenarios, a runner with
//! fail-fast/fail-slow semantics, service lifecycle orchestration by
//! priority group, and upgrade-path selection by installed product version.

pub mod checks;
pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod host;
pub mod package_manager;
pub mod procedures;
pub mod progress;
pub mod remediation;
pub mod runner;
pub mod sanity;
pub mod scenario;
pub mod service;
pub mod step;
pub mod upgrade;
pub mod version;

// Re-export main types for convenience
pub use config::{EngineConfig, ServiceSpec};
pub use error::{Result, UpkeepError};
pub use features::{CapabilityRegistry, Confine, FeatureId, FeatureSnapshot, ProductIdentity};
pub use host::{CommandOutput, DryRunHost, Host, HostCommand, ScriptedHost, SystemHost};
pub use package_manager::PackageManager;
pub use progress::{ConsoleReporter, NullProgress, ProgressSink, Reporter};
pub use remediation::{verify_remediate, Remediation, RemediationError, Verification};
pub use runner::{Runner, ScenarioReport};
pub use scenario::{
    compose, Composer, CompositionError, Scenario, ScenarioDefinition, ScenarioMetadata,
    TaggedScenario,
};
pub use service::{
    ServiceAction, ServiceCatalog, ServiceControl, ServiceError, ServiceOptions,
    ServiceOrchestrator, ServiceReport, ServiceSelector, SystemService,
};
pub use step::{
    Completion, Params, RunStrategy, Step, StepCatalog, StepContext, StepError, StepExecution,
    StepMetadata, StepResult, StepState,
};
pub use upgrade::{UpgradeOutcome, UpgradePhase, UpgradeRunner, UpgradeState, VersionRegistry};
pub use version::Version;
