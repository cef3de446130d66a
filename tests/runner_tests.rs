//! Scenario runner tests
//!
//! Scripted steps record the order they ran in, so each test can assert on
//! both the report and what actually executed.

use std::cell::RefCell;
use std::rc::Rc;

use upkeep::{
    compose, CapabilityRegistry, Completion, Composer, CompositionError, Confine, ConsoleReporter,
    EngineConfig, FeatureSnapshot, RunStrategy, Runner, ScenarioDefinition, ScenarioMetadata,
    ScenarioReport, ScriptedHost, Step, StepCatalog, StepContext, StepError, StepMetadata,
    StepResult, StepState,
};

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Clone, Copy)]
enum Outcome {
    Pass,
    Fail,
    Warn,
    Skip,
}

struct Scripted {
    metadata: StepMetadata,
    outcome: Outcome,
    preparations: Vec<(&'static str, Outcome, Confine)>,
    log: Log,
}

impl Scripted {
    fn new(label: &'static str, outcome: Outcome, log: &Log) -> Self {
        Self {
            metadata: StepMetadata::check(label, format!("Step {}", label)),
            outcome,
            preparations: Vec::new(),
            log: Rc::clone(log),
        }
    }

    fn preparing(mut self, label: &'static str, outcome: Outcome) -> Self {
        self.preparations.push((label, outcome, Confine::Always));
        self
    }

    fn preparing_confined(mut self, label: &'static str, confine: Confine) -> Self {
        self.preparations.push((label, Outcome::Pass, confine));
        self
    }

    fn strategy(mut self, strategy: RunStrategy) -> Self {
        self.metadata = self.metadata.run_strategy(strategy);
        self
    }

    fn boxed(self) -> Box<dyn Step> {
        Box::new(self)
    }
}

impl Step for Scripted {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    fn preparation_steps(&self, _features: &FeatureSnapshot) -> Vec<Box<dyn Step>> {
        self.preparations
            .iter()
            .map(|(label, outcome, confine)| {
                let mut prep = Scripted::new(*label, *outcome, &self.log);
                prep.metadata = prep.metadata.confine(confine.clone());
                prep.boxed()
            })
            .collect()
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> StepResult {
        self.log.borrow_mut().push(self.metadata.label.to_string());
        ctx.update(&format!("running {}", self.metadata.label));
        match self.outcome {
            Outcome::Pass => Ok(Completion::Done),
            Outcome::Fail => Err(StepError::failed(format!("{} broke", self.metadata.label))),
            Outcome::Warn => Ok(Completion::warn("almost")),
            Outcome::Skip => Ok(Completion::skip("not needed")),
        }
    }
}

/// A scenario over a fixed list of steps, built once.
struct Fixed {
    metadata: ScenarioMetadata,
    steps: RefCell<Vec<Box<dyn Step>>>,
}

impl Fixed {
    fn new(metadata: ScenarioMetadata, steps: Vec<Scripted>) -> Self {
        Self {
            metadata,
            steps: RefCell::new(steps.into_iter().map(Scripted::boxed).collect()),
        }
    }
}

impl ScenarioDefinition for Fixed {
    fn metadata(&self) -> ScenarioMetadata {
        self.metadata.clone()
    }

    fn compose(&self, composer: &mut Composer<'_>) -> Result<(), CompositionError> {
        composer.add_steps(self.steps.borrow_mut().drain(..).collect())?;
        Ok(())
    }
}

fn run(definition: &Fixed) -> ScenarioReport {
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let features = FeatureSnapshot::default();
    let catalog = StepCatalog::new();
    let scenario = compose(definition, &features, &catalog).unwrap().unwrap();
    let mut reporter = ConsoleReporter::new(Vec::new());
    Runner::new(&registry, &features)
        .run(&scenario, &mut reporter)
        .unwrap()
}

fn fail_fast() -> ScenarioMetadata {
    ScenarioMetadata::new("test", "Test scenario")
}

fn fail_slow() -> ScenarioMetadata {
    ScenarioMetadata::new("test", "Test scenario").run_strategy(RunStrategy::FailSlow)
}

#[test]
fn test_fail_fast_skips_remaining_steps() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_fast(),
        vec![
            Scripted::new("a", Outcome::Pass, &log),
            Scripted::new("b", Outcome::Fail, &log),
            Scripted::new("c", Outcome::Pass, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["a", "b"]);
    assert_eq!(report.state_of("a"), Some(&StepState::Success));
    assert_eq!(
        report.state_of("b"),
        Some(&StepState::Failed("b broke".into()))
    );
    assert_eq!(
        report.state_of("c"),
        Some(&StepState::Skipped("aborted after failure of b".into()))
    );
    assert_eq!(report.overall, StepState::Failed("Failed steps: b".into()));
    assert!(!report.passed());
}

#[test]
fn test_fail_slow_runs_everything() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_slow(),
        vec![
            Scripted::new("a", Outcome::Fail, &log),
            Scripted::new("b", Outcome::Pass, &log),
            Scripted::new("c", Outcome::Fail, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert_eq!(report.failed_steps(), vec!["a", "c"]);
    assert_eq!(report.overall, StepState::Failed("Failed steps: a, c".into()));
}

#[test]
fn test_step_strategy_overrides_scenario() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_slow(),
        vec![
            Scripted::new("a", Outcome::Fail, &log),
            Scripted::new("b", Outcome::Fail, &log).strategy(RunStrategy::FailFast),
            Scripted::new("c", Outcome::Pass, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["a", "b"]);
    assert!(matches!(report.state_of("c"), Some(StepState::Skipped(_))));
}

#[test]
fn test_preparation_steps_run_first_and_once() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_fast(),
        vec![
            Scripted::new("x", Outcome::Pass, &log).preparing("p", Outcome::Pass),
            Scripted::new("y", Outcome::Pass, &log).preparing("p", Outcome::Pass),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["p", "x", "y"]);
    let labels: Vec<&str> = report.executions.iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["p", "x", "y"]);
    assert_eq!(report.executions[0].preparation_for(), Some("x"));
    assert!(report.passed());
}

#[test]
fn test_failed_preparation_skips_its_step() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_slow(),
        vec![
            Scripted::new("x", Outcome::Pass, &log).preparing("p", Outcome::Fail),
            Scripted::new("y", Outcome::Pass, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["p", "y"]);
    assert_eq!(
        report.state_of("x"),
        Some(&StepState::Skipped("preparation step p failed".into()))
    );
    assert_eq!(report.overall, StepState::Failed("Failed steps: p".into()));
}

#[test]
fn test_failed_preparation_aborts_fail_fast_scenario() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_fast(),
        vec![
            Scripted::new("x", Outcome::Pass, &log).preparing("p", Outcome::Fail),
            Scripted::new("y", Outcome::Pass, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["p"]);
    assert!(matches!(report.state_of("x"), Some(StepState::Skipped(_))));
    assert_eq!(
        report.state_of("y"),
        Some(&StepState::Skipped("aborted after failure of p".into()))
    );
}

#[test]
fn test_warnings_and_skips_do_not_fail() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_fast(),
        vec![
            Scripted::new("a", Outcome::Warn, &log),
            Scripted::new("b", Outcome::Skip, &log),
            Scripted::new("c", Outcome::Pass, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert_eq!(
        report.overall,
        StepState::Warning("Completed with warnings".into())
    );
    assert!(report.passed());
}

#[test]
fn test_escalated_skips_fail_the_scenario() {
    let log = Log::default();
    let scenario = Fixed::new(
        fail_fast().escalate_skips(),
        vec![
            Scripted::new("a", Outcome::Pass, &log),
            Scripted::new("b", Outcome::Skip, &log),
        ],
    );

    let report = run(&scenario);

    assert_eq!(report.overall, StepState::Failed("Skipped steps: b".into()));
}

#[test]
fn test_reporter_sees_every_step() {
    let log = Log::default();
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let features = FeatureSnapshot::default();
    let catalog = StepCatalog::new();
    let definition = Fixed::new(
        fail_fast(),
        vec![
            Scripted::new("a", Outcome::Pass, &log),
            Scripted::new("b", Outcome::Fail, &log),
        ],
    );
    let scenario = compose(&definition, &features, &catalog).unwrap().unwrap();

    let mut reporter = ConsoleReporter::new(Vec::new());
    Runner::new(&registry, &features)
        .run(&scenario, &mut reporter)
        .unwrap();

    let text = String::from_utf8(reporter.into_inner()).unwrap();
    assert!(text.contains("Running Test scenario"));
    assert!(text.contains("running a"));
    assert!(text.contains("b broke"));
    assert!(text.contains("[FAIL]"));
}

#[test]
fn test_unconfined_preparation_is_neither_planned_nor_run() {
    let log = Log::default();
    let host = ScriptedHost::new();
    let config = EngineConfig::default();
    let registry = CapabilityRegistry::new(&host, &config);
    let features = FeatureSnapshot::default();
    let catalog = StepCatalog::new();
    let definition = Fixed::new(
        fail_fast(),
        vec![Scripted::new("parent", Outcome::Pass, &log)
            .preparing_confined("never-prep", Confine::Never)
            .preparing_confined("always-prep", Confine::Always)],
    );
    let scenario = compose(&definition, &features, &catalog).unwrap().unwrap();

    assert_eq!(scenario.plan(&features), vec!["always-prep", "parent"]);

    let mut reporter = ConsoleReporter::new(Vec::new());
    let report = Runner::new(&registry, &features)
        .run(&scenario, &mut reporter)
        .unwrap();

    assert_eq!(*log.borrow(), vec!["always-prep", "parent"]);
    assert_eq!(report.state_of("never-prep"), None);
    assert!(report.passed());
}
