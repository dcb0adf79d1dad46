//! Dependency-aware test orchestration
//!
//! Tests are registered through a [`TestFactory`] carrying a fixed list of
//! default dependencies, then executed strictly in declaration order by an
//! [`Orchestrator`]. Before a body runs, the orchestrator checks the
//! fail-fast flag, the test's declared dependencies, and the isolation mode;
//! any of these can settle the test without invoking its body.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::coverage::CoverageReporter;
use crate::dependency::DependencyGraph;
use crate::driver::BrowserDriver;
use crate::error::{E2eError, E2eResult};
use crate::ledger::{FailFast, RunMode, TestResultLedger};
use crate::runner::{SuiteReport, TestReport};

/// What a test body gets to work with.
#[derive(Clone)]
pub struct TestContext {
    pub driver: Arc<dyn BrowserDriver>,
    pub coverage: Arc<CoverageReporter>,
}

impl TestContext {
    pub fn new(driver: Arc<dyn BrowserDriver>, coverage: Arc<CoverageReporter>) -> Self {
        Self { driver, coverage }
    }

    /// Navigate, reporting the outgoing page's coverage first.
    pub async fn goto(&self, url: &str) -> E2eResult<()> {
        self.coverage.report(self.driver.as_ref(), url).await;
        self.driver.goto(url).await
    }
}

pub type TestBody = Box<dyn FnOnce(TestContext) -> BoxFuture<'static, E2eResult<()>> + Send>;

/// Lifecycle of a single test. Everything except `Registered` and `Running`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Registered,
    Running,
    Passed,
    /// Outside the isolation target's closure; recorded as passed unexecuted.
    SkippedAsPassed,
    /// A declared dependency had not passed.
    Blocked,
    FastFailed,
    Failed,
}

impl TestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestState::Registered | TestState::Running)
    }

    /// Whether this outcome satisfies dependents.
    pub fn is_pass(&self) -> bool {
        matches!(self, TestState::Passed | TestState::SkippedAsPassed)
    }
}

pub struct TestCase {
    name: String,
    body: Option<TestBody>,
    timeout: Option<Duration>,
    dependencies: Vec<String>,
    state: TestState,
}

impl TestCase {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directly declared dependencies (factory defaults plus extras).
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn state(&self) -> TestState {
        self.state
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("dependencies", &self.dependencies)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Ordered set of registered tests and their dependency graph.
#[derive(Debug, Default)]
pub struct Suite {
    cases: Vec<TestCase>,
    graph: DependencyGraph,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &mut self,
        name: &str,
        body: TestBody,
        timeout: Option<Duration>,
        dependencies: Vec<String>,
    ) -> E2eResult<()> {
        if self.contains(name) {
            return Err(E2eError::DuplicateTest(name.to_string()));
        }

        self.graph.add_dependencies(name, dependencies.iter().cloned())?;
        self.cases.push(TestCase {
            name: name.to_string(),
            body: Some(body),
            timeout,
            dependencies,
            state: TestState::Registered,
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cases.iter().any(|c| c.name == name)
    }

    pub fn case(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Dependencies that can never be satisfied when the suite runs in
    /// declaration order: unknown names, or tests declared later.
    pub fn ordering_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (index, case) in self.cases.iter().enumerate() {
            for dep in &case.dependencies {
                match self.cases.iter().position(|c| &c.name == dep) {
                    None => problems.push(format!("{} depends on unknown test {}", case.name, dep)),
                    Some(pos) if pos > index => problems.push(format!(
                        "{} depends on {} which is declared after it",
                        case.name, dep
                    )),
                    Some(_) => {}
                }
            }
        }
        problems
    }
}

/// Defines tests with a fixed set of default dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFactory {
    defaults: Vec<String>,
}

impl TestFactory {
    /// A factory with no default dependencies.
    pub fn standalone() -> Self {
        Self::default()
    }

    pub fn with_defaults<I, S>(defaults: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut factory = Self::default();
        for dep in defaults {
            let dep = dep.into();
            if !factory.defaults.contains(&dep) {
                factory.defaults.push(dep);
            }
        }
        factory
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Register `name` in `suite` with this factory's defaults plus
    /// `extra_dependencies`.
    pub fn define_test<F, Fut>(
        &self,
        suite: &mut Suite,
        name: &str,
        body: F,
        timeout: Option<Duration>,
        extra_dependencies: &[&str],
    ) -> E2eResult<()>
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = E2eResult<()>> + Send + 'static,
    {
        let mut dependencies = self.defaults.clone();
        for dep in extra_dependencies {
            if !dependencies.iter().any(|d| d == dep) {
                dependencies.push(dep.to_string());
            }
        }

        let body: TestBody =
            Box::new(move |ctx| -> BoxFuture<'static, E2eResult<()>> { Box::pin(body(ctx)) });
        suite.register(name, body, timeout, dependencies)
    }
}

/// Run-level settings for an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mode: RunMode,
    pub fail_fast: bool,
    /// Applied to tests that do not declare their own timeout
    pub default_timeout: Duration,
    /// Where failure screenshots are written
    pub screenshot_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::All,
            fail_fast: false,
            default_timeout: Duration::from_secs(60),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
        }
    }
}

/// Executes a [`Suite`] once, owning all run-wide state.
pub struct Orchestrator {
    suite: Suite,
    ctx: TestContext,
    ledger: TestResultLedger,
    mode: RunMode,
    fail_fast: FailFast,
    isolated: BTreeSet<String>,
    default_timeout: Duration,
    screenshot_dir: PathBuf,
    run_timestamp: String,
}

impl Orchestrator {
    pub fn new(suite: Suite, ctx: TestContext, config: OrchestratorConfig) -> E2eResult<Self> {
        let isolated = match &config.mode {
            RunMode::All => BTreeSet::new(),
            RunMode::Isolate(target) => {
                if !suite.contains(target) {
                    return Err(E2eError::UnknownTest(target.clone()));
                }
                let closure = suite.graph().closure(target);
                info!("Isolating {} (closure: {:?})", target, closure);
                closure
            }
        };

        for problem in suite.ordering_problems() {
            warn!("{}", problem);
        }

        Ok(Self {
            suite,
            ctx,
            ledger: TestResultLedger::new(),
            mode: config.mode,
            fail_fast: FailFast::new(config.fail_fast),
            isolated,
            default_timeout: config.default_timeout,
            screenshot_dir: config.screenshot_dir,
            run_timestamp: chrono::Local::now().format("%Y%m%dT%H%M%S").to_string(),
        })
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    pub fn ledger(&self) -> &TestResultLedger {
        &self.ledger
    }

    pub fn fail_fast(&self) -> &FailFast {
        &self.fail_fast
    }

    pub fn run_timestamp(&self) -> &str {
        &self.run_timestamp
    }

    /// Run every registered test once, in declaration order.
    pub async fn run(&mut self) -> E2eResult<SuiteReport> {
        if let Some(case) = self.suite.cases.iter().find(|c| c.state != TestState::Registered) {
            return Err(E2eError::AlreadyRun(case.name.clone()));
        }

        let start = Instant::now();
        info!("Running {} test(s)...", self.suite.len());

        let mut results = Vec::with_capacity(self.suite.len());
        for index in 0..self.suite.len() {
            let report = self.run_case(index).await;
            match report.outcome {
                TestState::Passed => info!("✓ {} ({} ms)", report.name, report.duration_ms),
                TestState::SkippedAsPassed => debug!("- {} (skipped)", report.name),
                _ => error!(
                    "✗ {} - {}",
                    report.name,
                    report.error.as_deref().unwrap_or("unknown error")
                ),
            }
            results.push(report);
        }

        let report = SuiteReport::from_results(
            results,
            start.elapsed().as_millis() as u64,
            self.run_timestamp.clone(),
        );

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} blocked, {} fast-failed, {} skipped ({} ms)",
            report.passed, report.failed, report.blocked, report.fast_failed, report.skipped, report.duration_ms
        );

        Ok(report)
    }

    async fn run_case(&mut self, index: usize) -> TestReport {
        let start = Instant::now();
        let case = &mut self.suite.cases[index];
        let name = case.name.clone();

        if self.fail_fast.is_tripped() {
            let err = E2eError::FailingFast { test: name.clone() };
            return self.settle(index, TestState::FastFailed, start, Some(err), None);
        }

        let missing = self.ledger.unsatisfied(&case.dependencies);
        if !missing.is_empty() {
            let err = E2eError::DependencyNotSatisfied {
                test: name.clone(),
                missing,
            };
            return self.settle(index, TestState::Blocked, start, Some(err), None);
        }

        if let RunMode::Isolate(target) = &self.mode {
            if &name != target && !self.isolated.contains(&name) {
                self.ledger.record(&name, true);
                return self.settle(index, TestState::SkippedAsPassed, start, None, None);
            }
        }

        let Some(body) = case.body.take() else {
            let err = E2eError::AlreadyRun(name.clone());
            return self.settle(index, TestState::Failed, start, Some(err), None);
        };
        let timeout = case.timeout.unwrap_or(self.default_timeout);
        case.state = TestState::Running;

        debug!("Running test: {} (timeout {:?})", name, timeout);
        let result = match tokio::time::timeout(timeout, body(self.ctx.clone())).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::TestTimeout {
                test: name.clone(),
                timeout,
            }),
        };

        match result {
            Ok(()) => {
                self.ctx.coverage.report(self.ctx.driver.as_ref(), &name).await;
                self.ledger.record(&name, true);
                self.settle(index, TestState::Passed, start, None, None)
            }
            Err(err) => {
                let screenshot = self.capture_failure(&name).await;
                self.ctx.coverage.report(self.ctx.driver.as_ref(), &name).await;
                if self.fail_fast.trip() {
                    warn!("{} failed; fail-fast is now active", name);
                }
                self.settle(index, TestState::Failed, start, Some(err), screenshot)
            }
        }
    }

    fn settle(
        &mut self,
        index: usize,
        state: TestState,
        start: Instant,
        error: Option<E2eError>,
        screenshot: Option<PathBuf>,
    ) -> TestReport {
        let case = &mut self.suite.cases[index];
        case.state = state;
        TestReport {
            name: case.name.clone(),
            outcome: state,
            duration_ms: start.elapsed().as_millis() as u64,
            error: error.map(|e| e.to_string()),
            screenshot,
        }
    }

    /// Full-page screenshot of the failed test. Failures here are only logged.
    async fn capture_failure(&self, name: &str) -> Option<PathBuf> {
        let path = screenshot_path(&self.screenshot_dir, name, &self.run_timestamp);

        if let Err(e) = std::fs::create_dir_all(&self.screenshot_dir) {
            warn!("Cannot create screenshot dir {}: {}", self.screenshot_dir.display(), e);
            return None;
        }

        match self.ctx.driver.screenshot(&path, true).await {
            Ok(()) => {
                info!("Failure screenshot: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failure screenshot for {} not captured: {}", name, e);
                None
            }
        }
    }
}

/// `<dir>/<test>-<timestamp>.png`, with path-hostile characters replaced.
pub fn screenshot_path(dir: &Path, test: &str, timestamp: &str) -> PathBuf {
    let tag: String = test
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{}-{}.png", tag, timestamp))
}
