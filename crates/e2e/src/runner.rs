//! Main test runner that ties helpers, the browser and the orchestrator together

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::coverage::CoverageReporter;
use crate::driver::BrowserDriver;
use crate::error::E2eResult;
use crate::helper::HelperHandle;
use crate::orchestrator::{Orchestrator, Suite, TestContext, TestState};

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub name: String,
    pub outcome: TestState,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub blocked: usize,
    pub fast_failed: usize,
    pub duration_ms: u64,
    pub run_timestamp: String,
    pub results: Vec<TestReport>,
}

impl SuiteReport {
    pub fn from_results(results: Vec<TestReport>, duration_ms: u64, run_timestamp: String) -> Self {
        let count = |state: TestState| results.iter().filter(|r| r.outcome == state).count();

        Self {
            total: results.len(),
            passed: count(TestState::Passed),
            skipped: count(TestState::SkippedAsPassed),
            failed: count(TestState::Failed),
            blocked: count(TestState::Blocked),
            fast_failed: count(TestState::FastFailed),
            duration_ms,
            run_timestamp,
            results,
        }
    }

    /// True when every test passed or was skipped by isolation
    pub fn success(&self) -> bool {
        self.failed == 0 && self.blocked == 0 && self.fast_failed == 0
    }

    pub fn result(&self, name: &str) -> Option<&TestReport> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Runs a suite end to end: helpers up, orchestrator, helpers down
pub struct TestRunner {
    config: HarnessConfig,
    helpers: Vec<HelperHandle>,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            helpers: Vec::new(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Start every configured helper, in order
    pub async fn start_helpers(&mut self) -> E2eResult<()> {
        for helper in &self.config.helpers {
            if self.helpers.iter().any(|h| h.name() == helper.name) {
                continue; // Already running
            }
            let handle = HelperHandle::spawn(helper, &self.config.pid_dir).await?;
            self.helpers.push(handle);
        }
        Ok(())
    }

    /// Stop helpers in reverse start order
    pub fn stop_helpers(&mut self) {
        while let Some(mut helper) = self.helpers.pop() {
            if let Err(e) = helper.stop() {
                warn!("Failed to stop {}: {}", helper.name(), e);
            }
        }
    }

    /// Run `suite` against `driver` with this runner's configuration
    pub async fn run_suite(&mut self, suite: Suite, driver: Arc<dyn BrowserDriver>) -> E2eResult<SuiteReport> {
        self.start_helpers().await?;

        let coverage = Arc::new(CoverageReporter::new(self.config.coverage_config())?);
        let ctx = TestContext::new(driver.clone(), coverage);
        let mut orchestrator = Orchestrator::new(suite, ctx, self.config.orchestrator_config())?;

        let report = orchestrator.run().await;

        if let Err(e) = driver.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        self.stop_helpers();

        report
    }

    /// Write test results to JSON file
    pub fn write_results(&self, report: &SuiteReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.stop_helpers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, outcome: TestState) -> TestReport {
        TestReport {
            name: name.to_string(),
            outcome,
            duration_ms: 1,
            error: None,
            screenshot: None,
        }
    }

    #[test]
    fn test_counts_and_success() {
        let results = vec![
            report("login", TestState::Passed),
            report("delete-user", TestState::SkippedAsPassed),
            report("create-feed-source", TestState::Failed),
            report("upload-gtfs", TestState::Blocked),
        ];
        let suite = SuiteReport::from_results(results, 10, "20240101T000000".to_string());

        assert_eq!(suite.total, 4);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.skipped, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.blocked, 1);
        assert!(!suite.success());
        assert_eq!(suite.result("upload-gtfs").map(|r| r.outcome), Some(TestState::Blocked));
    }

    #[test]
    fn test_skips_do_not_fail_the_run() {
        let results = vec![
            report("login", TestState::Passed),
            report("delete-user", TestState::SkippedAsPassed),
        ];
        assert!(SuiteReport::from_results(results, 1, String::new()).success());
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TestRunner::new(HarnessConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let suite = SuiteReport::from_results(vec![report("login", TestState::Passed)], 5, "ts".into());

        let path = runner.write_results(&suite).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["results"][0]["outcome"], "passed");
        assert_eq!(written["passed"], 1);
    }
}
