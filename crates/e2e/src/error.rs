//! Error types for E2E testing

use std::time::Duration;

use thiserror::Error;

/// Message carried by a test blocked on an unsatisfied dependency.
pub const DEPENDENCY_NOT_SATISFIED: &str = "dependent test has not completed";

/// Message carried by a test short-circuited by fail-fast mode.
pub const FAILING_FAST: &str = "failing fast due to previous failure";

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("{test}: dependent test has not completed ({})", .missing.join(", "))]
    DependencyNotSatisfied { test: String, missing: Vec<String> },

    #[error("{test}: failing fast due to previous failure")]
    FailingFast { test: String },

    #[error("{test}: timed out after {timeout:?}")]
    TestTimeout { test: String, timeout: Duration },

    #[error("Dependency cycle: {}", .0.join(" → "))]
    DependencyCycle(Vec<String>),

    #[error("Test already defined: {0}")]
    DuplicateTest(String),

    #[error("Test not found: {0}")]
    UnknownTest(String),

    #[error("Unknown test flavor: {0}")]
    UnknownFlavor(String),

    #[error("Test has already run: {0}")]
    AlreadyRun(String),

    #[error("Helper {0} failed to start: {1}")]
    HelperStartup(String, String),

    #[error("Helper health check failed after {0} attempts")]
    HelperHealthCheck(usize),

    #[error("Helper not running: {0}")]
    HelperNotRunning(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Coverage report rejected: HTTP {0}")]
    CoverageRejected(u16),

    #[error("Signal error: {0}")]
    Signal(#[from] nix::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error short-circuited a test before its body ran.
    pub fn is_gate(&self) -> bool {
        matches!(
            self,
            E2eError::DependencyNotSatisfied { .. } | E2eError::FailingFast { .. }
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
