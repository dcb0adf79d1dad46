//! Declarative YAML test specification
//!
//! A spec file holds an ordered list of tests. Each test names a flavor
//! (the default dependency set it inherits), any extra dependencies, and the
//! UI steps it performs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::orchestrator::{Suite, TestFactory};
use crate::steps;

/// An ordered list of tests parsed from one or more YAML files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteSpec {
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

/// A single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Default dependency set to inherit (e.g. `post-login`)
    #[serde(default)]
    pub flavor: Option<String>,

    /// Tests that must pass first, in addition to the flavor's defaults
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Overrides the run's default test timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Steps to execute in order
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to base)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Click an element
    Click { selector: String },

    /// Type text into an element
    Type { selector: String, text: String },

    /// Wait for an element to appear
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Assert on the inner text of an element
    AssertText {
        selector: String,
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        contains: Option<String>,
    },

    /// Re-read an element's text until it contains a value, e.g. a job status
    PollText {
        selector: String,
        contains: String,
        #[serde(default = "default_poll_interval")]
        interval_ms: u64,
        #[serde(default = "default_poll_timeout")]
        timeout_ms: u64,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default = "default_full_page")]
        full_page: bool,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    5000
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_poll_timeout() -> u64 {
    120_000
}

fn default_full_page() -> bool {
    true
}

impl TestStep {
    /// Short label used in logs and step failures
    pub fn describe(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Click { selector } => format!("click:{}", selector),
            TestStep::Type { selector, .. } => format!("type:{}", selector),
            TestStep::Wait { selector, .. } => format!("wait:{}", selector),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::AssertText { selector, .. } => format!("assert_text:{}", selector),
            TestStep::PollText { selector, .. } => format!("poll_text:{}", selector),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

impl SuiteSpec {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load every YAML file under `dir`, concatenating tests in path order
    pub fn load_all(dir: &Path) -> E2eResult<Self> {
        let mut suite = Self::default();

        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let is_yaml = entry
                .path()
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let spec = Self::from_file(entry.path())?;
            suite.tests.extend(spec.tests);
        }

        Ok(suite)
    }

    /// Register every test through the factory named by its flavor.
    ///
    /// `screenshot_dir` is where `screenshot` steps write their images.
    pub fn into_suite(
        self,
        factories: &BTreeMap<String, TestFactory>,
        screenshot_dir: &Path,
    ) -> E2eResult<Suite> {
        let mut suite = Suite::new();
        let standalone = TestFactory::standalone();

        for test in self.tests {
            let factory = match &test.flavor {
                None => &standalone,
                Some(flavor) => factories
                    .get(flavor)
                    .ok_or_else(|| E2eError::UnknownFlavor(flavor.clone()))?,
            };

            let extra: Vec<&str> = test.depends_on.iter().map(String::as_str).collect();
            let timeout = test.timeout_ms.map(Duration::from_millis);
            let test_steps = test.steps;
            let dir: PathBuf = screenshot_dir.to_path_buf();

            factory.define_test(
                &mut suite,
                &test.name,
                move |ctx| async move { steps::run_steps(&ctx, &test_steps, &dir).await },
                timeout,
                &extra,
            )?;
        }

        Ok(suite)
    }
}
