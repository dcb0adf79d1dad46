//! Harness configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coverage::CoverageConfig;
use crate::error::E2eResult;
use crate::helper::HelperConfig;
use crate::ledger::RunMode;
use crate::orchestrator::{OrchestratorConfig, TestFactory};
use crate::playwright::{Browser, PlaywrightConfig};

/// Top-level harness configuration, usually read from `e2e.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Directory holding YAML test specs
    pub specs_dir: PathBuf,

    /// Output directory for results and screenshots
    pub output_dir: PathBuf,

    /// Directory for helper pid files and logs
    pub pid_dir: PathBuf,

    /// Stop executing bodies after the first failure
    pub fail_fast: bool,

    /// Run only this test and its dependencies
    pub isolate: Option<String>,

    /// Timeout for tests that do not set their own
    pub default_timeout_ms: u64,

    pub coverage: CoverageSettings,

    pub browser: BrowserSettings,

    /// Named default-dependency sets, selected per test by `flavor`
    pub flavors: BTreeMap<String, Vec<String>>,

    /// Background processes started before the suite and stopped after it
    pub helpers: Vec<HelperConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut flavors = BTreeMap::new();
        flavors.insert("post-login".to_string(), vec!["login".to_string()]);
        flavors.insert(
            "post-feed-source".to_string(),
            vec!["login".to_string(), "create-feed-source".to_string()],
        );
        flavors.insert(
            "post-editor-entity".to_string(),
            vec![
                "login".to_string(),
                "create-feed-source".to_string(),
                "edit-feed-from-scratch".to_string(),
            ],
        );

        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            specs_dir: PathBuf::from("tests/e2e/specs"),
            output_dir: PathBuf::from("test-results"),
            pid_dir: PathBuf::from("test-results/pids"),
            fail_fast: false,
            isolate: None,
            default_timeout_ms: 60_000,
            coverage: CoverageSettings::default(),
            browser: BrowserSettings::default(),
            flavors,
            helpers: Vec::new(),
        }
    }
}

/// Coverage collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    pub enabled: bool,
    pub collector_url: String,
    pub global_name: String,
    pub request_timeout_ms: u64,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        let defaults = CoverageConfig::default();
        Self {
            enabled: defaults.enabled,
            collector_url: defaults.collector_url,
            global_name: defaults.global_name,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
        }
    }
}

/// Browser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub kind: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub node_modules: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let defaults = PlaywrightConfig::default();
        Self {
            kind: defaults.browser,
            headless: defaults.headless,
            viewport_width: defaults.viewport_width,
            viewport_height: defaults.viewport_height,
            action_timeout_ms: defaults.action_timeout.as_millis() as u64,
            navigation_timeout_ms: defaults.navigation_timeout.as_millis() as u64,
            node_modules: defaults.node_modules,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::from_isolate(self.isolate.clone())
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            mode: self.run_mode(),
            fail_fast: self.fail_fast,
            default_timeout: self.default_timeout(),
            screenshot_dir: self.screenshot_dir(),
        }
    }

    pub fn coverage_config(&self) -> CoverageConfig {
        CoverageConfig {
            enabled: self.coverage.enabled,
            collector_url: self.coverage.collector_url.clone(),
            global_name: self.coverage.global_name.clone(),
            request_timeout: Duration::from_millis(self.coverage.request_timeout_ms),
        }
    }

    pub fn playwright_config(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            base_url: self.base_url.clone(),
            browser: self.browser.kind,
            headless: self.browser.headless,
            viewport_width: self.browser.viewport_width,
            viewport_height: self.browser.viewport_height,
            action_timeout: Duration::from_millis(self.browser.action_timeout_ms),
            navigation_timeout: Duration::from_millis(self.browser.navigation_timeout_ms),
            node_modules: self.browser.node_modules.clone(),
            ..Default::default()
        }
    }

    /// One pre-configured factory per flavor
    pub fn factories(&self) -> BTreeMap<String, TestFactory> {
        self.flavors
            .iter()
            .map(|(name, defaults)| (name.clone(), TestFactory::with_defaults(defaults.iter().cloned())))
            .collect()
    }
}
