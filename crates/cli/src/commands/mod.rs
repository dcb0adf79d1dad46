//! CLI Commands

pub mod collector;
pub mod plan;
pub mod run;
pub mod stop;

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use gtfs_e2e::{HarnessConfig, Suite, SuiteSpec};

/// Where the harness configuration and test specs come from
#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    /// Harness configuration file (defaults apply when it is missing)
    #[arg(long, default_value = "e2e.toml", env = "GTFS_E2E_CONFIG")]
    pub config: PathBuf,

    /// Spec file or directory of YAML specs (overrides `specs_dir`)
    #[arg(long)]
    pub specs: Option<PathBuf>,

    /// Run only this test and the tests it depends on
    #[arg(long, env = "GTFS_E2E_ISOLATE")]
    pub isolate: Option<String>,
}

impl SuiteArgs {
    pub fn load_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = HarnessConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(specs) = &self.specs {
            config.specs_dir = specs.clone();
        }
        if self.isolate.is_some() {
            config.isolate = self.isolate.clone();
        }
        Ok(config)
    }

    /// Parse the specs named by `config` into a runnable suite
    pub fn load_suite(&self, config: &HarnessConfig) -> anyhow::Result<Suite> {
        let path = &config.specs_dir;
        let spec = if path.is_file() {
            SuiteSpec::from_file(path)?
        } else {
            SuiteSpec::load_all(path).with_context(|| format!("loading specs from {}", path.display()))?
        };

        let suite = spec.into_suite(&config.factories(), &config.screenshot_dir())?;
        Ok(suite)
    }
}
