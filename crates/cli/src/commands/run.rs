//! `gtfs-e2e run`: execute the suite in a real browser

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Args};
use colored::Colorize;
use gtfs_e2e::playwright::{Browser, PlaywrightDriver};
use gtfs_e2e::{E2eError, HarnessConfig, SuiteReport, TestReport, TestRunner, TestState};
use tracing::info;

use super::SuiteArgs;
use crate::output::{self, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,

    /// Stop running test bodies after the first failure
    #[arg(
        long,
        env = "GTFS_E2E_FAIL_FAST",
        action = ArgAction::SetTrue,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub fail_fast: bool,

    /// Post in-page coverage to the collector
    #[arg(
        long,
        env = "GTFS_E2E_COVERAGE",
        action = ArgAction::SetTrue,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub coverage: bool,

    /// Collector endpoint receiving coverage reports
    #[arg(long)]
    pub collector_url: Option<String>,

    /// Base URL of the editor under test
    #[arg(long, env = "GTFS_E2E_BASE_URL")]
    pub base_url: Option<String>,

    /// Browser engine: chromium, firefox or webkit
    #[arg(long)]
    pub browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Directory for results and screenshots
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Do not start the helpers listed in the configuration
    #[arg(long)]
    pub no_helpers: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if self.fail_fast {
            config.fail_fast = true;
        }
        if self.coverage {
            config.coverage.enabled = true;
        }
        if let Some(url) = &self.collector_url {
            config.coverage.collector_url = url.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(browser) = self.browser {
            config.browser.kind = browser;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if self.no_helpers {
            config.helpers.clear();
        }
    }
}

/// Returns whether every test passed or was skipped.
pub async fn execute(args: RunArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let mut config = args.suite.load_config()?;
    args.apply(&mut config);

    let suite = args.suite.load_suite(&config)?;
    if suite.is_empty() {
        anyhow::bail!("no tests found in {}", config.specs_dir.display());
    }
    if let Some(target) = config.run_mode().target() {
        if !suite.contains(target) {
            return Err(E2eError::UnknownTest(target.to_string()).into());
        }
    }
    info!("Loaded {} test(s) from {}", suite.len(), config.specs_dir.display());

    let driver = PlaywrightDriver::launch(config.playwright_config())
        .await
        .context("launching browser")?;

    let mut runner = TestRunner::new(config);
    let report = runner.run_suite(suite, Arc::new(driver)).await?;
    let results = runner.write_results(&report)?;

    print_report(&report, format);
    info!("Results: {}", results.display());

    Ok(report.success())
}

impl TableDisplay for TestReport {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Outcome", "Duration", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let detail = match (&self.error, &self.screenshot) {
            (Some(error), Some(shot)) => format!("{}\n{}", error, shot.display()),
            (Some(error), None) => error.clone(),
            (None, _) => String::new(),
        };
        vec![
            self.name.clone(),
            outcome_label(self.outcome),
            format!("{} ms", self.duration_ms),
            detail,
        ]
    }
}

fn outcome_label(state: TestState) -> String {
    match state {
        TestState::Passed => "passed".green().to_string(),
        TestState::SkippedAsPassed => "skipped".dimmed().to_string(),
        TestState::Blocked => "blocked".yellow().to_string(),
        TestState::FastFailed => "fast-failed".red().to_string(),
        TestState::Failed => "failed".red().bold().to_string(),
        TestState::Registered | TestState::Running => "not run".to_string(),
    }
}

fn print_report(report: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => output::print_value(report, format),
        OutputFormat::Table | OutputFormat::Plain => {
            output::print_list(&report.results, format);

            let summary = format!(
                "{} passed, {} failed, {} blocked, {} fast-failed, {} skipped in {} ms",
                report.passed, report.failed, report.blocked, report.fast_failed, report.skipped, report.duration_ms
            );
            if report.success() {
                output::print_success(&summary);
            } else {
                output::print_error(&summary);
            }
        }
    }
}
