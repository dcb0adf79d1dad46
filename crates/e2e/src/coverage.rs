//! Best-effort coverage reporting to the external collector

use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::BrowserDriver;
use crate::error::{E2eError, E2eResult};

/// Outcome of a single coverage report attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageStatus {
    Disabled,
    /// The page had no coverage object to report.
    NoData,
    Posted,
    Failed,
}

/// Pulls the in-page coverage object and POSTs it to the collector.
#[derive(Debug, Clone)]
pub struct CoverageReporter {
    client: reqwest::Client,
    config: CoverageConfig,
}

impl CoverageReporter {
    pub fn new(config: CoverageConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn disabled() -> E2eResult<Self> {
        Self::new(CoverageConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Report the current page's coverage. Never fails: errors are logged and
    /// surfaced only as [`CoverageStatus::Failed`].
    pub async fn report(&self, driver: &dyn BrowserDriver, context: &str) -> CoverageStatus {
        if !self.config.enabled {
            return CoverageStatus::Disabled;
        }

        match self.try_report(driver).await {
            Ok(true) => {
                debug!(context, "coverage posted to {}", self.config.collector_url);
                CoverageStatus::Posted
            }
            Ok(false) => {
                debug!(context, "no coverage object in page");
                CoverageStatus::NoData
            }
            Err(e) => {
                warn!(context, "coverage report failed: {}", e);
                CoverageStatus::Failed
            }
        }
    }

    async fn try_report(&self, driver: &dyn BrowserDriver) -> E2eResult<bool> {
        let Some(coverage) = driver.read_global(&self.config.global_name).await? else {
            return Ok(false);
        };

        let resp = self
            .client
            .post(&self.config.collector_url)
            .json(&coverage)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(E2eError::CoverageRejected(resp.status().as_u16()));
        }
        Ok(true)
    }
}

/// Configuration for coverage collection
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    pub enabled: bool,
    pub collector_url: String,
    /// Name of the page global holding the coverage map
    pub global_name: String,
    pub request_timeout: Duration,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            collector_url: "http://127.0.0.1:9999/coverage/client".to_string(),
            global_name: "__coverage__".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}
