//! Execution of declarative steps against the browser driver

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::orchestrator::TestContext;
use crate::spec::TestStep;

const NAVIGATE_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `steps` in order, stopping at the first failure.
pub async fn run_steps(ctx: &TestContext, steps: &[TestStep], screenshot_dir: &Path) -> E2eResult<()> {
    for (i, step) in steps.iter().enumerate() {
        let label = step.describe();
        debug!("Step {}: {}", i + 1, label);

        execute_step(ctx, step, screenshot_dir)
            .await
            .map_err(|e| E2eError::StepFailed {
                step: label,
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Execute a single test step
pub async fn execute_step(ctx: &TestContext, step: &TestStep, screenshot_dir: &Path) -> E2eResult<()> {
    let driver = ctx.driver.as_ref();

    match step {
        TestStep::Navigate { url, wait_for_selector } => {
            ctx.goto(url).await?;
            if let Some(selector) = wait_for_selector {
                driver.wait_for_selector(selector, NAVIGATE_WAIT_TIMEOUT).await?;
            }
            Ok(())
        }
        TestStep::Click { selector } => driver.click(selector).await,
        TestStep::Type { selector, text } => driver.type_text(selector, text).await,
        TestStep::Wait { selector, timeout_ms } => {
            driver
                .wait_for_selector(selector, Duration::from_millis(*timeout_ms))
                .await
        }
        TestStep::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(())
        }
        TestStep::AssertText { selector, equals, contains } => {
            let text = driver.inner_text(selector).await?;
            if let Some(expected) = equals {
                if text.trim() != expected.trim() {
                    return Err(E2eError::AssertionFailed(format!(
                        "{} has text {:?}, expected {:?}",
                        selector, text, expected
                    )));
                }
            }
            if let Some(fragment) = contains {
                if !text.contains(fragment.as_str()) {
                    return Err(E2eError::AssertionFailed(format!(
                        "{} has text {:?}, expected it to contain {:?}",
                        selector, text, fragment
                    )));
                }
            }
            Ok(())
        }
        TestStep::PollText {
            selector,
            contains,
            interval_ms,
            timeout_ms,
        } => {
            poll_text(
                ctx,
                selector,
                contains,
                Duration::from_millis(*interval_ms),
                Duration::from_millis(*timeout_ms),
            )
            .await
        }
        TestStep::Screenshot { name, full_page } => {
            std::fs::create_dir_all(screenshot_dir)?;
            let path = screenshot_dir.join(format!("{}.png", name));
            driver.screenshot(&path, *full_page).await
        }
        TestStep::Log { message } => {
            info!("[TEST LOG] {}", message);
            Ok(())
        }
    }
}

/// Poll an element's text until it contains `fragment`.
///
/// Read failures while polling are expected (the element may not be rendered
/// yet) and only end the poll once the timeout has elapsed.
pub async fn poll_text(
    ctx: &TestContext,
    selector: &str,
    fragment: &str,
    interval: Duration,
    timeout: Duration,
) -> E2eResult<()> {
    let start = Instant::now();
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        let last = match ctx.driver.inner_text(selector).await {
            Ok(text) if text.contains(fragment) => {
                debug!("{} matched {:?} after {} attempt(s)", selector, fragment, attempts);
                return Ok(());
            }
            Ok(text) => format!("text {:?}", text),
            Err(e) => format!("error {}", e),
        };

        if start.elapsed() >= timeout {
            return Err(E2eError::Timeout(format!(
                "{} to contain {:?} after {} attempt(s) (last: {})",
                selector, fragment, attempts, last
            )));
        }

        tokio::time::sleep(interval).await;
    }
}
