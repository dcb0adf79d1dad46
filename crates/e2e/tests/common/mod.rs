//! Scripted in-memory browser used by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{ready, Ready};

use gtfs_e2e::coverage::{CoverageConfig, CoverageReporter};
use gtfs_e2e::{BrowserDriver, E2eError, E2eResult, TestContext};

#[derive(Default)]
pub struct MockDriver {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    texts: Mutex<HashMap<String, VecDeque<String>>>,
    globals: Mutex<HashMap<String, serde_json::Value>>,
    screenshots: Mutex<Vec<PathBuf>>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call touching `selector` fails.
    pub fn fail_on(&self, selector: &str) {
        self.failing.lock().unwrap().insert(selector.to_string());
    }

    /// Successive `inner_text` reads return these values; the last one sticks.
    pub fn script_text(&self, selector: &str, texts: &[&str]) {
        self.texts
            .lock()
            .unwrap()
            .insert(selector.to_string(), texts.iter().map(|t| t.to_string()).collect());
    }

    pub fn set_global(&self, name: &str, value: serde_json::Value) {
        self.globals.lock().unwrap().insert(name.to_string(), value);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.screenshots.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, selector: &str) -> E2eResult<()> {
        if self.failing.lock().unwrap().contains(selector) {
            return Err(E2eError::Driver(format!("no element matches {}", selector)));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.record(format!("goto:{}", url));
        self.check(url)
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.record(format!("click:{}", selector));
        self.check(selector)
    }

    async fn type_text(&self, selector: &str, text: &str) -> E2eResult<()> {
        self.record(format!("type:{}:{}", selector, text));
        self.check(selector)
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> E2eResult<()> {
        self.record(format!("wait:{}", selector));
        self.check(selector)
    }

    async fn inner_text(&self, selector: &str) -> E2eResult<String> {
        self.record(format!("text:{}", selector));
        self.check(selector)?;

        let mut texts = self.texts.lock().unwrap();
        let queue = texts
            .get_mut(selector)
            .ok_or_else(|| E2eError::Driver(format!("no element matches {}", selector)))?;
        let text = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(text)
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> E2eResult<()> {
        self.record(format!("screenshot:{}", path.display()));
        std::fs::write(path, b"\x89PNG")?;
        self.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn read_global(&self, name: &str) -> E2eResult<Option<serde_json::Value>> {
        self.record(format!("read_global:{}", name));
        Ok(self.globals.lock().unwrap().get(name).cloned())
    }
}

pub fn context(driver: &Arc<MockDriver>) -> TestContext {
    context_with_coverage(driver, CoverageConfig::default())
}

pub fn context_with_coverage(driver: &Arc<MockDriver>, config: CoverageConfig) -> TestContext {
    let coverage = CoverageReporter::new(config).unwrap();
    TestContext::new(driver.clone(), Arc::new(coverage))
}

/// A test body that bumps `counter` and then passes or fails.
pub fn counted(
    counter: &Arc<AtomicUsize>,
    fail: bool,
) -> impl FnOnce(TestContext) -> Ready<E2eResult<()>> + Send + 'static {
    let counter = counter.clone();
    move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        ready(if fail {
            Err(E2eError::AssertionFailed("body failed".to_string()))
        } else {
            Ok(())
        })
    }
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
