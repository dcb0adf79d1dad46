//! Run-wide state read by every test: results so far, the run mode, and the
//! fail-fast flag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pass/fail record per test name. Each name is written at most once.
#[derive(Debug, Clone, Default)]
pub struct TestResultLedger {
    results: HashMap<String, bool>,
}

impl TestResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of `name`. Returns `false` (and keeps the first
    /// value) if the name was already recorded.
    pub fn record(&mut self, name: &str, passed: bool) -> bool {
        if let Some(existing) = self.results.get(name) {
            warn!(test = name, existing, "ignoring second ledger write");
            return false;
        }
        self.results.insert(name.to_string(), passed);
        true
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.results.get(name).copied()
    }

    pub fn is_passed(&self, name: &str) -> bool {
        self.get(name).unwrap_or(false)
    }

    /// The subset of `deps` that has not been recorded as passed, in input order.
    pub fn unsatisfied<'a, I>(&self, deps: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        deps.into_iter()
            .filter(|dep| !self.is_passed(dep))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Which tests execute their bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    All,
    /// Run only the named test and its transitive dependencies.
    Isolate(String),
}

impl RunMode {
    pub fn from_isolate(target: Option<String>) -> Self {
        match target {
            Some(name) if !name.trim().is_empty() => RunMode::Isolate(name),
            _ => RunMode::All,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            RunMode::All => None,
            RunMode::Isolate(name) => Some(name),
        }
    }
}

/// Global short-circuit after the first body failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast {
    enabled: bool,
    tripped: bool,
}

impl FailFast {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tripped: false,
        }
    }

    /// Trip the flag if fail-fast is enabled. Returns whether it is now tripped.
    pub fn trip(&mut self) -> bool {
        if self.enabled {
            self.tripped = true;
        }
        self.tripped
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}
