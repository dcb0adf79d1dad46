//! GTFS editor E2E test framework
//!
//! This crate drives the GTFS editor UI through a real browser and sequences
//! its tests with dependency awareness:
//! - Tests declare which earlier tests must have passed before they may run
//! - A failing test blocks its dependents, or every later test in fail-fast mode
//! - A run can be isolated to one test plus its transitive dependencies
//! - Failures leave a full-page screenshot behind
//! - In-page coverage is posted to a collector after every test and before
//!   every navigation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_helpers() -> [HelperHandle] (pid files)        │
//! │    ├── Orchestrator::run(Suite) -> SuiteReport              │
//! │    │     ├── FailFast gate                                  │
//! │    │     ├── TestResultLedger dependency gate               │
//! │    │     ├── RunMode isolation (DependencyGraph closure)    │
//! │    │     └── body under timeout → screenshot on failure     │
//! │    └── CoverageReporter -> POST collector                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteSpec (YAML)                                           │
//! │    └── tests: [{ name, flavor, depends_on, steps }]         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver  ← PlaywrightDriver (node bridge, JSON lines)│
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod coverage;
pub mod dependency;
pub mod driver;
pub mod error;
pub mod helper;
pub mod ledger;
pub mod orchestrator;
pub mod playwright;
pub mod runner;
pub mod spec;
pub mod steps;

pub use config::HarnessConfig;
pub use coverage::{CoverageReporter, CoverageStatus};
pub use dependency::DependencyGraph;
pub use driver::BrowserDriver;
pub use error::{E2eError, E2eResult};
pub use ledger::{FailFast, RunMode, TestResultLedger};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Suite, TestContext, TestFactory, TestState};
pub use runner::{SuiteReport, TestReport, TestRunner};
pub use spec::{SuiteSpec, TestSpec, TestStep};
