//! CareCheck verification harness
//!
//! Drives a real browser through scripted scenarios against a web
//! application and records what happened:
//! - Launches a browser session per run (Playwright over a JSON line protocol)
//! - Resolves declarative locators and waits for elements to become actionable
//! - Answers network requests from mock rules installed before the first page load
//! - Captures screenshot evidence, including a diagnostic shot on failure
//! - Stops at the first failing required step and reports one result per run
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                           │
//! │    ├── run(scenario) -> RunResult                           │
//! │    └── run_all(scenarios, concurrency) -> SuiteResult       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session<D: BrowserDriver>                                  │
//! │    ├── navigate / wait_for / perform / expect / capture     │
//! │    └── close(self)                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver                                              │
//! │    ├── PlaywrightDriver  (node + playwright child process)  │
//! │    └── FakeDriver        (scripted in-memory page)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod evidence;
pub mod fake;
pub mod locator;
pub mod mock;
pub mod playwright;
pub mod preflight;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod step;

pub use config::{BrowserKind, HarnessConfig};
pub use driver::{BrowserDriver, ElementState, Launcher};
pub use error::{ErrorKind, HarnessError, HarnessResult};
pub use evidence::Screenshot;
pub use locator::Locator;
pub use mock::{MockResponse, MockRule, MockTable, UrlPattern};
pub use playwright::PlaywrightLauncher;
pub use runner::{RunResult, RunStatus, ScenarioRunner, StepOutcome, SuiteResult};
pub use scenario::Scenario;
pub use session::Session;
pub use step::{Action, Budget, Condition, FilePayload, Step};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
