//! Harness configuration
//!
//! Loaded from an optional TOML file, then overlaid with `CARECHECK_*`
//! environment variables. Command-line flags override both.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CARECHECK_BROWSER` | `browser.kind` |
//! | `CARECHECK_HEADLESS` | `browser.headless` |
//! | `CARECHECK_NODE` | `browser.node_binary` |
//! | `CARECHECK_PLAYWRIGHT_MODULE` | `browser.playwright_module` |
//! | `CARECHECK_EVIDENCE_DIR` | `evidence.root` |
//! | `CARECHECK_NAVIGATION_TIMEOUT_MS` | `timeouts.navigation_ms` |
//! | `CARECHECK_ACTION_TIMEOUT_MS` | `timeouts.action_ms` |
//! | `CARECHECK_WAIT_TIMEOUT_MS` | `timeouts.wait_ms` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::step::Budget;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub browser: BrowserSettings,
    pub timeouts: TimeoutSettings,
    pub evidence: EvidenceSettings,

    /// Probe the base URL over HTTP before launching a browser
    pub preflight: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(HarnessError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

/// Browser process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub kind: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node.js executable that hosts the Playwright driver
    pub node_binary: PathBuf,

    /// Module specifier passed to `require()`; an absolute path works when
    /// Playwright is not installed globally
    pub playwright_module: String,

    pub launch_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            playwright_module: "playwright".to_string(),
            launch_timeout_ms: 30_000,
        }
    }
}

impl BrowserSettings {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

/// Default time budgets, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub navigation_ms: u64,
    pub action_ms: u64,
    pub wait_ms: u64,
    pub assertion_ms: u64,
    pub long_operation_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            navigation_ms: 10_000,
            action_ms: 5_000,
            wait_ms: 10_000,
            assertion_ms: 5_000,
            long_operation_ms: 30_000,
            poll_interval_ms: 100,
        }
    }
}

impl TimeoutSettings {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn assertion(&self) -> Duration {
        Duration::from_millis(self.assertion_ms)
    }

    pub fn long_operation(&self) -> Duration {
        Duration::from_millis(self.long_operation_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Concrete duration for a step budget, given the step type's default
    pub fn resolve(&self, budget: Budget, default: Duration) -> Duration {
        match budget {
            Budget::Default => default,
            Budget::LongOperation => self.long_operation(),
            Budget::Exactly(d) => d,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceSettings {
    /// Each run writes into its own subdirectory of this root
    pub root: PathBuf,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("verification-results"),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay `CARECHECK_*` variables from the process environment
    pub fn apply_env(self) -> HarnessResult<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> HarnessResult<Self> {
        if let Some(kind) = lookup("CARECHECK_BROWSER") {
            self.browser.kind = kind.parse()?;
        }
        if let Some(headless) = lookup("CARECHECK_HEADLESS") {
            self.browser.headless = parse_bool("CARECHECK_HEADLESS", &headless)?;
        }
        if let Some(node) = lookup("CARECHECK_NODE") {
            self.browser.node_binary = PathBuf::from(node);
        }
        if let Some(module) = lookup("CARECHECK_PLAYWRIGHT_MODULE") {
            self.browser.playwright_module = module;
        }
        if let Some(root) = lookup("CARECHECK_EVIDENCE_DIR") {
            self.evidence.root = PathBuf::from(root);
        }
        if let Some(ms) = lookup("CARECHECK_NAVIGATION_TIMEOUT_MS") {
            self.timeouts.navigation_ms = parse_ms("CARECHECK_NAVIGATION_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("CARECHECK_ACTION_TIMEOUT_MS") {
            self.timeouts.action_ms = parse_ms("CARECHECK_ACTION_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("CARECHECK_WAIT_TIMEOUT_MS") {
            self.timeouts.wait_ms = parse_ms("CARECHECK_WAIT_TIMEOUT_MS", &ms)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.browser.viewport_width == 0 || self.browser.viewport_height == 0 {
            return Err(HarnessError::Config("viewport must be non-empty".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(HarnessError::Config("poll interval must be positive".to_string()));
        }
        if self.timeouts.poll_interval_ms > self.timeouts.wait_ms {
            return Err(HarnessError::Config(
                "poll interval must not exceed the wait timeout".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> HarnessResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HarnessError::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}

fn parse_ms(key: &str, value: &str) -> HarnessResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("{} must be milliseconds, got '{}'", key, value)))
}
