//! Browser backend seam
//!
//! The harness logic (waiting, actionability, assertions, evidence) lives in
//! [`crate::session::Session`]; a [`BrowserDriver`] only executes primitive
//! commands against a page. [`crate::playwright`] provides the production
//! backend and [`crate::fake`] a scripted in-memory one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BrowserSettings;
use crate::error::HarnessResult;
use crate::locator::Locator;
use crate::mock::MockTable;
use crate::step::FilePayload;

/// Snapshot of a locator's resolution against the current DOM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// Elements matched by the locator, ignoring its ordinal
    pub matches: usize,
    /// Whether the ordinal picks an existing element; the fields below describe it
    pub resolved: bool,
    pub visible: bool,
    pub enabled: bool,
    pub editable: bool,
    pub text: Option<String>,
    pub value: Option<String>,
}

impl ElementState {
    pub fn detached(matches: usize) -> Self {
        Self {
            matches,
            ..Self::default()
        }
    }

    /// Short human-readable description used in assertion diffs
    pub fn summary(&self) -> String {
        if !self.resolved {
            return format!("not attached ({} match(es))", self.matches);
        }
        let mut parts = vec![if self.visible { "visible" } else { "hidden" }];
        if !self.enabled {
            parts.push("disabled");
        }
        if self.editable {
            parts.push("editable");
        }
        parts.join(", ")
    }
}

/// Primitive page commands.
///
/// Timeouts passed to action methods bound the backend's own actionability
/// checks; the session has already resolved the element before calling them.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> HarnessResult<()>;

    async fn query(&mut self, locator: &Locator) -> HarnessResult<ElementState>;

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> HarnessResult<()>;

    async fn fill(&mut self, locator: &Locator, value: &str, timeout: Duration) -> HarnessResult<()>;

    async fn select_option(
        &mut self,
        locator: &Locator,
        value: &str,
        timeout: Duration,
    ) -> HarnessResult<()>;

    async fn set_input_files(
        &mut self,
        locator: &Locator,
        files: &[FilePayload],
        timeout: Duration,
    ) -> HarnessResult<()>;

    async fn current_url(&mut self) -> HarnessResult<String>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> HarnessResult<()>;

    /// Route every request of the page through `mocks`
    async fn install_mocks(&mut self, mocks: Arc<MockTable>) -> HarnessResult<()>;

    async fn close(&mut self) -> HarnessResult<()>;
}

/// Starts browser contexts
#[async_trait]
pub trait Launcher: Send + Sync {
    type Driver: BrowserDriver + 'static;

    async fn launch(&self, settings: &BrowserSettings) -> HarnessResult<Self::Driver>;
}
