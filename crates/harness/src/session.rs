//! Browser session: waits, actions, assertions and evidence capture

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{HarnessConfig, TimeoutSettings};
use crate::driver::{BrowserDriver, ElementState, Launcher};
use crate::error::{HarnessError, HarnessResult};
use crate::evidence::{EvidenceDir, Screenshot};
use crate::locator::Locator;
use crate::mock::{MockHit, MockTable};
use crate::step::{Action, Condition, Step};

/// Result of evaluating a [`Condition`] once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub holds: bool,
    pub observed: String,
}

/// One browser context driving the application under test.
///
/// [`Session::close`] consumes the session, so resources are released at
/// most once; callers are responsible for calling it on every path.
pub struct Session<D: BrowserDriver> {
    driver: D,
    base_url: Option<Url>,
    mocks: Arc<MockTable>,
    timeouts: TimeoutSettings,
    evidence: EvidenceDir,
    screenshots: Vec<Screenshot>,
    diagnostics: usize,
}

impl<D: BrowserDriver> Session<D> {
    /// Start a browser context and install network interception, without navigating
    pub async fn launch<L>(
        launcher: &L,
        config: &HarnessConfig,
        mocks: MockTable,
        evidence: EvidenceDir,
    ) -> HarnessResult<Self>
    where
        L: Launcher<Driver = D>,
    {
        let launch_timeout = config.browser.launch_timeout();
        info!(
            browser = config.browser.kind.as_str(),
            headless = config.browser.headless,
            "Launching browser"
        );
        let mut driver = match timeout(launch_timeout, launcher.launch(&config.browser)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HarnessError::Launch(format!(
                    "browser did not start within {}ms",
                    launch_timeout.as_millis()
                )))
            }
        };

        let mocks = Arc::new(mocks);
        if !mocks.is_empty() {
            debug!("Installing {} mock rule(s)", mocks.len());
            if let Err(e) = driver.install_mocks(mocks.clone()).await {
                if let Err(close_err) = driver.close().await {
                    warn!("Failed to close browser after mock installation error: {}", close_err);
                }
                return Err(e);
            }
        }

        Ok(Self {
            driver,
            base_url: None,
            mocks,
            timeouts: config.timeouts.clone(),
            evidence,
            screenshots: Vec::new(),
            diagnostics: 0,
        })
    }

    /// Launch, install mocks and navigate to `url`.
    ///
    /// If the first page load fails the browser is closed before the error
    /// is returned.
    pub async fn open<L>(
        launcher: &L,
        config: &HarnessConfig,
        url: &str,
        mocks: MockTable,
        evidence: EvidenceDir,
    ) -> HarnessResult<Self>
    where
        L: Launcher<Driver = D>,
    {
        let mut session = Self::launch(launcher, config, mocks, evidence).await?;
        let budget = session.timeouts.navigation();
        if let Err(e) = session.navigate(url, budget).await {
            session.diagnostic("open").await;
            if let Err(close_err) = session.close().await {
                warn!("Failed to close browser after navigation error: {}", close_err);
            }
            return Err(e);
        }
        Ok(session)
    }

    /// Navigate; relative URLs resolve against the first URL this session opened
    pub async fn navigate(&mut self, url: &str, budget: Duration) -> HarnessResult<()> {
        let target = self.resolve_url(url)?;
        info!(url = %target, "Navigating");
        self.driver.goto(target.as_str(), budget).await?;
        if self.base_url.is_none() {
            self.base_url = Some(target);
        }
        Ok(())
    }

    fn resolve_url(&self, url: &str) -> HarnessResult<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(_) => {
                let base = self.base_url.as_ref().ok_or_else(|| HarnessError::Navigation {
                    url: url.to_string(),
                    reason: "relative URL before any page was opened".to_string(),
                })?;
                base.join(url).map_err(|e| HarnessError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Evaluate a condition once against the current page
    pub async fn observe(&mut self, condition: &Condition) -> HarnessResult<Observation> {
        let observation = match condition {
            Condition::Visible(locator) => {
                let state = self.driver.query(locator).await?;
                Observation {
                    holds: state.resolved && state.visible,
                    observed: state.summary(),
                }
            }
            Condition::Hidden(locator) => {
                let state = self.driver.query(locator).await?;
                Observation {
                    holds: !state.resolved || !state.visible,
                    observed: state.summary(),
                }
            }
            Condition::TextVisible(text) => {
                let state = self.driver.query(&Locator::text(text.clone())).await?;
                Observation {
                    holds: state.resolved && state.visible,
                    observed: state.summary(),
                }
            }
            Condition::TextContains { locator, text } => {
                let state = self.driver.query(locator).await?;
                contains_observation(&state, state.text.as_deref(), text)
            }
            Condition::ValueContains { locator, text } => {
                let state = self.driver.query(locator).await?;
                contains_observation(&state, state.value.as_deref(), text)
            }
            Condition::UrlIs(expected) => {
                let expected = self.resolve_url(expected)?;
                let current = self.driver.current_url().await?;
                let holds = match Url::parse(&current) {
                    Ok(current) => current == expected,
                    Err(_) => current == expected.as_str(),
                };
                Observation {
                    holds,
                    observed: current,
                }
            }
            Condition::Count { locator, count } => {
                let state = self.driver.query(locator).await?;
                Observation {
                    holds: state.matches == *count,
                    observed: format!("{} match(es)", state.matches),
                }
            }
        };
        Ok(observation)
    }

    /// Suspend until `condition` holds.
    ///
    /// Fails with [`HarnessError::WaitTimeout`] once `budget` has fully
    /// elapsed, never earlier.
    pub async fn wait_for(&mut self, condition: &Condition, budget: Duration) -> HarnessResult<()> {
        let start = Instant::now();
        let deadline = start + budget;
        loop {
            let held = self
                .observe_before(condition, deadline)
                .await?
                .is_some_and(|observation| observation.holds);
            if held {
                debug!(condition = %condition, elapsed_ms = start.elapsed().as_millis() as u64, "Condition met");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(HarnessError::WaitTimeout {
                    condition: condition.to_string(),
                    timeout: budget,
                });
            }
            sleep((deadline - now).min(self.timeouts.poll_interval())).await;
        }
    }

    /// Observe once, giving up at `deadline` (or one poll interval from now,
    /// whichever is later) when the browser is slow to answer
    async fn observe_before(
        &mut self,
        condition: &Condition,
        deadline: Instant,
    ) -> HarnessResult<Option<Observation>> {
        let poll = self.timeouts.poll_interval();
        let limit = deadline.saturating_duration_since(Instant::now()).max(poll);
        match timeout(limit, self.observe(condition)).await {
            Ok(observation) => observation.map(Some),
            Err(_) => {
                debug!(condition = %condition, limit_ms = limit.as_millis() as u64, "Observation outlived its budget");
                Ok(None)
            }
        }
    }

    /// Wait for a visible element, reporting absence as `false` instead of an error
    pub async fn probe(&mut self, locator: &Locator, budget: Duration) -> HarnessResult<bool> {
        match self.wait_for(&Condition::Visible(locator.clone()), budget).await {
            Ok(()) => Ok(true),
            Err(HarnessError::WaitTimeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Resolve the action's locator, wait until the element accepts it, then act
    pub async fn perform(&mut self, action: &Action, budget: Duration) -> HarnessResult<()> {
        let locator = action.locator();
        let poll = self.timeouts.poll_interval();
        let deadline = Instant::now() + budget;

        let mut state = loop {
            let state = self.driver.query(locator).await?;
            if state.resolved {
                break state;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(HarnessError::LocatorNotFound {
                    locator: locator.to_string(),
                    timeout: budget,
                });
            }
            sleep((deadline - now).min(poll)).await;
        };

        while let Some(reason) = blocker(action, &state) {
            let now = Instant::now();
            if now >= deadline {
                return Err(HarnessError::ElementNotInteractable {
                    locator: locator.to_string(),
                    action: action.verb().to_string(),
                    reason,
                });
            }
            sleep((deadline - now).min(poll)).await;
            state = self.driver.query(locator).await?;
        }

        let remaining = deadline.saturating_duration_since(Instant::now()).max(poll);
        debug!(action = action.verb(), locator = %locator, "Performing action");
        match action {
            Action::Click(locator) => self.driver.click(locator, remaining).await,
            Action::Fill { locator, value } => self.driver.fill(locator, value, remaining).await,
            Action::SelectOption { locator, value } => {
                self.driver.select_option(locator, value, remaining).await
            }
            Action::SetInputFiles { locator, files } => {
                self.driver.set_input_files(locator, files, remaining).await
            }
        }
    }

    /// Check a condition against the current page, once.
    ///
    /// On failure a diagnostic screenshot is captured before the
    /// [`HarnessError::AssertionFailed`] is returned.
    pub async fn assert(&mut self, condition: &Condition) -> HarnessResult<()> {
        let observation = self.observe(condition).await?;
        if observation.holds {
            return Ok(());
        }
        Err(self.assertion_failure(condition, observation).await)
    }

    /// Like [`Session::assert`], but lets the page settle for up to `within`
    pub async fn expect(&mut self, condition: &Condition, within: Duration) -> HarnessResult<()> {
        let deadline = Instant::now() + within;
        loop {
            let observation = match self.observe_before(condition, deadline).await? {
                Some(observation) if observation.holds => return Ok(()),
                Some(observation) => observation,
                None => Observation {
                    holds: false,
                    observed: "no answer from the browser".to_string(),
                },
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(self.assertion_failure(condition, observation).await);
            }
            sleep((deadline - now).min(self.timeouts.poll_interval())).await;
        }
    }

    async fn assertion_failure(&mut self, condition: &Condition, observation: Observation) -> HarnessError {
        warn!(expected = %condition, observed = %observation.observed, "Assertion failed");
        self.diagnostics += 1;
        let label = format!("assertion-{}", self.diagnostics);
        let screenshot = self.diagnostic(&label).await;
        HarnessError::AssertionFailed {
            expected: condition.to_string(),
            observed: observation.observed,
            screenshot,
        }
    }

    /// Write the viewport to `path`, relative to the evidence directory
    pub async fn capture(&mut self, path: &Path, full_page: bool) -> HarnessResult<Screenshot> {
        let target = self.evidence.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.driver.screenshot(&target, full_page).await?;
        let shot = Screenshot::record(&target, false)?;
        info!(path = %target.display(), "Captured screenshot");
        self.screenshots.push(shot.clone());
        Ok(shot)
    }

    /// Best-effort screenshot after a failure; errors are logged, never returned
    pub async fn diagnostic(&mut self, label: &str) -> Option<PathBuf> {
        let path = self.evidence.failure_path(label);
        if let Err(e) = self.driver.screenshot(&path, false).await {
            warn!("Diagnostic screenshot failed: {}", e);
            return None;
        }
        match Screenshot::record(&path, true) {
            Ok(shot) => {
                info!(path = %path.display(), "Captured diagnostic screenshot");
                self.screenshots.push(shot);
                Some(path)
            }
            Err(e) => {
                warn!("Could not record diagnostic screenshot {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Fixed delay declared by a scenario for a known debounce window
    pub async fn pause(&mut self, duration: Duration, reason: &str) {
        info!(ms = duration.as_millis() as u64, reason, "Pausing");
        sleep(duration).await;
    }

    /// Run one scenario step with the configured budgets
    pub async fn execute(&mut self, step: &Step) -> HarnessResult<()> {
        match step {
            Step::Navigate { url, budget } => {
                let budget = self.timeouts.resolve(*budget, self.timeouts.navigation());
                self.navigate(url, budget).await
            }
            Step::WaitFor { condition, budget } => {
                let budget = self.timeouts.resolve(*budget, self.timeouts.wait());
                self.wait_for(condition, budget).await
            }
            Step::Perform { action, budget } => {
                let budget = self.timeouts.resolve(*budget, self.timeouts.action());
                self.perform(action, budget).await
            }
            Step::Pause { duration, reason } => {
                self.pause(*duration, reason).await;
                Ok(())
            }
            Step::Expect { condition, budget } => {
                let budget = self.timeouts.resolve(*budget, self.timeouts.assertion());
                self.expect(condition, budget).await
            }
            Step::Screenshot { path, full_page } => self.capture(path, *full_page).await.map(|_| ()),
        }
    }

    pub fn screenshots(&self) -> &[Screenshot] {
        &self.screenshots
    }

    pub fn mock_hits(&self) -> Vec<MockHit> {
        self.mocks.hits()
    }

    pub fn evidence(&self) -> &EvidenceDir {
        &self.evidence
    }

    /// Release the browser
    pub async fn close(mut self) -> HarnessResult<()> {
        info!("Closing browser session");
        self.driver.close().await
    }
}

fn contains_observation(state: &ElementState, actual: Option<&str>, expected: &str) -> Observation {
    if !state.resolved {
        return Observation {
            holds: false,
            observed: state.summary(),
        };
    }
    let actual = actual.unwrap_or_default();
    Observation {
        holds: actual.contains(expected),
        observed: format!("\"{}\"", actual),
    }
}

/// Why the element cannot take the action yet, if it cannot
fn blocker(action: &Action, state: &ElementState) -> Option<String> {
    if !state.resolved {
        return Some("element detached".to_string());
    }
    match action {
        Action::Click(_) | Action::SelectOption { .. } => {
            if !state.visible {
                Some("element is hidden".to_string())
            } else if !state.enabled {
                Some("element is disabled".to_string())
            } else {
                None
            }
        }
        Action::Fill { .. } => {
            if !state.visible {
                Some("element is hidden".to_string())
            } else if !state.editable {
                Some("element is not editable".to_string())
            } else {
                None
            }
        }
        // Hidden file inputs are the normal case
        Action::SetInputFiles { .. } => None,
    }
}
