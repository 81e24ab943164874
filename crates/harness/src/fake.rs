//! Scripted in-memory browser
//!
//! [`FakeApp`] models just enough of a page for the session logic to run
//! against: a table of elements keyed by locator, reactions that mutate the
//! page when it is clicked, filled or navigated, and delayed effects that
//! follow the tokio clock (so paused-time tests are deterministic). Every
//! request the page makes is routed through the installed mocks, and the ones
//! that would have reached the network are recorded.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::BrowserSettings;
use crate::driver::{BrowserDriver, ElementState, Launcher};
use crate::error::{HarnessError, HarnessResult};
use crate::locator::{Locator, Ordinal};
use crate::mock::{MockTable, RouteDecision};
use crate::step::FilePayload;

/// One element on the fake page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeElement {
    pub visible: bool,
    pub enabled: bool,
    pub editable: bool,
    pub text: Option<String>,
    pub value: Option<String>,
}

impl FakeElement {
    /// Visible, enabled, not editable
    pub fn visible() -> Self {
        Self {
            visible: true,
            enabled: true,
            editable: false,
            text: None,
            value: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::visible()
        }
    }

    /// Visible, editable text field with an empty value
    pub fn input() -> Self {
        Self {
            editable: true,
            value: Some(String::new()),
            ..Self::visible()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self.editable = false;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Counters and request log, for assertions in tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub launches: usize,
    pub closes: usize,
    pub navigations: usize,
    pub screenshots: usize,
    pub actions: usize,
    /// Requests that no mock answered
    pub real_requests: Vec<String>,
    /// Requests answered by a mock
    pub mocked_requests: Vec<String>,
    /// Names of every file handed to a file input
    pub uploads: Vec<String>,
}

/// Mutable page state handed to reactions
#[derive(Default)]
pub struct Page {
    url: String,
    elements: HashMap<Locator, Vec<FakeElement>>,
    mocks: Option<Arc<MockTable>>,
    stats: DriverStats,
    crashed: bool,
}

impl Page {
    /// Add an element matched by `locator`
    pub fn show(&mut self, locator: Locator, element: FakeElement) {
        self.elements.entry(key(&locator)).or_default().push(element);
    }

    /// Add a visible element found by its text
    pub fn show_text(&mut self, text: &str) {
        self.show(
            Locator::text(text),
            FakeElement::visible().with_text(text),
        );
    }

    /// Mark every element matched by `locator` hidden
    pub fn hide(&mut self, locator: &Locator) {
        if let Some(elements) = self.elements.get_mut(&key(locator)) {
            elements.iter_mut().for_each(|e| e.visible = false);
        }
    }

    /// Detach every element matched by `locator`
    pub fn remove(&mut self, locator: &Locator) {
        self.elements.remove(&key(locator));
    }

    /// Replace the first element matched by `locator`
    pub fn set(&mut self, locator: &Locator, element: FakeElement) {
        match self.elements.get_mut(&key(locator)) {
            Some(elements) if !elements.is_empty() => elements[0] = element,
            _ => self.show(locator.clone(), element),
        }
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The browser process dies: every later driver call fails with `SessionClosed`
    pub fn crash(&mut self) {
        self.crashed = true;
    }

    pub fn value_of(&self, locator: &Locator) -> Option<String> {
        self.resolve(locator).and_then(|e| e.value.clone())
    }

    /// Issue a request from the page, the way application code would
    pub fn fetch(&mut self, url: &str) -> Option<Vec<u8>> {
        let mocks = self.mocks.clone();
        match mocks.as_ref().map(|m| m.route(url)) {
            Some(RouteDecision::Fulfill(response)) => {
                self.stats.mocked_requests.push(url.to_string());
                Some(response.body.clone())
            }
            _ => {
                self.stats.real_requests.push(url.to_string());
                None
            }
        }
    }

    fn resolve(&self, locator: &Locator) -> Option<&FakeElement> {
        let elements = self.elements.get(&key(locator))?;
        locator.pick(elements.len()).map(|i| &elements[i])
    }

    fn resolve_mut(&mut self, locator: &Locator) -> Option<&mut FakeElement> {
        let elements = self.elements.get_mut(&key(locator))?;
        let index = locator.pick(elements.len())?;
        elements.get_mut(index)
    }

    fn query(&self, locator: &Locator) -> ElementState {
        let matches = self.elements.get(&key(locator)).map_or(0, Vec::len);
        match self.resolve(locator) {
            None => ElementState::detached(matches),
            Some(e) => ElementState {
                matches,
                resolved: true,
                visible: e.visible,
                enabled: e.enabled,
                editable: e.editable,
                text: e.text.clone(),
                value: e.value.clone(),
            },
        }
    }
}

/// Elements are stored without their own ordinal
fn key(locator: &Locator) -> Locator {
    Locator {
        ordinal: None,
        parent: locator.parent.as_deref().map(|p| Box::new(normalize(p))),
        kind: locator.kind.clone(),
    }
}

/// `first()` and `nth(0)` resolve the same as no ordinal at all
fn normalize(locator: &Locator) -> Locator {
    let ordinal = match locator.ordinal {
        Some(Ordinal::First) | Some(Ordinal::Nth(0)) | None => None,
        other => other,
    };
    Locator {
        ordinal,
        parent: locator.parent.as_deref().map(|p| Box::new(normalize(p))),
        kind: locator.kind.clone(),
    }
}

type Effect = Arc<dyn Fn(&mut Page, &str) + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Click,
    Fill,
    Files,
}

struct Reaction {
    trigger: Trigger,
    locator: Locator,
    delay: Duration,
    effect: Effect,
}

struct NavigationReaction {
    url_contains: String,
    effect: Effect,
}

struct Scheduled {
    at: Instant,
    input: String,
    effect: Effect,
}

#[derive(Default)]
struct AppState {
    page: Page,
    reactions: Vec<Reaction>,
    navigation: Vec<NavigationReaction>,
    scheduled: Vec<Scheduled>,
    fail_launch: Option<String>,
    fail_navigation: Option<String>,
    query_delay: Duration,
}

impl AppState {
    /// Apply delayed effects that are due
    fn tick(&mut self) {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.scheduled).into_iter().partition(|s| s.at <= now);
        self.scheduled = pending;
        for s in due {
            (s.effect)(&mut self.page, &s.input);
        }
    }

    fn react(&mut self, trigger: Trigger, locator: &Locator, input: &str) {
        let target = normalize(locator);
        let now = Instant::now();
        let mut immediate = Vec::new();
        for r in &self.reactions {
            if r.trigger != trigger || normalize(&r.locator) != target {
                continue;
            }
            if r.delay.is_zero() {
                immediate.push(r.effect.clone());
            } else {
                self.scheduled.push(Scheduled {
                    at: now + r.delay,
                    input: input.to_string(),
                    effect: r.effect.clone(),
                });
            }
        }
        for effect in immediate {
            effect(&mut self.page, input);
        }
    }
}

/// Handle to a scripted application; clones share state
#[derive(Clone, Default)]
pub struct FakeApp {
    state: Arc<Mutex<AppState>>,
}

impl FakeApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launcher(&self) -> FakeLauncher {
        FakeLauncher { app: self.clone() }
    }

    /// Mutate the page directly
    pub fn page<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        f(&mut self.state.lock().page)
    }

    pub fn show(&self, locator: Locator, element: FakeElement) -> &Self {
        self.page(|p| p.show(locator, element));
        self
    }

    pub fn show_text(&self, text: &str) -> &Self {
        self.page(|p| p.show_text(text));
        self
    }

    pub fn on_click(&self, locator: Locator, effect: impl Fn(&mut Page) + Send + Sync + 'static) -> &Self {
        self.react(Trigger::Click, locator, Duration::ZERO, move |p, _| effect(p))
    }

    /// Like [`FakeApp::on_click`], with the effect landing `delay` after the click
    pub fn on_click_after(
        &self,
        locator: Locator,
        delay: Duration,
        effect: impl Fn(&mut Page) + Send + Sync + 'static,
    ) -> &Self {
        self.react(Trigger::Click, locator, delay, move |p, _| effect(p))
    }

    /// The effect receives the filled value
    pub fn on_fill(&self, locator: Locator, effect: impl Fn(&mut Page, &str) + Send + Sync + 'static) -> &Self {
        self.react(Trigger::Fill, locator, Duration::ZERO, effect)
    }

    /// The effect receives the uploaded file names, comma separated
    pub fn on_files(&self, locator: Locator, effect: impl Fn(&mut Page, &str) + Send + Sync + 'static) -> &Self {
        self.react(Trigger::Files, locator, Duration::ZERO, effect)
    }

    /// Run `effect` whenever a navigation target contains `url_contains`
    pub fn on_navigate(
        &self,
        url_contains: &str,
        effect: impl Fn(&mut Page) + Send + Sync + 'static,
    ) -> &Self {
        self.state.lock().navigation.push(NavigationReaction {
            url_contains: url_contains.to_string(),
            effect: Arc::new(move |p, _| effect(p)),
        });
        self
    }

    /// Apply `effect` once `delay` has passed on the tokio clock
    pub fn after(&self, delay: Duration, effect: impl Fn(&mut Page) + Send + Sync + 'static) -> &Self {
        self.state.lock().scheduled.push(Scheduled {
            at: Instant::now() + delay,
            input: String::new(),
            effect: Arc::new(move |p, _| effect(p)),
        });
        self
    }

    /// Kill the browser once `delay` has passed
    pub fn crash_after(&self, delay: Duration) -> &Self {
        self.after(delay, Page::crash)
    }

    /// Make every element query take `delay` before answering
    pub fn stall_queries(&self, delay: Duration) -> &Self {
        self.state.lock().query_delay = delay;
        self
    }

    pub fn fail_launch(&self, reason: &str) -> &Self {
        self.state.lock().fail_launch = Some(reason.to_string());
        self
    }

    pub fn fail_navigation(&self, reason: &str) -> &Self {
        self.state.lock().fail_navigation = Some(reason.to_string());
        self
    }

    pub fn stats(&self) -> DriverStats {
        self.state.lock().page.stats.clone()
    }

    pub fn url(&self) -> String {
        self.state.lock().page.url.clone()
    }

    pub fn value_of(&self, locator: &Locator) -> Option<String> {
        self.state.lock().page.value_of(locator)
    }

    fn react(
        &self,
        trigger: Trigger,
        locator: Locator,
        delay: Duration,
        effect: impl Fn(&mut Page, &str) + Send + Sync + 'static,
    ) -> &Self {
        self.state.lock().reactions.push(Reaction {
            trigger,
            locator,
            delay,
            effect: Arc::new(effect),
        });
        self
    }
}

/// Hands out [`FakeDriver`]s bound to one [`FakeApp`]
#[derive(Clone)]
pub struct FakeLauncher {
    app: FakeApp,
}

#[async_trait]
impl Launcher for FakeLauncher {
    type Driver = FakeDriver;

    async fn launch(&self, _settings: &BrowserSettings) -> HarnessResult<FakeDriver> {
        let mut state = self.app.state.lock();
        if let Some(reason) = &state.fail_launch {
            return Err(HarnessError::Launch(reason.clone()));
        }
        state.page.stats.launches += 1;
        Ok(FakeDriver {
            app: self.app.clone(),
            closed: false,
        })
    }
}

pub struct FakeDriver {
    app: FakeApp,
    closed: bool,
}

impl FakeDriver {
    /// Lock the app after checking the session is open and applying due effects
    fn live(&self) -> HarnessResult<parking_lot::MutexGuard<'_, AppState>> {
        if self.closed {
            return Err(HarnessError::SessionClosed);
        }
        let mut state = self.app.state.lock();
        state.tick();
        if state.page.crashed {
            return Err(HarnessError::SessionClosed);
        }
        Ok(state)
    }

    fn act(&self, trigger: Trigger, locator: &Locator, input: &str) -> HarnessResult<()> {
        let mut state = self.live()?;
        if state.page.resolve(locator).is_none() {
            return Err(HarnessError::Driver(format!("{} is not attached", locator)));
        }
        state.page.stats.actions += 1;
        state.react(trigger, locator, input);
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> HarnessResult<()> {
        let mut state = self.live()?;
        state.page.stats.navigations += 1;
        if let Some(reason) = &state.fail_navigation {
            return Err(HarnessError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        state.page.fetch(url);
        state.page.url = url.to_string();
        let effects: Vec<Effect> = state
            .navigation
            .iter()
            .filter(|r| url.contains(&r.url_contains))
            .map(|r| r.effect.clone())
            .collect();
        for effect in effects {
            effect(&mut state.page, url);
        }
        debug!(url, "Fake navigation");
        Ok(())
    }

    async fn query(&mut self, locator: &Locator) -> HarnessResult<ElementState> {
        let delay = self.app.state.lock().query_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.live()?.page.query(locator))
    }

    async fn click(&mut self, locator: &Locator, _timeout: Duration) -> HarnessResult<()> {
        self.act(Trigger::Click, locator, "")
    }

    async fn fill(&mut self, locator: &Locator, value: &str, _timeout: Duration) -> HarnessResult<()> {
        {
            let mut state = self.live()?;
            if let Some(element) = state.page.resolve_mut(locator) {
                element.value = Some(value.to_string());
            }
        }
        self.act(Trigger::Fill, locator, value)
    }

    async fn select_option(
        &mut self,
        locator: &Locator,
        value: &str,
        _timeout: Duration,
    ) -> HarnessResult<()> {
        {
            let mut state = self.live()?;
            if let Some(element) = state.page.resolve_mut(locator) {
                element.value = Some(value.to_string());
            }
        }
        self.act(Trigger::Fill, locator, value)
    }

    async fn set_input_files(
        &mut self,
        locator: &Locator,
        files: &[FilePayload],
        _timeout: Duration,
    ) -> HarnessResult<()> {
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        {
            let mut state = self.live()?;
            state
                .page
                .stats
                .uploads
                .extend(names.iter().map(|n| n.to_string()));
        }
        self.act(Trigger::Files, locator, &names.join(","))
    }

    async fn current_url(&mut self) -> HarnessResult<String> {
        Ok(self.live()?.page.url.clone())
    }

    async fn screenshot(&mut self, path: &Path, _full_page: bool) -> HarnessResult<()> {
        self.live()?.page.stats.screenshots += 1;
        image::RgbImage::from_pixel(16, 9, image::Rgb([240, 244, 248])).save(path)?;
        Ok(())
    }

    async fn install_mocks(&mut self, mocks: Arc<MockTable>) -> HarnessResult<()> {
        self.live()?.page.mocks = Some(mocks);
        Ok(())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        if self.closed {
            return Err(HarnessError::SessionClosed);
        }
        let crashed = {
            let mut state = self.app.state.lock();
            state.tick();
            state.page.stats.closes += 1;
            state.page.crashed
        };
        self.closed = true;
        if crashed {
            return Err(HarnessError::Driver("close (exited): browser process is gone".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, MockRule};

    #[tokio::test]
    async fn test_query_respects_ordinals() {
        let app = FakeApp::new();
        let rows = Locator::css("button[aria-haspopup=\"dialog\"]");
        app.show(rows.clone(), FakeElement::visible().with_text("TR001"))
            .show(rows.clone(), FakeElement::visible().with_text("TR002"));

        let mut driver = app.launcher().launch(&BrowserSettings::default()).await.unwrap();
        let second = driver.query(&rows.clone().nth(1)).await.unwrap();
        assert_eq!(second.matches, 2);
        assert_eq!(second.text.as_deref(), Some("TR002"));
        assert!(!driver.query(&rows.nth(2)).await.unwrap().resolved);
    }

    #[tokio::test]
    async fn test_reactions_and_close() {
        let app = FakeApp::new();
        let send = Locator::role_named("button", "Send OTP");
        app.show(send.clone(), FakeElement::visible())
            .on_click(send.clone(), |p| p.show_text("Verify OTP"));

        let mut driver = app.launcher().launch(&BrowserSettings::default()).await.unwrap();
        driver.click(&send.first(), Duration::from_secs(1)).await.unwrap();
        assert!(driver.query(&Locator::text("Verify OTP")).await.unwrap().visible);

        driver.close().await.unwrap();
        assert!(matches!(
            driver.query(&Locator::text("Verify OTP")).await,
            Err(HarnessError::SessionClosed)
        ));
        assert_eq!(app.stats().closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_effect_follows_clock() {
        let app = FakeApp::new();
        app.after(Duration::from_secs(3), |p| p.show_text("Analysis complete"));
        let mut driver = app.launcher().launch(&BrowserSettings::default()).await.unwrap();
        let done = Locator::text("Analysis complete");

        assert!(!driver.query(&done).await.unwrap().resolved);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(driver.query(&done).await.unwrap().resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_closes_the_session() {
        let app = FakeApp::new();
        app.show_text("Home").crash_after(Duration::from_secs(1));
        let mut driver = app.launcher().launch(&BrowserSettings::default()).await.unwrap();
        assert!(driver.query(&Locator::text("Home")).await.unwrap().resolved);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(
            driver.query(&Locator::text("Home")).await,
            Err(HarnessError::SessionClosed)
        ));
        assert!(matches!(driver.close().await, Err(HarnessError::Driver(_))));
        assert_eq!(app.stats().closes, 1);
    }

    #[test]
    fn test_fetch_routes_through_mocks() {
        let mut page = Page::default();
        page.mocks = Some(Arc::new(MockTable::new(vec![MockRule::glob(
            "**/functions/v1/*",
            MockResponse::new(200, "application/json", "{}"),
        )
        .unwrap()])));

        assert_eq!(page.fetch("http://h/functions/v1/search").as_deref(), Some(&b"{}"[..]));
        assert_eq!(page.fetch("http://h/index.html"), None);
        assert_eq!(page.stats.mocked_requests, vec!["http://h/functions/v1/search"]);
        assert_eq!(page.stats.real_requests, vec!["http://h/index.html"]);
    }
}
