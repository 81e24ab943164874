//! Playwright browser backend
//!
//! A small Node.js driver script is written to a temp dir and run with
//! `node`. It keeps one browser context alive and speaks line-delimited JSON
//! over stdio:
//!
//! ```text
//! harness -> driver   {"id":7,"method":"click","params":{...}}
//! driver  -> harness  {"id":7,"ok":true,"result":null}
//! driver  -> harness  {"event":"route","route_id":3,"url":"...","method":"GET"}
//! harness -> driver   {"id":8,"method":"fulfill_route","params":{"route_id":3,...}}
//! ```
//!
//! Route events are answered by the reader task from the session's mock
//! table, so mocked requests never leave the browser.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::BrowserSettings;
use crate::driver::{BrowserDriver, ElementState, Launcher};
use crate::error::{HarnessError, HarnessResult};
use crate::locator::Locator;
use crate::mock::{MockTable, RouteDecision};
use crate::step::FilePayload;

/// Budget for bookkeeping commands that do not wait on the page
const COMMAND_BUDGET: Duration = Duration::from_secs(5);

/// Extra time the harness allows for a reply beyond the driver-side timeout
const REPLY_GRACE: Duration = Duration::from_secs(2);

const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require(process.env.CARECHECK_PLAYWRIGHT_MODULE || 'playwright');

let browser = null;
let context = null;
let page = null;
const routes = new Map();
let nextRoute = 1;

function send(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function base(desc) {
  const scope = desc.parent ? resolve(desc.parent) : page;
  switch (desc.kind) {
    case 'role':
      return scope.getByRole(desc.role, desc.name == null ? {} : { name: desc.name, exact: desc.exact });
    case 'label':
      return scope.getByLabel(desc.text, { exact: desc.exact });
    case 'css':
      return scope.locator(desc.selector);
    case 'test_id':
      return scope.getByTestId(desc.id);
    case 'text':
      return scope.getByText(desc.text, { exact: desc.exact });
    default:
      throw new Error('unknown locator kind ' + desc.kind);
  }
}

function resolve(desc) {
  const loc = base(desc);
  const ordinal = desc.ordinal;
  if (!ordinal || ordinal.at === 'first') return loc.first();
  if (ordinal.at === 'last') return loc.last();
  return loc.nth(ordinal.n);
}

function classify(err) {
  const message = String((err && err.message) || err);
  if (err && err.name === 'TimeoutError') return 'timeout';
  if (message.includes('has been closed')) return 'closed';
  return 'failed';
}

const handlers = {
  async launch(p) {
    const engine = playwright[p.browser];
    if (!engine) throw new Error('unsupported browser ' + p.browser);
    browser = await engine.launch({ headless: p.headless });
    context = await browser.newContext({ viewport: p.viewport });
    page = await context.newPage();
    return null;
  },
  async enable_routing() {
    await context.route('**/*', (route) => {
      const id = nextRoute++;
      routes.set(id, route);
      send({ event: 'route', route_id: id, url: route.request().url(), method: route.request().method() });
    });
    return null;
  },
  async fulfill_route(p) {
    const route = routes.get(p.route_id);
    routes.delete(p.route_id);
    if (!route) return null;
    await route.fulfill({
      status: p.status,
      contentType: p.content_type,
      headers: p.headers,
      body: Buffer.from(p.body, 'base64'),
    });
    return null;
  },
  async continue_route(p) {
    const route = routes.get(p.route_id);
    routes.delete(p.route_id);
    if (route) await route.continue();
    return null;
  },
  async goto(p) {
    await page.goto(p.url, { timeout: p.timeout_ms, waitUntil: 'load' });
    return null;
  },
  async query(p) {
    const matches = await base(p.locator).count();
    const el = resolve(p.locator);
    const detached = { matches, resolved: false, visible: false, enabled: false, editable: false, text: null, value: null };
    if ((await el.count()) === 0) return detached;
    try {
      return {
        matches,
        resolved: true,
        visible: await el.isVisible(),
        enabled: await el.isEnabled({ timeout: 1000 }).catch(() => false),
        editable: await el.isEditable({ timeout: 1000 }).catch(() => false),
        text: await el.textContent({ timeout: 1000 }).catch(() => null),
        value: await el.inputValue({ timeout: 1000 }).catch(() => null),
      };
    } catch (e) {
      return detached;
    }
  },
  async click(p) {
    await resolve(p.locator).click({ timeout: p.timeout_ms });
    return null;
  },
  async fill(p) {
    await resolve(p.locator).fill(p.value, { timeout: p.timeout_ms });
    return null;
  },
  async select_option(p) {
    await resolve(p.locator).selectOption(p.value, { timeout: p.timeout_ms });
    return null;
  },
  async set_input_files(p) {
    const files = p.files.map((f) => ({ name: f.name, mimeType: f.mime_type, buffer: Buffer.from(f.data, 'base64') }));
    await resolve(p.locator).setInputFiles(files, { timeout: p.timeout_ms });
    return null;
  },
  async url() {
    return page.url();
  },
  async screenshot(p) {
    await page.screenshot({ path: p.path, fullPage: p.full_page });
    return null;
  },
  async close() {
    if (browser) await browser.close();
    browser = null;
    setTimeout(() => process.exit(0), 50);
    return null;
  },
};

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', async (line) => {
  let msg;
  try {
    msg = JSON.parse(line);
  } catch (e) {
    return;
  }
  try {
    const handler = handlers[msg.method];
    if (!handler) throw new Error('unknown method ' + msg.method);
    const result = await handler(msg.params || {});
    send({ id: msg.id, ok: true, result: result === undefined ? null : result });
  } catch (e) {
    send({ id: msg.id, ok: false, error: { kind: classify(e), message: String((e && e.message) || e) } });
  }
});
rl.on('close', async () => {
  if (browser) await browser.close().catch(() => {});
  process.exit(0);
});
"#;

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Route(RouteEvent),
    Reply(Reply),
}

#[derive(Debug, Deserialize)]
struct RouteEvent {
    event: String,
    route_id: u64,
    url: String,
    #[serde(default)]
    method: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    kind: String,
    message: String,
}

impl Reply {
    fn into_result(self, method: &str) -> HarnessResult<Value> {
        if self.ok {
            return Ok(self.result);
        }
        let (kind, message) = match self.error {
            Some(e) => (e.kind, e.message),
            None => ("failed".to_string(), "no error detail".to_string()),
        };
        match kind.as_str() {
            "closed" => Err(HarnessError::SessionClosed),
            _ => Err(HarnessError::Driver(format!("{} ({}): {}", method, kind, message))),
        }
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;
type MockSlot = Arc<Mutex<Option<Arc<MockTable>>>>;

/// Launches a Playwright driver process per session
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher;

#[async_trait]
impl Launcher for PlaywrightLauncher {
    type Driver = PlaywrightDriver;

    async fn launch(&self, settings: &BrowserSettings) -> HarnessResult<PlaywrightDriver> {
        PlaywrightDriver::spawn(settings).await
    }
}

/// Handle to a running Node/Playwright driver process
pub struct PlaywrightDriver {
    child: Child,
    outbound: mpsc::UnboundedSender<String>,
    pending: Pending,
    next_id: Arc<AtomicU64>,
    mocks: MockSlot,
    closed: Arc<AtomicBool>,
    _script_dir: TempDir,
}

impl PlaywrightDriver {
    /// Start the driver process and launch a browser context in it
    pub async fn spawn(settings: &BrowserSettings) -> HarnessResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("carecheck-driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let mut child = Command::new(&settings.node_binary)
            .arg(&script_path)
            .env("CARECHECK_PLAYWRIGHT_MODULE", &settings.playwright_module)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::Launch(format!(
                    "failed to spawn {}: {}",
                    settings.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Launch("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Launch("driver stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::Launch("driver stderr unavailable".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let mocks: MockSlot = Arc::new(Mutex::new(None));
        let next_id = Arc::new(AtomicU64::new(1));
        let closed = Arc::new(AtomicBool::new(false));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(stdin, outbound_rx));
        tokio::spawn(read_loop(
            BufReader::new(stdout),
            pending.clone(),
            mocks.clone(),
            outbound.clone(),
            next_id.clone(),
            closed.clone(),
        ));
        tokio::spawn(log_stderr(stderr));

        let driver = Self {
            child,
            outbound,
            pending,
            next_id,
            mocks,
            closed,
            _script_dir: script_dir,
        };

        let params = json!({
            "browser": settings.kind.as_str(),
            "headless": settings.headless,
            "viewport": { "width": settings.viewport_width, "height": settings.viewport_height },
        });
        driver
            .request("launch", params, settings.launch_timeout())
            .await
            .map_err(|e| HarnessError::Launch(e.to_string()))?;

        info!(browser = settings.kind.as_str(), "Playwright driver ready");
        Ok(driver)
    }

    async fn request(&self, method: &str, params: Value, budget: Duration) -> HarnessResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::SessionClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let line = serde_json::to_string(&Request { id, method, params })?;
        trace!(id, method, "Driver request");
        if self.outbound.send(line).is_err() {
            self.pending.lock().remove(&id);
            return Err(HarnessError::SessionClosed);
        }

        match timeout(budget + REPLY_GRACE, rx).await {
            Ok(Ok(reply)) => reply.into_result(method),
            Ok(Err(_)) => Err(HarnessError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(HarnessError::Driver(format!(
                    "no reply to '{}' within {}ms",
                    method,
                    (budget + REPLY_GRACE).as_millis()
                )))
            }
        }
    }

    async fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && timeout(Duration::from_millis(500), self.child.wait()).await.is_ok()
                {
                    return;
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill Playwright driver: {}", e);
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn goto(&mut self, url: &str, budget: Duration) -> HarnessResult<()> {
        self.request("goto", json!({ "url": url, "timeout_ms": millis(budget) }), budget)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                HarnessError::SessionClosed => e,
                other => HarnessError::Navigation {
                    url: url.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    async fn query(&mut self, locator: &Locator) -> HarnessResult<ElementState> {
        let value = self
            .request("query", json!({ "locator": locator }), COMMAND_BUDGET)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click(&mut self, locator: &Locator, budget: Duration) -> HarnessResult<()> {
        let params = json!({ "locator": locator, "timeout_ms": millis(budget) });
        self.request("click", params, budget).await.map(|_| ())
    }

    async fn fill(&mut self, locator: &Locator, value: &str, budget: Duration) -> HarnessResult<()> {
        let params = json!({ "locator": locator, "value": value, "timeout_ms": millis(budget) });
        self.request("fill", params, budget).await.map(|_| ())
    }

    async fn select_option(
        &mut self,
        locator: &Locator,
        value: &str,
        budget: Duration,
    ) -> HarnessResult<()> {
        let params = json!({ "locator": locator, "value": value, "timeout_ms": millis(budget) });
        self.request("select_option", params, budget).await.map(|_| ())
    }

    async fn set_input_files(
        &mut self,
        locator: &Locator,
        files: &[FilePayload],
        budget: Duration,
    ) -> HarnessResult<()> {
        let files: Vec<Value> = files
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "mime_type": f.mime_type,
                    "data": BASE64.encode(&f.data),
                })
            })
            .collect();
        let params = json!({ "locator": locator, "files": files, "timeout_ms": millis(budget) });
        self.request("set_input_files", params, budget).await.map(|_| ())
    }

    async fn current_url(&mut self) -> HarnessResult<String> {
        let value = self.request("url", Value::Null, COMMAND_BUDGET).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| HarnessError::Driver(format!("url returned {}", value)))
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> HarnessResult<()> {
        let params = json!({ "path": path.to_string_lossy(), "full_page": full_page });
        self.request("screenshot", params, COMMAND_BUDGET).await.map(|_| ())
    }

    async fn install_mocks(&mut self, mocks: Arc<MockTable>) -> HarnessResult<()> {
        *self.mocks.lock() = Some(mocks);
        self.request("enable_routing", Value::Null, COMMAND_BUDGET)
            .await
            .map(|_| ())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            self.terminate().await;
            return Ok(());
        }
        let result = self.request("close", Value::Null, COMMAND_BUDGET).await;
        self.closed.store(true, Ordering::SeqCst);

        match timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright driver exited: {}", status),
            _ => self.terminate().await,
        }
        result.map(|_| ())
    }
}

async fn write_loop(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!("Failed to write to Playwright driver: {}", e);
            break;
        }
    }
}

async fn read_loop<R: AsyncBufRead + Unpin>(
    reader: R,
    pending: Pending,
    mocks: MockSlot,
    outbound: mpsc::UnboundedSender<String>,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch(&line, &pending, &mocks, &outbound, &next_id),
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read from Playwright driver: {}", e);
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed-session error
    pending.lock().clear();
    debug!("Playwright driver output closed");
}

fn dispatch(
    line: &str,
    pending: &Pending,
    mocks: &MockSlot,
    outbound: &mpsc::UnboundedSender<String>,
    next_id: &AtomicU64,
) {
    let inbound: Inbound = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(_) => {
            debug!("driver: {}", line);
            return;
        }
    };

    match inbound {
        Inbound::Route(event) if event.event == "route" => {
            let table = mocks.lock().clone();
            let (method, params) = route_command(table.as_deref(), &event);
            let request = Request {
                id: next_id.fetch_add(1, Ordering::SeqCst),
                method,
                params,
            };
            match serde_json::to_string(&request) {
                Ok(line) => {
                    if outbound.send(line).is_err() {
                        warn!(url = %event.url, "Driver gone before route could be answered");
                    }
                }
                Err(e) => warn!("Failed to encode route reply: {}", e),
            }
        }
        Inbound::Route(event) => trace!(event = %event.event, "Ignoring driver event"),
        Inbound::Reply(reply) => match pending.lock().remove(&reply.id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => trace!(id = reply.id, "Unsolicited driver reply"),
        },
    }
}

/// Decide how the driver should answer an intercepted request
fn route_command(table: Option<&MockTable>, event: &RouteEvent) -> (&'static str, Value) {
    match table.map(|t| t.route(&event.url)) {
        Some(RouteDecision::Fulfill(response)) => {
            debug!(url = %event.url, method = %event.method, status = response.status, "Fulfilling request from mock");
            let headers: HashMap<&str, &str> = response
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            (
                "fulfill_route",
                json!({
                    "route_id": event.route_id,
                    "status": response.status,
                    "content_type": response.content_type,
                    "headers": headers,
                    "body": BASE64.encode(&response.body),
                }),
            )
        }
        _ => ("continue_route", json!({ "route_id": event.route_id })),
    }
}

async fn log_stderr<R: AsyncRead + Unpin>(stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("driver stderr: {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, MockRule};

    fn table() -> MockTable {
        MockTable::new(vec![MockRule::json(
            "*search-test-results*",
            &json!({ "John Doe": [] }),
        )
        .unwrap()])
    }

    fn event(url: &str) -> RouteEvent {
        RouteEvent {
            event: "route".to_string(),
            route_id: 9,
            url: url.to_string(),
            method: "POST".to_string(),
        }
    }

    #[test]
    fn test_route_command_fulfils_match() {
        let table = table();
        let (method, params) = route_command(
            Some(&table),
            &event("http://127.0.0.1:8080/functions/v1/search-test-results"),
        );
        assert_eq!(method, "fulfill_route");
        assert_eq!(params["route_id"], 9);
        assert_eq!(params["status"], 200);
        assert_eq!(params["content_type"], "application/json");
        let body = BASE64.decode(params["body"].as_str().unwrap()).unwrap();
        assert_eq!(body, br#"{"John Doe":[]}"#.to_vec());
        assert_eq!(table.hits()[0].hits, 1);
    }

    #[test]
    fn test_route_command_continues_otherwise() {
        let table = table();
        let (method, params) = route_command(Some(&table), &event("http://127.0.0.1:8080/app.js"));
        assert_eq!(method, "continue_route");
        assert_eq!(params, json!({ "route_id": 9 }));

        let (method, _) = route_command(None, &event("http://127.0.0.1:8080/app.js"));
        assert_eq!(method, "continue_route");
    }

    #[test]
    fn test_custom_headers_forwarded() {
        let table = MockTable::new(vec![MockRule::glob(
            "*",
            MockResponse::new(503, "text/plain", "down").with_header("Retry-After", "1"),
        )
        .unwrap()]);
        let (_, params) = route_command(Some(&table), &event("http://x/y"));
        assert_eq!(params["status"], 503);
        assert_eq!(params["headers"]["Retry-After"], "1");
    }

    #[test]
    fn test_reply_error_mapping() {
        let closed: Reply = serde_json::from_str(
            r#"{"id":1,"ok":false,"error":{"kind":"closed","message":"Target page has been closed"}}"#,
        )
        .unwrap();
        assert!(matches!(closed.into_result("click"), Err(HarnessError::SessionClosed)));

        let failed: Reply = serde_json::from_str(
            r#"{"id":2,"ok":false,"error":{"kind":"timeout","message":"Timeout 500ms exceeded"}}"#,
        )
        .unwrap();
        match failed.into_result("fill") {
            Err(HarnessError::Driver(msg)) => assert!(msg.starts_with("fill (timeout)")),
            other => panic!("unexpected {:?}", other),
        }

        let ok: Reply = serde_json::from_str(r#"{"id":3,"ok":true,"result":"http://h/"}"#).unwrap();
        assert_eq!(ok.into_result("url").unwrap(), json!("http://h/"));
    }

    #[tokio::test]
    async fn test_read_loop_routes_replies_and_events() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let mocks: MockSlot = Arc::new(Mutex::new(Some(Arc::new(table()))));
        let next_id = Arc::new(AtomicU64::new(100));
        let closed = Arc::new(AtomicBool::new(false));
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        let (tx, rx) = oneshot::channel();
        pending.lock().insert(5, tx);

        let output = concat!(
            "{\"event\":\"route\",\"route_id\":1,\"url\":\"http://h/search-test-results\",\"method\":\"POST\"}\n",
            "not json, just driver chatter\n",
            "{\"id\":5,\"ok\":true,\"result\":{\"matches\":1}}\n",
        );
        read_loop(
            BufReader::new(output.as_bytes()),
            pending.clone(),
            mocks,
            outbound,
            next_id,
            closed.clone(),
        )
        .await;

        let reply = rx.await.unwrap();
        assert_eq!(reply.result["matches"], 1);

        let sent: Value = serde_json::from_str(&outbound_rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent["method"], "fulfill_route");
        assert_eq!(sent["id"], 100);
        assert_eq!(sent["params"]["route_id"], 1);

        assert!(closed.load(Ordering::SeqCst));
        assert!(pending.lock().is_empty());
    }

    #[test]
    fn test_query_reply_decodes_element_state() {
        let state: ElementState = serde_json::from_value(json!({
            "matches": 2, "resolved": true, "visible": true, "enabled": true,
            "editable": false, "text": "Login", "value": null
        }))
        .unwrap();
        assert_eq!(state.matches, 2);
        assert_eq!(state.text.as_deref(), Some("Login"));
        assert_eq!(state.value, None);
    }
}
