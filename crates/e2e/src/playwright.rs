//! Playwright browser automation
//!
//! A single `node` process runs a generated bridge script for the lifetime of
//! the suite. Requests are JSON lines tagged with an id; the reader task hands
//! each reply to the caller waiting on that id. Lines without an id are page
//! diagnostics (console errors, failed or slow requests) and are logged.

use async_trait::async_trait;
use parking_lot::Mutex;
use rudder_common::{Browser, SuiteConfig, Viewport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::driver::{LoadState, PageDriver, SelectOption, WaitState};
use crate::error::{E2eError, E2eResult};

const BRIDGE_SCRIPT: &str = r##"
const readline = require('readline');
const config = JSON.parse(process.argv[2]);
const playwright = require(require.resolve('playwright', { paths: [process.cwd(), __dirname] }));

let browser = null;
const pages = new Map();
let nextPage = 1;

function emit(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function pageOf(args) {
  const entry = pages.get(args.page);
  if (!entry) throw new Error('unknown page ' + args.page);
  return entry.page;
}

function first(args) {
  return pageOf(args).locator(args.selector).first();
}

async function newPage() {
  const options = { viewport: config.viewport, ignoreHTTPSErrors: true };
  if (config.videoDir) options.recordVideo = { dir: config.videoDir, size: config.viewport };
  const context = await browser.newContext(options);
  const page = await context.newPage();
  page.setDefaultTimeout(config.actionTimeoutMs);
  page.setDefaultNavigationTimeout(config.actionTimeoutMs);

  const id = nextPage++;
  const started = new Map();
  page.on('console', m => {
    if (m.type() === 'error' || m.type() === 'warning') {
      emit({ event: 'console', page: id, data: { level: m.type(), text: m.text() } });
    }
  });
  page.on('requestfailed', r => {
    const failure = r.failure();
    emit({ event: 'requestfailed', page: id, data: { method: r.method(), url: r.url(), failure: failure ? failure.errorText : null } });
  });
  page.on('request', r => started.set(r, Date.now()));
  page.on('response', res => {
    const req = res.request();
    const t = started.get(req);
    started.delete(req);
    if (t === undefined || !['xhr', 'fetch'].includes(req.resourceType())) return;
    const ms = Date.now() - t;
    if (ms > config.slowRequestMs) {
      emit({ event: 'slow', page: id, data: { method: req.method(), url: req.url(), status: res.status(), durationMs: ms } });
    }
  });

  pages.set(id, { context, page });
  return { pageId: id };
}

async function closePage(args) {
  const entry = pages.get(args.page);
  if (entry) {
    pages.delete(args.page);
    await entry.context.close();
  }
  return null;
}

async function shutdown() {
  for (const entry of pages.values()) await entry.context.close().catch(() => {});
  pages.clear();
  if (browser) await browser.close();
  browser = null;
  setImmediate(() => process.exit(0));
  return null;
}

const ops = {
  launch: async () => {
    browser = await playwright[config.browser].launch({ headless: config.headless });
    return { version: browser.version() };
  },
  newPage,
  closePage,
  shutdown,
  goto: a => pageOf(a).goto(a.url, { waitUntil: 'domcontentloaded' }).then(() => null),
  waitForLoad: a => pageOf(a).waitForLoadState(a.state),
  url: a => pageOf(a).url(),
  title: a => pageOf(a).title(),
  isVisible: a => first(a).isVisible(),
  isEnabled: a => first(a).isEnabled(),
  isChecked: a => first(a).isChecked(),
  click: a => first(a).click(),
  fill: a => first(a).fill(a.value),
  type: a => {
    const l = first(a);
    return l.pressSequentially ? l.pressSequentially(a.text, { delay: a.delayMs }) : l.type(a.text, { delay: a.delayMs });
  },
  press: a => first(a).press(a.key),
  textContent: a => first(a).textContent(),
  inputValue: a => first(a).inputValue(),
  attribute: a => first(a).getAttribute(a.name),
  selectOption: a => first(a).selectOption(a.option).then(() => null),
  waitForSelector: a => pageOf(a).waitForSelector(a.selector, { state: a.state, timeout: a.timeoutMs }).then(() => null),
  waitForUrl: a => pageOf(a).waitForURL(a.pattern, { timeout: a.timeoutMs }),
  screenshot: a => pageOf(a).screenshot({ path: a.path, fullPage: a.fullPage }).then(() => null),
  evaluate: a => pageOf(a).evaluate(([src, arg]) => eval('(' + src + ')')(arg), [a.script, a.arg]),
  reload: a => pageOf(a).reload().then(() => null),
  goBack: a => pageOf(a).goBack().then(() => null),
  goForward: a => pageOf(a).goForward().then(() => null),
};

readline.createInterface({ input: process.stdin })
  .on('line', async line => {
    let msg;
    try {
      msg = JSON.parse(line);
    } catch (e) {
      emit({ event: 'protocol', data: { error: 'bad request: ' + e.message } });
      return;
    }
    const op = ops[msg.op];
    if (!op) {
      emit({ id: msg.id, ok: false, error: 'unknown op ' + msg.op });
      return;
    }
    try {
      const result = await op(msg.args || {});
      emit({ id: msg.id, ok: true, result: result === undefined ? null : result });
    } catch (e) {
      emit({ id: msg.id, ok: false, error: e.message });
    }
  })
  .on('close', async () => {
    if (browser) await browser.close().catch(() => {});
    process.exit(0);
  });
"##;

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// Default timeout for every page action and navigation
    pub action_timeout: Duration,
    /// Extra time a request may take beyond its own timeout before the bridge gives up on it
    pub request_slack: Duration,
    /// XHR/fetch responses slower than this are logged
    pub slow_request_threshold: Duration,
    pub video_dir: Option<PathBuf>,
    /// Where `node` runs; `playwright` is resolved from here
    pub working_dir: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            action_timeout: Duration::from_secs(30),
            request_slack: Duration::from_secs(5),
            slow_request_threshold: Duration::from_secs(5),
            video_dir: None,
            working_dir: PathBuf::from("."),
        }
    }
}

impl PlaywrightConfig {
    pub fn from_suite(config: &SuiteConfig) -> Self {
        let record_video = config.artifacts.videos || config.is_ci();
        Self {
            browser: config.browser,
            headless: config.headless,
            viewport: config.viewport,
            action_timeout: config.action_timeout,
            video_dir: record_video.then(|| config.video_dir()),
            ..Default::default()
        }
    }

    /// Settings handed to the bridge script on its command line
    fn to_wire(&self) -> Value {
        json!({
            "browser": self.browser.as_str(),
            "headless": self.headless,
            "viewport": { "width": self.viewport.width, "height": self.viewport.height },
            "actionTimeoutMs": self.action_timeout.as_millis() as u64,
            "slowRequestMs": self.slow_request_threshold.as_millis() as u64,
            "videoDir": self.video_dir.as_ref().map(|p| p.display().to_string()),
        })
    }
}

/// Line written by the bridge
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum BridgeMessage {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        event: String,
        #[serde(default)]
        page: Option<u64>,
        #[serde(default)]
        data: Value,
    },
}

#[derive(Debug)]
enum Reply {
    Ok(Value),
    Failed(String),
    Closed(String),
}

/// State shared between callers and the stdout reader
#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    closed: AtomicBool,
}

impl Shared {
    fn register(&self, id: u64) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        rx
    }

    fn forget(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    fn dispatch(&self, line: &str) {
        let message = match serde_json::from_str::<BridgeMessage>(line) {
            Ok(message) => message,
            Err(_) => {
                debug!("[bridge] {}", line);
                return;
            }
        };

        match message {
            BridgeMessage::Reply {
                id,
                ok,
                result,
                error,
            } => {
                let reply = if ok {
                    Reply::Ok(result)
                } else {
                    Reply::Failed(error.unwrap_or_else(|| "unknown error".to_string()))
                };
                match self.pending.lock().remove(&id) {
                    // The caller may have timed out and gone away.
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!("Dropping reply for abandoned request {}", id),
                }
            }
            BridgeMessage::Event { event, page, data } => log_page_event(&event, page, &data),
        }
    }

    fn close(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, tx) in self.pending.lock().drain() {
            let _ = tx.send(Reply::Closed(reason.to_string()));
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn log_page_event(event: &str, page: Option<u64>, data: &Value) {
    let page = page.unwrap_or_default();
    let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    match event {
        "console" if text("level") == "error" => {
            warn!(page, "Console error: {}", text("text"))
        }
        "console" => warn!(page, "Console warning: {}", text("text")),
        "requestfailed" => warn!(
            page,
            "Request failed: {} {} - {}",
            text("method"),
            text("url"),
            text("failure")
        ),
        "slow" => {
            let ms = data
                .get("durationMs")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or_default();
            warn!(page, "Slow request: {} {} took {}ms", text("method"), text("url"), ms)
        }
        other => debug!(page, "Bridge event {}: {}", other, data),
    }
}

async fn pump_stdout(stdout: ChildStdout, shared: Arc<Shared>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => shared.dispatch(&line),
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading bridge output: {}", e);
                break;
            }
        }
    }
    shared.close("bridge process exited");
}

async fn pump_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[node] {}", line);
    }
}

/// Connection to the bridge process
struct Bridge {
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Option<Child>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    slack: Duration,
    // Keeps the script alive until the process is gone.
    _script_dir: TempDir,
}

impl Bridge {
    async fn call(&self, op: &str, args: Value, timeout: Duration) -> E2eResult<Value> {
        if self.shared.is_closed() {
            return Err(E2eError::BridgeClosed(format!("cannot send {}", op)));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let rx = self.shared.register(id);
        let mut line = serde_json::to_string(&json!({ "id": id, "op": op, "args": args }))?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                self.shared.forget(id);
                return Err(E2eError::BridgeClosed(format!("{}: {}", op, e)));
            }
        }

        match tokio::time::timeout(timeout + self.slack, rx).await {
            Ok(Ok(Reply::Ok(value))) => Ok(value),
            Ok(Ok(Reply::Failed(message))) => Err(E2eError::Playwright(format!("{}: {}", op, message))),
            Ok(Ok(Reply::Closed(reason))) => Err(E2eError::BridgeClosed(reason)),
            Ok(Err(_)) => Err(E2eError::BridgeClosed(format!("{} abandoned", op))),
            Err(_) => {
                self.shared.forget(id);
                Err(E2eError::Timeout(format!(
                    "browser {} after {:?}",
                    op,
                    timeout + self.slack
                )))
            }
        }
    }

    async fn stop(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        if let Ok(Ok(status)) = tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            debug!("Bridge exited with {}", status);
            return;
        }

        // Graceful first, then force
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), child.wait())
                        .await
                        .is_ok()
                {
                    return;
                }
            }
        }

        warn!("Bridge did not exit, killing it");
        let _ = child.kill().await;
    }
}

/// Browser shared by every scenario of a run
pub struct PlaywrightBrowser {
    bridge: Arc<Bridge>,
    config: PlaywrightConfig,
    version: String,
}

impl PlaywrightBrowser {
    /// Start node, load Playwright and launch the configured browser
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed().await?;

        if let Some(dir) = &config.video_dir {
            std::fs::create_dir_all(dir)?;
        }

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .arg(config.to_wire().to_string())
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_stderr(stderr));
        }

        let shared = Arc::new(Shared::default());
        tokio::spawn(pump_stdout(stdout, shared.clone()));

        let bridge = Arc::new(Bridge {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(Some(child)),
            shared,
            next_id: AtomicU64::new(1),
            slack: config.request_slack,
            _script_dir: script_dir,
        });

        // Browser download on first launch can be slow.
        let launched = bridge
            .call("launch", json!({}), config.action_timeout * 2)
            .await;
        let launched = match launched {
            Ok(value) => value,
            Err(e) => {
                bridge.stop().await;
                return Err(e);
            }
        };
        let version = launched
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        info!(
            browser = %config.browser,
            headless = config.headless,
            "Browser launched (version {})",
            version
        );

        Ok(Self {
            bridge,
            config,
            version,
        })
    }

    async fn check_playwright_installed() -> E2eResult<()> {
        let status = TokioCommand::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Open a page in a fresh browser context
    pub async fn new_page(&self) -> E2eResult<PlaywrightPage> {
        let created = self
            .bridge
            .call("newPage", json!({}), self.config.action_timeout)
            .await?;
        let id = created
            .get("pageId")
            .and_then(Value::as_u64)
            .ok_or_else(|| E2eError::Playwright("newPage returned no page id".to_string()))?;

        debug!("Opened page {}", id);
        Ok(PlaywrightPage {
            bridge: self.bridge.clone(),
            id,
            action_timeout: self.config.action_timeout,
        })
    }

    /// Close every context and the browser, then reap the process
    pub async fn close(&self) -> E2eResult<()> {
        info!("Closing browser");
        let result = if self.bridge.shared.is_closed() {
            Ok(())
        } else {
            self.bridge
                .call("shutdown", json!({}), self.config.action_timeout)
                .await
                .map(|_| ())
        };
        self.bridge.stop().await;

        match result {
            // The bridge exits right after acknowledging.
            Err(E2eError::BridgeClosed(_)) => Ok(()),
            other => other,
        }
    }
}

/// One browser tab with its own context
pub struct PlaywrightPage {
    bridge: Arc<Bridge>,
    id: u64,
    action_timeout: Duration,
}

impl PlaywrightPage {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn args(&self, mut extra: Value) -> Value {
        if let Some(map) = extra.as_object_mut() {
            map.insert("page".to_string(), json!(self.id));
        }
        extra
    }

    async fn call(&self, op: &str, extra: Value) -> E2eResult<Value> {
        self.bridge
            .call(op, self.args(extra), self.action_timeout)
            .await
    }

    async fn call_within(&self, op: &str, extra: Value, timeout: Duration) -> E2eResult<Value> {
        self.bridge.call(op, self.args(extra), timeout).await
    }

    async fn query<T: DeserializeOwned>(&self, op: &str, extra: Value) -> E2eResult<T> {
        let value = self.call(op, extra).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl PageDriver for PlaywrightPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.call("goto", json!({ "url": url })).await.map(|_| ())
    }

    async fn wait_for_load(&self, state: LoadState) -> E2eResult<()> {
        self.call("waitForLoad", json!({ "state": state.as_str() }))
            .await
            .map(|_| ())
    }

    async fn url(&self) -> E2eResult<String> {
        self.query("url", json!({})).await
    }

    async fn title(&self) -> E2eResult<String> {
        self.query("title", json!({})).await
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        self.query("isVisible", json!({ "selector": selector })).await
    }

    async fn is_enabled(&self, selector: &str) -> E2eResult<bool> {
        self.query("isEnabled", json!({ "selector": selector })).await
    }

    async fn is_checked(&self, selector: &str) -> E2eResult<bool> {
        self.query("isChecked", json!({ "selector": selector })).await
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.call("click", json!({ "selector": selector }))
            .await
            .map(|_| ())
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.call("fill", json!({ "selector": selector, "value": value }))
            .await
            .map(|_| ())
    }

    async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> E2eResult<()> {
        let typing = delay * text.chars().count() as u32;
        self.call_within(
            "type",
            json!({ "selector": selector, "text": text, "delayMs": delay.as_millis() as u64 }),
            self.action_timeout + typing,
        )
        .await
        .map(|_| ())
    }

    async fn press(&self, selector: &str, key: &str) -> E2eResult<()> {
        self.call("press", json!({ "selector": selector, "key": key }))
            .await
            .map(|_| ())
    }

    async fn text_content(&self, selector: &str) -> E2eResult<Option<String>> {
        self.query("textContent", json!({ "selector": selector })).await
    }

    async fn input_value(&self, selector: &str) -> E2eResult<String> {
        self.query("inputValue", json!({ "selector": selector })).await
    }

    async fn attribute(&self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        self.query("attribute", json!({ "selector": selector, "name": name }))
            .await
    }

    async fn select_option(&self, selector: &str, option: &SelectOption) -> E2eResult<()> {
        self.call(
            "selectOption",
            json!({ "selector": selector, "option": option }),
        )
        .await
        .map(|_| ())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        self.call_within(
            "waitForSelector",
            json!({
                "selector": selector,
                "state": state.as_str(),
                "timeoutMs": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> E2eResult<()> {
        self.call_within(
            "waitForUrl",
            json!({ "pattern": pattern, "timeoutMs": timeout.as_millis() as u64 }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.call(
            "screenshot",
            json!({ "path": path.display().to_string(), "fullPage": full_page }),
        )
        .await
        .map(|_| ())
    }

    async fn evaluate(&self, script: &str, arg: Value) -> E2eResult<Value> {
        self.call("evaluate", json!({ "script": script, "arg": arg }))
            .await
    }

    async fn reload(&self) -> E2eResult<()> {
        self.call("reload", json!({})).await.map(|_| ())
    }

    async fn go_back(&self) -> E2eResult<()> {
        self.call("goBack", json!({})).await.map(|_| ())
    }

    async fn go_forward(&self) -> E2eResult<()> {
        self.call("goForward", json!({})).await.map(|_| ())
    }

    async fn close(&self) -> E2eResult<()> {
        debug!("Closing page {}", self.id);
        self.call("closePage", json!({})).await.map(|_| ())
    }
}
