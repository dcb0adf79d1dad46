//! Playwright browser automation
//!
//! A single Node.js process hosts the browser for the whole run. Commands
//! are written to its stdin as JSON lines and each one is answered by one
//! JSON line on stdout, so the page and its session survive between steps.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::driver::BrowserDriver;
use crate::error::{E2eError, E2eResult};

/// Extra time allowed on top of a command's own timeout before the bridge
/// is considered unresponsive.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

let browser = null;
let page = null;

async function handle(req) {
  switch (req.cmd) {
    case 'launch': {
      browser = await playwright[req.browser].launch({ headless: req.headless });
      const context = await browser.newContext({
        viewport: { width: req.width, height: req.height }
      });
      page = await context.newPage();
      return null;
    }
    case 'goto':
      await page.goto(req.url, { timeout: req.timeout_ms });
      return null;
    case 'click':
      await page.click(req.selector, { timeout: req.timeout_ms });
      return null;
    case 'type':
      await page.type(req.selector, req.text, { timeout: req.timeout_ms });
      return null;
    case 'wait_for_selector':
      await page.waitForSelector(req.selector, { timeout: req.timeout_ms });
      return null;
    case 'inner_text':
      return await page.innerText(req.selector, { timeout: req.timeout_ms });
    case 'screenshot':
      await page.screenshot({ path: req.path, fullPage: req.full_page });
      return null;
    case 'read_global':
      return await page.evaluate((name) => {
        const value = window[name];
        return value === undefined ? null : value;
      }, req.name);
    case 'close':
      if (browser) await browser.close();
      return null;
    default:
      throw new Error('unknown command: ' + req.cmd);
  }
}

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

const rl = readline.createInterface({ input: process.stdin });
// Requests run concurrently: a command abandoned by the driver must not
// hold up the ones sent after it. Replies are matched by id.
rl.on('line', async (line) => {
  let req;
  try {
    req = JSON.parse(line);
  } catch (error) {
    reply({ id: 0, ok: false, error: 'bad request: ' + error.message });
    return;
  }
  try {
    const value = await handle(req);
    reply({ id: req.id, ok: true, value: value === undefined ? null : value });
  } catch (error) {
    reply({ id: req.id, ok: false, error: error.message });
  }
  if (req.cmd === 'close') process.exit(0);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Launch {
        browser: &'static str,
        headless: bool,
        width: u32,
        height: u32,
    },
    Goto {
        url: &'a str,
        timeout_ms: u64,
    },
    Click {
        selector: &'a str,
        timeout_ms: u64,
    },
    Type {
        selector: &'a str,
        text: &'a str,
        timeout_ms: u64,
    },
    WaitForSelector {
        selector: &'a str,
        timeout_ms: u64,
    },
    InnerText {
        selector: &'a str,
        timeout_ms: u64,
    },
    Screenshot {
        path: String,
        full_page: bool,
    },
    ReadGlobal {
        name: &'a str,
    },
    Close,
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

struct BridgeSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Persistent Playwright browser session
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
    session: Mutex<BridgeSession>,
    // Holds the bridge script for the lifetime of the node process
    _workdir: TempDir,
}

impl PlaywrightDriver {
    /// Start node with the bridge script and open a page
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed().await?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(modules) = &config.node_modules {
            cmd.env("NODE_PATH", modules);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn node: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("node stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("node stdout unavailable".to_string()))?;

        let driver = Self {
            session: Mutex::new(BridgeSession {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
            _workdir: workdir,
            config,
        };

        driver
            .request(
                BridgeCommand::Launch {
                    browser: driver.config.browser.as_str(),
                    headless: driver.config.headless,
                    width: driver.config.viewport_width,
                    height: driver.config.viewport_height,
                },
                driver.config.launch_timeout,
            )
            .await?;

        info!(
            "Launched {} ({}x{}, headless: {})",
            driver.config.browser.as_str(),
            driver.config.viewport_width,
            driver.config.viewport_height,
            driver.config.headless
        );
        Ok(driver)
    }

    /// Check if Playwright is installed
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

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    fn action_timeout_ms(&self) -> u64 {
        self.config.action_timeout.as_millis() as u64
    }

    async fn request(&self, command: BridgeCommand<'_>, timeout: Duration) -> E2eResult<serde_json::Value> {
        let mut session = self.session.lock().await;
        session.next_id += 1;
        let id = session.next_id;

        let mut line = serde_json::to_string(&BridgeRequest { id, command })?;
        line.push('\n');
        session.stdin.write_all(line.as_bytes()).await?;
        session.stdin.flush().await?;

        let response = tokio::time::timeout(timeout + RESPONSE_GRACE, read_response(&mut session.stdout, id))
            .await
            .map_err(|_| E2eError::Timeout(format!("playwright response to request {}", id)))??;

        if response.ok {
            Ok(response.value)
        } else {
            Err(E2eError::Driver(
                response.error.unwrap_or_else(|| "unknown playwright error".to_string()),
            ))
        }
    }
}

async fn read_response(
    stdout: &mut Lines<BufReader<ChildStdout>>,
    id: u64,
) -> E2eResult<BridgeResponse> {
    loop {
        let Some(line) = stdout.next_line().await? else {
            return Err(E2eError::Playwright("bridge process exited".to_string()));
        };

        match serde_json::from_str::<BridgeResponse>(&line) {
            Ok(resp) if resp.id == id => return Ok(resp),
            Ok(resp) => warn!("Discarding stale playwright response {}", resp.id),
            Err(_) => debug!("[node] {}", line),
        }
    }
}

/// Resolve `url` against `base_url` unless it is already absolute
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        let url = resolve_url(&self.config.base_url, url);
        let timeout = self.config.navigation_timeout;
        self.request(
            BridgeCommand::Goto {
                url: &url,
                timeout_ms: timeout.as_millis() as u64,
            },
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.request(
            BridgeCommand::Click {
                selector,
                timeout_ms: self.action_timeout_ms(),
            },
            self.config.action_timeout,
        )
        .await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> E2eResult<()> {
        self.request(
            BridgeCommand::Type {
                selector,
                text,
                timeout_ms: self.action_timeout_ms(),
            },
            self.config.action_timeout,
        )
        .await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.request(
            BridgeCommand::WaitForSelector {
                selector,
                timeout_ms: timeout.as_millis() as u64,
            },
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn inner_text(&self, selector: &str) -> E2eResult<String> {
        let value = self
            .request(
                BridgeCommand::InnerText {
                    selector,
                    timeout_ms: self.action_timeout_ms(),
                },
                self.config.action_timeout,
            )
            .await?;

        match value {
            serde_json::Value::String(text) => Ok(text),
            serde_json::Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()> {
        self.request(
            BridgeCommand::Screenshot {
                path: path.to_string_lossy().to_string(),
                full_page,
            },
            self.config.action_timeout,
        )
        .await?;
        Ok(())
    }

    async fn read_global(&self, name: &str) -> E2eResult<Option<serde_json::Value>> {
        let value = self
            .request(BridgeCommand::ReadGlobal { name }, self.config.action_timeout)
            .await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn close(&self) -> E2eResult<()> {
        self.request(BridgeCommand::Close, self.config.action_timeout).await?;

        let mut session = self.session.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), session.child.wait()).await {
            Ok(status) => debug!("Playwright bridge exited: {:?}", status?),
            Err(_) => {
                warn!("Playwright bridge did not exit; killing it");
                session.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Default timeout for clicks, typing and reads
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
    pub launch_timeout: Duration,
    /// `NODE_PATH` for resolving the `playwright` package
    pub node_modules: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            action_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(60),
            node_modules: Some(PathBuf::from("node_modules")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("http://127.0.0.1:4000/", "/home"),
            "http://127.0.0.1:4000/home"
        );
        assert_eq!(
            resolve_url("http://127.0.0.1:4000", "project/abc"),
            "http://127.0.0.1:4000/project/abc"
        );
        assert_eq!(
            resolve_url("http://127.0.0.1:4000", "https://example.com/x"),
            "https://example.com/x"
        );
    }

    #[test]
    fn test_bridge_request_wire_format() {
        let req = BridgeRequest {
            id: 7,
            command: BridgeCommand::WaitForSelector {
                selector: "#feed",
                timeout_ms: 500,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 7, "cmd": "wait_for_selector", "selector": "#feed", "timeout_ms": 500})
        );

        let close = serde_json::to_value(BridgeRequest {
            id: 8,
            command: BridgeCommand::Close,
        })
        .unwrap();
        assert_eq!(close, serde_json::json!({"id": 8, "cmd": "close"}));
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("lynx".parse::<Browser>().is_err());
    }
}
