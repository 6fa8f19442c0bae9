// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! W3C WebDriver client for driving a headless Firefox via geckodriver.
//!
//! Only the handful of endpoints the export workflow needs are implemented.
//!
//! # Example
//!
//! ```no_run
//! use pma_backup::agent::{UiAgent, WebDriverConfig, WebDriverSession};
//! use std::time::Duration;
//!
//! let config = WebDriverConfig::default();
//! let mut session = WebDriverSession::start(&config, "/backups".as_ref(), Duration::from_secs(10))?;
//! session.navigate("https://example.com/phpmyadmin/")?;
//! session.quit()?;
//! # Ok::<(), pma_backup::BackupError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AgentLauncher, ElementHandle, Locator, UiAgent};
use crate::error::{BackupError, BackupResult};
use crate::types::ExportRequest;
use crate::utils::redact_url_credentials;

/// Default geckodriver endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// Key under which W3C WebDriver serializes element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Timeout for establishing the HTTP connection (in seconds).
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Extra time granted to a command on top of the implicit element wait.
const COMMAND_GRACE_SECS: u64 = 120;

/// MIME types Firefox saves without asking.
const SAVE_TO_DISK_TYPES: &str = "application/sql,application/x-sql,text/x-sql,text/plain,\
application/gzip,application/x-gzip,application/zip,application/x-zip-compressed,application/octet-stream";

/// Connection settings for the WebDriver server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDriverConfig {
    /// Base URL of the WebDriver server.
    pub endpoint: String,
    /// Run the browser without a window.
    pub headless: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
        }
    }
}

impl WebDriverConfig {
    /// New-session capabilities for Firefox downloading into `download_dir`.
    pub fn capabilities(&self, download_dir: &Path) -> Value {
        let args: Vec<&str> = if self.headless { vec!["-headless"] } else { vec![] };
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "firefox",
                    "acceptInsecureCerts": true,
                    "moz:firefoxOptions": {
                        "args": args,
                        "prefs": {
                            "browser.download.folderList": 2,
                            "browser.download.manager.showWhenStarting": false,
                            "browser.download.dir": download_dir.to_string_lossy(),
                            "browser.download.useDownloadDir": true,
                            "browser.helperApps.neverAsk.saveToDisk": SAVE_TO_DISK_TYPES,
                        }
                    }
                }
            }
        })
    }
}

/// Launches one WebDriver session per run.
#[derive(Debug, Clone, Default)]
pub struct WebDriverLauncher {
    config: WebDriverConfig,
}

impl WebDriverLauncher {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

impl AgentLauncher for WebDriverLauncher {
    type Agent = WebDriverSession;

    fn launch(&self, download_dir: &Path, request: &ExportRequest) -> BackupResult<WebDriverSession> {
        WebDriverSession::start(&self.config, download_dir, request.timeout)
    }
}

/// Envelope of every WebDriver response.
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

/// Error payload inside `value` on failed commands.
#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// An open browser session.
#[derive(Debug)]
pub struct WebDriverSession {
    base_url: String,
    session_id: String,
    client: reqwest::blocking::Client,
    command_timeout: Duration,
}

impl WebDriverSession {
    /// Create a session and set the implicit element wait.
    pub fn start(config: &WebDriverConfig, download_dir: &Path, implicit_wait: Duration) -> BackupResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackupError::Agent(format!("cannot create HTTP client: {}", e)))?;

        let base_url = config.endpoint.trim_end_matches('/').to_string();
        let command_timeout = implicit_wait + Duration::from_secs(COMMAND_GRACE_SECS);

        let value = send(
            &client,
            Method::POST,
            &format!("{}/session", base_url),
            Some(config.capabilities(download_dir)),
            command_timeout,
        )?;
        let created: NewSession = serde_json::from_value(value)
            .map_err(|e| BackupError::Agent(format!("unexpected new session response: {}", e)))?;

        tracing::info!("Started browser session {}", created.session_id);

        let session = Self {
            base_url,
            session_id: created.session_id,
            client,
            command_timeout,
        };
        session.command(
            Method::POST,
            "timeouts",
            Some(json!({ "implicit": implicit_wait.as_millis() as u64 })),
        )?;
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> BackupResult<Value> {
        let url = if path.is_empty() {
            format!("{}/session/{}", self.base_url, self.session_id)
        } else {
            format!("{}/session/{}/{}", self.base_url, self.session_id, path)
        };
        send(&self.client, method, &url, body, self.command_timeout)
    }

    fn element_ref(element: &ElementHandle) -> Value {
        json!({ ELEMENT_KEY: element.id })
    }
}

fn send(
    client: &reqwest::blocking::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    timeout: Duration,
) -> BackupResult<Value> {
    tracing::debug!("WebDriver {} {}", method, url);

    let mut request = client.request(method, url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().map_err(|e| {
        if e.is_connect() {
            BackupError::Agent(format!(
                "cannot connect to WebDriver at {}. Is geckodriver running?",
                url
            ))
        } else if e.is_timeout() {
            BackupError::Agent(format!("WebDriver command timed out: {}", url))
        } else {
            BackupError::Agent(e.to_string())
        }
    })?;

    let status = response.status();
    let text = response
        .text()
        .map_err(|e| BackupError::Agent(format!("failed to read WebDriver response: {}", e)))?;
    let wire: WireResponse = serde_json::from_str(&text).map_err(|e| {
        BackupError::Agent(format!("invalid WebDriver response (HTTP {}): {}", status, e))
    })?;

    if status.is_success() {
        return Ok(wire.value);
    }

    match serde_json::from_value::<WireError>(wire.value) {
        Ok(err) => Err(BackupError::Agent(format!("{}: {}", err.error, err.message))),
        Err(_) => Err(BackupError::Agent(format!("WebDriver returned HTTP {}", status))),
    }
}

impl UiAgent for WebDriverSession {
    fn navigate(&mut self, url: &str) -> BackupResult<()> {
        tracing::debug!("Navigating to {}", redact_url_credentials(url));
        self.command(Method::POST, "url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn current_url(&mut self) -> BackupResult<String> {
        let value = self.command(Method::GET, "url", None)?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| BackupError::Agent("current URL is not a string".to_string()))
    }

    fn find_element(&mut self, locator: &Locator) -> BackupResult<ElementHandle> {
        let body = json!({ "using": "css selector", "value": locator.to_css() });
        let value = self.command(Method::POST, "element", Some(body)).map_err(|e| match e {
            BackupError::Agent(msg) if msg.starts_with("no such element") => {
                BackupError::ElementNotFound {
                    selector: locator.to_string(),
                }
            }
            other => other,
        })?;

        let id = value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| BackupError::Agent(format!("no element reference for {}", locator)))?;
        Ok(ElementHandle::new(id, locator.clone()))
    }

    fn set_value(&mut self, element: &ElementHandle, text: &str) -> BackupResult<()> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.id),
            Some(json!({ "text": text })),
        )?;
        Ok(())
    }

    fn click(&mut self, element: &ElementHandle) -> BackupResult<()> {
        self.command(Method::POST, &format!("element/{}/click", element.id), Some(json!({})))?;
        Ok(())
    }

    fn get_attribute(&mut self, element: &ElementHandle, name: &str) -> BackupResult<Option<String>> {
        let value = self.command(
            Method::GET,
            &format!("element/{}/attribute/{}", element.id, name),
            None,
        )?;
        Ok(value.as_str().map(String::from))
    }

    fn switch_to_frame(&mut self, element: &ElementHandle) -> BackupResult<()> {
        let body = json!({ "id": Self::element_ref(element) });
        self.command(Method::POST, "frame", Some(body))?;
        Ok(())
    }

    fn run_script(&mut self, script: &str, args: &[&ElementHandle]) -> BackupResult<Value> {
        let args: Vec<Value> = args.iter().map(|e| Self::element_ref(e)).collect();
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
    }

    fn page_source(&mut self) -> BackupResult<String> {
        let value = self.command(Method::GET, "source", None)?;
        Ok(value.as_str().map(String::from).unwrap_or_default())
    }

    fn quit(&mut self) -> BackupResult<()> {
        tracing::info!("Closing browser session {}", self.session_id);
        self.command(Method::DELETE, "", None)?;
        Ok(())
    }
}
