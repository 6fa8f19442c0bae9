// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session driver: login, layout detection, export configuration and
//! download trigger, as an explicit state machine.
//!
//! ```text
//! Start ──▶ LoginSubmitted ──▶ VariantDetected(v) ──▶ ExportConfigured(v) ──▶ Triggered
//!                 │
//!                 └─ markers absent ──▶ AuthenticationFailure
//! ```
//!
//! Transitions only move forward. Any failure ends the session with the
//! error of the step that failed; nothing is retried.

use std::fmt;
use std::thread;
use std::time::SystemTime;

use url::Url;

use crate::agent::{ElementHandle, Locator, UiAgent};
use crate::error::{BackupError, BackupResult};
use crate::types::{ExportRequest, FrameMode, UiVariant};
use crate::utils::{embed_basic_auth, mask_sensitive, redact_url_credentials};

const USERNAME_FIELD: &str = "input_username";
const PASSWORD_FIELD: &str = "input_password";
const SERVER_FIELD: &str = "input_servername";
const LOGIN_SUBMIT: &str = "input_go";

/// Id of the content frame in the legacy layout; also a login marker.
pub const FRAME_MARKER: &str = "frame_content";
/// Only present once logged in.
pub const EXPORT_PAGE_MARKER: &str = "server_export.php";

const EXPORT_TAB: &str = ".tab[href='server_export.php']";
const CUSTOM_EXPORT: &str = "radio_custom_export";
const COMPRESSION_SELECT: &str = "compression";
const EXPORT_GO: &str = "buttonGo";

/// Keeps the button from hiding behind the console's footer panel.
const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView();";

/// Where the driver currently is in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing done yet
    Start,
    /// Login form submitted
    LoginSubmitted,
    /// Logged in, layout known, context switched if needed
    VariantDetected(UiVariant),
    /// Export tab open with exclusions and compression set
    ExportConfigured(UiVariant),
    /// Download started, or skipped on a dry run
    Triggered { activated: bool },
}

impl SessionState {
    fn rank(&self) -> u8 {
        match self {
            SessionState::Start => 0,
            SessionState::LoginSubmitted => 1,
            SessionState::VariantDetected(_) => 2,
            SessionState::ExportConfigured(_) => 3,
            SessionState::Triggered { .. } => 4,
        }
    }

    /// Returns true once the session has nothing left to do.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Triggered { .. })
    }

    /// Human-readable progress message.
    pub fn message(&self) -> String {
        match self {
            SessionState::Start => "Opening login page...".to_string(),
            SessionState::LoginSubmitted => "Logging in...".to_string(),
            SessionState::VariantDetected(v) => format!("Logged in, {} layout", v),
            SessionState::ExportConfigured(_) => "Export configured".to_string(),
            SessionState::Triggered { activated: true } => "Export started".to_string(),
            SessionState::Triggered { activated: false } => "Dry run, export not started".to_string(),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Start => write!(f, "START"),
            SessionState::LoginSubmitted => write!(f, "LOGIN_SUBMITTED"),
            SessionState::VariantDetected(_) => write!(f, "VARIANT_DETECTED"),
            SessionState::ExportConfigured(_) => write!(f, "EXPORT_CONFIGURED"),
            SessionState::Triggered { .. } => write!(f, "TRIGGERED"),
        }
    }
}

/// What a finished session reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub variant: UiVariant,
    /// False on a dry run.
    pub activated: bool,
    /// Moment just before the download control was clicked.
    pub triggered_at: Option<SystemTime>,
}

impl UiVariant {
    /// Decide the layout from the logged-in page's markup.
    pub fn detect(markup: &str) -> Self {
        if markup.contains(FRAME_MARKER) {
            UiVariant::Legacy
        } else {
            UiVariant::Modern
        }
    }

    /// Make the export UI reachable in the agent's current context.
    fn enter<A: UiAgent + ?Sized>(self, agent: &mut A, mode: FrameMode) -> BackupResult<()> {
        match self {
            UiVariant::Modern => Ok(()),
            UiVariant::Legacy => {
                let frame = agent.find_element(&Locator::id(FRAME_MARKER))?;
                match mode {
                    FrameMode::Switch => agent.switch_to_frame(&frame),
                    FrameMode::FollowSrc => {
                        let src = agent.get_attribute(&frame, "src")?.ok_or_else(|| {
                            BackupError::ElementNotFound {
                                selector: format!("#{}[src]", FRAME_MARKER),
                            }
                        })?;
                        // Relative to the document the frame lives in, which may
                        // differ from the login URL after redirects.
                        let base = agent.current_url()?;
                        agent.navigate(&resolve_frame_url(&base, &src)?)
                    }
                }
            }
        }
    }
}

/// Markup shows one of the logged-in markers.
pub fn is_login_successful(markup: &str) -> bool {
    markup.contains(FRAME_MARKER) || markup.contains(EXPORT_PAGE_MARKER)
}

/// Selector of a database entry in the export's database list.
pub fn db_option_locator(db: &str) -> Locator {
    let escaped = db.replace('\\', "\\\\").replace('\'', "\\'");
    Locator::css(format!("#db_select>option[value='{}']", escaped))
}

/// Absolute URL for a frame `src` that may be relative to `base`.
pub fn resolve_frame_url(base: &str, src: &str) -> BackupResult<String> {
    Url::parse(base)
        .and_then(|base| base.join(src))
        .map(String::from)
        .map_err(|e| BackupError::Agent(format!("cannot resolve frame URL '{}' against '{}': {}", src, base, e)))
}

/// Drives one [`UiAgent`] through the export workflow.
pub struct SessionDriver<'a, A: UiAgent + ?Sized> {
    agent: &'a mut A,
    request: &'a ExportRequest,
    state: SessionState,
    observer: Option<&'a mut dyn FnMut(&SessionState)>,
}

impl<'a, A: UiAgent + ?Sized> SessionDriver<'a, A> {
    pub fn new(agent: &'a mut A, request: &'a ExportRequest) -> Self {
        Self {
            agent,
            request,
            state: SessionState::Start,
            observer: None,
        }
    }

    /// Call `observer` on every state change.
    pub fn with_observer(mut self, observer: &'a mut dyn FnMut(&SessionState)) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run every step up to `Triggered`.
    pub fn run(mut self) -> BackupResult<SessionReport> {
        self.login()?;
        let variant = self.detect_variant()?;
        self.configure_export(variant)?;
        self.trigger(variant)
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next.rank() > self.state.rank(), "{} -> {}", self.state, next);
        tracing::info!("Session {} -> {}", self.state, next);
        self.state = next;
        if let Some(observer) = self.observer.as_deref_mut() {
            observer(&next);
        }
    }

    fn find(&mut self, locator: Locator) -> BackupResult<ElementHandle> {
        self.agent.find_element(&locator)
    }

    /// Start → LoginSubmitted
    fn login(&mut self) -> BackupResult<()> {
        let request = self.request;
        let url = match &request.http_auth {
            Some(auth) => embed_basic_auth(&request.url, auth)?,
            None => request.url.clone(),
        };
        tracing::info!("Opening {}", redact_url_credentials(&url));
        self.agent.navigate(&url)?;

        let username = self.find(Locator::id(USERNAME_FIELD))?;
        let password = self.find(Locator::id(PASSWORD_FIELD))?;
        let server = match &request.server_name {
            Some(_) => Some(self.find(Locator::id(SERVER_FIELD))?),
            None => None,
        };
        let submit = self.find(Locator::id(LOGIN_SUBMIT))?;

        tracing::debug!("Logging in as {}", mask_sensitive(request.user(), 2));
        self.agent.set_value(&username, &request.credentials.user)?;
        self.agent.set_value(&password, &request.credentials.password)?;
        if let (Some(field), Some(name)) = (&server, &request.server_name) {
            self.agent.set_value(field, name)?;
        }
        self.agent.click(&submit)?;

        self.advance(SessionState::LoginSubmitted);
        Ok(())
    }

    /// LoginSubmitted → VariantDetected
    fn detect_variant(&mut self) -> BackupResult<UiVariant> {
        let markup = self.agent.page_source()?;
        if !is_login_successful(&markup) {
            tracing::error!("Login markers absent after submitting credentials");
            return Err(BackupError::AuthenticationFailure);
        }

        let variant = UiVariant::detect(&markup);
        variant.enter(&mut *self.agent, self.request.frame_mode)?;

        self.advance(SessionState::VariantDetected(variant));
        Ok(variant)
    }

    /// VariantDetected → ExportConfigured
    fn configure_export(&mut self, variant: UiVariant) -> BackupResult<()> {
        let request = self.request;

        let export_tab = self.find(Locator::css(EXPORT_TAB))?;
        if !request.settle_delay.is_zero() {
            thread::sleep(request.settle_delay);
        }
        self.agent.click(&export_tab)?;

        let custom = self.find(Locator::id(CUSTOM_EXPORT))?;
        self.agent.click(&custom)?;

        for db in request.exclude_dbs.iter().filter(|db| !db.is_empty()) {
            tracing::debug!("Excluding database {}", db);
            let option = self.find(db_option_locator(db))?;
            self.agent.click(&option)?;
        }

        let compression = self.find(Locator::id(COMPRESSION_SELECT))?;
        self.agent.set_value(&compression, request.compression.as_str())?;

        self.advance(SessionState::ExportConfigured(variant));
        Ok(())
    }

    /// ExportConfigured → Triggered
    fn trigger(&mut self, variant: UiVariant) -> BackupResult<SessionReport> {
        let go = self.find(Locator::id(EXPORT_GO))?;

        let triggered_at = if self.request.dry_run {
            tracing::info!("Dry run: not starting the export");
            None
        } else {
            self.agent.run_script(SCROLL_INTO_VIEW, &[&go])?;
            let at = SystemTime::now();
            self.agent.click(&go)?;
            Some(at)
        };

        let activated = triggered_at.is_some();
        self.advance(SessionState::Triggered { activated });
        Ok(SessionReport {
            variant,
            activated,
            triggered_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_markers() {
        assert!(is_login_successful("<frame id=\"frame_content\">"));
        assert!(is_login_successful("<a href=\"server_export.php\">Export</a>"));
        assert!(!is_login_successful("<form id=\"login_form\">"));
    }

    #[test]
    fn test_variant_detection() {
        assert_eq!(UiVariant::detect("<frame id=\"frame_content\">"), UiVariant::Legacy);
        assert_eq!(UiVariant::detect("server_export.php"), UiVariant::Modern);
    }

    #[test]
    fn test_db_option_locator_escapes_quotes() {
        assert_eq!(
            db_option_locator("shop").to_string(),
            "#db_select>option[value='shop']"
        );
        assert_eq!(
            db_option_locator("o'neil").to_string(),
            "#db_select>option[value='o\\'neil']"
        );
    }

    #[test]
    fn test_resolve_frame_url() {
        let base = "https://db.example.com/pma/index.php?lang=en";
        assert_eq!(
            resolve_frame_url(base, "main.php?token=abc").unwrap(),
            "https://db.example.com/pma/main.php?token=abc"
        );
        assert_eq!(
            resolve_frame_url(base, "/other/main.php").unwrap(),
            "https://db.example.com/other/main.php"
        );
        assert_eq!(
            resolve_frame_url("http://host", "main.php").unwrap(),
            "http://host/main.php"
        );
        assert_eq!(
            resolve_frame_url(base, "http://elsewhere/x").unwrap(),
            "http://elsewhere/x"
        );
    }

    #[test]
    fn test_resolve_frame_url_directory_base() {
        assert_eq!(
            resolve_frame_url("https://host/phpmyadmin/", "main.php").unwrap(),
            "https://host/phpmyadmin/main.php"
        );
    }

    #[test]
    fn test_resolve_frame_url_protocol_relative() {
        assert_eq!(
            resolve_frame_url("https://host/pma/index.php", "//cdn.example/main.php").unwrap(),
            "https://cdn.example/main.php"
        );
    }

    #[test]
    fn test_resolve_frame_url_query_only() {
        assert_eq!(
            resolve_frame_url("https://host/pma/index.php", "?token=abc").unwrap(),
            "https://host/pma/index.php?token=abc"
        );
    }

    #[test]
    fn test_resolve_frame_url_bad_base() {
        assert_eq!(resolve_frame_url("about:blank", "main.php").unwrap_err().kind(), "agent");
    }

    #[test]
    fn test_state_order_and_display() {
        assert!(SessionState::Start.rank() < SessionState::LoginSubmitted.rank());
        assert!(SessionState::Triggered { activated: false }.is_terminal());
        assert_eq!(SessionState::LoginSubmitted.to_string(), "LOGIN_SUBMITTED");
    }
}
