// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy and consistent error formatting for pma-backup.
//!
//! Every failure of a backup run ends up as one [`BackupError`]. Nothing is
//! retried automatically: a half-configured export could silently download
//! the wrong data set, so the run stops at the first failure and reports it.
//!
//! [`BackupError::report`] renders an actionable message with possible
//! causes and suggested fixes, built with [`ErrorBuilder`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Project page for support.
pub const ISSUES_URL: &str = "https://github.com/morganforge/pma-backup/issues";

/// Result alias used throughout the library.
pub type BackupResult<T> = std::result::Result<T, BackupError>;

/// All the ways a backup run can fail.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupError {
    /// Login markers were absent after the login form was submitted.
    AuthenticationFailure,
    /// A required control could not be located on the page.
    ElementNotFound {
        /// Selector that failed, e.g. `#input_username`.
        selector: String,
    },
    /// The download did not finish before the deadline.
    Timeout {
        /// How long the poller waited.
        waited: Duration,
    },
    /// The downloaded file could not be moved to its final name.
    /// The source file is left where the browser put it.
    RenameFailure {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
    /// The automation agent could not be started or answered with a
    /// protocol error.
    Agent(String),
    /// The output directory could not be read.
    Io(String),
    /// Invalid configuration (bad prefix format, missing directory, ...).
    Config(String),
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailure => write!(
                f,
                "Could not login - did you provide the correct username and password?"
            ),
            Self::ElementNotFound { selector } => {
                write!(f, "Page element not found: {}", selector)
            }
            Self::Timeout { waited } => write!(
                f,
                "Timeout of {} seconds reached on SQL backup file download",
                waited.as_secs()
            ),
            Self::RenameFailure { from, to, reason } => write!(
                f,
                "Could not rename {} to {}: {}",
                from.display(),
                to.display(),
                reason
            ),
            Self::Agent(msg) => write!(f, "Browser automation error: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BackupError {}

impl BackupError {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "authentication_failure",
            Self::ElementNotFound { .. } => "element_not_found",
            Self::Timeout { .. } => "timeout",
            Self::RenameFailure { .. } => "rename_failure",
            Self::Agent(_) => "agent",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }

    /// Render the error with possible causes and suggested fixes.
    pub fn report(&self) -> String {
        let builder = ErrorBuilder::new(self.to_string());
        let builder = match self {
            Self::AuthenticationFailure => builder
                .cause("Wrong username or password")
                .cause("Server name required but not supplied")
                .cause("HTTP basic authentication in front of the console")
                .fix("Verify the credentials by logging in with a browser")
                .fix("Pass --server-name if the login page shows a server field")
                .fix("Pass --http-auth user:password for protected sites"),
            Self::ElementNotFound { .. } => builder
                .cause("Unsupported phpMyAdmin version or theme")
                .cause("Page did not finish loading within the timeout")
                .cause("Excluded database name does not exist")
                .fix("Increase the element wait: --timeout 30")
                .fix("Check the --exclude-dbs names against the server"),
            Self::Timeout { .. } => builder
                .cause("Export is very large or the network is slow")
                .cause("The browser failed silently and never started the download")
                .fix("Increase the wait: --download-timeout 1800")
                .fix("Run with --show-browser to watch the export"),
            Self::RenameFailure { from, .. } => builder
                .cause("Missing write permission on the output directory")
                .cause("Disk full")
                .cause("Another process created the target file meanwhile")
                .fix(format!("The downloaded file is still at {}", from.display())),
            Self::Agent(_) => builder
                .cause("geckodriver is not running")
                .cause("Firefox is not installed")
                .fix("Start the driver: geckodriver --port 4444")
                .fix("Point to another driver: --webdriver-url http://host:port"),
            Self::Io(_) => builder
                .cause("Output directory was removed or is not readable")
                .fix("Check the --output-directory path"),
            Self::Config(_) => builder
                .fix("Check ~/.pma-backup/config.json")
                .fix("Run with --help to see valid options"),
        };
        builder.build()
    }
}

/// Formats an error message with title, causes, fixes, and help link.
///
/// # Example
///
/// ```
/// use pma_backup::error::format_error;
///
/// let error = format_error(
///     "Could not reach geckodriver",
///     &["geckodriver not running"],
///     &["Start it: geckodriver --port 4444"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = String::new();

    output.push_str(&format!("[✗] {}\n\n", title));

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(&format!("Need help? {}", ISSUES_URL));

    output
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    /// Create a new error builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Add a possible cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    /// Build the formatted error message.
    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone().build())
    }
}
