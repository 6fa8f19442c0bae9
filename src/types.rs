// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical types used across pma-backup.
//!
//! [`ExportRequest`] describes what to export and how to talk to the
//! console, [`NamingPolicy`] decides where the dump lands and under which
//! name. Both are plain values filled in completely by the caller; the
//! library keeps no process-wide defaults of its own.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Login credentials. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Parse `user:password`; the password may itself contain colons.
    pub fn parse_pair(pair: &str) -> Option<Self> {
        let (user, password) = pair.split_once(':')?;
        Some(Self::new(user, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Compression applied by the server to the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zip,
    Gzip,
}

impl Compression {
    /// Option text in the console's compression selector.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zip => "zip",
            Self::Gzip => "gzip",
        }
    }

    /// Extension of a dump produced with this compression.
    pub fn dump_extension(&self) -> &'static str {
        match self {
            Self::None => ".sql",
            Self::Zip => ".sql.zip",
            Self::Gzip => ".sql.gz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "zip" => Ok(Self::Zip),
            "gzip" => Ok(Self::Gzip),
            other => Err(format!("unknown compression '{}' (expected none, zip or gzip)", other)),
        }
    }
}

/// How the Legacy layout's content frame is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Switch the agent's browsing context into the frame element.
    #[default]
    Switch,
    /// Read the frame's `src` and navigate the top-level document there.
    FollowSrc,
}

/// Layout of the console, resolved once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiVariant {
    /// Content rendered inside the `frame_content` frame.
    Legacy,
    /// Content rendered inline in the top-level document.
    Modern,
}

impl fmt::Display for UiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiVariant::Legacy => write!(f, "legacy (framed)"),
            UiVariant::Modern => write!(f, "modern (inline)"),
        }
    }
}

/// Everything needed to drive one export through the console.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Login page of the console.
    pub url: String,
    pub credentials: Credentials,
    /// Value for the optional server-name field on the login page.
    pub server_name: Option<String>,
    /// HTTP basic-auth credentials embedded into the URL before navigation.
    pub http_auth: Option<Credentials>,
    /// Databases to leave out of the export.
    pub exclude_dbs: Vec<String>,
    pub compression: Compression,
    /// How long the agent waits for an element to appear.
    pub timeout: Duration,
    /// Deadline for the browser to finish writing the dump.
    pub download_timeout: Duration,
    /// Interval between two looks at the download directory.
    pub poll_interval: Duration,
    /// Pause before the export tab is clicked.
    pub settle_delay: Duration,
    pub frame_mode: FrameMode,
    /// Configure everything but never start the download.
    pub dry_run: bool,
}

impl ExportRequest {
    /// Create a request with no exclusions, no compression and zero waits.
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: Credentials::new(user, password),
            server_name: None,
            http_auth: None,
            exclude_dbs: Vec::new(),
            compression: Compression::None,
            timeout: Duration::ZERO,
            download_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            frame_mode: FrameMode::Switch,
            dry_run: false,
        }
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_http_auth(mut self, auth: Credentials) -> Self {
        self.http_auth = Some(auth);
        self
    }

    /// Set the exclusion list from a comma-separated string.
    /// Blank entries are dropped, so an empty string excludes nothing.
    pub fn with_exclude_dbs(mut self, list: &str) -> Self {
        self.exclude_dbs = list
            .split(',')
            .map(str::trim)
            .filter(|db| !db.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_frame_mode(mut self, mode: FrameMode) -> Self {
        self.frame_mode = mode;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn user(&self) -> &str {
        &self.credentials.user
    }
}

/// Where the dump ends up and how it is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    pub output_dir: PathBuf,
    /// Replaces the stem of the downloaded file; the extension is kept.
    /// May be empty when combined with a date prefix.
    pub basename: Option<String>,
    pub prepend_date: bool,
    /// strftime-style format of the UTC date prefix.
    pub prefix_format: String,
    /// Replace an existing file instead of picking `name(N).ext`.
    pub overwrite_existing: bool,
}

impl NamingPolicy {
    pub fn new(output_dir: impl Into<PathBuf>, prefix_format: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            basename: None,
            prepend_date: false,
            prefix_format: prefix_format.into(),
            overwrite_existing: false,
        }
    }

    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = Some(basename.into());
        self
    }

    pub fn with_prepend_date(mut self, prepend: bool) -> Self {
        self.prepend_date = prepend;
        self
    }

    pub fn with_overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// File as written by the browser (the placeholder name on dry runs).
    pub source_path: PathBuf,
    /// Final location of the dump.
    pub target_path: PathBuf,
    /// The export came out under the server-default name.
    pub source_was_generic: bool,
    /// Nothing was downloaded or renamed.
    pub dry_run: bool,
}
