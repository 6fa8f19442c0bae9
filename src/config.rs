// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent tool configuration.
//!
//! Stored as JSON in `~/.pma-backup/config.json`. Every field is optional;
//! missing fields take the defaults below, and command-line flags override
//! whatever the file says.
//!
//! ```json
//! {
//!   "webdriver_url": "http://localhost:4444",
//!   "prefix_format": "%Y-%m-%d_%H-%M-%S_UTC_",
//!   "download_timeout_secs": 1800
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::webdriver::DEFAULT_WEBDRIVER_URL;
use crate::agent::WebDriverConfig;
use crate::error::{BackupError, BackupResult};
use crate::types::FrameMode;

/// Default strftime format of the date prefix.
pub const DEFAULT_PREFIX_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_UTC_";

/// Lower bound for `poll_interval_ms`; zero would spin on the directory.
pub const MIN_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// WebDriver server to start browser sessions on.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    /// Run the browser without a window (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_prefix_format")]
    pub prefix_format: String,
    /// Element wait in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Download completion deadline in seconds (default: 300).
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Download directory poll interval (default: 1000, at least 50).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause before clicking the export tab (default: 5000).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub legacy_frame_mode: FrameMode,
}

fn default_webdriver_url() -> String {
    DEFAULT_WEBDRIVER_URL.to_string()
}

fn default_headless() -> bool {
    true
}

fn default_prefix_format() -> String {
    DEFAULT_PREFIX_FORMAT.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_download_timeout_secs() -> u64 {
    5 * 60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
            prefix_format: default_prefix_format(),
            timeout_secs: default_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            legacy_frame_mode: FrameMode::default(),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn webdriver(&self) -> WebDriverConfig {
        WebDriverConfig {
            endpoint: self.webdriver_url.clone(),
            headless: self.headless,
        }
    }
}

/// Directory holding the config file.
pub fn get_config_dir() -> BackupResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".pma-backup"))
        .ok_or_else(|| BackupError::Config("cannot determine home directory".to_string()))
}

/// Default config file location.
pub fn default_config_path() -> BackupResult<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Load the config at `path`, or defaults when the file does not exist.
pub fn load_config_from(path: &Path) -> BackupResult<Config> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| BackupError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let config = serde_json::from_str(&content)
        .map_err(|e| BackupError::Config(format!("invalid {}: {}", path.display(), e)))?;
    Ok(config)
}

/// Load the config from the default location.
pub fn load_config() -> BackupResult<Config> {
    load_config_from(&default_config_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.download_timeout(), Duration::from_secs(300));
        assert_eq!(config.prefix_format, DEFAULT_PREFIX_FORMAT);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"webdriver_url": "http://grid:4444", "legacy_frame_mode": "follow_src"}"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.webdriver_url, "http://grid:4444");
        assert_eq!(config.legacy_frame_mode, FrameMode::FollowSrc);
        assert_eq!(config.timeout_secs, 10);
        assert!(config.headless);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"poll_interval_ms": 0}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));

        let config = Config {
            poll_interval_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
