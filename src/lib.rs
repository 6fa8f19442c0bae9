// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! pma-backup - SQL dump downloads from a phpMyAdmin console
//!
//! One command logs into the console through a browser, configures a
//! server export, starts the download, waits for the browser to finish
//! writing it and moves the dump to a collision-free name:
//!
//! **Login** -> **Configure export** -> **Trigger** -> **Wait for file** -> **Rename**
//!
//! # Core Modules
//!
//! - [`session`] - Login and export configuration state machine
//! - [`download`] - Download completion polling
//! - [`resolver`] - Target naming, collision avoidance and the final rename
//! - [`orchestrator`] - The end-to-end run
//! - [`agent`] - Browser automation surface and the WebDriver client
//! - [`filename`] - Compound extension handling (`.sql.gz`, `.sql.zip`)
//! - [`error`] - Error taxonomy and actionable error formatting

pub mod agent;
pub mod config;
pub mod download;
pub mod error;
pub mod filename;
pub mod fs;
pub mod orchestrator;
pub mod resolver;
pub mod session;
pub mod types;
pub mod utils;

pub use types::{
    Compression, Credentials, DownloadOutcome, ExportRequest, FrameMode, NamingPolicy, UiVariant,
};

pub use error::{format_error, BackupError, BackupResult, ErrorBuilder};

pub use agent::{
    AgentGuard, AgentLauncher, ElementHandle, Locator, UiAgent, WebDriverConfig, WebDriverLauncher,
    WebDriverSession,
};

pub use download::{CompletionPoller, PollStatus};
pub use filename::split_compound_extension;
pub use fs::{FileSystem, LocalFileSystem};
pub use orchestrator::{perform_backup_download, Orchestrator, RunEvent};
pub use resolver::PathResolver;
pub use session::{SessionDriver, SessionReport, SessionState};
pub use config::{load_config, Config, DEFAULT_PREFIX_FORMAT};
pub use utils::mask_sensitive;
