// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared test utilities for pma-backup integration tests.
//!
//! [`FakeAgent`] stands in for a browser: it serves fixed markup, records
//! every action in a shared log and can drop a file into the download
//! directory when the export button is clicked.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pma_backup::agent::PAGE_SOURCE_SCRIPT;
use pma_backup::{
    AgentLauncher, BackupError, BackupResult, ElementHandle, ExportRequest, Locator, UiAgent,
};
use serde_json::Value;

/// Markup of a logged-in modern console.
pub const MODERN_MARKUP: &str =
    r#"<html><body><a class="tab" href="server_export.php">Export</a></body></html>"#;

/// Markup of a logged-in legacy (frameset) console.
pub const LEGACY_MARKUP: &str =
    r#"<html><frameset><frame id="frame_content" src="main.php?token=abc"></frameset></html>"#;

/// Markup of the login page shown again after bad credentials.
pub const LOGIN_MARKUP: &str =
    r#"<html><body><form id="login_form"><input id="input_username"></form></body></html>"#;

pub type ActionLog = Rc<RefCell<Vec<String>>>;

/// Scripted browser.
#[derive(Clone)]
pub struct FakeAgent {
    pub markup: String,
    pub missing: HashSet<String>,
    pub attributes: HashMap<String, String>,
    /// File written into `download_dir` when `#buttonGo` is clicked.
    pub download: Option<(String, Vec<u8>)>,
    pub download_dir: Option<PathBuf>,
    /// Reported by `current_url`; defaults to the last navigated URL.
    pub current_url: Option<String>,
    pub log: ActionLog,
    last_url: Option<String>,
    next_id: u32,
}

impl FakeAgent {
    pub fn new(markup: &str) -> Self {
        Self {
            markup: markup.to_string(),
            missing: HashSet::new(),
            attributes: HashMap::new(),
            download: None,
            download_dir: None,
            current_url: None,
            log: Rc::new(RefCell::new(Vec::new())),
            last_url: None,
            next_id: 0,
        }
    }

    /// Make the element rendered as `selector` (e.g. `#input_servername`) absent.
    pub fn without(mut self, selector: &str) -> Self {
        self.missing.insert(selector.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Pretend the console redirected to `url` after login.
    pub fn redirected_to(mut self, url: &str) -> Self {
        self.current_url = Some(url.to_string());
        self
    }

    pub fn downloading(mut self, name: &str, content: &[u8]) -> Self {
        self.download = Some((name.to_string(), content.to_vec()));
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn record(&self, action: String) {
        self.log.borrow_mut().push(action);
    }
}

impl UiAgent for FakeAgent {
    fn navigate(&mut self, url: &str) -> BackupResult<()> {
        self.record(format!("navigate {}", url));
        self.last_url = Some(url.to_string());
        Ok(())
    }

    fn current_url(&mut self) -> BackupResult<String> {
        Ok(self
            .current_url
            .clone()
            .or_else(|| self.last_url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    fn find_element(&mut self, locator: &Locator) -> BackupResult<ElementHandle> {
        let selector = locator.to_string();
        if self.missing.contains(&selector) {
            return Err(BackupError::ElementNotFound { selector });
        }
        self.next_id += 1;
        Ok(ElementHandle::new(format!("el-{}", self.next_id), locator.clone()))
    }

    fn set_value(&mut self, element: &ElementHandle, text: &str) -> BackupResult<()> {
        self.record(format!("set {} {}", element.locator, text));
        Ok(())
    }

    fn click(&mut self, element: &ElementHandle) -> BackupResult<()> {
        self.record(format!("click {}", element.locator));
        if element.locator == Locator::id("buttonGo") {
            if let (Some((name, content)), Some(dir)) = (&self.download, &self.download_dir) {
                fs::write(dir.join(name), content)
                    .map_err(|e| BackupError::Io(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn get_attribute(&mut self, element: &ElementHandle, name: &str) -> BackupResult<Option<String>> {
        self.record(format!("attribute {} {}", element.locator, name));
        Ok(self.attributes.get(name).cloned())
    }

    fn switch_to_frame(&mut self, element: &ElementHandle) -> BackupResult<()> {
        self.record(format!("frame {}", element.locator));
        Ok(())
    }

    fn run_script(&mut self, script: &str, args: &[&ElementHandle]) -> BackupResult<Value> {
        if script == PAGE_SOURCE_SCRIPT {
            return Ok(Value::String(self.markup.clone()));
        }
        let target = args
            .first()
            .map(|e| e.locator.to_string())
            .unwrap_or_default();
        self.record(format!("script {}", target));
        Ok(Value::Null)
    }

    fn quit(&mut self) -> BackupResult<()> {
        self.record("quit".to_string());
        Ok(())
    }
}

/// Hands out clones of a template agent pointed at the run's directory.
pub struct FakeLauncher {
    pub template: FakeAgent,
}

impl FakeLauncher {
    pub fn new(template: FakeAgent) -> Self {
        Self { template }
    }

    pub fn actions(&self) -> Vec<String> {
        self.template.actions()
    }
}

impl AgentLauncher for FakeLauncher {
    type Agent = FakeAgent;

    fn launch(&self, download_dir: &Path, _request: &ExportRequest) -> BackupResult<FakeAgent> {
        let mut agent = self.template.clone();
        agent.download_dir = Some(download_dir.to_path_buf());
        agent.record(format!("launch {}", download_dir.display()));
        Ok(agent)
    }
}

/// Number of logged actions equal to `action`.
pub fn count(actions: &[String], action: &str) -> usize {
    actions.iter().filter(|a| a.as_str() == action).count()
}

/// Names of the regular files in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Hermetic `pma-backup` command for CLI tests.
pub fn pma_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pma-backup");
    cmd.env_remove("RUST_LOG");
    cmd
}
