// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! UI automation agent capability surface.
//!
//! The session driver only ever talks to a [`UiAgent`]: open a URL, find an
//! element, type, click, read an attribute, enter a frame, run a script and
//! shut down. [`webdriver`] provides the real implementation on top of a W3C
//! WebDriver server; tests substitute a scripted fake.
//!
//! An agent is owned through an [`AgentGuard`], which shuts the browser down
//! when the guard goes out of scope, whether the run succeeded or not.

pub mod webdriver;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::BackupResult;
use crate::types::ExportRequest;

pub use webdriver::{WebDriverConfig, WebDriverLauncher, WebDriverSession};

/// Script returning the current document's markup.
pub const PAGE_SOURCE_SCRIPT: &str = "return document.documentElement.outerHTML;";

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Element `id` attribute.
    Id(String),
    /// CSS selector.
    Css(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// Equivalent CSS selector.
    pub fn to_css(&self) -> String {
        match self {
            Locator::Id(id) => format!("[id=\"{}\"]", id.replace('\\', "\\\\").replace('"', "\\\"")),
            Locator::Css(selector) => selector.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", id),
            Locator::Css(selector) => f.write_str(selector),
        }
    }
}

/// Opaque reference to an element located by an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Agent-specific element reference.
    pub id: String,
    /// How the element was found, for error messages.
    pub locator: Locator,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
        }
    }
}

/// Scripted interaction with a rendered document.
pub trait UiAgent {
    /// Load `url` in the current browsing context.
    fn navigate(&mut self, url: &str) -> BackupResult<()>;

    /// URL of the top-level document, after any redirects.
    fn current_url(&mut self) -> BackupResult<String>;

    /// Locate one element. Fails with `ElementNotFound` when absent.
    fn find_element(&mut self, locator: &Locator) -> BackupResult<ElementHandle>;

    /// Type `text` into the element.
    fn set_value(&mut self, element: &ElementHandle, text: &str) -> BackupResult<()>;

    fn click(&mut self, element: &ElementHandle) -> BackupResult<()>;

    /// Attribute value, `None` when the attribute is not set.
    fn get_attribute(&mut self, element: &ElementHandle, name: &str) -> BackupResult<Option<String>>;

    /// Make the frame element's document the current browsing context.
    fn switch_to_frame(&mut self, element: &ElementHandle) -> BackupResult<()>;

    /// Run `script` with the elements as `arguments[..]`.
    fn run_script(&mut self, script: &str, args: &[&ElementHandle]) -> BackupResult<serde_json::Value>;

    /// Markup of the current document.
    fn page_source(&mut self) -> BackupResult<String> {
        let value = self.run_script(PAGE_SOURCE_SCRIPT, &[])?;
        Ok(value.as_str().map(String::from).unwrap_or_default())
    }

    /// Shut the browser down.
    fn quit(&mut self) -> BackupResult<()>;
}

/// Starts agents for a run.
pub trait AgentLauncher {
    type Agent: UiAgent;

    /// Start an agent whose downloads land in `download_dir`.
    fn launch(&self, download_dir: &Path, request: &ExportRequest) -> BackupResult<Self::Agent>;
}

/// Exclusive ownership of an agent; quits it exactly once.
pub struct AgentGuard<A: UiAgent> {
    agent: Option<A>,
}

impl<A: UiAgent> AgentGuard<A> {
    pub fn new(agent: A) -> Self {
        Self { agent: Some(agent) }
    }

    /// Quit now and report the outcome instead of only logging it.
    pub fn release(mut self) -> BackupResult<()> {
        match self.agent.take() {
            Some(mut agent) => agent.quit(),
            None => Ok(()),
        }
    }
}

impl<A: UiAgent> Deref for AgentGuard<A> {
    type Target = A;

    fn deref(&self) -> &A {
        // `agent` is only taken by `release`, which consumes the guard.
        match &self.agent {
            Some(agent) => agent,
            None => unreachable!("agent guard used after release"),
        }
    }
}

impl<A: UiAgent> DerefMut for AgentGuard<A> {
    fn deref_mut(&mut self) -> &mut A {
        match &mut self.agent {
            Some(agent) => agent,
            None => unreachable!("agent guard used after release"),
        }
    }
}

impl<A: UiAgent> Drop for AgentGuard<A> {
    fn drop(&mut self) {
        if let Some(mut agent) = self.agent.take() {
            if let Err(e) = agent.quit() {
                tracing::warn!("Failed to shut down browser session: {}", e);
            }
        }
    }
}
