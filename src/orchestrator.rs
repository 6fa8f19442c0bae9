// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end backup run.
//!
//! ```text
//! ┌────────────────┐   ┌───────────────────┐   ┌──────────────┐
//! │ SessionDriver  │──▶│ CompletionPoller  │──▶│ PathResolver │──▶ final path
//! │ (agent guard)  │   │ (skipped dry-run) │   │ (+ rename)   │
//! └────────────────┘   └───────────────────┘   └──────────────┘
//! ```
//!
//! Exactly one agent is launched per run. It is shut down as soon as the
//! download has been triggered (or the session failed), before polling.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::agent::{AgentGuard, AgentLauncher};
use crate::download::{CompletionPoller, PollStatus};
use crate::error::{BackupError, BackupResult};
use crate::filename::{generic_placeholder, is_generic_placeholder};
use crate::fs::{absolute_dir, FileSystem, LocalFileSystem};
use crate::resolver::PathResolver;
use crate::session::{SessionDriver, SessionState};
use crate::types::{DownloadOutcome, ExportRequest, NamingPolicy};

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The session driver changed state
    Session(SessionState),
    /// One look at the download directory
    Poll(PollStatus),
    /// The dump was moved to its final name
    Renamed { from: PathBuf, to: PathBuf },
}

impl RunEvent {
    /// Human-readable status message.
    pub fn message(&self) -> String {
        match self {
            RunEvent::Session(state) => state.message(),
            RunEvent::Poll(status) => status.message(),
            RunEvent::Renamed { to, .. } => format!("Saved {}", to.display()),
        }
    }
}

/// Composes session, poller and resolver into one run.
pub struct Orchestrator<'a, L: AgentLauncher, F: FileSystem + ?Sized> {
    launcher: &'a L,
    fs: &'a F,
    clock: Box<dyn Fn() -> DateTime<Utc> + 'a>,
    observer: Box<dyn FnMut(&RunEvent) + 'a>,
}

impl<'a, L: AgentLauncher, F: FileSystem + ?Sized> Orchestrator<'a, L, F> {
    pub fn new(launcher: &'a L, fs: &'a F) -> Self {
        Self {
            launcher,
            fs,
            clock: Box::new(Utc::now),
            observer: Box::new(|_| {}),
        }
    }

    /// Source of "now" for the date prefix.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Receive progress events.
    pub fn with_observer(mut self, observer: impl FnMut(&RunEvent) + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Run the whole workflow and return where the dump ended up.
    pub fn run(&mut self, request: &ExportRequest, policy: &NamingPolicy) -> BackupResult<DownloadOutcome> {
        let output_dir = absolute_dir(&policy.output_dir).map_err(|e| {
            BackupError::Config(format!(
                "output directory {} is not usable: {}",
                policy.output_dir.display(),
                e
            ))
        })?;
        let policy = NamingPolicy {
            output_dir: output_dir.clone(),
            ..policy.clone()
        };

        let agent = self.launcher.launch(&output_dir, request)?;
        let mut guard = AgentGuard::new(agent);
        let session = {
            let observer = &mut self.observer;
            let mut on_state = |state: &SessionState| observer(&RunEvent::Session(*state));
            SessionDriver::new(&mut *guard, request)
                .with_observer(&mut on_state)
                .run()
        };
        if let Err(e) = guard.release() {
            tracing::warn!("Failed to shut down browser session: {}", e);
        }
        let report = session?;

        let (source_name, source_was_generic) = if request.dry_run {
            (generic_placeholder(request.compression), true)
        } else {
            let since = report.triggered_at.unwrap_or_else(SystemTime::now);
            let poller = CompletionPoller::new(self.fs, request.poll_interval).with_since(since);
            let observer = &mut self.observer;
            let name = poller.wait_with_progress(&output_dir, request.download_timeout, |status| {
                observer(&RunEvent::Poll(status.clone()))
            })?;
            let generic = is_generic_placeholder(&name);
            (name, generic)
        };
        tracing::info!("Source file: {} (generic: {})", source_name, source_was_generic);

        let resolver = PathResolver::new(self.fs);
        let now = (self.clock)();
        let target_path =
            resolver.resolve_target_path(request, &policy, &source_name, source_was_generic, now)?;
        let source_path = output_dir.join(&source_name);

        if !request.dry_run {
            resolver.commit(&source_path, &target_path, policy.overwrite_existing)?;
            (self.observer)(&RunEvent::Renamed {
                from: source_path.clone(),
                to: target_path.clone(),
            });
        }

        Ok(DownloadOutcome {
            source_path,
            target_path,
            source_was_generic,
            dry_run: request.dry_run,
        })
    }
}

/// Run a backup download on the local filesystem.
///
/// Returns the final path of the dump, or on a dry run the path it would
/// have been saved to.
pub fn perform_backup_download<L: AgentLauncher>(
    launcher: &L,
    request: &ExportRequest,
    policy: &NamingPolicy,
) -> BackupResult<PathBuf> {
    Orchestrator::new(launcher, &LocalFileSystem)
        .run(request, policy)
        .map(|outcome| outcome.target_path)
}
