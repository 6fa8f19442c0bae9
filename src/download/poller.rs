// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Polling the output directory for a finished browser download.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::error::{BackupError, BackupResult};
use crate::filename::split_compound_extension;
use crate::fs::FileSystem;

use super::types::PollStatus;

/// Extensions browsers give to files they are still writing.
pub const IN_FLIGHT_EXTENSIONS: &[&str] = &[".part", ".crdownload"];

/// Allowance for coarse filesystem timestamps when filtering by `since`.
pub const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Watches one directory for the newest completed file.
#[derive(Debug, Clone)]
pub struct CompletionPoller<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    interval: Duration,
    since: Option<SystemTime>,
}

impl<'a, F: FileSystem + ?Sized> CompletionPoller<'a, F> {
    pub fn new(fs: &'a F, interval: Duration) -> Self {
        Self {
            fs,
            interval,
            since: None,
        }
    }

    /// Ignore files last modified before `since` (minus [`MTIME_SLACK`]).
    ///
    /// Keeps an older dump in the same directory from being taken for the
    /// download that was just triggered.
    pub fn with_since(mut self, since: SystemTime) -> Self {
        self.since = Some(since.checked_sub(MTIME_SLACK).unwrap_or(since));
        self
    }

    /// Look at the directory once.
    pub fn check(&self, dir: &Path) -> BackupResult<PollStatus> {
        let files = self
            .fs
            .list_files(dir)
            .map_err(|e| BackupError::Io(format!("cannot list {}: {}", dir.display(), e)))?;

        let newest = files
            .into_iter()
            .filter(|f| self.since.map_or(true, |since| f.modified >= since))
            .max_by_key(|f| f.modified);

        Ok(match newest {
            None => PollStatus::Empty,
            Some(file) => {
                let (_, ext) = split_compound_extension(&file.name);
                // Firefox creates an empty file under the final name before
                // the `.part` file shows up.
                if IN_FLIGHT_EXTENSIONS.contains(&ext.as_str()) || file.len == 0 {
                    PollStatus::InFlight { name: file.name }
                } else {
                    PollStatus::Completed { name: file.name }
                }
            }
        })
    }

    /// Block until the newest file in `dir` is complete and return its name.
    ///
    /// Fails with [`BackupError::Timeout`] once `max_wait` has elapsed.
    pub fn wait_for_completed_download(&self, dir: &Path, max_wait: Duration) -> BackupResult<String> {
        self.wait_with_progress(dir, max_wait, |_| {})
    }

    /// Same as [`wait_for_completed_download`](Self::wait_for_completed_download),
    /// reporting every observation to `on_poll`.
    pub fn wait_with_progress<C>(&self, dir: &Path, max_wait: Duration, mut on_poll: C) -> BackupResult<String>
    where
        C: FnMut(&PollStatus),
    {
        let start = Instant::now();

        loop {
            let status = self.check(dir)?;
            tracing::debug!("Polled {}: {:?}", dir.display(), status);
            on_poll(&status);

            if let PollStatus::Completed { name } = status {
                return Ok(name);
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                tracing::error!(
                    "No finished download in {} after {:?}",
                    dir.display(),
                    max_wait
                );
                return Err(BackupError::Timeout { waited: max_wait });
            }

            thread::sleep(self.interval.min(max_wait - elapsed));
        }
    }
}
