// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download completion detection.
//!
//! The browser signals a finished download only by renaming its partial
//! file, so the output directory is polled until the newest file no longer
//! carries an in-flight extension or the deadline passes.
//!
//! ```text
//!   trigger ──▶ list dir ──▶ newest file ──▶ *.part? ──no──▶ done
//!                  ▲                           │
//!                  └──── sleep(interval) ◀─yes─┘   (until deadline → Timeout)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pma_backup::download::CompletionPoller;
//! use pma_backup::fs::LocalFileSystem;
//!
//! let poller = CompletionPoller::new(&LocalFileSystem, Duration::from_secs(1));
//! let name = poller.wait_for_completed_download("/backups".as_ref(), Duration::from_secs(300))?;
//! println!("Downloaded {}", name);
//! # Ok::<(), pma_backup::BackupError>(())
//! ```

pub mod poller;
pub mod types;

pub use poller::{CompletionPoller, IN_FLIGHT_EXTENSIONS, MTIME_SLACK};
pub use types::PollStatus;
