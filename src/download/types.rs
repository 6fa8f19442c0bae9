// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download types for completion polling.

/// What one look at the download directory found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// No qualifying file yet
    Empty,
    /// Newest file is still being written
    InFlight { name: String },
    /// Newest file is finished
    Completed { name: String },
}

impl PollStatus {
    /// Returns true if the download is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStatus::Completed { .. })
    }

    /// Name of the newest file, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            PollStatus::Empty => None,
            PollStatus::InFlight { name } | PollStatus::Completed { name } => Some(name),
        }
    }

    /// Human-readable status message.
    pub fn message(&self) -> String {
        match self {
            PollStatus::Empty => "Waiting for the download to start...".to_string(),
            PollStatus::InFlight { name } => format!("Downloading {}...", name),
            PollStatus::Completed { name } => format!("Download complete: {}", name),
        }
    }
}
