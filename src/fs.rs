// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Filesystem access used by the poller and the path resolver.
//!
//! The download directory is shared with the browser, which may be writing
//! to a file at the very moment it is listed. Entries that vanish between
//! the listing and the metadata lookup are skipped rather than reported.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A regular file found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub modified: SystemTime,
    /// Size in bytes.
    pub len: u64,
}

/// The filesystem operations the core relies on.
pub trait FileSystem {
    /// Regular files directly inside `dir`.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileEntry>>;

    /// True when a regular file exists at `path`.
    fn is_file(&self, path: &Path) -> bool;

    /// Move `from` to `to` in one step, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Move `from` to `to`, failing with `AlreadyExists` instead of
    /// replacing a file at `to`. `from` is untouched on failure.
    fn rename_no_replace(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                tracing::debug!("Skipping non UTF-8 file name in {:?}", dir);
                continue;
            };
            files.push(FileEntry {
                name,
                modified: metadata.modified()?,
                len: metadata.len(),
            });
        }
        Ok(files)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn rename_no_replace(&self, from: &Path, to: &Path) -> io::Result<()> {
        // link(2) refuses to replace an existing target, unlike rename(2)
        match fs::hard_link(from, to) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied) => {
                // No hard links on this filesystem (FAT, some network mounts)
                if to.exists() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} already exists", to.display()),
                    ));
                }
                return fs::rename(from, to);
            }
            Err(e) => return Err(e),
        }
        if let Err(e) = fs::remove_file(from) {
            let _ = fs::remove_file(to);
            return Err(e);
        }
        Ok(())
    }
}

/// Resolve the output directory to an absolute path the browser can use.
pub fn absolute_dir(dir: &Path) -> io::Result<PathBuf> {
    let canonical = fs::canonicalize(dir)?;
    if !canonical.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", canonical.display()),
        ));
    }
    Ok(canonical)
}
