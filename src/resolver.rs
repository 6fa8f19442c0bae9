// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Final naming of the downloaded dump.
//!
//! The name is built in this order:
//!
//! 1. A server-default name (`localhost.sql...`) or a dry run becomes
//!    `<username><ext>`.
//! 2. A basename override replaces the stem, keeping the compound extension.
//! 3. An optional UTC date prefix is prepended.
//! 4. The result is joined with the output directory.
//! 5. Unless overwriting is allowed, an existing file pushes the name to
//!    `stem(1)ext`, `stem(2)ext`, ... until a free one is found.
//!
//! The only filesystem mutation is the final [`PathResolver::commit`].

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{BackupError, BackupResult};
use crate::filename::{compound_extension, split_compound_extension};
use crate::fs::FileSystem;
use crate::types::{ExportRequest, NamingPolicy};

/// Format `now` with a strftime-style `format`.
///
/// Fails with a configuration error instead of panicking on an invalid
/// format specifier.
pub fn date_prefix(format: &str, now: DateTime<Utc>) -> BackupResult<String> {
    let mut prefix = String::new();
    write!(prefix, "{}", now.format(format))
        .map_err(|_| BackupError::Config(format!("invalid prefix format '{}'", format)))?;
    Ok(prefix)
}

/// Filename before date prefix and collision handling.
pub fn working_filename(
    request: &ExportRequest,
    policy: &NamingPolicy,
    source_filename: &str,
    source_was_generic: bool,
) -> String {
    let mut name = if source_was_generic || request.dry_run {
        format!("{}{}", request.user(), compound_extension(source_filename))
    } else {
        source_filename.to_string()
    };

    if let Some(basename) = &policy.basename {
        name = format!("{}{}", basename, compound_extension(&name));
    }

    name
}

/// Computes target paths and performs the final rename.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
}

impl<'a, F: FileSystem + ?Sized> PathResolver<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Final path for `source_filename`, a file inside `policy.output_dir`.
    ///
    /// The source file itself never counts as a collision: when the computed
    /// name equals the downloaded name the dump simply stays where it is.
    pub fn resolve_target_path(
        &self,
        request: &ExportRequest,
        policy: &NamingPolicy,
        source_filename: &str,
        source_was_generic: bool,
        now: DateTime<Utc>,
    ) -> BackupResult<PathBuf> {
        let mut filename = working_filename(request, policy, source_filename, source_was_generic);

        if policy.prepend_date {
            filename = format!("{}{}", date_prefix(&policy.prefix_format, now)?, filename);
        }

        let candidate = policy.output_dir.join(&filename);
        let is_source = !request.dry_run && filename == source_filename;

        if policy.overwrite_existing || is_source || !self.fs.is_file(&candidate) {
            return Ok(candidate);
        }

        tracing::warn!(
            "File {} already exists, to overwrite it use --overwrite-existing",
            candidate.display()
        );
        Ok(self.first_free_path(&policy.output_dir, &filename))
    }

    /// Lowest `stem(N)ext` in `dir` that is not an existing file.
    pub fn first_free_path(&self, dir: &Path, filename: &str) -> PathBuf {
        let (stem, ext) = split_compound_extension(filename);
        let mut n: u32 = 1;
        loop {
            let alternate = dir.join(format!("{}({}){}", stem, n, ext));
            if !self.fs.is_file(&alternate) {
                return alternate;
            }
            n += 1;
        }
    }

    /// Move the downloaded file to `target`.
    ///
    /// Unless `overwrite` is set, a file that appeared at `target` since
    /// [`resolve_target_path`](Self::resolve_target_path) checked it is a
    /// [`BackupError::RenameFailure`], never replaced. On failure the source
    /// stays untouched.
    pub fn commit(&self, source: &Path, target: &Path, overwrite: bool) -> BackupResult<()> {
        if source == target {
            tracing::debug!("{} already has its final name", source.display());
            return Ok(());
        }

        let moved = if overwrite {
            self.fs.rename(source, target)
        } else {
            self.fs.rename_no_replace(source, target)
        };
        moved.map_err(|e| {
            tracing::error!(
                "Rename {} -> {} failed: {}",
                source.display(),
                target.display(),
                e
            );
            let reason = if e.kind() == io::ErrorKind::AlreadyExists {
                "target was created by another process".to_string()
            } else {
                e.to_string()
            };
            BackupError::RenameFailure {
                from: source.to_path_buf(),
                to: target.to_path_buf(),
                reason,
            }
        })?;

        tracing::info!("Renamed {} -> {}", source.display(), target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use crate::types::Compression;
    use chrono::TimeZone;
    use std::fs;

    fn request() -> ExportRequest {
        ExportRequest::new("http://localhost/phpmyadmin/", "root", "secret")
    }

    fn march_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_generic_name_becomes_username() {
        let policy = NamingPolicy::new("/out", "%Y");
        assert_eq!(working_filename(&request(), &policy, "localhost.sql", true), "root.sql");
    }

    #[test]
    fn test_meaningful_name_is_kept() {
        let policy = NamingPolicy::new("/out", "%Y");
        assert_eq!(working_filename(&request(), &policy, "shop.sql.gz", false), "shop.sql.gz");
    }

    #[test]
    fn test_basename_keeps_compound_extension() {
        let policy = NamingPolicy::new("/out", "%Y").with_basename("nightly");
        assert_eq!(
            working_filename(&request(), &policy, "localhost.sql.zip", true),
            "nightly.sql.zip"
        );
    }

    #[test]
    fn test_dry_run_uses_username_even_for_real_names() {
        let req = request().with_dry_run(true);
        let policy = NamingPolicy::new("/out", "%Y");
        assert_eq!(working_filename(&req, &policy, "shop.sql", false), "root.sql");
    }

    #[test]
    fn test_date_prefix() {
        assert_eq!(date_prefix("%Y%m%d_", march_first()).unwrap(), "20240301_");
        assert_eq!(
            date_prefix("%Y-%m-%d_%H-%M-%S_UTC_", march_first()).unwrap(),
            "2024-03-01_12-30-00_UTC_"
        );
        assert!(date_prefix("%Q", march_first()).is_err());
    }

    #[test]
    fn test_prefixed_basename_target() {
        let dir = tempfile::tempdir().unwrap();
        let req = request().with_compression(Compression::Gzip);
        let policy = NamingPolicy::new(dir.path(), "%Y%m%d_")
            .with_basename("nightly")
            .with_prepend_date(true);

        let target = PathResolver::new(&LocalFileSystem)
            .resolve_target_path(&req, &policy, "localhost.sql.gz", true, march_first())
            .unwrap();
        assert_eq!(target, dir.path().join("20240301_nightly.sql.gz"));
    }

    #[test]
    fn test_collisions_pick_lowest_free_index() {
        let dir = tempfile::tempdir().unwrap();
        let policy = NamingPolicy::new(dir.path(), "%Y");
        let resolver = PathResolver::new(&LocalFileSystem);

        fs::write(dir.path().join("root.sql.gz"), b"").unwrap();
        let target = resolver
            .resolve_target_path(&request(), &policy, "localhost.sql.gz", true, march_first())
            .unwrap();
        assert_eq!(target, dir.path().join("root(1).sql.gz"));

        fs::write(dir.path().join("root(1).sql.gz"), b"").unwrap();
        fs::write(dir.path().join("root(3).sql.gz"), b"").unwrap();
        let target = resolver
            .resolve_target_path(&request(), &policy, "localhost.sql.gz", true, march_first())
            .unwrap();
        assert_eq!(target, dir.path().join("root(2).sql.gz"));
    }

    #[test]
    fn test_overwrite_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("root.sql"), b"old").unwrap();
        let policy = NamingPolicy::new(dir.path(), "%Y").with_overwrite_existing(true);
        let resolver = PathResolver::new(&LocalFileSystem);

        let first = resolver
            .resolve_target_path(&request(), &policy, "localhost.sql", true, march_first())
            .unwrap();
        let second = resolver
            .resolve_target_path(&request(), &policy, "localhost.sql", true, march_first())
            .unwrap();
        assert_eq!(first, dir.path().join("root.sql"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_source_is_not_its_own_collision() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shop.sql"), b"dump").unwrap();
        let policy = NamingPolicy::new(dir.path(), "%Y");
        let resolver = PathResolver::new(&LocalFileSystem);

        let target = resolver
            .resolve_target_path(&request(), &policy, "shop.sql", false, march_first())
            .unwrap();
        assert_eq!(target, dir.path().join("shop.sql"));
        resolver.commit(&target, &target, false).unwrap();
        assert!(target.is_file());
    }

    #[test]
    fn test_commit_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("localhost.sql");
        let target = dir.path().join("root.sql");
        fs::write(&source, b"dump").unwrap();

        PathResolver::new(&LocalFileSystem).commit(&source, &target, false).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"dump");
    }

    #[test]
    fn test_failed_commit_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("localhost.sql");
        fs::write(&source, b"dump").unwrap();
        let target = dir.path().join("missing-dir").join("root.sql");

        let err = PathResolver::new(&LocalFileSystem)
            .commit(&source, &target, false)
            .unwrap_err();
        assert_eq!(err.kind(), "rename_failure");
        assert_eq!(fs::read(&source).unwrap(), b"dump");
    }

    #[test]
    fn test_commit_refuses_target_created_after_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("localhost.sql");
        fs::write(&source, b"new dump").unwrap();
        let policy = NamingPolicy::new(dir.path(), "%Y");
        let resolver = PathResolver::new(&LocalFileSystem);

        let target = resolver
            .resolve_target_path(&request(), &policy, "localhost.sql", true, march_first())
            .unwrap();
        assert_eq!(target, dir.path().join("root.sql"));
        fs::write(&target, b"other backup").unwrap();

        let err = resolver.commit(&source, &target, false).unwrap_err();
        assert_eq!(err.kind(), "rename_failure");
        assert_eq!(fs::read(&target).unwrap(), b"other backup");
        assert_eq!(fs::read(&source).unwrap(), b"new dump");
    }

    #[test]
    fn test_commit_with_overwrite_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("localhost.sql");
        let target = dir.path().join("root.sql");
        fs::write(&source, b"new dump").unwrap();
        fs::write(&target, b"old dump").unwrap();

        PathResolver::new(&LocalFileSystem).commit(&source, &target, true).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"new dump");
    }
}
