// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Filename helpers that understand compound extensions.
//!
//! A dump named `backup.sql.gz` has the stem `backup` and the extension
//! `.sql.gz`; splitting it as `backup.sql` + `.gz` would produce names like
//! `backup.sql(1).gz` on collision. Every place that derives an extension
//! goes through [`split_compound_extension`].

use crate::types::Compression;

/// Stem prefix phpMyAdmin uses when it has no database name to offer.
pub const GENERIC_STEM: &str = "localhost";

/// Single-dot split with the same rules as a plain `splitext`.
///
/// Leading dots belong to the stem, so `.bashrc` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if !name[..idx].chars().all(|c| c == '.') => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Split `name` into `(stem, extension)`, keeping `.gz` and `.zip`
/// together with the extension in front of them.
///
/// ```
/// use pma_backup::filename::split_compound_extension;
///
/// assert_eq!(split_compound_extension("dump.sql.gz"), ("dump".to_string(), ".sql.gz".to_string()));
/// assert_eq!(split_compound_extension("dump.sql"), ("dump".to_string(), ".sql".to_string()));
/// ```
pub fn split_compound_extension(name: &str) -> (String, String) {
    let (stem, ext) = split_extension(name);
    match ext {
        ".gz" | ".zip" => {
            let (inner_stem, inner_ext) = split_extension(stem);
            (inner_stem.to_string(), format!("{}{}", inner_ext, ext))
        }
        _ => (stem.to_string(), ext.to_string()),
    }
}

/// Compound extension of `name`, e.g. `.sql.zip`.
pub fn compound_extension(name: &str) -> String {
    split_compound_extension(name).1
}

/// Server-default filename the export would produce for `compression`.
pub fn generic_placeholder(compression: Compression) -> String {
    format!("{}{}", GENERIC_STEM, compression.dump_extension())
}

/// True when the export produced the server-default name instead of one
/// derived from the database.
pub fn is_generic_placeholder(name: &str) -> bool {
    name.starts_with(GENERIC_STEM)
}
