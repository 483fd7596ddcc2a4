//! Directory walk that yields ingestible file paths.
//!
//! Walks the root recursively without following symlinks, keeps regular
//! files whose extension is in the allowlist, and drops anything matching
//! an exclude glob. An unreadable directory is logged and skipped; the
//! rest of the tree is still collected.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::IngestError;

/// Collect every matching file under `root`, sorted by path.
///
/// `extensions` are compared case-insensitively and may be given with or
/// without a leading dot. `exclude_globs` are matched against the path
/// relative to `root`.
pub fn collect_files(
    root: &Path,
    extensions: &[String],
    exclude_globs: &[String],
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IngestError::RootMissing(root.to_path_buf()).into());
    }

    let allowed: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let exclude_set = build_globset(exclude_globs)?;

    let mut files = Vec::new();
    for entry in readable_entries(WalkDir::new(root).follow_links(false)) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !has_allowed_extension(path, &allowed) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            debug!(path = %relative.display(), "excluded by glob");
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Drop walk errors (unreadable directories, entries that vanished
/// mid-walk) with a warning and keep walking.
fn readable_entries<I>(walk: I) -> impl Iterator<Item = DirEntry>
where
    I: IntoIterator<Item = walkdir::Result<DirEntry>>,
{
    walk.into_iter().filter_map(|entry| match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
            let at = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            warn!(path = %at, error = %e, "skipping unreadable path");
            None
        }
    })
}

fn has_allowed_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| allowed.iter().any(|a| *a == e))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}
