//! Single-writer lock around an ingestion run.
//!
//! A `.ingest.lock` file next to the cache, created exclusively and holding
//! the owner's pid. A second run sees the file and fails with
//! [`IngestError::Locked`]. The file is removed when the guard drops.
//!
//! A run that was killed never drops its guard, so an existing lock whose
//! pid no longer names a live process is treated as stale: it is removed
//! and acquisition is retried once.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::IngestError;

/// A lock without a readable pid is only reclaimed once it is this old,
/// so a writer that has created the file but not yet written its pid is
/// not mistaken for a dead one.
const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct IngestLock {
    path: PathBuf,
}

impl IngestLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create lock directory: {}", dir.display()))?;
        }

        let mut file = match create_exclusive(path)? {
            Some(file) => file,
            None if is_stale(path) => {
                warn!(path = %path.display(), "removing stale ingest lock");
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| {
                            format!("Failed to remove stale lock file: {}", path.display())
                        })
                    }
                }
                create_exclusive(path)?
                    .ok_or_else(|| IngestError::Locked(path.to_path_buf()))?
            }
            None => return Err(IngestError::Locked(path.to_path_buf()).into()),
        };
        writeln!(file, "{}", std::process::id())?;

        debug!(path = %path.display(), "acquired ingest lock");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove ingest lock");
        }
    }
}

/// `None` when the file already exists.
fn create_exclusive(path: &Path) -> Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to create lock file: {}", path.display()))
        }
    }
}

fn is_stale(path: &Path) -> bool {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        // Gone between the create attempt and now: let the retry race for it.
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(_) => return false,
    };

    match content.trim().parse::<u32>() {
        Ok(pid) if pid != 0 => !process_alive(pid),
        _ => lock_age(path).is_some_and(|age| age >= UNREADABLE_LOCK_GRACE),
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the process exists; nothing is sent.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

// No portable liveness check; a lock left by a killed run must be removed
// by hand on these platforms.
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
