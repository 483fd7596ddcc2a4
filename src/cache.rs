//! Persisted path → fingerprint map used to detect changed files.
//!
//! The cache is a flat JSON object, `{ "<path>": "<hex sha256>" }`. It is
//! loaded at the start of a run, diffed against fresh fingerprints, and
//! rewritten in full only after a run indexes at least one chunk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::hasher::fingerprint_file;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeCache {
    entries: BTreeMap<String, String>,
}

/// Result of comparing the current file set against a [`ChangeCache`].
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Files that are new or whose fingerprint differs, in input order.
    pub changed: Vec<PathBuf>,
    /// Fresh fingerprints for every file that hashed successfully.
    pub snapshot: ChangeCache,
    /// Files that could not be hashed. They appear in neither output above.
    pub unreadable: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the cache at `path`.
    ///
    /// A missing file is an empty cache. A file that cannot be read or does
    /// not parse as a JSON object of strings is ALSO treated as empty, with a
    /// warning: losing the cache only costs a full re-ingest, so a corrupt
    /// cache file must not stop the run.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ingest cache yet");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ingest cache unreadable, treating as empty");
                return Self::new();
            }
        };

        match serde_json::from_str::<ChangeCache>(&raw) {
            Ok(cache) => {
                debug!(path = %path.display(), entries = cache.len(), "loaded ingest cache");
                cache
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ingest cache corrupt, treating as empty");
                Self::new()
            }
        }
    }

    /// Fingerprint every file in `files` and compare against this cache.
    pub fn diff(&self, files: &[PathBuf]) -> ChangeSet {
        let mut set = ChangeSet::default();
        for path in files {
            let fingerprint = match fingerprint_file(path) {
                Ok(fp) => fp,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to hash file, skipping");
                    set.unreadable.push(path.clone());
                    continue;
                }
            };
            let key = cache_key(path);
            if self.get(&key) != Some(fingerprint.as_str()) {
                set.changed.push(path.clone());
            }
            set.snapshot.insert(key, fingerprint);
        }
        set
    }

    /// Overwrite `path` with this cache as pretty JSON.
    ///
    /// Writes a sibling temp file and renames it into place so a crash never
    /// leaves a truncated cache behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = temp_path(path);
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace cache file: {}", path.display()))?;

        debug!(path = %path.display(), entries = self.len(), "saved ingest cache");
        Ok(())
    }

    /// Drop entries under `root` whose paths no longer exist. Returns the
    /// removed keys.
    pub fn prune_missing(&mut self, root: &Path) -> Vec<String> {
        let gone: Vec<String> = self
            .entries
            .keys()
            .map(|k| Path::new(k.as_str()))
            .filter(|p| p.starts_with(root) && !p.exists())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        for key in &gone {
            self.entries.remove(key);
        }
        gone
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, fingerprint: String) {
        self.entries.insert(key, fingerprint);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ChangeCache::load(&tmp.path().join("cache.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(ChangeCache::load(&path).is_empty());

        fs::write(&path, r#"{"a.txt": 42}"#).unwrap();
        assert!(ChangeCache::load(&path).is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/cache.json");
        let mut cache = ChangeCache::new();
        cache.insert("a.txt".into(), "abc".into());
        cache.insert("b.py".into(), "def".into());
        cache.save(&path).unwrap();

        assert_eq!(ChangeCache::load(&path), cache);
        assert!(!temp_path(&path).exists());

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.get("b.py").map(String::as_str), Some("def"));
    }

    #[test]
    fn test_diff_reports_new_and_modified_only() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.py");
        fs::write(&a, "hello world").unwrap();
        fs::write(&b, "print(1)").unwrap();
        let files = vec![a.clone(), b.clone()];

        let first = ChangeCache::new().diff(&files);
        assert_eq!(first.changed, files);
        assert_eq!(first.snapshot.len(), 2);

        let second = first.snapshot.diff(&files);
        assert!(second.is_empty());
        assert_eq!(second.snapshot, first.snapshot);

        fs::write(&b, "print(2)").unwrap();
        let third = first.snapshot.diff(&files);
        assert_eq!(third.changed, vec![b]);
        assert_eq!(third.snapshot.len(), 2);
    }

    #[test]
    fn test_unhashable_file_left_out_of_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "x").unwrap();
        let ghost = tmp.path().join("ghost.txt");

        let set = ChangeCache::new().diff(&[a.clone(), ghost.clone()]);
        assert_eq!(set.changed, vec![a]);
        assert_eq!(set.unreadable, vec![ghost.clone()]);
        assert!(set.snapshot.get(&cache_key(&ghost)).is_none());
    }

    #[test]
    fn test_prune_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let kept = tmp.path().join("kept.md");
        fs::write(&kept, "k").unwrap();
        let gone = tmp.path().join("gone.md");
        let elsewhere = tmp.path().join("other/gone.md");

        let mut cache = ChangeCache::new();
        cache.insert(cache_key(&kept), "1".into());
        cache.insert(cache_key(&gone), "2".into());
        cache.insert(cache_key(&elsewhere), "3".into());

        let removed = cache.prune_missing(&tmp.path().join("gone.md"));
        assert_eq!(removed, vec![cache_key(&gone)]);
        assert_eq!(cache.len(), 2);

        let removed = cache.prune_missing(tmp.path());
        assert_eq!(removed, vec![cache_key(&elsewhere)]);
        assert_eq!(cache.len(), 1);
    }
}
