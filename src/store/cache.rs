//! Durable cache store
//!
//! Mirrors artifact paths under a cache root. Only artifacts the differ
//! reports as changed are written, so a cycle costs I/O proportional to
//! what changed rather than to the total artifact count.

use crate::artifact::{artifact_location, Snapshot};
use super::clear_file_ancestors;
use crate::error::{OutsyncError, OutsyncResult};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Cache directory mirroring artifact paths
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `root`.
    ///
    /// Nothing is created on disk until the first artifact is written.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an artifact inside the store
    pub fn location(&self, artifact: &str) -> PathBuf {
        artifact_location(&self.root, artifact)
    }

    /// Persist every changed artifact of `current`, returning the number of
    /// files written.
    ///
    /// Each file is written to a temporary sibling and renamed into place,
    /// so readers never observe a half-written artifact. A failure stops the
    /// pass; artifacts written before it stay in the store.
    pub fn materialize(
        &self,
        current: &Snapshot,
        changed: &BTreeSet<String>,
    ) -> OutsyncResult<usize> {
        let mut written = 0;

        for path in changed {
            let contents = current.get(path).ok_or_else(|| {
                OutsyncError::Internal(format!("changed artifact {} missing from snapshot", path))
            })?;

            self.write_artifact(path, contents)?;
            written += 1;
        }

        debug!(
            "Materialized {} of {} artifacts into {}",
            written,
            current.len(),
            self.root.display()
        );
        Ok(written)
    }

    fn write_artifact(&self, artifact: &str, contents: &[u8]) -> OutsyncResult<()> {
        let location = self.location(artifact);
        let parent = location.parent().ok_or_else(|| {
            OutsyncError::Internal(format!("artifact {} has no parent", artifact))
        })?;

        clear_file_ancestors(&self.root, artifact)?;
        fs::create_dir_all(parent).map_err(|e| {
            OutsyncError::io(format!("creating cache directory {}", parent.display()), e)
        })?;

        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            OutsyncError::io(format!("staging cache entry for {}", artifact), e)
        })?;
        staged
            .write_all(contents)
            .and_then(|_| staged.as_file().sync_data())
            .map_err(|e| OutsyncError::io(format!("writing cache entry for {}", artifact), e))?;

        if fs::symlink_metadata(&location).is_ok_and(|meta| meta.is_dir()) {
            fs::remove_dir_all(&location).map_err(|e| {
                OutsyncError::io(format!("replacing directory {}", location.display()), e)
            })?;
        }

        // Replaces a stale symlink or file at the destination as well
        staged.persist(&location).map_err(|e| {
            OutsyncError::io(format!("writing cache entry {}", location.display()), e.error)
        })?;

        trace!("Cached {} ({} bytes)", artifact, contents.len());
        Ok(())
    }

    /// Read an artifact back from the store
    pub fn read(&self, artifact: &str) -> OutsyncResult<Vec<u8>> {
        let location = self.location(artifact);
        fs::read(&location)
            .map_err(|e| OutsyncError::io(format!("reading cache entry {}", location.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (path, contents) in entries {
            snapshot.insert(path, *contents).unwrap();
        }
        snapshot
    }

    fn all_paths(snapshot: &Snapshot) -> BTreeSet<String> {
        snapshot.paths().map(str::to_string).collect()
    }

    #[test]
    fn store_is_created_lazily() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let store = CacheStore::new(&root);
        assert!(!root.exists());

        let current = snapshot(&[("js/app.js", "app")]);
        let written = store.materialize(&current, &all_paths(&current)).unwrap();

        assert_eq!(written, 1);
        assert_eq!(fs::read(root.join("js").join("app.js")).unwrap(), b"app");
    }

    #[test]
    fn only_changed_paths_are_written() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        let current = snapshot(&[("a.js", "1"), ("b.js", "3")]);
        let changed: BTreeSet<String> = ["b.js".to_string()].into();

        let written = store.materialize(&current, &changed).unwrap();

        assert_eq!(written, 1);
        assert!(!temp.path().join("a.js").exists());
        assert_eq!(store.read("b.js").unwrap(), b"3");
    }

    #[test]
    fn overwrites_previous_content() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());

        let first = snapshot(&[("a.js", "old content")]);
        store.materialize(&first, &all_paths(&first)).unwrap();
        let second = snapshot(&[("a.js", "new")]);
        store.materialize(&second, &all_paths(&second)).unwrap();

        assert_eq!(store.read("a.js").unwrap(), b"new");
    }

    #[test]
    fn empty_change_set_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let store = CacheStore::new(&root);

        let current = snapshot(&[("a.js", "1")]);
        let written = store.materialize(&current, &BTreeSet::new()).unwrap();

        assert_eq!(written, 0);
        assert!(!root.exists());
    }

    #[test]
    fn changed_path_missing_from_snapshot_is_internal_error() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let changed: BTreeSet<String> = ["ghost.js".to_string()].into();

        let err = store.materialize(&Snapshot::new(), &changed).unwrap_err();
        assert!(matches!(err, OutsyncError::Internal(_)));
    }

    #[test]
    fn write_failure_is_io_error() {
        let temp = TempDir::new().unwrap();
        // a file where the cache root directory should be
        let root = temp.path().join("cache");
        fs::write(&root, b"not a directory").unwrap();
        let store = CacheStore::new(&root);

        let current = snapshot(&[("a.js", "1")]);
        let err = store.materialize(&current, &all_paths(&current)).unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn file_entry_becomes_directory() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let before = snapshot(&[("lib", "file")]);
        store.materialize(&before, &all_paths(&before)).unwrap();

        let after = snapshot(&[("lib/index.js", "nested")]);
        let written = store.materialize(&after, &all_paths(&after)).unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.read("lib/index.js").unwrap(), b"nested");
    }

    #[test]
    fn directory_entry_becomes_file() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let before = snapshot(&[("lib/index.js", "nested"), ("lib/deep/x.js", "x")]);
        store.materialize(&before, &all_paths(&before)).unwrap();

        let after = snapshot(&[("lib", "file")]);
        store.materialize(&after, &all_paths(&after)).unwrap();

        assert_eq!(store.read("lib").unwrap(), b"file");
        assert!(temp.path().join("lib").is_file());
    }
}
