//! Artifact snapshots
//!
//! A snapshot is the complete set of artifacts known after one compile
//! cycle, keyed by forward-slash output path.

use crate::error::{OutsyncError, OutsyncResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping of output path to artifact bytes for one build cycle.
///
/// Paths are normalized on insert and iterate in lexicographic order, so
/// two snapshots with the same artifacts always enumerate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact, replacing any previous content at the same path
    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> OutsyncResult<()> {
        let path = normalize_path(path)?;
        self.artifacts.insert(path, contents.into());
        Ok(())
    }

    /// Content of the artifact at `path`
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.artifacts.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.artifacts.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Iterate artifacts in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.artifacts
            .iter()
            .map(|(path, contents)| (path.as_str(), contents.as_slice()))
    }

    /// Iterate artifact paths in order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Total size of all artifact contents in bytes
    pub fn total_bytes(&self) -> usize {
        self.artifacts.values().map(Vec::len).sum()
    }
}

/// Normalize an artifact path to its forward-slash, root-relative form.
///
/// Backslashes are treated as separators, empty and `.` segments are
/// dropped. Parent (`..`) segments and absolute paths are rejected since
/// they would escape the cache and output roots.
pub fn normalize_path(raw: &str) -> OutsyncResult<String> {
    let invalid = |reason: &str| OutsyncError::ArtifactPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || unified.split('/').next().is_some_and(|s| s.ends_with(':')) {
        return Err(invalid("path must be relative"));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("parent segments are not allowed")),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(invalid("path is empty"));
    }

    Ok(segments.join("/"))
}

/// Resolve a normalized artifact path beneath a filesystem root
pub fn artifact_location(root: &Path, artifact: &str) -> PathBuf {
    artifact
        .split('/')
        .fold(root.to_path_buf(), |location, segment| location.join(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_dot_and_empty_segments() {
        assert_eq!(normalize_path("./js//app.js").unwrap(), "js/app.js");
        assert_eq!(normalize_path("js\\vendor\\lib.js").unwrap(), "js/vendor/lib.js");
    }

    #[test]
    fn normalize_rejects_escaping_paths() {
        assert!(normalize_path("../secret").is_err());
        assert!(normalize_path("a/../../b").is_err());
        assert!(normalize_path("/etc/passwd").is_err());
        assert!(normalize_path("C:\\out\\a.js").is_err());
        assert!(normalize_path("./").is_err());
    }

    #[test]
    fn insert_normalizes_and_replaces() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("./a.js", "1").unwrap();
        snapshot.insert("a.js", "2").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a.js"), Some(&b"2"[..]));
    }

    #[test]
    fn iterates_in_path_order() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("z.js", "z").unwrap();
        snapshot.insert("a/b.js", "b").unwrap();
        snapshot.insert("a.js", "a").unwrap();

        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(paths, vec!["a.js", "a/b.js", "z.js"]);
        assert_eq!(snapshot.total_bytes(), 3);
    }

    #[test]
    fn artifact_location_joins_segments() {
        let location = artifact_location(Path::new("/cache"), "js/app.js");
        assert_eq!(location, Path::new("/cache").join("js").join("app.js"));
    }
}
