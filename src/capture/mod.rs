//! In-memory output capture
//!
//! The compiler writes its artifacts here instead of to disk, so a cycle
//! that fails or produces unchanged output costs no disk I/O. The capture
//! is cumulative: it keeps every artifact until the compiler removes it,
//! which means artifacts cached by the compiler and not re-emitted this
//! cycle still show up in the next snapshot.

use crate::artifact::{normalize_path, Snapshot};
use crate::error::OutsyncResult;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

const ROOT: &str = "";

/// Shared handle to an in-memory directory tree.
///
/// Cloning the handle shares the underlying tree, so the driver and the
/// compiler can both hold one.
#[derive(Debug, Clone)]
pub struct MemoryOutput {
    inner: Arc<Mutex<MemoryOutputInner>>,
}

#[derive(Debug)]
struct MemoryOutputInner {
    entries: HashMap<String, Entry>,
}

#[derive(Debug)]
enum Entry {
    File { contents: Vec<u8> },
    Dir { children: BTreeSet<String> },
}

impl MemoryOutput {
    /// Create an empty capture containing only the root directory
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            ROOT.to_string(),
            Entry::Dir {
                children: BTreeSet::new(),
            },
        );

        Self {
            inner: Arc::new(Mutex::new(MemoryOutputInner { entries })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryOutputInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a directory and all of its missing parents
    pub fn create_dir_all(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        self.lock().create_dir_all(&path)
    }

    /// Write a file, creating parent directories as needed
    pub fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let path = normalize(path)?;
        let mut inner = self.lock();

        if let Some(Entry::Dir { .. }) = inner.entries.get(&path) {
            return must_be_file(&path);
        }

        inner.create_dir_all(parent_of(&path))?;
        inner.attach(&path);
        inner.entries.insert(
            path,
            Entry::File {
                contents: data.to_vec(),
            },
        );
        Ok(())
    }

    /// Read a file's contents
    pub fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let path = normalize(path)?;
        match self.lock().entries.get(&path) {
            Some(Entry::File { contents }) => Ok(contents.clone()),
            Some(Entry::Dir { .. }) => must_be_file(&path),
            None => not_found(&path),
        }
    }

    /// List the full paths of a directory's children in sorted order.
    ///
    /// An empty path lists the root.
    pub fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let path = normalize_or_root(path)?;
        match self.lock().entries.get(&path) {
            Some(Entry::Dir { children }) => Ok(children.iter().cloned().collect()),
            Some(Entry::File { .. }) => must_be_dir(&path),
            None => not_found(&path),
        }
    }

    pub fn remove_file(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        let mut inner = self.lock();
        match inner.entries.get(&path) {
            Some(Entry::File { .. }) => {
                inner.remove(path);
                Ok(())
            }
            Some(Entry::Dir { .. }) => must_be_file(&path),
            None => not_found(&path),
        }
    }

    pub fn remove_dir_all(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        let mut inner = self.lock();
        match inner.entries.get(&path) {
            Some(Entry::Dir { .. }) => {
                inner.remove(path);
                Ok(())
            }
            Some(Entry::File { .. }) => must_be_dir(&path),
            None => not_found(&path),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        match normalize_or_root(path) {
            Ok(path) => self.lock().entries.contains_key(&path),
            Err(_) => false,
        }
    }

    pub fn is_file(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(path) => matches!(self.lock().entries.get(&path), Some(Entry::File { .. })),
            Err(_) => false,
        }
    }

    /// Number of files currently held
    pub fn file_count(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|entry| matches!(entry, Entry::File { .. }))
            .count()
    }

    /// Whether the capture holds no files
    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    /// Paths of every file, sorted
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::File { .. }))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Enumerate every file into a snapshot.
    ///
    /// Walks the tree depth-first in sorted order and reads each file once.
    /// Paths listed in `excluded` are left out; they are compared in
    /// normalized form, so `./a.js` excludes `a.js`.
    pub fn snapshot(&self, excluded: &[String]) -> OutsyncResult<Snapshot> {
        let excluded: Vec<String> = excluded
            .iter()
            .filter_map(|raw| match normalize_path(raw) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Ignoring exclusion {}: {}", raw, e);
                    None
                }
            })
            .collect();
        let inner = self.lock();
        let mut snapshot = Snapshot::new();
        let mut pending = vec![ROOT.to_string()];

        while let Some(path) = pending.pop() {
            match inner.entries.get(&path) {
                Some(Entry::File { contents }) => {
                    if !excluded.iter().any(|e| e == &path) {
                        snapshot.insert(&path, contents.as_slice())?;
                    }
                }
                Some(Entry::Dir { children }) => {
                    // reversed so the stack pops children in order
                    pending.extend(children.iter().rev().cloned());
                }
                None => {}
            }
        }

        Ok(snapshot)
    }
}

impl Default for MemoryOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOutputInner {
    fn create_dir_all(&mut self, path: &str) -> io::Result<()> {
        if path.is_empty() {
            return Ok(());
        }

        match self.entries.get(path) {
            Some(Entry::Dir { .. }) => return Ok(()),
            Some(Entry::File { .. }) => return must_be_dir(path),
            None => {}
        }

        self.create_dir_all(parent_of(path))?;
        self.attach(path);
        self.entries.insert(
            path.to_string(),
            Entry::Dir {
                children: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Register `path` as a child of its parent directory
    fn attach(&mut self, path: &str) {
        if let Some(Entry::Dir { children }) = self.entries.get_mut(parent_of(path)) {
            children.insert(path.to_string());
        }
    }

    fn remove(&mut self, root_path: String) {
        if let Some(Entry::Dir { children }) = self.entries.get_mut(parent_of(&root_path)) {
            children.remove(&root_path);
        }

        let mut to_remove = VecDeque::new();
        to_remove.push_back(root_path);

        while let Some(path) = to_remove.pop_front() {
            if let Some(Entry::Dir { children }) = self.entries.remove(&path) {
                to_remove.extend(children);
            }
        }
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => ROOT,
    }
}

fn normalize(path: &str) -> io::Result<String> {
    normalize_path(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

fn normalize_or_root(path: &str) -> io::Result<String> {
    if path.trim_matches(|c| c == '/' || c == '.').is_empty() {
        Ok(ROOT.to_string())
    } else {
        normalize(path)
    }
}

fn must_be_dir<T>(path: &str) -> io::Result<T> {
    Err(io::Error::other(format!(
        "path {} was a file, but must be a directory",
        path
    )))
}

fn must_be_file<T>(path: &str) -> io::Result<T> {
    Err(io::Error::other(format!(
        "path {} was a directory, but must be a file",
        path
    )))
}

fn not_found<T>(path: &str) -> io::Result<T> {
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("path {} not found", path),
    ))
}
