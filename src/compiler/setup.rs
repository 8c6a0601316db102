//! Compiler setup owned by the driver
//!
//! The user's compiler options stay immutable. Everything outsync itself
//! decides (context, resolution roots, where output goes, the compiler's
//! cache) lives here instead.

use crate::capture::MemoryOutput;
use crate::config::CompilerOptions;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything a compiler needs to be created
#[derive(Debug, Clone)]
pub struct CompilerSetup {
    /// Input directory; the compilation context
    pub context: PathBuf,

    /// Module resolution roots, anchored at the context
    pub resolve_roots: Vec<PathBuf>,

    /// Where compiled artifacts must be written
    pub output: MemoryOutput,

    /// Cache kept alive across cycles so incremental state stays warm
    pub cache: CompilerCache,

    /// Keep symlinked module paths instead of resolving them to their real
    /// location
    pub preserve_symlinks: bool,

    /// Caller-supplied options, with no reserved field set
    pub options: Arc<CompilerOptions>,
}

/// Key-value store a compiler may use for its own incremental state.
///
/// Created once per driver and handed to the compiler on setup; its
/// contents are opaque to outsync.
#[derive(Debug, Clone, Default)]
pub struct CompilerCache {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl CompilerCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    /// Whether `key` currently holds exactly `value`
    pub fn holds(&self, key: &str, value: &[u8]) -> bool {
        self.lock().get(key).is_some_and(|stored| stored == value)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_clones_share_entries() {
        let cache = CompilerCache::new();
        let handle = cache.clone();
        handle.insert("a.js", b"12:34".to_vec());

        assert!(cache.holds("a.js", b"12:34"));
        assert!(!cache.holds("a.js", b"12:35"));
        assert_eq!(cache.len(), 1);

        cache.remove("a.js");
        assert!(handle.is_empty());
    }
}
