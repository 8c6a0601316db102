//! Snapshot diffing
//!
//! Pure comparison of two consecutive snapshots. Identity is exact byte
//! content; sizes and timestamps are never consulted.

use crate::artifact::Snapshot;
use std::collections::BTreeSet;

/// Paths that are new in `current` or whose bytes differ from `previous`.
///
/// Paths that only exist in `previous` are removals and are not part of
/// this set; see [`removed_paths`].
pub fn changed_paths(previous: Option<&Snapshot>, current: &Snapshot) -> BTreeSet<String> {
    current
        .iter()
        .filter(|(path, contents)| match previous.and_then(|prev| prev.get(path)) {
            Some(old) => old != *contents,
            None => true,
        })
        .map(|(path, _)| path.to_string())
        .collect()
}

/// Paths present in `previous` but missing from `current`
pub fn removed_paths(previous: Option<&Snapshot>, current: &Snapshot) -> BTreeSet<String> {
    let Some(previous) = previous else {
        return BTreeSet::new();
    };

    previous
        .paths()
        .filter(|path| !current.contains(path))
        .map(str::to_string)
        .collect()
}
