//! Build artifacts and their per-cycle snapshots
//!
//! A snapshot is always the full artifact set of a cycle, never a delta.
//! The differ compares two consecutive snapshots to find what must be
//! written to the cache store.

pub mod diff;
pub mod snapshot;

pub use diff::{changed_paths, removed_paths};
pub use snapshot::{artifact_location, normalize_path, Snapshot};
