//! On-disk state: the cache store, the projected output tree and the
//! build record
//!
//! # Layout
//!
//! | Location | Contents |
//! |----------|----------|
//! | `cache_dir/<path>` | Artifact bytes, rewritten only when changed |
//! | `output_dir/<path>` | Symlink (or copy) of `cache_dir/<path>` |
//! | `record` | JSON digest list of the last successful cycle |

pub mod cache;
pub mod project;
pub mod record;

pub use cache::CacheStore;
pub use project::{LinkMode, OutputProjector, ProjectReport};
pub use record::{digest, BuildRecord, Mismatch};

use crate::error::{OutsyncError, OutsyncResult};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Remove regular files or symlinks under `root` that sit where a parent
/// directory of `artifact` must go.
///
/// An artifact path that was a file in one cycle can be a directory in the
/// next; the stale entry would otherwise block every later write.
pub(crate) fn clear_file_ancestors(root: &Path, artifact: &str) -> OutsyncResult<()> {
    let mut segments: Vec<&str> = artifact.split('/').collect();
    segments.pop();

    let mut current = root.to_path_buf();
    for segment in segments {
        current.push(segment);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                debug!("Replacing file {} with a directory", current.display());
                fs::remove_file(&current).map_err(|e| {
                    OutsyncError::io(format!("removing {}", current.display()), e)
                })?;
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(OutsyncError::io(format!("inspecting {}", current.display()), e));
            }
        }
    }
    Ok(())
}

/// Whether every parent of `artifact` under `root` is a real directory
pub(crate) fn ancestors_are_dirs(root: &Path, artifact: &str) -> bool {
    let mut segments: Vec<&str> = artifact.split('/').collect();
    segments.pop();

    let mut current = root.to_path_buf();
    segments.into_iter().all(|segment| {
        current.push(segment);
        fs::symlink_metadata(&current).is_ok_and(|meta| meta.is_dir())
    })
}
