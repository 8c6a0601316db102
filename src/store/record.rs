//! Build record bookkeeping
//!
//! A small JSON file written after every successful cycle. It lists the
//! SHA256 digest of each artifact so the output tree can be verified
//! later without re-running the compiler.

use crate::artifact::{artifact_location, Snapshot};
use crate::error::{OutsyncError, OutsyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Record of the last successful cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Unique ID of the cycle that wrote this record
    pub build_id: Uuid,

    /// Cycle number within the writing process, starting at 1
    pub cycle: u64,

    /// When the cycle finished
    pub finished_at: DateTime<Utc>,

    /// Artifact path to hex SHA256 digest
    pub artifacts: BTreeMap<String, String>,
}

/// Outcome of checking one artifact against the output tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// Nothing readable at the artifact's output path
    Missing(String),
    /// Output content digest differs from the recorded one
    Modified(String),
}

impl BuildRecord {
    /// Build a record describing `snapshot`
    pub fn from_snapshot(snapshot: &Snapshot, cycle: u64) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            cycle,
            finished_at: Utc::now(),
            artifacts: snapshot
                .iter()
                .map(|(path, contents)| (path.to_string(), digest(contents)))
                .collect(),
        }
    }

    /// Load a record, returning `None` if the file does not exist
    pub fn load(path: &Path) -> OutsyncResult<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OutsyncError::io(
                    format!("reading build record {}", path.display()),
                    e,
                ))
            }
        };

        let record: BuildRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Write the record, creating its directory if needed
    pub fn save(&self, path: &Path) -> OutsyncResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| OutsyncError::io("creating build record directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            OutsyncError::io(format!("writing build record {}", path.display()), e)
        })?;

        debug!("Wrote build record {} ({} artifacts)", path.display(), self.artifacts.len());
        Ok(())
    }

    /// Compare the output tree against the recorded digests
    pub fn verify(&self, output_root: &Path) -> Vec<Mismatch> {
        self.artifacts
            .iter()
            .filter_map(|(path, expected)| {
                match fs::read(artifact_location(output_root, path)) {
                    Ok(contents) if &digest(&contents) == expected => None,
                    Ok(_) => Some(Mismatch::Modified(path.clone())),
                    Err(_) => Some(Mismatch::Missing(path.clone())),
                }
            })
            .collect()
    }
}

/// Hex SHA256 digest of artifact content
pub fn digest(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hex::encode(hasher.finalize())
}
